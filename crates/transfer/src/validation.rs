use crate::TransferError;

/// Validates the relative path of a file record before it is joined onto
/// the remote base path.
///
/// Both `/` and `\` are accepted as separators. Rejects:
/// - Empty paths, or paths that collapse to nothing (`.`, `a/..`)
/// - Absolute paths (`/etc/passwd`, `\\server\share`)
/// - Drive-letter paths (`C:\Windows`, `c:/temp`)
/// - `..` components that climb above the base directory
pub fn validate_upload_path(file_path: &str) -> Result<(), TransferError> {
    if file_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let normalized = file_path.replace('\\', "/");

    if normalized.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    if has_drive_prefix(&normalized) {
        return Err(TransferError::InvalidPath(format!(
            "drive prefix not allowed: {file_path}"
        )));
    }

    let mut depth: usize = 0;
    for component in normalized.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    TransferError::InvalidPath(format!(
                        "parent directory traversal not allowed: {file_path}"
                    ))
                })?;
            }
            _ => depth += 1,
        }
    }

    if depth == 0 {
        return Err(TransferError::InvalidPath(format!(
            "path does not name a file: {file_path}"
        )));
    }

    Ok(())
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
