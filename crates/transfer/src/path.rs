//! Remote path resolution.
//!
//! Remote paths are kept in a canonical forward-slash form everywhere in
//! the pipeline. Only the paths handed to directory calls on a Windows
//! remote are converted, through [`RemotePlatform::native_path`].

use std::fmt;

use crate::TransferError;
use crate::validation::validate_upload_path;

/// Filesystem flavour of the remote host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemotePlatform {
    #[default]
    Unix,
    Windows,
}

impl RemotePlatform {
    /// Interprets a free-form platform hint such as `"unix"`, `"windows"`
    /// or `"Win32"`. Anything containing `win` (any case) is Windows.
    pub fn from_hint(hint: &str) -> Self {
        if hint.to_ascii_lowercase().contains("win") {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Converts a canonical path to the separator style of the remote.
    pub fn native_path(self, path: &str) -> String {
        match self {
            Self::Unix => path.to_string(),
            Self::Windows => path.replace('/', "\\"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for RemotePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a remote path to its canonical form.
///
/// Backslashes become `/`, empty and `.` components are dropped, `..`
/// is folded into its parent, and trailing slashes are removed (except
/// for the root itself). A leading `/~` is treated as home-relative `~`.
/// An empty relative path normalizes to `.`.
pub fn normalize_remote_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                // `/..` is still `/`.
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    if absolute && parts.first() == Some(&"~") {
        absolute = false;
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".into()
    } else {
        joined
    }
}

/// Where one file lands on the remote and which directories it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    target: String,
    directories: Vec<String>,
}

impl ResolvedPath {
    /// Canonical remote path of the file itself.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Ancestor directories at or below the base path, root-to-leaf.
    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// Directories still to be ensured, skipping the ones `known` reports
    /// as already present. Order is preserved.
    pub fn pending_directories<F>(&self, known: F) -> Vec<&str>
    where
        F: Fn(&str) -> bool,
    {
        self.directories
            .iter()
            .map(String::as_str)
            .filter(|dir| !known(dir))
            .collect()
    }
}

/// Resolves `relative_path` against the remote `base_path`.
///
/// Ancestors shorter than the normalized base are never returned, so the
/// pipeline never tries to create directories above its configured root.
/// The root marker itself (`/`, `~` or `.`) is omitted as it always exists.
pub fn resolve(base_path: &str, relative_path: &str) -> Result<ResolvedPath, TransferError> {
    validate_upload_path(relative_path)?;

    let base = normalize_remote_path(base_path);
    let target = normalize_remote_path(&format!("{base}/{relative_path}"));

    let directories = ancestors(&target)
        .into_iter()
        .filter(|dir| dir.len() >= base.len() && !is_root_marker(dir))
        .collect();

    Ok(ResolvedPath {
        target,
        directories,
    })
}

/// Every proper ancestor of a canonical path, shallowest first.
fn ancestors(target: &str) -> Vec<String> {
    let absolute = target.starts_with('/');
    let parts: Vec<&str> = target.split('/').filter(|p| !p.is_empty()).collect();

    (1..parts.len())
        .map(|depth| {
            let joined = parts[..depth].join("/");
            if absolute { format!("/{joined}") } else { joined }
        })
        .collect()
}

fn is_root_marker(dir: &str) -> bool {
    matches!(dir, "/" | "~" | ".")
}
