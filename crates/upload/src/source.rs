//! Local file source.
//!
//! Recursively walks a directory and produces entries with relative
//! paths normalized to forward slashes. Directories are listed too; they
//! open as null records and pass through the pipeline without upload.

use std::io;
use std::path::{Path, PathBuf};

use sftpdeploy_transfer::FileRecord;

/// One entry found under the scanned root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the scanned root, `/` separated.
    pub relative_path: String,
    pub size: u64,
    pub is_dir: bool,
}

impl LocalFile {
    /// Opens the entry as a pipeline record.
    ///
    /// Files are streamed from disk with their size taken from current
    /// metadata. Directories yield a null record.
    pub async fn open(&self) -> io::Result<FileRecord> {
        if self.is_dir {
            return Ok(FileRecord::null(self.relative_path.clone()));
        }
        let file = tokio::fs::File::open(&self.path).await?;
        let size = file.metadata().await?.len();
        Ok(FileRecord::from_reader(self.relative_path.clone(), file, size))
    }
}

/// Scans `root` recursively, parents before their contents.
///
/// Entries within a directory are sorted by name so runs are
/// reproducible. Anything that is neither a file nor a directory is
/// skipped.
pub fn scan_files_for_upload(root: &Path) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    walk_dir(root, root, &mut files)?;
    Ok(files)
}

fn walk_dir(root: &Path, current: &Path, files: &mut Vec<LocalFile>) -> io::Result<()> {
    let mut entries = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata()?;
        let rel_path = path.strip_prefix(root).map_err(io::Error::other)?;

        // Normalize to forward slashes.
        let relative_path = rel_path.to_string_lossy().replace('\\', "/");

        if metadata.is_dir() {
            files.push(LocalFile {
                path: path.clone(),
                relative_path,
                size: 0,
                is_dir: true,
            });
            walk_dir(root, &path, files)?;
        } else if metadata.is_file() {
            files.push(LocalFile {
                path,
                relative_path,
                size: metadata.len(),
                is_dir: false,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::write(root.join("index.html"), b"<html>").unwrap();
        fs::write(root.join("robots.txt"), b"User-agent: *").unwrap();

        fs::create_dir_all(root.join("assets").join("img")).unwrap();
        fs::write(root.join("assets").join("site.css"), b"body{}").unwrap();
        fs::write(root.join("assets").join("img").join("logo.png"), b"PNGDATA").unwrap();

        dir
    }

    #[test]
    fn scan_lists_files_and_directories_in_order() {
        let dir = create_test_tree();
        let files = scan_files_for_upload(dir.path()).unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "assets",
                "assets/img",
                "assets/img/logo.png",
                "assets/site.css",
                "index.html",
                "robots.txt",
            ]
        );
        assert!(files[0].is_dir);
        assert_eq!(files[2].size, b"PNGDATA".len() as u64);
    }

    #[test]
    fn scan_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(scan_files_for_upload(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn scan_nonexistent_dir() {
        let result = scan_files_for_upload(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_streams_file_contents() {
        let dir = create_test_tree();
        let files = scan_files_for_upload(dir.path()).unwrap();
        let css = files
            .iter()
            .find(|f| f.relative_path == "assets/site.css")
            .unwrap();

        let record = css.open().await.unwrap();
        assert!(record.is_stream());
        assert_eq!(record.size, 6);

        let sftpdeploy_transfer::FileContent::Stream(mut reader) = record.contents else {
            panic!("expected stream");
        };
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"body{}");
    }

    #[tokio::test]
    async fn directories_open_as_null_records() {
        let dir = create_test_tree();
        let files = scan_files_for_upload(dir.path()).unwrap();

        let record = files[0].open().await.unwrap();
        assert!(record.is_null());
        assert_eq!(record.relative_path, "assets");
    }
}
