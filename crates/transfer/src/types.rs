use std::fmt;

use bytes::Bytes;
use tokio::io::AsyncRead;

/// Contents of a [`FileRecord`].
pub enum FileContent {
    /// No contents (directories, placeholders). Passed through, never uploaded.
    Null,
    /// Fully buffered contents. Cloning is cheap.
    Buffer(Bytes),
    /// A readable byte stream, consumed exactly once.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Contents handed to the transfer engine.
pub enum UploadBody {
    Buffer(Bytes),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One unit of input to the upload pipeline.
#[derive(Debug)]
pub struct FileRecord {
    /// Path relative to the remote base path. `/` or `\` separated.
    pub relative_path: String,
    pub contents: FileContent,
    /// Declared size in bytes. Only used to estimate progress.
    pub size: u64,
}

impl FileRecord {
    /// A record with buffered contents; the size is the buffer length.
    pub fn from_bytes(relative_path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            relative_path: relative_path.into(),
            size: data.len() as u64,
            contents: FileContent::Buffer(data),
        }
    }

    /// A record whose contents are read from `reader`.
    pub fn from_reader<R>(relative_path: impl Into<String>, reader: R, size: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            relative_path: relative_path.into(),
            contents: FileContent::Stream(Box::new(reader)),
            size,
        }
    }

    /// A record without contents.
    pub fn null(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: FileContent::Null,
            size: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.contents, FileContent::Null)
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.contents, FileContent::Buffer(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.contents, FileContent::Stream(_))
    }

    /// Hands out the contents to be written remotely, or `None` for a
    /// record without contents.
    ///
    /// Buffers are shared, so the record keeps its contents. Streams can
    /// only be read once: the record is left [`FileContent::Null`] with
    /// its path and size intact.
    pub fn take_upload_contents(&mut self) -> Option<UploadBody> {
        match std::mem::replace(&mut self.contents, FileContent::Null) {
            FileContent::Null => None,
            FileContent::Buffer(bytes) => {
                self.contents = FileContent::Buffer(bytes.clone());
                Some(UploadBody::Buffer(bytes))
            }
            FileContent::Stream(reader) => Some(UploadBody::Stream(reader)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn from_bytes_sets_size() {
        let record = FileRecord::from_bytes("a.txt", &b"hello"[..]);
        assert_eq!(record.size, 5);
        assert!(record.is_buffer());
    }

    #[test]
    fn buffer_contents_survive_upload() {
        let mut record = FileRecord::from_bytes("a.txt", "hello");
        let Some(UploadBody::Buffer(taken)) = record.take_upload_contents() else {
            panic!("expected buffer");
        };
        assert_eq!(&taken[..], b"hello");

        let FileContent::Buffer(kept) = &record.contents else {
            panic!("record lost its buffer");
        };
        assert_eq!(&kept[..], b"hello");
    }

    #[tokio::test]
    async fn stream_contents_are_taken_once() {
        let mut record = FileRecord::from_reader("s.bin", &b"stream"[..], 6);
        assert!(record.is_stream());

        let Some(UploadBody::Stream(mut reader)) = record.take_upload_contents() else {
            panic!("expected stream");
        };
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"stream");

        assert!(record.is_null());
        assert_eq!(record.size, 6);
        assert_eq!(record.relative_path, "s.bin");
        assert!(record.take_upload_contents().is_none());
    }

    #[test]
    fn null_record() {
        let record = FileRecord::null("dir");
        assert!(record.is_null());
        assert_eq!(record.size, 0);
        assert_eq!(format!("{:?}", record.contents), "Null");
    }
}
