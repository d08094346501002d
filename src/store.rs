//! Directory-backed file store.
//!
//! All four wire commands bottom out here: one flat root directory holding
//! named blobs, with no metadata beyond what the filesystem keeps. Calls
//! are plain synchronous file I/O and are meant to run on pool workers,
//! never on the async reactor.
//!
//! File content crosses the wire base64-encoded; `get` encodes on the way
//! out and `upload` decodes on the way in, re-padding payloads whose `=`
//! padding was stripped in transit.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, info};

/// Storage operation errors. The `Display` text is what goes out on the
/// wire in `status: ERROR` responses.
#[derive(Debug)]
pub enum StoreError {
    /// Required filename parameter was empty.
    EmptyFilename,
    /// Filename or payload parameter was empty.
    EmptyNameOrData,
    /// Filename is not a single normal path component.
    InvalidFilename(String),
    /// No such file in the store.
    NotFound(String),
    /// Payload failed to decode as base64.
    InvalidPayload(base64::DecodeError),
    /// Underlying filesystem failure.
    Io(io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::EmptyFilename => write!(f, "Filename is empty"),
            StoreError::EmptyNameOrData => write!(f, "Filename or file data is empty"),
            StoreError::InvalidFilename(name) => write!(f, "Invalid filename: {name}"),
            StoreError::NotFound(name) => write!(f, "File {name} not found"),
            StoreError::InvalidPayload(e) => write!(f, "Invalid base64 payload: {e}"),
            StoreError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Directory-backed blob store.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store rooted at `root`, creating the directory if absent.
    pub fn new(root: impl Into<PathBuf>) -> Result<Arc<Self>, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::Io)?;
        info!(root = %root.display(), "File store ready");
        Ok(Arc::new(Self { root }))
    }

    /// Root directory the store serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List stored filenames, sorted.
    ///
    /// Only names containing a dot are visible and dot-prefixed names are
    /// hidden, matching the `*.*` listing pattern of the original service.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(StoreError::Io)? {
            let entry = entry.map_err(StoreError::Io)?;
            if let Ok(name) = entry.file_name().into_string() {
                if !name.starts_with('.') && name.contains('.') {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a file and return its content base64-encoded.
    pub fn get(&self, filename: &str) -> Result<String, StoreError> {
        if filename.is_empty() {
            return Err(StoreError::EmptyNameOrData);
        }
        let path = self.entry_path(filename)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(BASE64.encode(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Decode a base64 payload and write it under `filename`, replacing any
    /// existing entry.
    ///
    /// The write goes straight to the final path, so a concurrent `get` of
    /// the same name can observe a partially written file.
    pub fn upload(&self, filename: &str, payload_b64: &str) -> Result<(), StoreError> {
        if filename.is_empty() || payload_b64.is_empty() {
            return Err(StoreError::EmptyNameOrData);
        }
        let path = self.entry_path(filename)?;
        let bytes = decode_repadded(payload_b64)?;
        fs::write(&path, &bytes).map_err(StoreError::Io)?;
        debug!(filename, size = bytes.len(), "Stored file");
        Ok(())
    }

    /// Remove `filename` from the store.
    pub fn delete(&self, filename: &str) -> Result<(), StoreError> {
        if filename.is_empty() {
            return Err(StoreError::EmptyFilename);
        }
        let path = self.entry_path(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(filename, "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Resolve `filename` inside the root, rejecting anything that is not
    /// a single normal path component. Keeps `../`, absolute paths, and
    /// nested paths from escaping the store.
    fn entry_path(&self, filename: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(filename)),
            _ => Err(StoreError::InvalidFilename(filename.to_string())),
        }
    }
}

/// Decode base64, restoring `=` padding stripped in transit.
fn decode_repadded(payload: &str) -> Result<Vec<u8>, StoreError> {
    let rem = payload.len() % 4;
    let decoded = if rem != 0 {
        let mut padded = String::with_capacity(payload.len() + (4 - rem));
        padded.push_str(payload);
        for _ in 0..(4 - rem) {
            padded.push('=');
        }
        BASE64.decode(padded.as_bytes())
    } else {
        BASE64.decode(payload.as_bytes())
    };
    decoded.map_err(StoreError::InvalidPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> Arc<FileStore> {
        FileStore::new(dir.path().join("files")).unwrap()
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_upload_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.upload("hello.txt", &BASE64.encode(b"hello world")).unwrap();
        let content = store.get("hello.txt").unwrap();
        assert_eq!(BASE64.decode(content).unwrap(), b"hello world");
    }

    #[test]
    fn test_upload_accepts_unpadded_payload() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        // "hello" encodes as "aGVsbG8=" and arrives without its padding.
        store.upload("a.txt", "aGVsbG8").unwrap();
        let content = store.get("a.txt").unwrap();
        assert_eq!(BASE64.decode(content).unwrap(), b"hello");
    }

    #[test]
    fn test_upload_overwrites() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.upload("a.txt", &BASE64.encode(b"first")).unwrap();
        store.upload("a.txt", &BASE64.encode(b"second")).unwrap();
        let content = store.get("a.txt").unwrap();
        assert_eq!(BASE64.decode(content).unwrap(), b"second");
    }

    #[test]
    fn test_upload_rejects_garbage_payload() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        match store.upload("a.txt", "!!not base64!!") {
            Err(StoreError::InvalidPayload(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_list_hides_names_without_dot() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.upload("b.txt", &BASE64.encode(b"x")).unwrap();
        store.upload("a.bin", &BASE64.encode(b"x")).unwrap();
        store.upload("noext", &BASE64.encode(b"x")).unwrap();
        store.upload(".hidden.txt", &BASE64.encode(b"x")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["a.bin", "b.txt"]);
    }

    #[test]
    fn test_get_missing_file() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        match store.get("ghost.txt") {
            Err(e @ StoreError::NotFound(_)) => {
                assert_eq!(e.to_string(), "File ghost.txt not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_delete_then_get_fails() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        store.upload("a.txt", &BASE64.encode(b"x")).unwrap();
        store.delete("a.txt").unwrap();
        assert!(matches!(store.get("a.txt"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_missing_file() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        match store.delete("ghost.txt") {
            Err(e @ StoreError::NotFound(_)) => {
                assert_eq!(e.to_string(), "File ghost.txt not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_parameter_messages() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(
            store.delete("").unwrap_err().to_string(),
            "Filename is empty"
        );
        assert_eq!(
            store.get("").unwrap_err().to_string(),
            "Filename or file data is empty"
        );
        assert_eq!(
            store.upload("a.txt", "").unwrap_err().to_string(),
            "Filename or file data is empty"
        );
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        for name in ["../escape.txt", "/etc/passwd", "sub/dir.txt", ".."] {
            assert!(
                matches!(store.upload(name, "aGVsbG8="), Err(StoreError::InvalidFilename(_))),
                "{name} should be rejected"
            );
        }
    }
}
