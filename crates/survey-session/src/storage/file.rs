//! Directory-of-files snapshot backend: one JSON file per key.
//!
//! Keys are percent-encoded into file names so any key maps to exactly one
//! file. Writes go to a temporary sibling and are renamed into place, so a
//! crash mid-write leaves the previous value readable.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::LocalStorageError;

use super::traits::SnapshotBackend;

pub struct FileSnapshotBackend {
    dir: PathBuf,
}

impl FileSnapshotBackend {
    /// Use `dir` for snapshot files, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LocalStorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| LocalStorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> LocalStorageError + '_ {
    move |source| LocalStorageError::Io {
        key: key.to_string(),
        source,
    }
}

impl SnapshotBackend for FileSnapshotBackend {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key)(e)),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(io_err(key))?;
        fs::rename(&tmp, &path).map_err(io_err(key))
    }

    fn remove(&self, key: &str) -> Result<(), LocalStorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(key)(e)),
        }
    }
}
