//! Filesystem-backed [`StoragePort`].
//!
//! Each value lives in its own file at `<root>/<namespace>/<key>`.  Writes
//! go to a sibling `.tmp` file which is then renamed over the target, so a
//! reader sees either the old value or the new one, never a torn record.
//!
//! Used on the host in place of NVS; on the device it works against any
//! mounted VFS partition.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::app::ports::{StorageError, StoragePort};

pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: &str, key: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_component(namespace) || !is_safe_component(key) {
            warn!("FileStorage: rejected path component {:?}/{:?}", namespace, key);
            return Err(StorageError::IoError);
        }
        Ok(self.root.join(namespace).join(key))
    }
}

/// A single path segment with no separators or parent references.
fn is_safe_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

fn io_error(e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::IoError,
    }
}

impl StoragePort for FileStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let path = self.path_for(namespace, key)?;
        let mut file = fs::File::open(&path).map_err(io_error)?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(io_error(e)),
            }
        }
        Ok(filled)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(namespace, key)?;
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).map_err(io_error)?;

        let tmp = dir.join(format!("{key}.tmp"));
        let result = fs::File::create(&tmp)
            .and_then(|mut f| {
                f.write_all(data)?;
                f.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = result {
            warn!("FileStorage: write {} failed ({})", path.display(), e);
            let _ = fs::remove_file(&tmp);
            return Err(io_error(e));
        }
        debug!("FileStorage: wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.path_for(namespace, key)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }
}
