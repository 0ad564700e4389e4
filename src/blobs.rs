use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;
use uuid::Uuid;

pub const LOCAL_DISK: &str = "local";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Failed to write file '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file '{path}': {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown disk '{0}'")]
    UnknownDisk(String),

    #[error("Refusing path outside the disk root: '{0}'")]
    InvalidPath(String),
}

/// Where a stored blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub disk: String,
    pub path: String,
}

/// Blob storage collaborator holding attachment bytes.
pub trait BlobStorage {
    /// Stores `bytes` under a fresh unique name that keeps the extension of
    /// `filename`.
    fn store(&self, bytes: &[u8], filename: &str) -> Result<StoredFile, BlobError>;
    fn read(&self, disk: &str, path: &str) -> Result<Vec<u8>, BlobError>;
    /// Returns whether a file was removed.
    fn delete(&self, disk: &str, path: &str) -> Result<bool, BlobError>;
    fn exists(&self, disk: &str, path: &str) -> bool;
}

/// Name under which an upload is kept: a UUID plus the original extension.
pub fn unique_file_name(filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext.to_lowercase()),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Files on the local filesystem under `root/attachments/`.
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, disk: &str, path: &str) -> Result<PathBuf, BlobError> {
        if disk != LOCAL_DISK {
            return Err(BlobError::UnknownDisk(disk.to_string()));
        }
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStorage for LocalDisk {
    fn store(&self, bytes: &[u8], filename: &str) -> Result<StoredFile, BlobError> {
        let relative = format!("attachments/{}", unique_file_name(filename));
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(&full, bytes).map_err(|e| BlobError::WriteFailed {
            path: full.clone(),
            source: e,
        })?;
        Ok(StoredFile {
            disk: LOCAL_DISK.to_string(),
            path: relative,
        })
    }

    fn read(&self, disk: &str, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(disk, path)?;
        fs::read(&full).map_err(|e| BlobError::ReadFailed {
            path: full,
            source: e,
        })
    }

    fn delete(&self, disk: &str, path: &str) -> Result<bool, BlobError> {
        let full = self.resolve(disk, path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::DeleteFailed {
                path: full,
                source: e,
            }),
        }
    }

    fn exists(&self, disk: &str, path: &str) -> bool {
        self.resolve(disk, path)
            .map(|full| full.is_file())
            .unwrap_or(false)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_exists_delete() {
        let dir = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(dir.path().to_path_buf());

        let stored = disk.store(b"report", "Q3 Report.PDF").unwrap();
        assert_eq!(stored.disk, LOCAL_DISK);
        assert!(stored.path.starts_with("attachments/"));
        assert!(stored.path.ends_with(".pdf"));
        assert!(disk.exists(&stored.disk, &stored.path));
        assert_eq!(disk.read(&stored.disk, &stored.path).unwrap(), b"report");

        assert!(disk.delete(&stored.disk, &stored.path).unwrap());
        assert!(!disk.exists(&stored.disk, &stored.path));
        assert!(
            !disk.delete(&stored.disk, &stored.path).unwrap(),
            "deleting a missing file is not an error"
        );
    }

    #[test]
    fn test_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(dir.path().to_path_buf());

        assert!(matches!(
            disk.delete(LOCAL_DISK, "../secrets"),
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(
            disk.delete("s3", "attachments/a.txt"),
            Err(BlobError::UnknownDisk(_))
        ));
        assert!(!disk.exists(LOCAL_DISK, "/etc/passwd"));
    }
}
