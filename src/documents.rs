//! Blob storage for uploaded contract documents.
//!
//! The database keeps only metadata ([`ContractDocument`](crate::domain::ContractDocument));
//! bytes live behind [`DocumentStorage`]. Storage paths are relative and use
//! `/` separators regardless of platform.

use crate::error::ContractError;
use may::sync::{Mutex, MutexGuard};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// One file in an upload batch.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

pub trait DocumentStorage: Send + Sync {
    /// Store `bytes` at `path`, or at a free variant of it if taken.
    /// Returns the path actually used.
    fn store(&self, path: &str, bytes: &[u8]) -> Result<String, ContractError>;
    fn read(&self, path: &str) -> Result<Vec<u8>, ContractError>;
    /// Missing blobs are not an error.
    fn delete(&self, path: &str) -> Result<(), ContractError>;
}

/// Hex SHA-256 of a blob.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reject names that could escape the contract's directory.
pub fn validate_file_name(file_name: &str) -> Result<(), ContractError> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(ContractError::validation("File name cannot be empty."));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(ContractError::validation(format!(
            "Invalid file name: {file_name}"
        )));
    }
    if name.len() > 255 {
        return Err(ContractError::validation("File name is too long."));
    }
    Ok(())
}

/// Relative path for a contract's document.
pub fn document_path(contract_id: i64, file_name: &str) -> String {
    format!("contracts/{contract_id}/{}", file_name.trim())
}

/// `dir/name.ext` -> `dir/name_<suffix>.ext`
fn with_suffix(path: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..7];
    let (dir, name) = path.rsplit_once('/').map_or(("", path), |(d, n)| (d, n));
    let renamed = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{name}_{suffix}"),
    };
    if dir.is_empty() {
        renamed
    } else {
        format!("{dir}/{renamed}")
    }
}

/// Filesystem storage rooted at `document_root`.
pub struct LocalDocumentStorage {
    root: PathBuf,
}

impl LocalDocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ContractError> {
        if path.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(ContractError::Storage(format!("invalid storage path: {path}")));
        }
        Ok(path.split('/').fold(self.root.clone(), |acc, part| acc.join(part)))
    }
}

impl DocumentStorage for LocalDocumentStorage {
    fn store(&self, path: &str, bytes: &[u8]) -> Result<String, ContractError> {
        let mut stored = path.to_string();
        let mut target = self.resolve(&stored)?;
        while target.exists() {
            stored = with_suffix(path);
            target = self.resolve(&stored)?;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes)?;
        log::debug!("stored {} bytes at {}", bytes.len(), target.display());
        Ok(stored)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ContractError> {
        Ok(fs::read(self.resolve(path)?)?)
    }

    fn delete(&self, path: &str) -> Result<(), ContractError> {
        match fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage for tests.
pub struct MemoryDocumentStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl Default for MemoryDocumentStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStorage {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    fn blobs(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, ContractError> {
        self.blobs
            .lock()
            .map_err(|_| ContractError::Storage("document storage lock poisoned".into()))
    }

    pub fn len(&self) -> usize {
        self.blobs().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStorage for MemoryDocumentStorage {
    fn store(&self, path: &str, bytes: &[u8]) -> Result<String, ContractError> {
        let mut blobs = self.blobs()?;
        let mut stored = path.to_string();
        while blobs.contains_key(&stored) {
            stored = with_suffix(path);
        }
        blobs.insert(stored.clone(), bytes.to_vec());
        Ok(stored)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ContractError> {
        self.blobs()?
            .get(path)
            .cloned()
            .ok_or_else(|| ContractError::Storage(format!("no document at {path}")))
    }

    fn delete(&self, path: &str) -> Result<(), ContractError> {
        self.blobs()?.remove(path);
        Ok(())
    }
}
