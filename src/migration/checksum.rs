//! Checksums of migration SQL

use crate::migration::MigrationError;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of `content`.
pub fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare the checksum stored at apply time with the current one.
///
/// # Errors
///
/// Returns `MigrationError::ChecksumMismatch` when they differ.
pub fn validate_checksum(
    version: i64,
    name: &str,
    stored: &str,
    current: &str,
) -> Result<(), MigrationError> {
    if stored == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version,
            name: name.to_string(),
            stored: stored.to_string(),
            current: current.to_string(),
        })
    }
}
