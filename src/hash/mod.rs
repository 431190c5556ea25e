// Hashing module using BLAKE3

use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::error::{LibraryError, Result};

const FILE_CHUNK_SIZE: usize = 1_048_576; // 1MB

/// Fingerprint a parameter vector for duplicate detection.
/// Format: "blake3:params:<hash>"
pub fn parameter_fingerprint(params: &[i32]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(params.len() as u64).to_le_bytes());
    for value in params {
        hasher.update(&value.to_le_bytes());
    }
    format!("blake3:params:{}", hasher.finalize().to_hex())
}

/// Compute full BLAKE3 hash of a file (used for backup copies)
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| LibraryError::Read(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; FILE_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)
            .map_err(|e| LibraryError::Read(format!("Failed to read {}: {}", path.display(), e)))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("blake3:full:{}", hasher.finalize().to_hex()))
}

/// Verify a file matches its stored hash
pub fn verify_file_hash(path: &Path, expected_hash: &str) -> Result<bool> {
    Ok(compute_file_hash(path)? == expected_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parameter_fingerprint_is_order_sensitive() {
        let a = parameter_fingerprint(&[1, 2, 3]);
        let b = parameter_fingerprint(&[3, 2, 1]);
        assert!(a.starts_with("blake3:params:"));
        assert_ne!(a, b);
        assert_eq!(a, parameter_fingerprint(&[1, 2, 3]));
    }

    #[test]
    fn test_file_hash_verifies() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"library bytes").unwrap();

        let hash = compute_file_hash(file.path()).unwrap();
        assert!(hash.starts_with("blake3:full:"));
        assert!(verify_file_hash(file.path(), &hash).unwrap());
        assert!(!verify_file_hash(file.path(), "blake3:full:00").unwrap());
    }
}
