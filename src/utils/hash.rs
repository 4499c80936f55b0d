//! Content hashing.
//!
//! Files are read in fixed-size blocks so memory use does not grow with file size.

use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default read block size.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Supported content hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    /// Identifier stored alongside cached hashes.
    pub fn id(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Create an incremental hasher.
    pub fn hasher(&self) -> ContentHasher {
        match self {
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => ContentHasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => ContentHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(crate::Error::other(format!("Unknown hash algorithm: {}", other))),
        }
    }
}

/// Incremental hasher over one of the supported algorithms.
pub enum ContentHasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl ContentHasher {
    /// Feed a block of bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Sha256(h) => h.update(data),
            ContentHasher::Sha512(h) => h.update(data),
            ContentHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Sha256(h) => to_hex(&h.finalize()),
            ContentHasher::Sha512(h) => to_hex(&h.finalize()),
            ContentHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hash a whole file.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm, block_size: usize) -> Result<String> {
    hash_file_abortable(path, algorithm, block_size, None)
}

/// Hash a whole file, stopping early when `abort` is raised.
pub fn hash_file_abortable(
    path: &Path,
    algorithm: HashAlgorithm,
    block_size: usize,
    abort: Option<&AtomicBool>,
) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; block_size.max(1)];

    loop {
        if abort.is_some_and(|a| a.load(Ordering::Relaxed)) {
            return Err(crate::Error::TransientIo(format!(
                "hashing aborted: {}",
                path.display()
            )));
        }
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();

        let hash = hash_file(&path, HashAlgorithm::Sha256, 2).unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_algorithms_differ() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![7u8; 200_000]).unwrap();

        let a = hash_file(&path, HashAlgorithm::Sha256, DEFAULT_BLOCK_SIZE).unwrap();
        let b = hash_file(&path, HashAlgorithm::Blake3, DEFAULT_BLOCK_SIZE).unwrap();
        let c = hash_file(&path, HashAlgorithm::Sha512, DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(b.len(), 64);
        assert_eq!(c.len(), 128);
        assert_ne!(a, b);
    }

    #[test]
    fn test_block_size_does_not_change_digest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, (0..10_000u32).flat_map(|n| n.to_le_bytes()).collect::<Vec<_>>())
            .unwrap();

        let small = hash_file(&path, HashAlgorithm::Blake3, 7).unwrap();
        let large = hash_file(&path, HashAlgorithm::Blake3, 1 << 20).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_abort_flag_stops_hashing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, "x").unwrap();

        let abort = AtomicBool::new(true);
        let result = hash_file_abortable(&path, HashAlgorithm::Sha256, 16, Some(&abort));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("BLAKE3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
