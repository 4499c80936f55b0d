//! Duplicate detection.
//!
//! Compares a source file with an existing destination file. Hashes are only
//! computed when the destination exists and the sizes agree, and go through
//! the hash cache.

use crate::core::hash_cache::HashCache;
use crate::models::config::GlobalSettings;
use crate::models::plan::Classification;
use crate::models::record::FileRecord;
use crate::utils::hash::{hash_file_abortable, HashAlgorithm};
use crate::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Content comparison against the destination.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    cache: Arc<HashCache>,
    algorithm: HashAlgorithm,
    block_size: usize,
    timeout: Duration,
    use_cache: bool,
}

impl DuplicateDetector {
    /// Create a new detector.
    pub fn new(cache: Arc<HashCache>, settings: &GlobalSettings) -> Self {
        Self {
            cache,
            algorithm: settings.hash_algorithm,
            block_size: settings.buffer_size,
            timeout: settings.io_timeout(),
            use_cache: settings.cache_hashes,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Classify `record` against `destination`.
    ///
    /// Returns the source hash when one was needed.
    pub async fn classify(
        &self,
        record: &FileRecord,
        destination: &Path,
    ) -> Result<(Classification, Option<String>)> {
        let meta = match tokio::fs::metadata(destination).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Classification::New, None));
            }
            Err(e) => return Err(crate::Error::from_io(e)),
        };

        if !meta.is_file() || meta.len() != record.size {
            return Ok((Classification::NameConflictDifferentContent, None));
        }

        let source_hash = self.hash_record(record).await?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(crate::Error::from_io)?;
        let destination_hash = self.hash_of(destination, meta.len(), modified).await?;

        if source_hash == destination_hash {
            tracing::debug!(
                "{} is identical to {}",
                record.source_path.display(),
                destination.display()
            );
            Ok((Classification::DuplicateContent, Some(source_hash)))
        } else {
            Ok((
                Classification::NameConflictDifferentContent,
                Some(source_hash),
            ))
        }
    }

    /// Hash of a source record, using its discovered size and modified time.
    pub async fn hash_record(&self, record: &FileRecord) -> Result<String> {
        if let Some(hash) = &record.content_hash {
            return Ok(hash.clone());
        }
        self.hash_of(&record.source_path, record.size, record.modified)
            .await
    }

    /// Hash of any file, reading its attributes first.
    pub async fn hash_path(&self, path: &Path) -> Result<String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(crate::Error::from_io)?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(crate::Error::from_io)?;
        self.hash_of(path, meta.len(), modified).await
    }

    /// Hash `path`, consulting and filling the cache.
    pub async fn hash_of(&self, path: &Path, size: u64, modified: DateTime<Utc>) -> Result<String> {
        if self.use_cache {
            if let Some(hash) = self.cache.get(path, size, modified, self.algorithm) {
                return Ok(hash);
            }
        }

        let hash = self.hash_blocking(path.to_path_buf()).await?;

        if self.use_cache {
            if let Err(e) = self.cache.put(path, size, modified, self.algorithm, &hash) {
                tracing::warn!("Failed to cache hash of {}: {}", path.display(), e);
            }
        }
        Ok(hash)
    }

    async fn hash_blocking(&self, path: PathBuf) -> Result<String> {
        let abort = Arc::new(AtomicBool::new(false));
        let task = {
            let abort = Arc::clone(&abort);
            let path = path.clone();
            let algorithm = self.algorithm;
            let block_size = self.block_size;
            tokio::task::spawn_blocking(move || {
                hash_file_abortable(&path, algorithm, block_size, Some(&abort))
            })
        };

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(crate::Error::other(format!("hash task failed: {}", e))),
            Err(_) => {
                abort.store(true, Ordering::Relaxed);
                Err(crate::Error::TransientIo(format!(
                    "timed out hashing {}",
                    path.display()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::RecordId;
    use std::fs;

    fn detector() -> DuplicateDetector {
        DuplicateDetector::new(Arc::new(HashCache::in_memory()), &GlobalSettings::default())
    }

    #[tokio::test]
    async fn test_classify() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        fs::write(&src, b"same bytes").unwrap();
        let record = FileRecord::from_path(RecordId(0), &src).unwrap();
        let detector = detector();

        let missing = dir.path().join("missing.jpg");
        let (class, hash) = detector.classify(&record, &missing).await.unwrap();
        assert_eq!(class, Classification::New);
        assert!(hash.is_none());

        let same = dir.path().join("same.jpg");
        fs::write(&same, b"same bytes").unwrap();
        let (class, hash) = detector.classify(&record, &same).await.unwrap();
        assert_eq!(class, Classification::DuplicateContent);
        assert!(hash.is_some());

        let other = dir.path().join("other.jpg");
        fs::write(&other, b"diff bytes").unwrap();
        let (class, _) = detector.classify(&record, &other).await.unwrap();
        assert_eq!(class, Classification::NameConflictDifferentContent);

        let longer = dir.path().join("longer.jpg");
        fs::write(&longer, b"much longer bytes").unwrap();
        let (class, hash) = detector.classify(&record, &longer).await.unwrap();
        assert_eq!(class, Classification::NameConflictDifferentContent);
        assert!(hash.is_none());
    }

    #[tokio::test]
    async fn test_hash_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.bin");
        fs::write(&src, b"payload").unwrap();

        let cache = Arc::new(HashCache::in_memory());
        let detector = DuplicateDetector::new(Arc::clone(&cache), &GlobalSettings::default());
        let first = detector.hash_path(&src).await.unwrap();
        let second = detector.hash_path(&src).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits, 1);
    }
}
