//! Integration tests for the hash cache.
//!
//! Tests cover:
//! - Persistence across opens
//! - Stale entries after a file changes
//! - Compaction and clearing
//! - Duplicate detection through the cache

use chrono::{DateTime, Utc};
use media_ingest::core::duplicates::DuplicateDetector;
use media_ingest::core::hash_cache::HashCache;
use media_ingest::models::config::GlobalSettings;
use media_ingest::utils::hash::{hash_file, HashAlgorithm};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn stat(path: &Path) -> (u64, DateTime<Utc>) {
    let meta = fs::metadata(path).unwrap();
    (meta.len(), DateTime::<Utc>::from(meta.modified().unwrap()))
}

#[test]
fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("cache").join("hash_cache.jsonl");
    let file = dir.path().join("IMG_0001.JPG");
    fs::write(&file, "jpeg").unwrap();
    let (size, modified) = stat(&file);

    {
        let cache = HashCache::open(&store).unwrap();
        cache
            .put(&file, size, modified, HashAlgorithm::Sha256, "cafe")
            .unwrap();
        // Later lines win.
        cache
            .put(&file, size, modified, HashAlgorithm::Sha256, "beef")
            .unwrap();
    }

    let cache = HashCache::open(&store).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get(&file, size, modified, HashAlgorithm::Sha256),
        Some("beef".to_string())
    );
    assert_eq!(cache.path(), Some(store));
}

#[test]
fn test_changed_file_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("IMG_0001.JPG");
    fs::write(&file, "jpeg").unwrap();
    let (size, modified) = stat(&file);

    let cache = HashCache::in_memory();
    cache
        .put(&file, size, modified, HashAlgorithm::Sha256, "cafe")
        .unwrap();

    let later = modified + chrono::Duration::seconds(5);
    assert_eq!(cache.get(&file, size, later, HashAlgorithm::Sha256), None);
    assert!(cache.lookup(&file, size, later, HashAlgorithm::Sha256).is_err());
    assert_eq!(cache.get(&file, size, modified, HashAlgorithm::Blake3), None);

    let stats = cache.stats();
    assert!(stats.stale >= 1);
    assert!(stats.misses >= 2);
}

#[test]
fn test_compact_drops_missing_files() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("hash_cache.jsonl");
    let kept = dir.path().join("kept.jpg");
    let gone = dir.path().join("gone.jpg");
    fs::write(&kept, "kept").unwrap();
    fs::write(&gone, "gone").unwrap();

    let cache = HashCache::open(&store).unwrap();
    for path in [&kept, &gone] {
        let (size, modified) = stat(path);
        cache
            .put(path, size, modified, HashAlgorithm::Sha256, "00")
            .unwrap();
    }
    fs::remove_file(&gone).unwrap();

    assert_eq!(cache.compact().unwrap(), 1);
    assert!(!dir.path().join("hash_cache.jsonl.tmp").exists());

    let lines = fs::read_to_string(&store).unwrap();
    assert_eq!(lines.lines().count(), 1);
    assert_eq!(HashCache::open(&store).unwrap().len(), 1);
}

#[test]
fn test_clear_truncates_store() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("hash_cache.jsonl");
    let file = dir.path().join("a.jpg");
    fs::write(&file, "a").unwrap();
    let (size, modified) = stat(&file);

    let cache = HashCache::open(&store).unwrap();
    cache
        .put(&file, size, modified, HashAlgorithm::Sha256, "00")
        .unwrap();
    cache.clear().unwrap();

    assert!(cache.is_empty());
    assert_eq!(fs::read_to_string(&store).unwrap(), "");
}

#[tokio::test]
async fn test_detector_recomputes_after_modification() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("IMG_0001.JPG");
    fs::write(&file, "version one").unwrap();

    let cache = Arc::new(HashCache::in_memory());
    let detector = DuplicateDetector::new(Arc::clone(&cache), &GlobalSettings::default());

    let first = detector.hash_path(&file).await.unwrap();
    assert_eq!(first, hash_file(&file, HashAlgorithm::Sha256, 4096).unwrap());
    assert_eq!(cache.len(), 1);

    fs::write(&file, "version two").unwrap();
    let bumped = SystemTime::now() + Duration::from_secs(10);
    fs::File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_modified(bumped)
        .unwrap();

    let second = detector.hash_path(&file).await.unwrap();
    assert_ne!(first, second);

    // The stale entry was replaced.
    let (size, modified) = stat(&file);
    assert_eq!(
        cache.get(&file, size, modified, HashAlgorithm::Sha256),
        Some(second)
    );
}
