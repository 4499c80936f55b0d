//! Persistent content hash cache.
//!
//! Entries are keyed by absolute path and only trusted while the file's size
//! and modified time still match. The store is a JSON-lines file: each put
//! appends one line, later lines win, and a torn trailing line from an
//! interrupted write is ignored on load.

use crate::utils::hash::HashAlgorithm;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// One cached hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashCacheEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub algorithm: HashAlgorithm,
    pub hash: String,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
}

struct Store {
    path: PathBuf,
    file: Option<File>,
    /// The file ends without a newline (torn write).
    needs_newline: bool,
}

/// Hash cache shared by every task of a run.
pub struct HashCache {
    entries: RwLock<HashMap<PathBuf, HashCacheEntry>>,
    store: Option<Mutex<Store>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
}

impl std::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCache")
            .field("path", &self.path())
            .field("entries", &self.len())
            .finish()
    }
}

fn key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl HashCache {
    /// Create a cache that lives only for this process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    /// Open (or create) the cache stored at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut needs_newline = false;

        if path.exists() {
            let content = fs::read(path)?;
            needs_newline = !content.is_empty() && !content.ends_with(b"\n");

            let mut skipped = 0usize;
            for line in BufReader::new(content.as_slice()).lines() {
                let Ok(line) = line else {
                    skipped += 1;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HashCacheEntry>(&line) {
                    Ok(entry) => {
                        entries.insert(entry.path.clone(), entry);
                    }
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::warn!("Ignored {} unreadable hash cache lines in {:?}", skipped, path);
            }
            tracing::debug!("Loaded {} hash cache entries from {:?}", entries.len(), path);
        }

        Ok(Self {
            entries: RwLock::new(entries),
            store: Some(Mutex::new(Store {
                path: path.to_path_buf(),
                file: None,
                needs_newline,
            })),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        })
    }

    /// Backing file, if persistent.
    pub fn path(&self) -> Option<PathBuf> {
        self.store
            .as_ref()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).path.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the hash of `path` if the entry still matches the file.
    pub fn get(
        &self,
        path: &Path,
        size: u64,
        modified: DateTime<Utc>,
        algorithm: HashAlgorithm,
    ) -> Option<String> {
        match self.lookup(path, size, modified, algorithm) {
            Ok(Some(hash)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(hash)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::trace!("{}", e);
                self.stale.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Look up an entry, reporting a mismatching one as an error.
    pub fn lookup(
        &self,
        path: &Path,
        size: u64,
        modified: DateTime<Utc>,
        algorithm: HashAlgorithm,
    ) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get(&key(path)) else {
            return Ok(None);
        };

        if entry.algorithm != algorithm {
            return Ok(None);
        }
        if entry.size != size || entry.modified != modified {
            return Err(crate::Error::CacheInconsistency(format!(
                "{} changed since it was hashed",
                path.display()
            )));
        }
        Ok(Some(entry.hash.clone()))
    }

    /// Insert or replace the hash of `path`.
    pub fn put(
        &self,
        path: &Path,
        size: u64,
        modified: DateTime<Utc>,
        algorithm: HashAlgorithm,
        hash: &str,
    ) -> Result<()> {
        let entry = HashCacheEntry {
            path: key(path),
            size,
            modified,
            algorithm,
            hash: hash.to_string(),
        };

        if let Some(store) = &self.store {
            let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            if store.needs_newline {
                line.insert(0, '\n');
            }
            let file = store.append_handle()?;
            file.write_all(line.as_bytes())?;
            file.flush()?;
            store.needs_newline = false;
        }

        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.path.clone(), entry);
        Ok(())
    }

    /// Rewrite the store with one line per live entry, dropping entries whose
    /// file is gone or changed. Returns the number of entries kept.
    pub fn compact(&self) -> Result<usize> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|path, entry| match fs::metadata(path) {
            Ok(meta) => {
                let modified = meta.modified().map(DateTime::<Utc>::from).ok();
                meta.len() == entry.size && modified == Some(entry.modified)
            }
            Err(_) => false,
        });

        let Some(store) = &self.store else {
            return Ok(entries.len());
        };
        let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
        store.file = None;

        if let Some(parent) = store.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = store.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            let mut sorted: Vec<&HashCacheEntry> = entries.values().collect();
            sorted.sort_by(|a, b| a.path.cmp(&b.path));
            for entry in sorted {
                writeln!(file, "{}", serde_json::to_string(entry)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &store.path)?;
        store.needs_newline = false;

        tracing::info!("Hash cache compacted to {} entries", entries.len());
        Ok(entries.len())
    }

    /// Remove every entry and truncate the store.
    pub fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        if let Some(store) = &self.store {
            let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
            store.file = None;
            if store.path.exists() {
                File::create(&store.path)?;
            }
            store.needs_newline = false;
        }
        Ok(())
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

impl Store {
    fn append_handle(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| crate::Error::other("hash cache store is not open"))
    }
}
