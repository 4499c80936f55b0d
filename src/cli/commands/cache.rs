//! Cache command implementation.

use crate::core::hash_cache::HashCache;
use crate::models::config::GlobalSettings;
use crate::Result;
use colored::Colorize;

fn open(settings: &GlobalSettings) -> Result<HashCache> {
    HashCache::open(&settings.cache_path)
}

/// Show hash cache statistics.
pub fn stats(settings: &GlobalSettings) -> Result<()> {
    let cache = open(settings)?;
    let size = std::fs::metadata(&settings.cache_path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("{}", "🗄️  Hash Cache".bold().cyan());
    println!("  {} {}", "Path:".bold(), settings.cache_path.display());
    println!(
        "  {} {}",
        "Enabled:".bold(),
        if settings.cache_hashes { "yes" } else { "no" }
    );
    println!("  {} {}", "Entries:".bold(), cache.len());
    println!("  {} {}", "File size:".bold(), super::format_bytes(size));
    println!("  {} {}", "Algorithm:".bold(), settings.hash_algorithm);
    Ok(())
}

/// Remove every cached hash.
pub fn clear(settings: &GlobalSettings) -> Result<()> {
    let cache = open(settings)?;
    let removed = cache.len();
    cache.clear()?;
    println!(
        "{} removed {} entries from {}",
        "[OK]".green(),
        removed,
        settings.cache_path.display()
    );
    Ok(())
}

/// Drop stale entries and rewrite the cache file.
pub fn compact(settings: &GlobalSettings) -> Result<()> {
    let cache = open(settings)?;
    let before = cache.len();
    let kept = cache.compact()?;
    println!(
        "{} kept {} entries, dropped {}",
        "[OK]".green(),
        kept,
        before.saturating_sub(kept)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash::HashAlgorithm;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_compact_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let settings = GlobalSettings {
            cache_path: dir.path().join("cache").join("hash_cache.jsonl"),
            ..Default::default()
        };

        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"jpeg").unwrap();
        let meta = std::fs::metadata(&file).unwrap();
        let modified = DateTime::<Utc>::from(meta.modified().unwrap());
        {
            let cache = open(&settings).unwrap();
            cache
                .put(&file, meta.len(), modified, HashAlgorithm::Sha256, "abc")
                .unwrap();
            cache
                .put(
                    &dir.path().join("gone.jpg"),
                    1,
                    modified,
                    HashAlgorithm::Sha256,
                    "def",
                )
                .unwrap();
        }

        compact(&settings).unwrap();
        assert_eq!(open(&settings).unwrap().len(), 1);

        clear(&settings).unwrap();
        assert!(open(&settings).unwrap().is_empty());
        assert!(stats(&settings).is_ok());
    }
}
