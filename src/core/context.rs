//! Shared state of one run.
//!
//! Everything the planner and executor share across tasks lives here and is
//! passed in explicitly.

use crate::core::decision::{AutoDecision, DecisionProvider};
use crate::core::hash_cache::HashCache;
use crate::generators::pattern::SequenceState;
use crate::models::config::GlobalSettings;
use crate::models::record::RecordId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plan only.
    pub dry_run: bool,
    /// Answer `ask` questions automatically.
    pub assume_yes: bool,
    /// Draw a progress bar.
    pub show_progress: bool,
}

/// Cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`crate::Error::Cancelled`] once cancelled.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Planned { id: RecordId, destination: PathBuf },
    Excluded { id: RecordId, filter: String, reason: String },
    Duplicate { id: RecordId, destination: PathBuf },
    Copied { id: RecordId, destination: PathBuf, bytes: u64 },
    Failed { id: RecordId, message: String },
    Cancelled,
}

/// Who holds a destination name in this run.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub id: RecordId,
    pub source: PathBuf,
    pub size: u64,
}

/// Destination names claimed during planning, per folder.
///
/// Names compare case-insensitively so the plan stays valid on
/// case-insensitive destination file systems.
#[derive(Debug, Default)]
pub struct NameReservations {
    folders: Mutex<HashMap<PathBuf, HashMap<String, Claim>>>,
}

impl NameReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `name` in `folder`.
    pub fn claimed(&self, folder: &Path, name: &str) -> Option<Claim> {
        let folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        folders
            .get(folder)
            .and_then(|names| names.get(&name.to_lowercase()))
            .cloned()
    }

    /// Claim `name` in `folder`. Returns false if it is already held.
    pub fn try_reserve(&self, folder: &Path, name: &str, claim: Claim) -> bool {
        let mut folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        let names = folders.entry(folder.to_path_buf()).or_default();
        let key = name.to_lowercase();
        if names.contains_key(&key) {
            return false;
        }
        names.insert(key, claim);
        true
    }

    /// Number of claimed names.
    pub fn len(&self) -> usize {
        let folders = self.folders.lock().unwrap_or_else(|e| e.into_inner());
        folders.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared state of one run.
pub struct RunContext {
    pub run_id: String,
    pub destination_root: PathBuf,
    pub settings: GlobalSettings,
    pub options: RunOptions,
    pub cache: Arc<HashCache>,
    pub sequences: Mutex<SequenceState>,
    pub reservations: NameReservations,
    pub decisions: Arc<dyn DecisionProvider>,
    pub cancel: CancelFlag,
    events: Option<UnboundedSender<RunEvent>>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("destination_root", &self.destination_root)
            .field("options", &self.options)
            .finish()
    }
}

impl RunContext {
    /// Create a new run context with an in-memory hash cache.
    pub fn new(destination_root: impl Into<PathBuf>, settings: GlobalSettings) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            destination_root: destination_root.into(),
            settings,
            options: RunOptions::default(),
            cache: Arc::new(HashCache::in_memory()),
            sequences: Mutex::new(SequenceState::new()),
            reservations: NameReservations::new(),
            decisions: Arc::new(AutoDecision::default()),
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cache(mut self, cache: Arc<HashCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_decisions(mut self, decisions: Arc<dyn DecisionProvider>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Continue sequence numbering from an earlier state.
    pub fn with_sequences(mut self, sequences: SequenceState) -> Self {
        self.sequences = Mutex::new(sequences);
        self
    }

    /// Send a progress event. Nobody listening is fine.
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(id: usize) -> Claim {
        Claim {
            id: RecordId(id),
            source: PathBuf::from(format!("/src/{}", id)),
            size: 1,
        }
    }

    #[test]
    fn test_reservations_case_insensitive() {
        let reservations = NameReservations::new();
        let folder = Path::new("/dest/2023");
        assert!(reservations.try_reserve(folder, "IMG.JPG", claim(0)));
        assert!(!reservations.try_reserve(folder, "img.jpg", claim(1)));
        assert!(reservations.try_reserve(Path::new("/dest/2024"), "img.jpg", claim(1)));
        assert_eq!(reservations.claimed(folder, "Img.Jpg"), Some(claim(0)));
        assert_eq!(reservations.len(), 2);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let shared = flag.clone();
        assert!(flag.check().is_ok());
        shared.cancel();
        assert!(matches!(flag.check(), Err(crate::Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = RunContext::new("/dest", GlobalSettings::default()).with_events(tx);
        ctx.emit(RunEvent::Cancelled);
        assert_eq!(rx.recv().await, Some(RunEvent::Cancelled));
    }
}
