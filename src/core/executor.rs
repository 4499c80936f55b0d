//! Plan execution.
//!
//! Copies every actionable plan entry. Each copy goes to a temporary file in
//! the destination folder, is checked against the source, gets the source
//! modified time and is then renamed into place, so a destination name never
//! holds a partial file.

use crate::core::context::{RunContext, RunEvent};
use crate::models::plan::{CopyPlan, PlanAction, PlanEntry};
use crate::models::record::{FileRecord, FileStatus, RecordId};
use crate::utils::hash::{hash_file_abortable, HashAlgorithm};
use crate::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Result of one plan entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemResult {
    Copied { bytes: u64, hash: String },
    Skipped,
    Failed { message: String },
    Cancelled,
}

/// Outcome of one plan entry.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub id: RecordId,
    pub parent: Option<RecordId>,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub result: ItemResult,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    AllSucceeded,
    NothingToCopy,
    PartialFailure,
    TotalFailure,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::AllSucceeded | RunOutcome::NothingToCopy => 0,
            RunOutcome::TotalFailure => 1,
            RunOutcome::PartialFailure => 2,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::AllSucceeded => write!(f, "all files copied"),
            RunOutcome::NothingToCopy => write!(f, "nothing to copy"),
            RunOutcome::PartialFailure => write!(f, "some files failed"),
            RunOutcome::TotalFailure => write!(f, "all files failed"),
        }
    }
}

/// Report of one execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub run_id: String,
    /// In plan order.
    pub outcomes: Vec<ItemOutcome>,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes_copied: u64,
    /// Errors already recorded in the plan.
    pub plan_errors: usize,
}

impl ExecutionReport {
    /// Aggregate outcome. Cancelled items count as failures.
    pub fn outcome(&self) -> RunOutcome {
        let failures = self.failed + self.cancelled + self.plan_errors;
        match (self.copied, failures) {
            (0, 0) => RunOutcome::NothingToCopy,
            (_, 0) => RunOutcome::AllSucceeded,
            (0, _) => RunOutcome::TotalFailure,
            _ => RunOutcome::PartialFailure,
        }
    }

    /// Move the records of this run to their final status.
    pub fn apply(&self, records: &mut [FileRecord]) -> Result<()> {
        for outcome in &self.outcomes {
            let Some(record) = find_record(records, outcome.id, outcome.parent) else {
                continue;
            };
            match &outcome.result {
                ItemResult::Copied { hash, .. } => {
                    record.transition(FileStatus::Copying)?;
                    record.transition(FileStatus::Copied)?;
                    record.content_hash = Some(hash.clone());
                }
                ItemResult::Failed { message } => {
                    record.transition(FileStatus::Copying)?;
                    record.transition_with(FileStatus::Error, message.clone())?;
                }
                ItemResult::Skipped | ItemResult::Cancelled => {}
            }
        }
        Ok(())
    }
}

fn find_record(
    records: &mut [FileRecord],
    id: RecordId,
    parent: Option<RecordId>,
) -> Option<&mut FileRecord> {
    match parent {
        None => records.iter_mut().find(|r| r.id == id),
        Some(parent) => records
            .iter_mut()
            .find(|r| r.id == parent)?
            .associated_mut()
            .iter_mut()
            .find(|a| a.id == id),
    }
}

/// Result of copying one file.
#[derive(Debug, Clone)]
pub struct Copied {
    pub bytes: u64,
    pub hash: String,
}

/// Moves the bytes of one file to its destination.
///
/// Runs on a blocking thread. Errors for which [`crate::Error::is_transient`]
/// holds are retried by the executor.
pub trait Transfer: Send + Sync {
    fn copy(
        &self,
        source: &Path,
        destination: &Path,
        options: CopyOptions,
        abort: &AtomicBool,
    ) -> Result<Copied>;
}

/// Local copy through a temporary file in the destination folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicCopy;

impl Transfer for AtomicCopy {
    fn copy(
        &self,
        source: &Path,
        destination: &Path,
        options: CopyOptions,
        abort: &AtomicBool,
    ) -> Result<Copied> {
        copy_file_atomic(source, destination, options, abort)
    }
}

/// Removes a temporary file unless disarmed.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove temporary file {:?}: {}", self.path, e);
                }
            }
        }
    }
}

/// Executes copy plans.
pub struct CopyExecutor {
    ctx: Arc<RunContext>,
    transfer: Arc<dyn Transfer>,
}

impl CopyExecutor {
    /// Create a new executor.
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self {
            ctx,
            transfer: Arc::new(AtomicCopy),
        }
    }

    /// Replace the file transfer.
    pub fn with_transfer(mut self, transfer: Arc<dyn Transfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Execute `plan`. Per-file failures are reported, not returned.
    pub async fn execute(&self, plan: &CopyPlan) -> Result<ExecutionReport> {
        let actionable: Vec<(usize, &PlanEntry)> = plan
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.action.writes())
            .collect();
        let total_bytes: u64 = actionable.iter().map(|(_, e)| e.size).sum();

        tracing::info!(
            "Copying {} files ({} bytes) into {:?}",
            actionable.len(),
            total_bytes,
            plan.destination_root
        );

        let pb = if self.ctx.options.show_progress {
            let pb = ProgressBar::new(total_bytes);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .map(|s| s.progress_chars("=>-"))
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let concurrency = self.ctx.settings.max_concurrent_operations.max(1);
        let mut done: Vec<(usize, ItemResult)> = stream::iter(actionable)
            .map(|(index, entry)| {
                let pb = pb.clone();
                async move {
                    if self.ctx.cancel.is_cancelled() {
                        return (index, ItemResult::Cancelled);
                    }
                    pb.set_message(
                        entry
                            .destination
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                    );
                    let result = match self.copy_with_retry(entry).await {
                        Ok(copied) => {
                            tracing::debug!(
                                "Copied {:?} -> {:?}",
                                entry.source,
                                entry.destination
                            );
                            self.ctx.emit(RunEvent::Copied {
                                id: entry.id,
                                destination: entry.destination.clone(),
                                bytes: copied.bytes,
                            });
                            ItemResult::Copied {
                                bytes: copied.bytes,
                                hash: copied.hash,
                            }
                        }
                        Err(crate::Error::Cancelled) => ItemResult::Cancelled,
                        Err(e) => {
                            tracing::error!("Copy failed: {} - {}", entry.source.display(), e);
                            self.ctx.emit(RunEvent::Failed {
                                id: entry.id,
                                message: e.to_string(),
                            });
                            ItemResult::Failed {
                                message: e.to_string(),
                            }
                        }
                    };
                    pb.inc(entry.size);
                    (index, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        pb.finish_and_clear();

        done.sort_by_key(|(index, _)| *index);
        let mut results = done.into_iter().peekable();

        let mut report = ExecutionReport {
            run_id: plan.run_id.clone(),
            plan_errors: plan.errors.len(),
            ..Default::default()
        };

        for (index, entry) in plan.entries.iter().enumerate() {
            let result = match results.peek() {
                Some((i, _)) if *i == index => match results.next() {
                    Some((_, result)) => result,
                    None => ItemResult::Skipped,
                },
                _ => ItemResult::Skipped,
            };

            match &result {
                ItemResult::Copied { bytes, .. } => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                ItemResult::Skipped => report.skipped += 1,
                ItemResult::Failed { .. } => report.failed += 1,
                ItemResult::Cancelled => report.cancelled += 1,
            }

            report.outcomes.push(ItemOutcome {
                id: entry.id,
                parent: entry.parent,
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                result,
            });
        }

        if report.cancelled > 0 {
            self.ctx.emit(RunEvent::Cancelled);
            tracing::warn!("Run cancelled, {} files not copied", report.cancelled);
        }
        tracing::info!(
            "Copied {} files ({} bytes), {} skipped, {} failed",
            report.copied,
            report.bytes_copied,
            report.skipped,
            report.failed
        );

        Ok(report)
    }

    /// Copy one entry, retrying transient failures with backoff.
    async fn copy_with_retry(&self, entry: &PlanEntry) -> Result<Copied> {
        let settings = &self.ctx.settings;
        let mut attempt = 0u32;

        loop {
            self.ctx.cancel.check()?;

            let abort = Arc::new(AtomicBool::new(false));
            let task = {
                let abort = Arc::clone(&abort);
                let transfer = Arc::clone(&self.transfer);
                let source = entry.source.clone();
                let destination = entry.destination.clone();
                let overwrite = entry.action == PlanAction::Overwrite;
                let algorithm = settings.hash_algorithm;
                let block_size = settings.buffer_size;
                let verify = settings.verify_after_copy;
                tokio::task::spawn_blocking(move || {
                    transfer.copy(
                        &source,
                        &destination,
                        CopyOptions {
                            overwrite,
                            algorithm,
                            block_size,
                            verify,
                        },
                        &abort,
                    )
                })
            };

            let result = match tokio::time::timeout(settings.io_timeout(), task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(crate::Error::other(format!("copy task failed: {}", e))),
                Err(_) => {
                    abort.store(true, Ordering::Relaxed);
                    Err(crate::Error::TransientIo(format!(
                        "timed out copying {}",
                        entry.source.display()
                    )))
                }
            };

            match result {
                Ok(copied) => {
                    self.record_hash(&entry.destination, &copied);
                    return Ok(copied);
                }
                Err(e) if e.is_transient() && attempt < settings.transfer_retry_count => {
                    attempt += 1;
                    let delay = settings.backoff(attempt);
                    tracing::warn!(
                        "Retrying {} in {:?} (attempt {}): {}",
                        entry.source.display(),
                        delay,
                        attempt,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn record_hash(&self, destination: &Path, copied: &Copied) {
        if !self.ctx.settings.cache_hashes {
            return;
        }
        let modified = match fs::metadata(destination).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(e) => {
                tracing::debug!("Cannot stat {:?} for the hash cache: {}", destination, e);
                return;
            }
        };
        if let Err(e) = self.ctx.cache.put(
            destination,
            copied.bytes,
            modified,
            self.ctx.settings.hash_algorithm,
            &copied.hash,
        ) {
            tracing::warn!("Failed to cache hash of {:?}: {}", destination, e);
        }
    }
}

/// Settings of one file transfer.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    /// Replace an existing destination file.
    pub overwrite: bool,
    pub algorithm: HashAlgorithm,
    pub block_size: usize,
    /// Re-read the written file and compare hashes.
    pub verify: bool,
}

/// Copy `source` to `destination` through a temporary file.
fn copy_file_atomic(
    source: &Path,
    destination: &Path,
    options: CopyOptions,
    abort: &AtomicBool,
) -> Result<Copied> {
    let parent = destination
        .parent()
        .ok_or_else(|| crate::Error::FatalIo(format!("no parent folder: {:?}", destination)))?;
    fs::create_dir_all(parent).map_err(crate::Error::from_io)?;

    if !options.overwrite && destination.exists() {
        return Err(crate::Error::FatalIo(format!(
            "destination appeared since planning: {}",
            destination.display()
        )));
    }

    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut temp = TempFile::new(parent.join(format!(
        ".{}.{}.part",
        file_name,
        Uuid::new_v4().simple()
    )));

    let source_meta = fs::metadata(source).map_err(crate::Error::from_io)?;
    let mut input = File::open(source).map_err(crate::Error::from_io)?;
    let mut output = File::create(&temp.path).map_err(crate::Error::from_io)?;
    let mut hasher = options.algorithm.hasher();
    let mut buffer = vec![0u8; options.block_size.max(1)];
    let mut written = 0u64;

    loop {
        if abort.load(Ordering::Relaxed) {
            return Err(crate::Error::TransientIo(format!(
                "copy aborted: {}",
                source.display()
            )));
        }
        let n = input.read(&mut buffer).map_err(crate::Error::from_io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        output.write_all(&buffer[..n]).map_err(crate::Error::from_io)?;
        written += n as u64;
    }
    output.flush().map_err(crate::Error::from_io)?;
    output.sync_all().map_err(crate::Error::from_io)?;

    if written != source_meta.len() {
        return Err(crate::Error::FatalIo(format!(
            "size mismatch copying {}: expected {}, wrote {}",
            source.display(),
            source_meta.len(),
            written
        )));
    }

    let hash = hasher.finalize_hex();
    if options.verify {
        let copied = hash_file_abortable(&temp.path, options.algorithm, options.block_size, Some(abort))?;
        if copied != hash {
            return Err(crate::Error::FatalIo(format!(
                "checksum mismatch after copying {}",
                source.display()
            )));
        }
    }

    if let Ok(modified) = source_meta.modified() {
        output.set_modified(modified).map_err(crate::Error::from_io)?;
    }
    drop(output);

    if options.overwrite && cfg!(windows) && destination.exists() {
        fs::remove_file(destination).map_err(crate::Error::from_io)?;
    }
    fs::rename(&temp.path, destination).map_err(crate::Error::from_io)?;
    temp.disarm();

    Ok(Copied {
        bytes: written,
        hash,
    })
}
