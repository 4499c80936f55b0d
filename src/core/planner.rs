//! Copy planning.
//!
//! Turns discovered records into a [`CopyPlan`]:
//!
//! 1. associated files are attached to their main file;
//! 2. the filter chain runs on main files (associated files only when the
//!    preset asks for it);
//! 3. folder and file names are resolved in discovery order, so sequence
//!    numbers are deterministic;
//! 4. names are claimed and compared with the destination, one folder at a
//!    time, folders in parallel;
//! 5. the plan is assembled in discovery order, associated files after
//!    their main file.

use crate::core::associated::AssociatedFileResolver;
use crate::core::context::{Claim, RunContext, RunEvent};
use crate::core::decision::{DuplicateDecision, DuplicateQuestion};
use crate::core::duplicates::DuplicateDetector;
use crate::core::filters::{ChainVerdict, FilterChain, FilterRegistry, FilterStats};
use crate::generators::collision::CollisionResolver;
use crate::generators::filename::generate_filename;
use crate::generators::folder::generate_folder_path;
use crate::generators::pattern::{PatternResolver, SequenceState};
use crate::models::plan::{
    Classification, CopyPlan, ErrorEntry, ExcludedEntry, PlanAction, PlanCounters, PlanEntry,
    PLAN_VERSION,
};
use crate::models::preset::{DuplicateHandling, Preset};
use crate::models::record::{FileRecord, FileStatus};
use crate::utils::fs::split_file_name;
use crate::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reason recorded for duplicates skipped under the `skip` policy.
pub const DUPLICATE_REASON: &str = "duplicate";

/// Output of planning.
#[derive(Debug)]
pub struct PlannedRun {
    pub plan: CopyPlan,
    /// Top-level records with their associated files, statuses updated.
    pub records: Vec<FileRecord>,
    pub filter_stats: FilterStats,
}

/// Where a record goes, decided against the destination.
#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Place {
        destination: PathBuf,
        action: PlanAction,
        classification: Classification,
        source_hash: Option<String>,
    },
    Skip {
        destination: PathBuf,
        classification: Classification,
        source_hash: Option<String>,
        status: FileStatus,
        reason: String,
    },
}

#[derive(Debug)]
enum Stage {
    Excluded { filter: String, reason: String },
    Failed(String),
    Named { folder: PathBuf, name: String },
    Placed { folder: PathBuf, verdict: Verdict },
}

#[derive(Debug, Clone)]
enum AssociateStage {
    Excluded { filter: String, reason: String },
    Failed(String),
    Named(String),
    Placed(Verdict),
}

#[derive(Debug)]
struct Item {
    record: FileRecord,
    stage: Stage,
    associates: Vec<AssociateStage>,
}

type GroupResult = (usize, std::result::Result<Verdict, String>, Vec<(usize, AssociateStage)>);

/// Builds copy plans.
pub struct CopyPlanner {
    preset: Preset,
    chain: Arc<FilterChain>,
    associations: AssociatedFileResolver,
    resolver: PatternResolver,
    collisions: CollisionResolver,
    detector: DuplicateDetector,
    ctx: Arc<RunContext>,
}

impl CopyPlanner {
    /// Create a new planner with the built-in filter kinds. The preset is
    /// validated first.
    pub fn new(preset: Preset, ctx: Arc<RunContext>) -> Result<Self> {
        Self::with_registry(preset, ctx, &FilterRegistry::with_builtins())
    }

    /// Create a new planner whose filters come from `registry`.
    pub fn with_registry(
        preset: Preset,
        ctx: Arc<RunContext>,
        registry: &FilterRegistry,
    ) -> Result<Self> {
        preset.validate_with(registry)?;

        let chain = registry.build_chain(&preset.filters)?;
        let associations = AssociatedFileResolver::new(preset.associated_file_rules.clone())?;
        let placeholder = Some(ctx.settings.missing_metadata_placeholder.clone())
            .filter(|p| !p.is_empty());
        let resolver = PatternResolver::new().with_placeholder(placeholder);
        let collisions = CollisionResolver::new(
            preset.file_name_pattern.conflict_resolution.clone(),
            ctx.settings.max_collision_attempts,
        );
        let detector = DuplicateDetector::new(Arc::clone(&ctx.cache), &ctx.settings);

        Ok(Self {
            preset,
            chain: Arc::new(chain),
            associations,
            resolver,
            collisions,
            detector,
            ctx,
        })
    }

    /// Replace the pattern resolver (e.g. with [`PatternResolver::strict`]).
    pub fn with_resolver(mut self, resolver: PatternResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    /// Build the plan for `records`, given in discovery order.
    pub async fn plan(&self, records: Vec<FileRecord>) -> Result<PlannedRun> {
        tracing::info!(
            "Planning {} files into {:?} with preset '{}'",
            records.len(),
            self.ctx.destination_root,
            self.preset.name
        );

        let records = self.associations.resolve(records)?;
        let mut items = self.filter(records).await?;
        self.resolve_names(&mut items)?;
        self.place_all(&mut items).await?;
        let (plan, records) = self.assemble(items)?;

        tracing::info!(
            "Plan ready: {} to copy, {} excluded, {} duplicates, {} errors",
            plan.counters.included,
            plan.counters.excluded_by_filter,
            plan.counters.duplicate,
            plan.counters.error
        );

        Ok(PlannedRun {
            plan,
            records,
            filter_stats: self.chain.stats(),
        })
    }

    async fn filter(&self, records: Vec<FileRecord>) -> Result<Vec<Item>> {
        let apply_to_associates = self.preset.associated_file_rules.apply_filters;
        let workers = self.ctx.settings.workers.max(1);

        let results: Vec<_> = stream::iter(records.into_iter().map(|record| {
            let chain = Arc::clone(&self.chain);
            tokio::task::spawn_blocking(move || {
                let verdict = chain.evaluate(&record);
                let associates = record
                    .associated()
                    .iter()
                    .map(|a| {
                        if apply_to_associates && verdict.is_included() {
                            chain.evaluate(a)
                        } else {
                            ChainVerdict::Included
                        }
                    })
                    .collect::<Vec<_>>();
                (record, verdict, associates)
            })
        }))
        .buffered(workers)
        .collect()
        .await;

        let mut items = Vec::with_capacity(results.len());
        for result in results {
            let (record, verdict, associates) =
                result.map_err(|e| crate::Error::other(format!("filter task failed: {}", e)))?;

            let stage = match verdict {
                ChainVerdict::Included => Stage::Named {
                    folder: PathBuf::new(),
                    name: String::new(),
                },
                ChainVerdict::Excluded { filter, reason } => Stage::Excluded { filter, reason },
            };
            let associates = associates
                .into_iter()
                .map(|v| match v {
                    ChainVerdict::Included => AssociateStage::Named(String::new()),
                    ChainVerdict::Excluded { filter, reason } => {
                        AssociateStage::Excluded { filter, reason }
                    }
                })
                .collect();

            items.push(Item {
                record,
                stage,
                associates,
            });
        }
        Ok(items)
    }

    /// Resolve folder and file names, strictly in discovery order.
    fn resolve_names(&self, items: &mut [Item]) -> Result<()> {
        let mut sequences = self
            .ctx
            .sequences
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        for item in items.iter_mut() {
            if !matches!(item.stage, Stage::Named { .. }) {
                continue;
            }
            self.ctx.cancel.check()?;

            let folder = match generate_folder_path(
                &self.resolver,
                &self.preset.folder_structure,
                &item.record,
                &mut sequences,
            ) {
                Ok(folder) => self.ctx.destination_root.join(folder),
                Err(e) => {
                    item.stage = Stage::Failed(e.to_string());
                    continue;
                }
            };

            let before: SequenceState = sequences.clone();
            let name = match generate_filename(
                &self.resolver,
                &self.preset.file_name_pattern,
                &item.record,
                &mut sequences,
            ) {
                Ok(name) => name,
                Err(e) => {
                    item.stage = Stage::Failed(e.to_string());
                    continue;
                }
            };

            for (associate, stage) in item.record.associated().iter().zip(item.associates.iter_mut()) {
                if !matches!(stage, AssociateStage::Named(_)) {
                    continue;
                }
                // Associated files reuse the main file's sequence values.
                let mut local = before.clone();
                *stage = match generate_filename(
                    &self.resolver,
                    &self.preset.file_name_pattern,
                    associate,
                    &mut local,
                ) {
                    Ok(name) => AssociateStage::Named(name),
                    Err(e) => AssociateStage::Failed(e.to_string()),
                };
            }

            item.stage = Stage::Named { folder, name };
        }
        Ok(())
    }

    async fn place_all(&self, items: &mut [Item]) -> Result<()> {
        let mut groups: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
        for (i, item) in items.iter().enumerate() {
            if let Stage::Named { folder, .. } = &item.stage {
                groups.entry(folder.clone()).or_default().push(i);
            }
        }
        tracing::debug!("Placing files into {} folders", groups.len());

        let workers = self.ctx.settings.workers.max(1);
        let shared: &[Item] = &*items;
        let results: Vec<Result<Vec<GroupResult>>> = stream::iter(groups.into_values())
            .map(|indices| self.place_group(shared, indices))
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut placed = Vec::new();
        for result in results {
            placed.extend(result?);
        }

        for (index, main, associates) in placed {
            let item = &mut items[index];
            let folder = match &item.stage {
                Stage::Named { folder, .. } => folder.clone(),
                _ => continue,
            };
            item.stage = match main {
                Ok(verdict) => Stage::Placed { folder, verdict },
                Err(message) => Stage::Failed(message),
            };
            for (a, stage) in associates {
                item.associates[a] = stage;
            }
        }
        Ok(())
    }

    /// Place the items of one destination folder, in discovery order.
    async fn place_group(&self, items: &[Item], indices: Vec<usize>) -> Result<Vec<GroupResult>> {
        let mut results = Vec::with_capacity(indices.len());

        for index in indices {
            self.ctx.cancel.check()?;
            let item = &items[index];
            let Stage::Named { folder, name } = &item.stage else {
                continue;
            };

            let main = self.place(&item.record, folder, name).await;
            let mut associates = Vec::new();

            if let Ok(Verdict::Place { destination, .. }) = &main {
                let final_name = destination
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();

                for (a, (record, stage)) in item
                    .record
                    .associated()
                    .iter()
                    .zip(item.associates.iter())
                    .enumerate()
                {
                    let AssociateStage::Named(candidate) = stage else {
                        continue;
                    };
                    let candidate = follow_rename(candidate, name, &final_name);
                    let stage = match self.place(record, folder, &candidate).await {
                        Ok(verdict) => AssociateStage::Placed(verdict),
                        Err(e) => AssociateStage::Failed(e.to_string()),
                    };
                    associates.push((a, stage));
                }
            }

            results.push((index, main.map_err(|e| e.to_string()), associates));
        }
        Ok(results)
    }

    /// Claim a destination name for `record` in `folder`.
    async fn place(&self, record: &FileRecord, folder: &Path, candidate: &str) -> Result<Verdict> {
        let mut conflicted = false;
        let mut source_hash = record.content_hash.clone();

        for name in self.collisions.candidates(candidate, Some(record.modified)) {
            let destination = folder.join(&name);

            if let Some(claim) = self.ctx.reservations.claimed(folder, &name) {
                if claim.size == record.size && claim.source != record.source_path {
                    let ours = self.detector.hash_record(record).await?;
                    let theirs = self.detector.hash_path(&claim.source).await?;
                    let same = ours == theirs;
                    source_hash = Some(ours);
                    if same {
                        return Ok(self.duplicate(destination, source_hash));
                    }
                }
                conflicted = true;
                continue;
            }

            let (classification, hash) = self.detector.classify(record, &destination).await?;
            if hash.is_some() {
                source_hash = hash;
            }

            let decision = match classification {
                Classification::New => {
                    if !self.reserve(folder, &name, record) {
                        conflicted = true;
                        continue;
                    }
                    let (action, classification) = if conflicted {
                        (PlanAction::Rename, Classification::NameConflictDifferentContent)
                    } else {
                        (PlanAction::Copy, Classification::New)
                    };
                    return Ok(Verdict::Place {
                        destination,
                        action,
                        classification,
                        source_hash,
                    });
                }
                _ => self.decide(record, &destination, classification).await,
            };

            match decision {
                DuplicateDecision::Rename => {
                    conflicted = true;
                }
                DuplicateDecision::Overwrite => {
                    if !self.reserve(folder, &name, record) {
                        conflicted = true;
                        continue;
                    }
                    return Ok(Verdict::Place {
                        destination,
                        action: PlanAction::Overwrite,
                        classification,
                        source_hash,
                    });
                }
                DuplicateDecision::Skip if classification == Classification::DuplicateContent => {
                    // Later files with this name are compared against us.
                    self.reserve(folder, &name, record);
                    return Ok(self.duplicate(destination, source_hash));
                }
                DuplicateDecision::Skip => {
                    return Ok(Verdict::Skip {
                        destination,
                        classification,
                        source_hash,
                        status: FileStatus::FilteredOut,
                        reason: "skipped: name conflict".to_string(),
                    });
                }
            }
        }

        Err(crate::Error::CollisionExhausted {
            name: candidate.to_string(),
            attempts: self.collisions.max_attempts(),
        })
    }

    fn reserve(&self, folder: &Path, name: &str, record: &FileRecord) -> bool {
        self.ctx.reservations.try_reserve(
            folder,
            name,
            Claim {
                id: record.id,
                source: record.source_path.clone(),
                size: record.size,
            },
        )
    }

    fn duplicate(&self, destination: PathBuf, source_hash: Option<String>) -> Verdict {
        let (status, reason) = match self.preset.duplicate_handling {
            DuplicateHandling::Skip => (FileStatus::FilteredOut, DUPLICATE_REASON),
            _ => (FileStatus::Duplicate, "duplicate content"),
        };
        Verdict::Skip {
            destination,
            classification: Classification::DuplicateContent,
            source_hash,
            status,
            reason: reason.to_string(),
        }
    }

    /// Apply the duplicate handling policy to an occupied destination.
    async fn decide(
        &self,
        record: &FileRecord,
        destination: &Path,
        classification: Classification,
    ) -> DuplicateDecision {
        let duplicate = classification == Classification::DuplicateContent;
        match self.preset.duplicate_handling {
            DuplicateHandling::Skip | DuplicateHandling::Rename if duplicate => {
                DuplicateDecision::Skip
            }
            DuplicateHandling::Skip | DuplicateHandling::Rename => DuplicateDecision::Rename,
            DuplicateHandling::Overwrite => DuplicateDecision::Overwrite,
            DuplicateHandling::Ask => {
                let question = DuplicateQuestion {
                    id: record.id,
                    source: record.source_path.clone(),
                    destination: destination.to_path_buf(),
                    classification,
                };
                self.ctx.decisions.decide(&question).await
            }
        }
    }

    fn assemble(&self, items: Vec<Item>) -> Result<(CopyPlan, Vec<FileRecord>)> {
        let mut plan = CopyPlan {
            version: PLAN_VERSION.to_string(),
            created_at: Utc::now().to_rfc3339(),
            run_id: self.ctx.run_id.clone(),
            preset_name: self.preset.name.clone(),
            destination_root: self.ctx.destination_root.clone(),
            dry_run: self.ctx.options.dry_run,
            ..Default::default()
        };
        let mut records = Vec::with_capacity(items.len());

        for item in items {
            let Item {
                mut record,
                stage,
                associates,
            } = item;

            match stage {
                Stage::Excluded { filter, reason } => {
                    self.exclude(&mut plan, &mut record, &filter, &reason)?;
                    let shared = format!("associated with excluded file: {}", reason);
                    for associate in record.associated_mut() {
                        self.exclude(&mut plan, associate, &filter, &shared)?;
                    }
                }
                Stage::Failed(message) => {
                    self.fail_with_associates(&mut plan, &mut record, &message)?;
                }
                Stage::Named { .. } => {
                    self.fail_with_associates(&mut plan, &mut record, "not placed")?;
                }
                Stage::Placed { folder, verdict } => {
                    let skipped = match &verdict {
                        Verdict::Skip { status, reason, .. } => Some((*status, reason.clone())),
                        Verdict::Place { .. } => None,
                    };
                    self.accept(&mut plan, &mut record, verdict)?;

                    for (associate, stage) in record.associated_mut().iter_mut().zip(associates) {
                        match (&skipped, stage) {
                            (Some((status, reason)), stage) => {
                                let name = match stage {
                                    AssociateStage::Named(name) => name,
                                    _ => associate.original_filename.clone(),
                                };
                                let destination = folder.join(name);
                                let verdict = Verdict::Skip {
                                    destination,
                                    classification: Classification::New,
                                    source_hash: None,
                                    status: *status,
                                    reason: format!("associated with skipped file: {}", reason),
                                };
                                self.accept(&mut plan, associate, verdict)?;
                            }
                            (None, AssociateStage::Placed(verdict)) => {
                                self.accept(&mut plan, associate, verdict)?;
                            }
                            (None, AssociateStage::Excluded { filter, reason }) => {
                                self.exclude(&mut plan, associate, &filter, &reason)?;
                            }
                            (None, AssociateStage::Failed(message)) => {
                                self.fail(&mut plan, associate, &message)?;
                            }
                            (None, AssociateStage::Named(_)) => {
                                self.fail(&mut plan, associate, "not placed")?;
                            }
                        }
                    }
                }
            }
            records.push(record);
        }

        plan.counters = PlanCounters {
            included: plan.actionable_count(),
            excluded_by_filter: plan.excluded.len(),
            duplicate: plan
                .entries
                .iter()
                .filter(|e| {
                    e.action == PlanAction::Skip
                        && e.classification == Classification::DuplicateContent
                })
                .count(),
            error: plan.errors.len(),
        };
        Ok((plan, records))
    }

    fn accept(&self, plan: &mut CopyPlan, record: &mut FileRecord, verdict: Verdict) -> Result<()> {
        let (destination, action, classification, source_hash, reason) = match verdict {
            Verdict::Place {
                destination,
                action,
                classification,
                source_hash,
            } => {
                record.transition(FileStatus::Planned)?;
                self.ctx.emit(RunEvent::Planned {
                    id: record.id,
                    destination: destination.clone(),
                });
                (destination, action, classification, source_hash, None)
            }
            Verdict::Skip {
                destination,
                classification,
                source_hash,
                status,
                reason,
            } => {
                record.transition_with(status, reason.clone())?;
                self.ctx.emit(RunEvent::Duplicate {
                    id: record.id,
                    destination: destination.clone(),
                });
                (destination, PlanAction::Skip, classification, source_hash, Some(reason))
            }
        };

        record.target_path = destination.parent().map(Path::to_path_buf);
        record.target_file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        if source_hash.is_some() {
            record.content_hash = source_hash.clone();
        }

        plan.entries.push(PlanEntry {
            id: record.id,
            parent: record.parent(),
            source: record.source_path.clone(),
            destination,
            action,
            classification,
            size: record.size,
            modified: record.modified,
            source_hash,
            reason,
        });
        Ok(())
    }

    fn exclude(
        &self,
        plan: &mut CopyPlan,
        record: &mut FileRecord,
        filter: &str,
        reason: &str,
    ) -> Result<()> {
        record.transition_with(FileStatus::FilteredOut, reason)?;
        self.ctx.emit(RunEvent::Excluded {
            id: record.id,
            filter: filter.to_string(),
            reason: reason.to_string(),
        });
        plan.excluded.push(ExcludedEntry {
            id: record.id,
            source: record.source_path.clone(),
            filter: filter.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn fail_with_associates(
        &self,
        plan: &mut CopyPlan,
        record: &mut FileRecord,
        message: &str,
    ) -> Result<()> {
        self.fail(plan, record, message)?;
        let shared = format!("associated with failed file: {}", message);
        for associate in record.associated_mut() {
            self.fail(plan, associate, &shared)?;
        }
        Ok(())
    }

    fn fail(&self, plan: &mut CopyPlan, record: &mut FileRecord, message: &str) -> Result<()> {
        tracing::warn!("Cannot plan {}: {}", record.source_path.display(), message);
        record.transition_with(FileStatus::Error, message)?;
        self.ctx.emit(RunEvent::Failed {
            id: record.id,
            message: message.to_string(),
        });
        plan.errors.push(ErrorEntry {
            id: record.id,
            source: record.source_path.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Carry a main file's collision suffix over to an associated file that
/// shares its base name.
fn follow_rename(associate: &str, main_candidate: &str, main_final: &str) -> String {
    if main_candidate == main_final {
        return associate.to_string();
    }
    let (associate_stem, associate_ext) = split_file_name(associate);
    let (main_stem, _) = split_file_name(main_candidate);
    if !associate_stem.eq_ignore_ascii_case(&main_stem) {
        return associate.to_string();
    }
    let (final_stem, _) = split_file_name(main_final);
    if associate_ext.is_empty() {
        final_stem
    } else {
        format!("{}.{}", final_stem, associate_ext)
    }
}
