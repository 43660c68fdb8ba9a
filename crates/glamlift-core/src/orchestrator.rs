//! Batch migration driver.
//!
//! Walks records through upload and metadata reconciliation, one at a time,
//! recording progress in the ledger after every remote step. A run can be
//! killed at any point and restarted: completed records are skipped,
//! uploaded-but-unfinished records resume at metadata, and failed records
//! are retried from wherever they got stuck.
//!
//! One record failing never stops the batch. After a failure the loop
//! cools down for a full backoff interval before the next record; after a
//! success it waits the configured per-item delay.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::catalog::CatalogRecord;
use crate::config::SiteDefaults;
use crate::error::{GlamliftError, Result};
use crate::exclusions::CategoryExclusions;
use crate::ledger::{Ledger, MigrationState};
use crate::reconcile::{desired_for, reconcile_entity, DesiredStatementSet};
use crate::remote::{throttled_sleep, EntityId, RemoteEntityState, RemoteStore, ThrottleConfig};
use crate::wikitext::render_description;

/// How a single record came out of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    /// Dry run; at most read-only calls were made.
    Previewed,
    /// Ledger already shows full migration; no remote traffic.
    AlreadyComplete,
    /// Local asset missing; logged and left untouched.
    SkippedMissingAsset,
    /// File and all metadata are on the remote.
    Complete { newly_uploaded: bool },
    /// File is on the remote but some metadata commands failed.
    Partial { newly_uploaded: bool },
    /// The record made no forward progress this pass.
    Failed { reason: String },
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Records the loop looked at.
    pub processed: usize,
    /// New file uploads performed.
    pub uploaded: usize,
    /// Records whose metadata is fully on the remote.
    pub metadata_complete: usize,
    /// Records where some metadata commands failed.
    pub metadata_partial: usize,
    /// Records skipped without remote traffic.
    pub skipped: usize,
    /// Records that made no forward progress.
    pub failed: usize,
    /// Records rendered in preview mode.
    pub previewed: usize,
    /// True when the run stopped early on a cancellation request.
    pub cancelled: bool,
    pub duration: Duration,
}

/// Counters for a verification pass against the live remote.
#[derive(Debug, Clone, Default)]
pub struct VerifySummary {
    pub checked: usize,
    pub complete: usize,
    pub incomplete: usize,
    /// Records that could not be checked (missing entity id, fetch failure).
    pub errors: usize,
    pub cancelled: bool,
}

/// What would be sent for a record, rendered without remote calls.
#[derive(Debug, Clone)]
pub struct PreviewReport {
    pub unique_id: String,
    pub target_filename: String,
    /// Full description page wikitext.
    pub wikitext: String,
    /// Label that would be set, if the record has a title.
    pub label: Option<String>,
    /// Properties of the statements that would be ensured, in order.
    pub statement_properties: Vec<&'static str>,
}

/// Drives records through the migration pipeline.
pub struct Orchestrator {
    ledger: Ledger,
    remote: Option<Arc<dyn RemoteStore>>,
    language: String,
    /// Pause between successfully processed records.
    item_delay: Duration,
    throttle: ThrottleConfig,
    exclusions: CategoryExclusions,
    preview: bool,
    cancel: CancellationToken,
    /// Flush the ledger WAL every this many records.
    checkpoint_interval: usize,
}

impl Orchestrator {
    /// Create an orchestrator over a ledger. Without a remote client it can
    /// only preview; attach one with [`Orchestrator::with_remote`].
    pub fn new(ledger: Ledger) -> Self {
        let throttle = ThrottleConfig::default();
        Self {
            ledger,
            remote: None,
            language: SiteDefaults::LANGUAGE.to_string(),
            item_delay: throttle.base_delay,
            throttle,
            exclusions: CategoryExclusions::default(),
            preview: false,
            cancel: CancellationToken::new(),
            checkpoint_interval: 10,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the pause between records. The failure cooldown scales with the
    /// same value, so slowing a run down slows its retries too.
    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self.throttle = self.throttle.with_base_delay(delay);
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_exclusions(mut self, exclusions: CategoryExclusions) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Render what would be sent instead of sending it.
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    /// Migrate a single record.
    pub async fn migrate_one(&self, unique_id: &str) -> Result<RunSummary> {
        self.migrate_ids(&[unique_id.to_string()]).await
    }

    /// Migrate every record in the ledger, in import order.
    pub async fn migrate_all(&self) -> Result<RunSummary> {
        let ids = self.ledger.all_ids()?;
        self.migrate_ids(&ids).await
    }

    /// Migrate the records at positions `[start, end)` in import order.
    pub async fn migrate_range(&self, start: usize, end: usize) -> Result<RunSummary> {
        let entries = self.ledger.get_range(start, end)?;
        let ids: Vec<String> = entries.into_iter().map(|e| e.record.unique_id).collect();
        info!("Range [{}, {}) covers {} records", start, end, ids.len());
        self.migrate_ids(&ids).await
    }

    /// Migrate the given records in order.
    ///
    /// Ids not present in the ledger are logged and skipped. Per-record
    /// remote failures are recorded and the loop moves on; only local
    /// infrastructure failures (a broken ledger) abort the run.
    pub async fn migrate_ids(&self, ids: &[String]) -> Result<RunSummary> {
        let started = Instant::now();
        let total = ids.len();
        let mut summary = RunSummary::default();

        info!("Starting run over {} records", total);

        for (index, unique_id) in ids.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    "Cancellation requested; stopping after {} of {} records",
                    summary.processed, total
                );
                summary.cancelled = true;
                break;
            }

            debug!("[{}/{}] {}", index + 1, total, unique_id);
            let outcome = match self.process_record(unique_id).await {
                Ok(outcome) => outcome,
                Err(GlamliftError::RecordNotFound(id)) => {
                    warn!("Record {} not in ledger, skipping", id);
                    summary.processed += 1;
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.processed += 1;

            let failed = match &outcome {
                ItemOutcome::Previewed => {
                    summary.previewed += 1;
                    false
                }
                ItemOutcome::AlreadyComplete | ItemOutcome::SkippedMissingAsset => {
                    summary.skipped += 1;
                    false
                }
                ItemOutcome::Complete { newly_uploaded } => {
                    if *newly_uploaded {
                        summary.uploaded += 1;
                    }
                    summary.metadata_complete += 1;
                    false
                }
                ItemOutcome::Partial { newly_uploaded } => {
                    if *newly_uploaded {
                        summary.uploaded += 1;
                    }
                    summary.metadata_partial += 1;
                    true
                }
                ItemOutcome::Failed { reason } => {
                    warn!("{}: {}", unique_id, reason);
                    summary.failed += 1;
                    true
                }
            };

            if summary.processed % self.checkpoint_interval == 0 {
                if let Err(e) = self.ledger.checkpoint() {
                    warn!("Ledger checkpoint failed: {}", e);
                }
            }

            let touched_remote = !matches!(
                outcome,
                ItemOutcome::Previewed
                    | ItemOutcome::AlreadyComplete
                    | ItemOutcome::SkippedMissingAsset
            );
            if index + 1 < total && touched_remote {
                if failed {
                    // Give the remote a full backoff interval to recover
                    throttled_sleep(&self.throttle, self.throttle.backoff_delay(0)).await;
                } else {
                    throttled_sleep(&self.throttle, self.item_delay).await;
                }
            }
        }

        if let Err(e) = self.ledger.checkpoint() {
            warn!("Ledger checkpoint failed: {}", e);
        }

        summary.duration = started.elapsed();
        info!(
            "Run finished in {:?}: {} processed, {} uploaded, {} complete, {} partial, {} failed, {} skipped",
            summary.duration,
            summary.processed,
            summary.uploaded,
            summary.metadata_complete,
            summary.metadata_partial,
            summary.failed,
            summary.skipped,
        );
        Ok(summary)
    }

    /// Re-run metadata for every uploaded record that is not yet complete.
    pub async fn repair(&self) -> Result<RunSummary> {
        let ids = self.ledger.pending_metadata_ids()?;
        info!("Repair pass over {} records with incomplete metadata", ids.len());
        self.migrate_ids(&ids).await
    }

    /// Audit migrated records against the live remote.
    ///
    /// Fetches each record's entity and checks that every desired statement
    /// and the label are present, then corrects the ledger's completeness
    /// flag in whichever direction the remote disagrees.
    pub async fn verify(&self) -> Result<VerifySummary> {
        let remote = self.require_remote()?;
        let ids = self.ledger.migrated_ids()?;
        info!("Verifying {} migrated records", ids.len());

        let mut summary = VerifySummary::default();
        for unique_id in &ids {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let entry = match self.ledger.get(unique_id)? {
                Some(entry) => entry,
                None => continue,
            };
            let Some(entity_id) = entry.remote_entity_id else {
                warn!("{} has no entity id, cannot verify", unique_id);
                summary.errors += 1;
                continue;
            };

            summary.checked += 1;
            let entity = EntityId(entity_id);
            match remote.entity_state(&entity).await {
                Ok(state) => {
                    let mut record = entry.record;
                    record.categories = self.exclusions.filter(unique_id, &record.categories);
                    let desired = desired_for(&record, &self.language);
                    let complete = Self::state_satisfies(&state, &desired);
                    if complete {
                        summary.complete += 1;
                    } else {
                        info!("{}: metadata incomplete on remote", unique_id);
                        summary.incomplete += 1;
                    }
                    self.ledger.set_verified(unique_id, complete)?;
                }
                Err(e) => {
                    warn!("Could not verify {}: {}", unique_id, e);
                    summary.errors += 1;
                }
            }
        }

        info!(
            "Verify finished: {} checked, {} complete, {} incomplete, {} errors",
            summary.checked, summary.complete, summary.incomplete, summary.errors
        );
        Ok(summary)
    }

    /// Render a record's upload without sending anything.
    pub fn preview_one(&self, unique_id: &str) -> Result<PreviewReport> {
        let entry = self
            .ledger
            .get(unique_id)?
            .ok_or_else(|| GlamliftError::RecordNotFound(unique_id.to_string()))?;

        let mut record = entry.record;
        record.categories = self.exclusions.filter(unique_id, &record.categories);
        Ok(Self::build_preview(&record, &self.language))
    }

    /// Carry one record as far forward as possible.
    ///
    /// Order matters: existence is checked before uploading, and remote ids
    /// are written to the ledger before any metadata call, so an
    /// interruption can never leave an uploaded file the ledger does not
    /// know about.
    async fn process_record(&self, unique_id: &str) -> Result<ItemOutcome> {
        let entry = self
            .ledger
            .get(unique_id)?
            .ok_or_else(|| GlamliftError::RecordNotFound(unique_id.to_string()))?;

        if entry.status == MigrationState::MetadataComplete {
            debug!("{} already migrated, nothing to do", unique_id);
            return Ok(ItemOutcome::AlreadyComplete);
        }

        let mut record = entry.record;
        record.categories = self.exclusions.filter(unique_id, &record.categories);

        if self.preview {
            return self.preview_record(unique_id, &record).await;
        }

        if record.target_filename.is_empty() {
            let reason = "no target filename".to_string();
            self.ledger.record_failure(unique_id, &reason)?;
            return Ok(ItemOutcome::Failed { reason });
        }

        let remote = self.require_remote()?;

        let mut newly_uploaded = false;
        let entity = if let Some(known) = entry.remote_entity_id {
            debug!("{} resumes with entity {}", unique_id, known);
            Some(EntityId(known))
        } else {
            let filename = record.target_filename.clone();
            let file_ref = remote.file_ref(&filename)?;

            let exists = match remote.exists(&filename).await {
                Ok(exists) => exists,
                Err(e) => {
                    let reason = format!("existence check: {}", e);
                    self.ledger.record_failure(unique_id, &reason)?;
                    return Ok(ItemOutcome::Failed { reason });
                }
            };

            if exists {
                info!("{} already on remote as {}", unique_id, filename);
            } else {
                let local_path = Path::new(&record.local_path);
                if record.local_path.is_empty() || !local_path.exists() {
                    warn!(
                        "{}: local asset '{}' missing, skipping",
                        unique_id, record.local_path
                    );
                    return Ok(ItemOutcome::SkippedMissingAsset);
                }

                let wikitext = render_description(&record);
                if let Err(e) = remote.upload(local_path, &filename, &wikitext).await {
                    let reason = format!("upload: {}", e);
                    self.ledger.record_failure(unique_id, &reason)?;
                    return Ok(ItemOutcome::Failed { reason });
                }
                info!("Uploaded {} as {}", unique_id, filename);
                newly_uploaded = true;
            }

            // The file is on the remote now; persist what we know before
            // metadata, even if the entity lookup fails.
            let resolved = match remote.resolve_entity_id(&filename).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.ledger.record_upload(unique_id, &file_ref, None)?;
                    let reason = format!("entity lookup: {}", e);
                    self.ledger.record_failure(unique_id, &reason)?;
                    return Ok(ItemOutcome::Failed { reason });
                }
            };
            self.ledger.record_upload(
                unique_id,
                &file_ref,
                resolved.as_ref().map(|m| m.0.as_str()),
            )?;
            resolved
        };

        let Some(entity) = entity else {
            let reason = "no entity id for remote file".to_string();
            self.ledger.record_failure(unique_id, &reason)?;
            return Ok(ItemOutcome::Failed { reason });
        };

        let desired = desired_for(&record, &self.language);
        let report = match reconcile_entity(remote.as_ref(), &entity, &desired).await {
            Ok(report) => report,
            Err(e) => {
                let reason = format!("metadata: {}", e);
                self.ledger.record_failure(unique_id, &reason)?;
                return Ok(ItemOutcome::Failed { reason });
            }
        };

        let complete = report.metadata_complete();
        self.ledger.record_metadata(unique_id, complete)?;

        if complete {
            info!(
                "{}: metadata complete ({} commands applied)",
                unique_id,
                report.applied_count()
            );
            Ok(ItemOutcome::Complete { newly_uploaded })
        } else {
            let failures = report.failures().join("; ");
            warn!("{}: metadata partial: {}", unique_id, failures);
            self.ledger.record_failure(unique_id, &failures)?;
            Ok(ItemOutcome::Partial { newly_uploaded })
        }
    }

    /// Dry-run one record: render locally and, when a remote client is
    /// attached, log the diff a real pass would close. Mutates neither the
    /// remote nor the ledger.
    async fn preview_record(&self, unique_id: &str, record: &CatalogRecord) -> Result<ItemOutcome> {
        if record.target_filename.is_empty() {
            warn!("[preview] {}: no target filename, a real run would fail", unique_id);
            return Ok(ItemOutcome::Previewed);
        }

        let preview = Self::build_preview(record, &self.language);
        info!(
            "[preview] {} -> {} ({} statements, label: {})",
            unique_id,
            preview.target_filename,
            preview.statement_properties.len(),
            preview.label.as_deref().unwrap_or("<none>")
        );
        debug!("[preview] wikitext for {}:\n{}", unique_id, preview.wikitext);

        if let Some(remote) = &self.remote {
            if let Err(e) = self.preview_remote_diff(remote.as_ref(), unique_id, record).await {
                warn!("[preview] {}: remote check failed: {}", unique_id, e);
            }
        }
        Ok(ItemOutcome::Previewed)
    }

    /// The read-only half of a real pass: existence check and metadata diff.
    async fn preview_remote_diff(
        &self,
        remote: &dyn RemoteStore,
        unique_id: &str,
        record: &CatalogRecord,
    ) -> Result<()> {
        let filename = &record.target_filename;
        if remote.exists(filename).await? {
            info!("[preview] {}: already on remote, upload would be skipped", unique_id);
        } else {
            info!("[preview] {}: would upload {}", unique_id, filename);
        }

        let Some(entity) = remote.resolve_entity_id(filename).await? else {
            info!("[preview] {}: no entity yet, every statement would be sent", unique_id);
            return Ok(());
        };

        let state = remote.entity_state(&entity).await?;
        let desired = desired_for(record, &self.language);

        if let Some(want) = &desired.label {
            match state.label(&want.language) {
                None => info!("[preview] {}: would set label ({})", unique_id, want.language),
                Some(current) if current == want.text => {
                    debug!("[preview] {}: label already matches", unique_id);
                }
                Some(_) => {
                    debug!("[preview] {}: label already set, would leave as is", unique_id);
                }
            }
        }

        let missing: Vec<&str> = desired
            .statements
            .iter()
            .filter(|s| !state.has_statement(s.property))
            .map(|s| s.property)
            .collect();
        if missing.is_empty() {
            info!("[preview] {}: every statement already present", unique_id);
        } else {
            info!(
                "[preview] {}: would add statements {}",
                unique_id,
                missing.join(", ")
            );
        }
        Ok(())
    }

    fn require_remote(&self) -> Result<&Arc<dyn RemoteStore>> {
        self.remote.as_ref().ok_or_else(|| GlamliftError::Config {
            message: "no remote client configured for this run".to_string(),
        })
    }

    fn build_preview(record: &CatalogRecord, language: &str) -> PreviewReport {
        let desired = desired_for(record, language);
        PreviewReport {
            unique_id: record.unique_id.clone(),
            target_filename: record.target_filename.clone(),
            wikitext: render_description(record),
            label: desired.label.as_ref().map(|l| l.text.clone()),
            statement_properties: desired.properties().collect(),
        }
    }

    /// Whether the live entity carries everything the record asks for.
    ///
    /// An existing label in the right language satisfies the label wish
    /// whatever its text, mirroring the first-writer-wins rule.
    fn state_satisfies(state: &RemoteEntityState, desired: &DesiredStatementSet) -> bool {
        if let Some(label) = &desired.label {
            if state.label(&label.language).is_none() {
                return false;
            }
        }
        desired.statements.iter().all(|s| state.has_statement(s.property))
    }
}
