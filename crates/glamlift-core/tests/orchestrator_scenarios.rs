//! End-to-end scenarios for the migration orchestrator.
//!
//! A scripted in-memory remote store stands in for the wiki API so the
//! full upload -> resolve -> reconcile -> ledger flow runs
//! deterministically, including failure injection, resume, and repair.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use glamlift_core::remote::{
    EntityId, RemoteEntityState, RemoteStore, StatementRef, StatementValue, ThrottleConfig,
};
use glamlift_core::{
    CancellationToken, CatalogRecord, GlamliftError, Ledger, MigrationState, Orchestrator, Result,
};
use tempfile::TempDir;

#[derive(Default)]
struct FakeState {
    /// filename -> entity id
    files: HashMap<String, String>,
    /// entity id -> language -> label text
    labels: HashMap<String, HashMap<String, String>>,
    /// entity id -> property -> claim count
    statements: HashMap<String, HashMap<String, usize>>,
    /// claim guid -> qualifier properties attached to it
    qualifiers: HashMap<String, Vec<String>>,
    next_page_id: u64,
    next_claim: u64,
}

/// In-memory wiki store with call counters and failure switches.
struct FakeRemote {
    state: Mutex<FakeState>,
    uploads: AtomicUsize,
    statement_calls: AtomicUsize,
    qualifier_calls: AtomicUsize,
    label_calls: AtomicUsize,
    /// 1-based add_statement call index that fails permanently.
    fail_statement_at: Mutex<Option<usize>>,
    /// Filenames whose upload fails permanently.
    fail_uploads: Mutex<HashSet<String>>,
    /// Cancelled right after a successful upload, if set.
    cancel_after_upload: Mutex<Option<CancellationToken>>,
}

impl FakeRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
            uploads: AtomicUsize::new(0),
            statement_calls: AtomicUsize::new(0),
            qualifier_calls: AtomicUsize::new(0),
            label_calls: AtomicUsize::new(0),
            fail_statement_at: Mutex::new(None),
            fail_uploads: Mutex::new(HashSet::new()),
            cancel_after_upload: Mutex::new(None),
        })
    }

    /// Put a file page (with an empty entity) on the remote.
    fn preload_file(&self, filename: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_page_id += 1;
        let entity = format!("M{}", state.next_page_id);
        state.files.insert(filename.to_string(), entity.clone());
        state.labels.entry(entity.clone()).or_default();
        state.statements.entry(entity.clone()).or_default();
        entity
    }

    fn preload_statement(&self, entity: &str, property: &str) {
        let mut state = self.state.lock().unwrap();
        *state
            .statements
            .entry(entity.to_string())
            .or_default()
            .entry(property.to_string())
            .or_insert(0) += 1;
    }

    fn preload_label(&self, entity: &str, language: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .labels
            .entry(entity.to_string())
            .or_default()
            .insert(language.to_string(), text.to_string());
    }

    fn fail_statement_call(&self, index: usize) {
        *self.fail_statement_at.lock().unwrap() = Some(index);
    }

    fn clear_statement_failure(&self) {
        *self.fail_statement_at.lock().unwrap() = None;
    }

    fn fail_upload_of(&self, filename: &str) {
        self.fail_uploads.lock().unwrap().insert(filename.to_string());
    }

    /// (uploads, statements, qualifiers, labels)
    fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.uploads.load(Ordering::SeqCst),
            self.statement_calls.load(Ordering::SeqCst),
            self.qualifier_calls.load(Ordering::SeqCst),
            self.label_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn exists(&self, filename: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().files.contains_key(filename))
    }

    async fn upload(&self, local_path: &Path, filename: &str, wikitext: &str) -> Result<()> {
        assert!(local_path.exists(), "upload must only see checked assets");
        assert!(!wikitext.is_empty(), "upload must carry a description page");

        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.lock().unwrap().contains(filename) {
            return Err(GlamliftError::Api {
                code: "verification-error".into(),
                info: "This file did not pass file verification".into(),
            });
        }

        self.preload_file(filename);
        if let Some(token) = self.cancel_after_upload.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok(())
    }

    fn file_ref(&self, filename: &str) -> Result<String> {
        Ok(format!(
            "https://fake.example.org/wiki/File:{}",
            filename.replace(' ', "_")
        ))
    }

    async fn resolve_entity_id(&self, filename: &str) -> Result<Option<EntityId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .get(filename)
            .cloned()
            .map(EntityId))
    }

    async fn entity_state(&self, entity: &EntityId) -> Result<RemoteEntityState> {
        let state = self.state.lock().unwrap();
        if !state.labels.contains_key(&entity.0) {
            return Err(GlamliftError::RemoteFileMissing(entity.0.clone()));
        }
        Ok(RemoteEntityState {
            labels: state.labels.get(&entity.0).cloned().unwrap_or_default(),
            statements: state.statements.get(&entity.0).cloned().unwrap_or_default(),
        })
    }

    async fn set_label(&self, entity: &EntityId, language: &str, text: &str) -> Result<()> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .labels
            .entry(entity.0.clone())
            .or_default()
            .insert(language.to_string(), text.to_string());
        Ok(())
    }

    async fn add_statement(
        &self,
        entity: &EntityId,
        property: &str,
        _value: &StatementValue,
    ) -> Result<StatementRef> {
        let call = self.statement_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_statement_at.lock().unwrap() == Some(call) {
            return Err(GlamliftError::Api {
                code: "invalid-snak".into(),
                info: "Invalid snak data".into(),
            });
        }

        let mut state = self.state.lock().unwrap();
        *state
            .statements
            .entry(entity.0.clone())
            .or_default()
            .entry(property.to_string())
            .or_insert(0) += 1;
        state.next_claim += 1;
        Ok(StatementRef(format!("{}$claim-{}", entity.0, state.next_claim)))
    }

    async fn add_qualifier(
        &self,
        claim: &StatementRef,
        property: &str,
        _value: &StatementValue,
    ) -> Result<()> {
        self.qualifier_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .qualifiers
            .entry(claim.0.clone())
            .or_default()
            .push(property.to_string());
        Ok(())
    }
}

const ALL_PROPERTIES: [&str; 5] = ["P31", "P6216", "P1163", "P1476", "P7482"];

fn record(assets: &Path, id: &str, title: &str) -> CatalogRecord {
    let asset = assets.join(format!("{}.jpg", id));
    std::fs::write(&asset, b"jpeg bytes").unwrap();

    CatalogRecord {
        unique_id: id.to_string(),
        title: title.to_string(),
        image_url: format!("http://resolver.example.org/urn:{}", id),
        detail_url: format!("https://catalog.example.org/beeldbank?id={}", id),
        local_path: asset.to_string_lossy().into_owned(),
        target_filename: format!("{} - {}.jpg", title, id),
        ..Default::default()
    }
}

fn no_delays() -> ThrottleConfig {
    ThrottleConfig::new()
        .with_base_delay(Duration::ZERO)
        .with_min_delay(Duration::ZERO)
        .with_jitter_max(Duration::ZERO)
}

fn orchestrator(ledger: Ledger, remote: Arc<FakeRemote>) -> Orchestrator {
    Orchestrator::new(ledger)
        .with_remote(remote)
        .with_throttle(no_delays())
        .with_item_delay(Duration::ZERO)
}

fn open_ledger(dir: &TempDir) -> Ledger {
    Ledger::open(dir.path().join("glamlift.db")).unwrap()
}

#[tokio::test]
async fn test_fresh_record_uploads_and_completes_metadata() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    let remote = FakeRemote::new();
    let orch = orchestrator(ledger.clone(), remote.clone());

    let summary = orch.migrate_one("BBB-1").await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.metadata_complete, 1);
    assert_eq!(summary.failed, 0);

    assert_eq!(remote.counts(), (1, 5, 3, 1));

    let entry = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(entry.status, MigrationState::MetadataComplete);
    assert!(entry.metadata_complete);
    assert_eq!(entry.remote_entity_id.as_deref(), Some("M1"));
    assert_eq!(
        entry.remote_file_ref.as_deref(),
        Some("https://fake.example.org/wiki/File:De_wolf_en_de_ezel_-_BBB-1.jpg")
    );

    // The source statement carries its three qualifiers in order
    let state = remote.state.lock().unwrap();
    let attached: Vec<String> = state.qualifiers.values().flatten().cloned().collect();
    assert_eq!(attached, vec!["P137", "P953", "P973"]);
}

#[tokio::test]
async fn test_second_run_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    let remote = FakeRemote::new();
    let orch = orchestrator(ledger.clone(), remote.clone());

    orch.migrate_one("BBB-1").await.unwrap();
    let after_first = remote.counts();

    let summary = orch.migrate_one("BBB-1").await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.uploaded, 0);
    assert_eq!(remote.counts(), after_first);
}

#[tokio::test]
async fn test_converges_against_prefilled_remote_without_mutations() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    // Someone else already uploaded the file and filled in everything
    let remote = FakeRemote::new();
    let entity = remote.preload_file("De wolf en de ezel - BBB-1.jpg");
    for property in ALL_PROPERTIES {
        remote.preload_statement(&entity, property);
    }
    remote.preload_label(&entity, "nl", "Een bestaande titel");

    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch.migrate_one("BBB-1").await.unwrap();

    assert_eq!(summary.metadata_complete, 1);
    assert_eq!(summary.uploaded, 0);
    assert_eq!(remote.counts(), (0, 0, 0, 0));

    // The run still adopted the remote ids into the ledger
    let entry = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(entry.status, MigrationState::MetadataComplete);
    assert_eq!(entry.remote_entity_id.as_deref(), Some(entity.as_str()));
    assert!(entry.remote_file_ref.is_some());
}

#[tokio::test]
async fn test_existing_file_gets_metadata_without_reupload() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    let remote = FakeRemote::new();
    remote.preload_file("De wolf en de ezel - BBB-1.jpg");

    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch.migrate_one("BBB-1").await.unwrap();

    assert_eq!(summary.metadata_complete, 1);
    assert_eq!(summary.uploaded, 0);
    // No upload, but the empty entity was filled in
    assert_eq!(remote.counts(), (0, 5, 3, 1));
    assert_eq!(
        ledger.get("BBB-1").unwrap().unwrap().status,
        MigrationState::MetadataComplete
    );
}

#[tokio::test]
async fn test_statement_failure_leaves_partial_then_repair_completes() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    let remote = FakeRemote::new();
    // Third statement command (P1163) fails permanently
    remote.fail_statement_call(3);

    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch.migrate_one("BBB-1").await.unwrap();

    assert_eq!(summary.metadata_partial, 1);
    assert_eq!(summary.metadata_complete, 0);
    // All five statements were attempted despite the failure
    assert_eq!(remote.counts(), (1, 5, 3, 1));

    let entry = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(entry.status, MigrationState::MetadataPartial);
    assert!(!entry.metadata_complete);
    let reason = entry.failure_reason.unwrap();
    assert!(reason.contains("P1163"), "reason was: {}", reason);

    // The blocker is gone; a repair pass fills exactly the gap
    remote.clear_statement_failure();
    let repair = orch.repair().await.unwrap();

    assert_eq!(repair.processed, 1);
    assert_eq!(repair.metadata_complete, 1);
    // One more statement call, nothing else resent
    assert_eq!(remote.counts(), (1, 6, 3, 1));

    let entry = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(entry.status, MigrationState::MetadataComplete);
    assert!(entry.failure_reason.is_none());
}

#[tokio::test]
async fn test_missing_local_asset_is_skipped_without_ledger_write() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    let mut missing = record(dir.path(), "BBB-1", "Zonder plaatje");
    missing.local_path = dir.path().join("gone.jpg").to_string_lossy().into_owned();
    ledger.import_records(&[missing]).unwrap();

    let remote = FakeRemote::new();
    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch.migrate_one("BBB-1").await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(remote.counts(), (0, 0, 0, 0));

    let entry = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(entry.status, MigrationState::NotStarted);
    assert!(entry.failure_reason.is_none());
}

#[tokio::test]
async fn test_batch_continues_past_upload_failure() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[
            record(dir.path(), "BBB-1", "Eerste"),
            record(dir.path(), "BBB-2", "Tweede"),
        ])
        .unwrap();

    let remote = FakeRemote::new();
    remote.fail_upload_of("Eerste - BBB-1.jpg");

    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch
        .migrate_ids(&["BBB-1".to_string(), "BBB-2".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.metadata_complete, 1);

    let first = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(first.status, MigrationState::Failed);
    assert!(first.failure_reason.unwrap().contains("upload"));

    let second = ledger.get("BBB-2").unwrap().unwrap();
    assert_eq!(second.status, MigrationState::MetadataComplete);
}

#[tokio::test]
async fn test_range_migrates_only_the_window() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[
            record(dir.path(), "BBB-1", "Eerste"),
            record(dir.path(), "BBB-2", "Tweede"),
            record(dir.path(), "BBB-3", "Derde"),
        ])
        .unwrap();

    let remote = FakeRemote::new();
    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch.migrate_range(1, 2).await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.uploaded, 1);
    assert_eq!(
        ledger.get("BBB-2").unwrap().unwrap().status,
        MigrationState::MetadataComplete
    );
    assert_eq!(
        ledger.get("BBB-1").unwrap().unwrap().status,
        MigrationState::NotStarted
    );
    assert_eq!(
        ledger.get("BBB-3").unwrap().unwrap().status,
        MigrationState::NotStarted
    );
}

#[tokio::test]
async fn test_resumes_metadata_from_persisted_entity_id() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    // A previous run uploaded the file and died before metadata
    let remote = FakeRemote::new();
    let entity = remote.preload_file("De wolf en de ezel - BBB-1.jpg");
    ledger
        .record_upload("BBB-1", "https://fake.example.org/wiki/File:x", Some(&entity))
        .unwrap();

    let orch = orchestrator(ledger.clone(), remote.clone());
    let summary = orch.migrate_one("BBB-1").await.unwrap();

    assert_eq!(summary.metadata_complete, 1);
    // Straight to metadata: no upload, no page lookups needed
    assert_eq!(remote.counts(), (0, 5, 3, 1));
    assert_eq!(
        ledger.get("BBB-1").unwrap().unwrap().status,
        MigrationState::MetadataComplete
    );
}

#[tokio::test]
async fn test_verify_flags_gaps_and_confirms_repairs() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    let remote = FakeRemote::new();
    remote.fail_statement_call(3);

    let orch = orchestrator(ledger.clone(), remote.clone());
    orch.migrate_one("BBB-1").await.unwrap();

    let verify = orch.verify().await.unwrap();
    assert_eq!(verify.checked, 1);
    assert_eq!(verify.incomplete, 1);
    assert_eq!(
        ledger.get("BBB-1").unwrap().unwrap().status,
        MigrationState::MetadataPartial
    );

    remote.clear_statement_failure();
    orch.repair().await.unwrap();

    let verify = orch.verify().await.unwrap();
    assert_eq!(verify.complete, 1);
    assert_eq!(verify.incomplete, 0);
    assert_eq!(
        ledger.get("BBB-1").unwrap().unwrap().status,
        MigrationState::MetadataComplete
    );
}

#[tokio::test]
async fn test_preview_with_remote_reads_but_never_mutates() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[record(dir.path(), "BBB-1", "De wolf en de ezel")])
        .unwrap();

    let remote = FakeRemote::new();
    let entity = remote.preload_file("De wolf en de ezel - BBB-1.jpg");
    remote.preload_statement(&entity, "P31");

    let orch = orchestrator(ledger.clone(), remote.clone()).with_preview(true);
    let summary = orch.migrate_one("BBB-1").await.unwrap();

    assert_eq!(summary.previewed, 1);
    assert_eq!(summary.uploaded, 0);
    // Read-only: the diff was computed but nothing was written anywhere
    assert_eq!(remote.counts(), (0, 0, 0, 0));
    let entry = ledger.get("BBB-1").unwrap().unwrap();
    assert_eq!(entry.status, MigrationState::NotStarted);
    assert!(entry.remote_entity_id.is_none());
}

#[tokio::test]
async fn test_cancellation_stops_at_the_next_record_boundary() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    ledger
        .import_records(&[
            record(dir.path(), "BBB-1", "Eerste"),
            record(dir.path(), "BBB-2", "Tweede"),
        ])
        .unwrap();

    let token = CancellationToken::new();
    let remote = FakeRemote::new();
    *remote.cancel_after_upload.lock().unwrap() = Some(token.clone());

    let orch = orchestrator(ledger.clone(), remote.clone()).with_cancel_token(token);
    let summary = orch
        .migrate_ids(&["BBB-1".to_string(), "BBB-2".to_string()])
        .await
        .unwrap();

    // The first record finished cleanly, the second was never started
    assert!(summary.cancelled);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.metadata_complete, 1);
    assert_eq!(
        ledger.get("BBB-1").unwrap().unwrap().status,
        MigrationState::MetadataComplete
    );
    assert_eq!(
        ledger.get("BBB-2").unwrap().unwrap().status,
        MigrationState::NotStarted
    );
    assert_eq!(remote.uploads.load(Ordering::SeqCst), 1);
}
