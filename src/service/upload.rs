use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::{ProcessResponse, RawFile};
use crate::remote::DocumentService;
use crate::service::registry::{self, FileRegistry};

pub const ALLOWED_EXTENSIONS: [&str; 8] = ["pdf", "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
pub const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

const PROCESSING_FAILED: &str = "Unknown processing error";

// ── Stages ────────────────────────────────────────────────────────────────────

/// Named steps of server-side processing, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Extraction,
    Chunking,
    Embedding,
    VectorStorage,
    CloudUpload,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Extraction,
        Stage::Chunking,
        Stage::Embedding,
        Stage::VectorStorage,
        Stage::CloudUpload,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::VectorStorage => "vectorStorage",
            Stage::CloudUpload => "cloudUpload",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Extraction => "Text extraction",
            Stage::Chunking => "Text chunking",
            Stage::Embedding => "Embedding generation",
            Stage::VectorStorage => "Vector storage",
            Stage::CloudUpload => "Cloud storage upload",
        }
    }

    pub fn from_key(key: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.key() == key)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Status of every stage. Always holds exactly the five stage keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageMap(BTreeMap<Stage, StageStatus>);

impl Default for StageMap {
    fn default() -> Self {
        Self(Stage::ALL.into_iter().map(|s| (s, StageStatus::Pending)).collect())
    }
}

impl StageMap {
    pub fn get(&self, stage: Stage) -> StageStatus {
        self.0.get(&stage).copied().unwrap_or_default()
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus) {
        self.0.insert(stage, status);
    }

    /// Share of completed stages, rounded to a whole percent.
    pub fn percent_complete(&self) -> u8 {
        let done = self.0.values().filter(|s| **s == StageStatus::Completed).count();
        ((done as f64 / Stage::ALL.len() as f64) * 100.0).round() as u8
    }

    /// First stage currently reported as processing.
    pub fn current(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|stage| self.get(*stage) == StageStatus::Processing)
    }

    /// Folds whatever stage information the service reported into the map.
    /// Absent information leaves stages untouched.
    pub fn apply_report(&mut self, report: &ProcessResponse) {
        if let Some(done) = report.steps_completed {
            for stage in Stage::ALL.into_iter().take(done) {
                self.set(stage, StageStatus::Completed);
            }
        }
        if let Some(steps) = &report.steps {
            for (key, status) in steps {
                match Stage::from_key(key) {
                    Some(stage) => self.set(stage, *status),
                    None => debug!("Ignoring unknown processing stage '{key}'"),
                }
            }
        }
    }

    pub fn fail_in_progress(&mut self) {
        for status in self.0.values_mut() {
            if *status == StageStatus::Processing {
                *status = StageStatus::Failed;
            }
        }
    }
}

// ── Per-file state machine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Validating,
    Rejected,
    Submitting,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Validating)
                | (Validating, Rejected)
                | (Validating, Submitting)
                | (Submitting, Succeeded)
                | (Submitting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Rejected | TaskState::Succeeded | TaskState::Failed)
    }
}

/// One file moving through the pipeline. The body itself is handed to the
/// remote on submission, so only metadata is kept here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    pub filename: String,
    pub size: u64,
    pub owner_user_id: String,
    pub state: TaskState,
}

impl UploadTask {
    fn queued(file: &RawFile, owner_user_id: &str) -> Self {
        Self {
            filename: file.name.clone(),
            size: file.size,
            owner_user_id: owner_user_id.to_string(),
            state: TaskState::Queued,
        }
    }

    fn advance(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal upload transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.filename, self.state, next);
        self.state = next;
    }
}

/// Checks extension and size before anything touches the network.
pub fn validate(file: &RawFile) -> Result<(), AppError> {
    let extension = Path::new(&file.name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::UnsupportedFileType { filename: file.name.clone() });
    }
    if file.size > MAX_FILE_BYTES {
        return Err(AppError::FileTooLarge { filename: file.name.clone(), size: file.size });
    }
    Ok(())
}

// ── Progress & results ────────────────────────────────────────────────────────

/// What the progress UI renders. `active_file` is set only while a file is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub in_progress: bool,
    pub active_file: Option<String>,
    pub stages: StageMap,
    pub percent_complete: u8,
    pub current_stage: Option<Stage>,
    /// Human-readable name of `current_stage`.
    pub current_label: Option<&'static str>,
    pub processed: usize,
    pub total: usize,
}

impl UploadProgress {
    fn update_stages(&mut self, update: impl FnOnce(&mut StageMap)) {
        update(&mut self.stages);
        self.percent_complete = self.stages.percent_complete();
        self.current_stage = self.stages.current();
        self.current_label = self.current_stage.map(Stage::label);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub uploaded: Vec<String>,
    /// One "`filename`: `reason`" entry per rejected or failed file.
    pub failures: Vec<String>,
    pub tasks: Vec<UploadTask>,
    pub refresh_error: Option<String>,
}

impl BatchResult {
    pub fn summary_error(&self) -> Option<String> {
        (!self.failures.is_empty()).then(|| format!("Upload errors: {}", self.failures.join("; ")))
    }
}

// ── Tracker ───────────────────────────────────────────────────────────────────

/// Drives batches of uploads one file at a time and publishes progress.
pub struct UploadTracker {
    progress: watch::Sender<UploadProgress>,
    batch_gate: Mutex<()>,
}

impl Default for UploadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTracker {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(UploadProgress::default());
        Self { progress, batch_gate: Mutex::new(()) }
    }

    pub fn progress(&self) -> UploadProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    /// Submits `files` in input order, each waiting for the previous one to
    /// settle, then refreshes the registry exactly once. Never fails: every
    /// per-file problem ends up in [`BatchResult::failures`]. Concurrent
    /// batches queue behind each other.
    pub async fn submit_batch(
        &self,
        remote: &dyn DocumentService,
        registry: &Mutex<FileRegistry>,
        files: Vec<RawFile>,
        owner_user_id: &str,
    ) -> BatchResult {
        let _gate = self.batch_gate.lock().await;
        let total = files.len();
        info!("Starting upload batch of {total} file(s) for {owner_user_id}");
        self.progress.send_replace(UploadProgress {
            in_progress: true,
            total,
            ..UploadProgress::default()
        });

        let mut result = BatchResult::default();
        for (index, file) in files.into_iter().enumerate() {
            let mut task = UploadTask::queued(&file, owner_user_id);
            task.advance(TaskState::Validating);

            match validate(&file) {
                Err(e) => {
                    task.advance(TaskState::Rejected);
                    warn!("Rejected {}: {e}", task.filename);
                    result.failures.push(format!("{}: {e}", task.filename));
                }
                Ok(()) => {
                    self.progress.send_modify(|p| {
                        p.active_file = Some(task.filename.clone());
                        p.update_stages(|stages| *stages = StageMap::default());
                    });
                    task.advance(TaskState::Submitting);

                    match submit_one(remote, file, owner_user_id).await {
                        Ok(report) => {
                            task.advance(TaskState::Succeeded);
                            self.progress
                                .send_modify(|p| p.update_stages(|s| s.apply_report(&report)));
                            info!(
                                "Uploaded {} as document {}",
                                task.filename,
                                report.document_id.as_deref().unwrap_or("<unassigned>")
                            );
                            result.uploaded.push(task.filename.clone());
                        }
                        Err(e) => {
                            task.advance(TaskState::Failed);
                            self.progress
                                .send_modify(|p| p.update_stages(StageMap::fail_in_progress));
                            warn!("Upload error for {}: {e}", task.filename);
                            result.failures.push(format!("{}: {e}", task.filename));
                        }
                    }
                }
            }

            debug_assert!(task.state.is_terminal(), "{} left unsettled", task.filename);
            self.progress.send_modify(|p| p.processed = index + 1);
            result.tasks.push(task);
        }

        if let Err(e) = registry::refresh(registry, remote, owner_user_id).await {
            warn!("Registry refresh after upload batch failed: {e}");
            result.refresh_error = Some(e.to_string());
        }
        self.progress.send_replace(UploadProgress::default());

        info!(
            "Upload batch finished: {} uploaded, {} failed",
            result.uploaded.len(),
            result.failures.len()
        );
        result
    }
}

async fn submit_one(
    remote: &dyn DocumentService,
    file: RawFile,
    owner_user_id: &str,
) -> Result<ProcessResponse, AppError> {
    let response = remote.process_file(file, owner_user_id).await?;
    if response.success {
        Ok(response)
    } else {
        Err(AppError::server(
            response.error.clone().unwrap_or_else(|| PROCESSING_FAILED.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{listing, Call, FakeDocumentService};
    use serde_json::json;

    fn pdf(name: &str) -> RawFile {
        RawFile::new(name, "application/pdf", b"%PDF-1.4".to_vec())
    }

    fn oversized(name: &str) -> RawFile {
        RawFile {
            name: name.to_string(),
            content_type: "application/pdf".into(),
            size: MAX_FILE_BYTES + 1,
            bytes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn invalid_files_are_rejected_without_network() {
        let remote = FakeDocumentService::new();
        let registry = Mutex::new(FileRegistry::new());
        let tracker = UploadTracker::new();

        let result = tracker
            .submit_batch(
                &remote,
                &registry,
                vec![RawFile::new("notes.txt", "text/plain", b"hi".to_vec()), oversized("big.pdf")],
                "u1",
            )
            .await;

        assert_eq!(
            result.failures,
            vec![
                "notes.txt: Only PDF and image files are supported (PDF, JPG, JPEG, PNG, GIF, BMP, TIFF, WEBP)"
                    .to_string(),
                "big.pdf: File too large (max 50MB)".to_string(),
            ]
        );
        assert_eq!(remote.count(|c| matches!(c, Call::Process { .. })), 0);
        assert!(result.tasks.iter().all(|t| t.state == TaskState::Rejected));
    }

    #[tokio::test]
    async fn files_are_submitted_in_order_then_refreshed_once() {
        let remote = FakeDocumentService::new();
        remote.push_process(Ok(ProcessResponse { success: true, ..Default::default() }));
        remote.push_process(Err(AppError::Timeout));
        remote.push_process(Ok(ProcessResponse {
            success: false,
            error: Some("OCR failed".into()),
            ..Default::default()
        }));
        remote.push_listing(Ok(listing(json!([{"document_id": "d1", "filename": "a.pdf"}]))));
        let registry = Mutex::new(FileRegistry::new());
        let tracker = UploadTracker::new();

        let result = tracker
            .submit_batch(
                &remote,
                &registry,
                vec![pdf("a.pdf"), pdf("b.pdf"), RawFile::new("scan.JPG", "image/jpeg", vec![1]), pdf("d.pdf")],
                "u1",
            )
            .await;

        let calls = remote.calls();
        let submitted: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Process { filename, .. } => Some(filename.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, vec!["a.pdf", "b.pdf", "scan.JPG", "d.pdf"]);
        assert_eq!(remote.count(|c| matches!(c, Call::ListFiles(_))), 1);
        assert_eq!(calls.last(), Some(&Call::ListFiles("u1".into())));

        assert_eq!(result.uploaded, vec!["a.pdf".to_string(), "d.pdf".to_string()]);
        assert_eq!(
            result.failures,
            vec![
                "b.pdf: Request timed out. Please try again.".to_string(),
                "scan.JPG: OCR failed".to_string()
            ]
        );
        assert_eq!(
            result.summary_error().as_deref(),
            Some("Upload errors: b.pdf: Request timed out. Please try again.; scan.JPG: OCR failed")
        );
        assert_eq!(registry.lock().await.list().len(), 1);
    }

    #[tokio::test]
    async fn empty_batch_still_refreshes_once() {
        let remote = FakeDocumentService::new();
        let registry = Mutex::new(FileRegistry::new());
        let result = UploadTracker::new()
            .submit_batch(&remote, &registry, Vec::new(), "u1")
            .await;
        assert!(result.failures.is_empty());
        assert_eq!(remote.calls(), vec![Call::ListFiles("u1".into())]);
    }

    #[tokio::test]
    async fn progress_is_cleared_after_batch() {
        let remote = FakeDocumentService::new();
        remote.push_process(Ok(ProcessResponse {
            success: true,
            steps_completed: Some(5),
            ..Default::default()
        }));
        let registry = Mutex::new(FileRegistry::new());
        let tracker = UploadTracker::new();
        let mut rx = tracker.subscribe();

        tracker.submit_batch(&remote, &registry, vec![pdf("a.pdf")], "u1").await;

        assert!(rx.has_changed().unwrap());
        let progress = rx.borrow_and_update().clone();
        assert_eq!(progress, UploadProgress::default());
        assert_eq!(tracker.progress().active_file, None);
    }

    #[tokio::test]
    async fn refresh_failure_is_reported_not_thrown() {
        let remote = FakeDocumentService::new();
        remote.push_listing(Err(AppError::Unreachable { base_url: "http://x".into() }));
        let registry = Mutex::new(FileRegistry::new());

        let result = UploadTracker::new()
            .submit_batch(&remote, &registry, vec![pdf("a.pdf")], "u1")
            .await;

        assert_eq!(result.uploaded, vec!["a.pdf".to_string()]);
        assert!(result.refresh_error.is_some());
    }

    #[test]
    fn stage_map_defaults_to_pending() {
        let stages = StageMap::default();
        assert!(Stage::ALL.iter().all(|s| stages.get(*s) == StageStatus::Pending));
        assert_eq!(stages.percent_complete(), 0);
        assert_eq!(stages.current(), None);
        assert_eq!(
            serde_json::to_value(&stages).unwrap(),
            json!({
                "extraction": "pending",
                "chunking": "pending",
                "embedding": "pending",
                "vectorStorage": "pending",
                "cloudUpload": "pending"
            })
        );
    }

    #[test]
    fn reported_stages_are_applied() {
        let report: ProcessResponse = serde_json::from_value(json!({
            "success": true,
            "steps_completed": 2,
            "steps": {"embedding": "processing", "mongoStorage": "completed"}
        }))
        .unwrap();
        let mut stages = StageMap::default();
        stages.apply_report(&report);

        assert_eq!(stages.get(Stage::Extraction), StageStatus::Completed);
        assert_eq!(stages.get(Stage::Chunking), StageStatus::Completed);
        assert_eq!(stages.current(), Some(Stage::Embedding));
        assert_eq!(stages.percent_complete(), 40);

        stages.fail_in_progress();
        assert_eq!(stages.get(Stage::Embedding), StageStatus::Failed);
    }

    #[test]
    fn progress_names_the_running_stage() {
        let report: ProcessResponse =
            serde_json::from_value(json!({"success": true, "steps": {"vectorStorage": "processing"}}))
                .unwrap();
        let mut progress = UploadProgress::default();
        progress.update_stages(|s| s.apply_report(&report));

        assert_eq!(progress.current_stage, Some(Stage::VectorStorage));
        assert_eq!(progress.current_label, Some("Vector storage"));
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["current_label"], "Vector storage");

        progress.update_stages(StageMap::fail_in_progress);
        assert_eq!(progress.current_label, None);
    }

    #[test]
    fn task_transitions_follow_pipeline() {
        use TaskState::*;
        assert!(Queued.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Rejected));
        assert!(Submitting.can_advance_to(Failed));
        assert!(!Queued.can_advance_to(Submitting));
        assert!(!Succeeded.can_advance_to(Submitting));
        assert!(Rejected.is_terminal() && Succeeded.is_terminal() && Failed.is_terminal());
        assert!(!Submitting.is_terminal());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(validate(&RawFile::new("Photo.WEBP", "image/webp", vec![0])).is_ok());
        assert!(validate(&RawFile::new("archive.pdf.zip", "application/zip", vec![0])).is_err());
        assert!(validate(&RawFile::new("noext", "application/octet-stream", vec![0])).is_err());
    }
}
