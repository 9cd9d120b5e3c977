use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::{ChatMessage, DialogueSummary, FileRecord, RawFile, UserIdentity};
use crate::remote::DocumentService;
use crate::service::conversation::{composer_hint, ConversationThread, ANONYMOUS_USER};
use crate::service::registry::{self, FileRegistry};
use crate::service::selection::SelectionSet;
use crate::service::upload::{BatchResult, UploadProgress, UploadTracker};

pub const DEFAULT_DIALOGUE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ServerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A registry entry as the file panel shows it.
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub key: String,
    pub display_name: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesView {
    pub files: Vec<FileView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    pub previous_dialogue_id: Option<String>,
    pub selection: Vec<FileView>,
    pub draft: String,
    pub hint: String,
}

/// Selection, draft and transcript move together, so they share one lock.
#[derive(Debug, Default)]
struct ChatState {
    selection: SelectionSet,
    thread: ConversationThread,
    draft: String,
}

struct SessionInner {
    remote: Arc<dyn DocumentService>,
    user: RwLock<Option<UserIdentity>>,
    registry: Mutex<FileRegistry>,
    chat: Mutex<ChatState>,
    uploads: UploadTracker,
}

/// Owned client state for one browser user. Locks are never held across a
/// remote call: each operation snapshots what it needs, awaits the service,
/// then applies the outcome.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(remote: Arc<dyn DocumentService>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                remote,
                user: RwLock::new(None),
                registry: Mutex::new(FileRegistry::new()),
                chat: Mutex::new(ChatState::default()),
                uploads: UploadTracker::new(),
            }),
        }
    }

    fn remote(&self) -> &dyn DocumentService {
        self.inner.remote.as_ref()
    }

    async fn require_user(&self) -> Result<String, AppError> {
        self.inner
            .user
            .read()
            .await
            .as_ref()
            .map(|u| u.uid.clone())
            .ok_or(AppError::NotSignedIn)
    }

    // ── Identity ──────────────────────────────────────────────────────────────

    pub async fn health(&self) -> HealthReport {
        match self.remote().health().await {
            Ok(()) => HealthReport { status: ServerStatus::Online, message: None },
            Err(e) => {
                warn!("Health check failed: {e}");
                HealthReport {
                    status: ServerStatus::Offline,
                    message: Some(format!(
                        "Document service appears to be offline. Please check if the server is running on {}.",
                        self.remote().base_url()
                    )),
                }
            }
        }
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.inner.user.read().await.clone()
    }

    /// Stores the identity and registers it with the service. Registration is
    /// best-effort; its failure is only logged.
    pub async fn sign_in(&self, user: UserIdentity) -> Result<Vec<FileRecord>, AppError> {
        if user.uid.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "uid".to_string() });
        }
        if let Err(e) = self.remote().sign_in(&user).await {
            warn!("Sign-in registration for {} failed: {e}", user.uid);
        }
        info!("Signed in {}", user.uid);
        let uid = user.uid.clone();
        let previous = self.inner.user.write().await.replace(user);
        if previous.is_some_and(|p| p.uid != uid) {
            debug!("Switching user, discarding the previous user's state");
            self.reset_chat().await;
            self.inner.registry.lock().await.clear();
        }
        self.refresh_files().await
    }

    pub async fn sign_out(&self) {
        if let Some(user) = self.inner.user.write().await.take() {
            info!("Signed out {}", user.uid);
        }
        self.reset_chat().await;
        self.inner.registry.lock().await.clear();
    }

    // ── File registry ─────────────────────────────────────────────────────────

    pub async fn refresh_files(&self) -> Result<Vec<FileRecord>, AppError> {
        let user_id = self.require_user().await?;
        registry::refresh(&self.inner.registry, self.remote(), &user_id).await
    }

    pub async fn files(&self) -> FilesView {
        let (files, error) = {
            let registry = self.inner.registry.lock().await;
            (registry.list().to_vec(), registry.error().map(str::to_string))
        };
        let chat = self.inner.chat.lock().await;
        FilesView {
            files: files
                .iter()
                .map(|f| view(f, chat.selection.contains(f)))
                .collect(),
            error,
        }
    }

    async fn find_file(&self, key: &str) -> Result<FileRecord, AppError> {
        self.inner
            .registry
            .lock()
            .await
            .find_by_key(key)
            .cloned()
            .ok_or_else(|| AppError::FileNotFound { key: key.to_string() })
    }

    pub async fn delete_file(&self, key: &str) -> Result<(), AppError> {
        let user_id = self.require_user().await?;
        let record = self.find_file(key).await?;
        registry::delete(&self.inner.registry, self.remote(), &user_id, &record).await
    }

    // ── Uploads ───────────────────────────────────────────────────────────────

    pub async fn upload(&self, files: Vec<RawFile>) -> Result<BatchResult, AppError> {
        let user_id = self.require_user().await?;
        Ok(self
            .inner
            .uploads
            .submit_batch(self.remote(), &self.inner.registry, files, &user_id)
            .await)
    }

    pub fn upload_progress(&self) -> UploadProgress {
        self.inner.uploads.progress()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<UploadProgress> {
        self.inner.uploads.subscribe()
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    pub async fn select(&self, key: &str) -> Result<bool, AppError> {
        let record = self.find_file(key).await?;
        let mut chat = self.inner.chat.lock().await;
        let ChatState { selection, draft, .. } = &mut *chat;
        Ok(selection.toggle_add(record, draft))
    }

    /// Removes by key. Keys absent from the registry still match selected
    /// entries, so stale selections stay removable after a refresh.
    pub async fn deselect(&self, key: &str) -> bool {
        let mut chat = self.inner.chat.lock().await;
        let target = chat
            .selection
            .list()
            .iter()
            .find(|f| f.key() == key)
            .cloned();
        match target {
            Some(record) => chat.selection.remove(&record),
            None => false,
        }
    }

    pub async fn selection(&self) -> Vec<FileView> {
        let chat = self.inner.chat.lock().await;
        chat.selection.list().iter().map(|f| view(f, true)).collect()
    }

    // ── Conversation ──────────────────────────────────────────────────────────

    pub async fn set_draft(&self, text: String) {
        self.inner.chat.lock().await.draft = text;
    }

    pub async fn chat(&self) -> ChatView {
        let chat = self.inner.chat.lock().await;
        ChatView {
            messages: chat.thread.messages().to_vec(),
            previous_dialogue_id: chat.thread.previous_id().map(str::to_string),
            selection: chat.selection.list().iter().map(|f| view(f, true)).collect(),
            draft: chat.draft.clone(),
            hint: composer_hint(chat.thread.is_follow_up(), chat.selection.len()),
        }
    }

    /// Sends `query`, or the current draft when `None`. The draft is cleared
    /// once the query has been accepted, whatever the remote outcome.
    pub async fn send(&self, query: Option<String>) -> Result<ChatMessage, AppError> {
        let user_id = self
            .current_user()
            .await
            .map(|u| u.uid)
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());

        let pending = {
            let mut chat = self.inner.chat.lock().await;
            let text = query.unwrap_or_else(|| chat.draft.clone());
            let selection = chat.selection.list().to_vec();
            let pending = chat.thread.begin_send(&text, &selection, &user_id)?;
            chat.draft.clear();
            pending
        };

        let outcome = self.remote().chat_query(&pending.request).await;
        Ok(self.inner.chat.lock().await.thread.complete_send(&pending, outcome))
    }

    pub async fn reset_thread(&self) {
        self.inner.chat.lock().await.thread.reset_thread();
    }

    /// Clears transcript, thread token, selection and draft.
    pub async fn reset_chat(&self) {
        let mut chat = self.inner.chat.lock().await;
        chat.thread.reset();
        if !chat.selection.is_empty() {
            debug!("Clearing {} selected file(s)", chat.selection.len());
        }
        chat.selection.clear();
        chat.draft.clear();
    }

    pub async fn dialogues(&self, limit: Option<usize>) -> Result<Vec<DialogueSummary>, AppError> {
        let user_id = self.require_user().await?;
        let response = self
            .remote()
            .list_dialogues(&user_id, limit.unwrap_or(DEFAULT_DIALOGUE_LIMIT))
            .await?;
        if response.success {
            Ok(response.dialogues)
        } else {
            Err(AppError::server("Failed to retrieve dialogues."))
        }
    }
}

fn view(record: &FileRecord, selected: bool) -> FileView {
    FileView {
        key: record.key(),
        display_name: record.display_name.clone(),
        uploaded_at: record.uploaded_at,
        selected,
    }
}
