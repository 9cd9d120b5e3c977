use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::models::{FileRecord, ListFilesResponse};
use crate::remote::DocumentService;

const LIST_FAILED: &str = "Failed to fetch files from server.";
const DELETE_FAILED: &str = "Failed to delete file. Please try again.";

/// Issue-order tag of one refresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

/// The authoritative local list of the user's documents.
///
/// Refreshes replace the list wholesale. Overlapping refreshes are resolved by
/// ticket: a response is applied only when its ticket is newer than the last
/// applied one, so a slow, older listing cannot overwrite a newer one.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<FileRecord>,
    last_issued: u64,
    last_applied: u64,
    error: Option<String>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[FileRecord] {
        &self.files
    }

    /// Last refresh/delete failure, for display next to the file list.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn find_by_key(&self, key: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.key() == key)
    }

    /// Empties the list and retires every ticket issued so far, so a refresh
    /// still in flight cannot repopulate it.
    pub fn clear(&mut self) {
        self.files.clear();
        self.error = None;
        self.last_applied = self.last_issued;
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.last_issued += 1;
        RefreshTicket(self.last_issued)
    }

    /// Applies a listing outcome unless a newer refresh already landed.
    /// Failures empty the list rather than keep stale entries.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        outcome: Result<ListFilesResponse, AppError>,
    ) -> Result<Vec<FileRecord>, AppError> {
        if ticket.0 <= self.last_applied {
            debug!("Discarding stale refresh #{} (applied #{})", ticket.0, self.last_applied);
            return Ok(self.files.clone());
        }
        self.last_applied = ticket.0;

        let outcome = outcome.and_then(|listing| {
            if listing.success {
                Ok(listing)
            } else {
                Err(AppError::server(
                    listing.message.unwrap_or_else(|| LIST_FAILED.to_string()),
                ))
            }
        });

        match outcome {
            Ok(listing) => {
                let now = Utc::now();
                self.files = listing
                    .files
                    .into_iter()
                    .flatten()
                    .filter_map(|f| FileRecord::from_remote(f, now))
                    .collect();
                self.error = None;
                Ok(self.files.clone())
            }
            Err(e) => {
                error!("Error fetching files: {e}");
                self.files.clear();
                self.error = Some(format!("Failed to fetch files: {e}"));
                Err(e)
            }
        }
    }

    /// Drops every entry referring to `document_id`. Returns how many were removed.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.files.len();
        self.files.retain(|f| f.document_ref() != Some(document_id));
        before - self.files.len()
    }

    fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }
}

/// Re-fetches the owner's listing. The lock is released while the request is
/// in flight so other operations are not blocked behind the network.
pub async fn refresh(
    registry: &Mutex<FileRegistry>,
    remote: &dyn DocumentService,
    owner_user_id: &str,
) -> Result<Vec<FileRecord>, AppError> {
    let ticket = registry.lock().await.begin_refresh();
    let outcome = remote.list_files(owner_user_id).await;
    let result = registry.lock().await.complete_refresh(ticket, outcome);
    if let Ok(files) = &result {
        debug!("Registry holds {} file(s) for {owner_user_id}", files.len());
    }
    result
}

/// Deletes `record` remotely and, on confirmation, locally. A record without a
/// resolvable document id fails before any request is made.
pub async fn delete(
    registry: &Mutex<FileRegistry>,
    remote: &dyn DocumentService,
    owner_user_id: &str,
    record: &FileRecord,
) -> Result<(), AppError> {
    let Some(document_id) = record.document_ref().map(str::to_string) else {
        let err = AppError::MissingDocumentId;
        registry.lock().await.set_error(err.to_string());
        return Err(err);
    };
    registry.lock().await.error = None;

    let outcome = remote
        .delete_file(&document_id, owner_user_id)
        .await
        .and_then(|response| {
            if response.success {
                Ok(())
            } else {
                Err(AppError::server(
                    response.message.unwrap_or_else(|| DELETE_FAILED.to_string()),
                ))
            }
        });

    let mut guard = registry.lock().await;
    match outcome {
        Ok(()) => {
            let removed = guard.remove_document(&document_id);
            info!("Deleted file '{}' (removed {removed} local entries)", record.display_name);
            Ok(())
        }
        Err(e) => {
            warn!("Delete of '{}' failed: {e}", record.display_name);
            guard.set_error(e.to_string());
            Err(e)
        }
    }
}
