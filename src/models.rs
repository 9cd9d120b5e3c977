use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::service::upload::StageStatus;

pub const UNKNOWN_FILE: &str = "Unknown File";

/// The `{uid, displayName, email}` triple handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A file picked by the user, not yet submitted.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub content_type: String,
    /// Declared size in bytes. May exceed `bytes.len()` when an oversized body was not buffered.
    pub size: u64,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }
}

// ── File records ──────────────────────────────────────────────────────────────

/// One document owned by the signed-in user, normalized from the remote listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Server id, falling back to the document id.
    pub identity: Option<String>,
    pub document_id: Option<String>,
    pub filename: Option<String>,
    pub original_name: Option<String>,
    pub display_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    /// Normalizes one listing entry. Entries with neither `filename` nor
    /// `originalName` are unusable and yield `None`.
    pub fn from_remote(file: RemoteFile, now: DateTime<Utc>) -> Option<Self> {
        let filename = non_empty(file.filename);
        let original_name = non_empty(file.original_name);
        if filename.is_none() && original_name.is_none() {
            return None;
        }

        let document_id = non_empty(file.document_id);
        let identity = non_empty(file.id)
            .or_else(|| document_id.clone())
            .or_else(|| non_empty(file.mongo_id));
        let display_name = original_name
            .clone()
            .or_else(|| filename.clone())
            .unwrap_or_else(|| UNKNOWN_FILE.to_string());
        let uploaded_at = file
            .uploaded_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);

        Some(Self {
            identity,
            document_id,
            filename,
            original_name,
            display_name,
            uploaded_at,
        })
    }

    /// Stable key for the local surface: identity when known, else a key
    /// synthesized from the name so it survives repeated listings.
    pub fn key(&self) -> String {
        match &self.identity {
            Some(id) => id.clone(),
            None => format!("name:{}", self.display_name),
        }
    }

    /// Id the remote accepts for deletion and query filtering.
    pub fn document_ref(&self) -> Option<&str> {
        self.document_id.as_deref().or(self.identity.as_deref())
    }

    /// Name used when talking about the file to the user.
    pub fn label(&self) -> &str {
        self.filename
            .as_deref()
            .or(self.original_name.as_deref())
            .unwrap_or(&self.display_name)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ── Chat transcript ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A supporting source attached to an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_id: Option<String>,
    pub page: u32,
    pub similarity_score: f64,
    pub excerpt: String,
    /// First characters of `excerpt`, as shown in the sources list.
    #[serde(default)]
    pub preview: String,
}

const PREVIEW_CHARS: usize = 150;

impl Citation {
    pub fn relevance_percent(&self) -> String {
        format!("{:.1}", self.similarity_score * 100.0)
    }
}

fn excerpt_preview(excerpt: &str) -> String {
    let head: String = excerpt.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}

impl From<Reference> for Citation {
    fn from(r: Reference) -> Self {
        let excerpt = r.text.unwrap_or_default();
        Self {
            filename: r.filename.unwrap_or_else(|| "Unknown".to_string()),
            document_id: r.document_id,
            page: r.page_num.unwrap_or(0),
            similarity_score: r.similarity_score.unwrap_or(0.0),
            preview: excerpt_preview(&excerpt),
            excerpt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub name: String,
    pub id: Option<String>,
}

impl From<&FileRecord> for AttachedFile {
    fn from(f: &FileRecord) -> Self {
        Self {
            name: f.label().to_string(),
            id: f.document_ref().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_files: Option<Vec<AttachedFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
            citations: None,
            attached_files: None,
            dialogue_id: None,
            is_error: false,
            created_at: Utc::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { is_error: true, ..Self::new(Sender::Assistant, text) }
    }
}

// ── Wire payloads of the document service ─────────────────────────────────────

/// One entry of `GET /user-files`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "originalName", default)]
    pub original_name: Option<String>,
    #[serde(rename = "uploadedAt", default)]
    pub uploaded_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub files: Vec<Option<RemoteFile>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub steps_completed: Option<usize>,
    #[serde(default)]
    pub steps: Option<HashMap<String, StageStatus>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /chat-query-json`. `None` fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatQueryRequest {
    pub query: String,
    pub user_id: String,
    pub document_ids: Option<Vec<String>>,
    pub previous_dialogue_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient_page")]
    pub page_num: Option<u32>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub similarity_score: Option<f64>,
}

/// Page numbers pass through vector-store metadata and may come back as
/// `4`, `4.0` or `"4"`. Anything else is treated as absent.
fn lenient_page<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= u32::MAX as f64)
        .map(|n| n.trunc() as u32))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatQueryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub references: Option<Vec<Reference>>,
    #[serde(default)]
    pub dialogue_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub previous_dialogue_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialoguesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub dialogues: Vec<DialogueSummary>,
}
