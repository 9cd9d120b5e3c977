//! Scripted in-memory [`DocumentService`] used by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::DocumentService;
use crate::errors::AppError;
use crate::models::{
    ChatQueryRequest, ChatQueryResponse, DeleteResponse, DialoguesResponse, ListFilesResponse,
    ProcessResponse, RawFile, UserIdentity,
};

pub const FAKE_BASE_URL: &str = "http://fake-docs:8000";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Health,
    SignIn(String),
    Process { filename: String, user_id: String },
    ListFiles(String),
    Delete { document_id: String, user_id: String },
    Chat(ChatQueryRequest),
    Dialogues(usize),
}

/// Each operation pops its next scripted result; an empty script answers with
/// a plain success.
#[derive(Default)]
pub struct FakeDocumentService {
    calls: Mutex<Vec<Call>>,
    offline: Mutex<bool>,
    processes: Mutex<VecDeque<Result<ProcessResponse, AppError>>>,
    listings: Mutex<VecDeque<Result<ListFilesResponse, AppError>>>,
    deletes: Mutex<VecDeque<Result<DeleteResponse, AppError>>>,
    chats: Mutex<VecDeque<Result<ChatQueryResponse, AppError>>>,
}

impl FakeDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn chat_requests(&self) -> Vec<ChatQueryRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Chat(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn push_process(&self, result: Result<ProcessResponse, AppError>) {
        self.processes.lock().unwrap().push_back(result);
    }

    pub fn push_listing(&self, result: Result<ListFilesResponse, AppError>) {
        self.listings.lock().unwrap().push_back(result);
    }

    pub fn push_delete(&self, result: Result<DeleteResponse, AppError>) {
        self.deletes.lock().unwrap().push_back(result);
    }

    pub fn push_chat(&self, result: Result<ChatQueryResponse, AppError>) {
        self.chats.lock().unwrap().push_back(result);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn unreachable(&self) -> Option<AppError> {
        (*self.offline.lock().unwrap())
            .then(|| AppError::Unreachable { base_url: FAKE_BASE_URL.to_string() })
    }
}

pub fn listing(files: serde_json::Value) -> ListFilesResponse {
    serde_json::from_value(serde_json::json!({ "success": true, "files": files }))
        .expect("valid listing")
}

pub fn reply(text: &str, dialogue_id: Option<&str>, references: serde_json::Value) -> ChatQueryResponse {
    serde_json::from_value(serde_json::json!({
        "success": true,
        "response": text,
        "dialogue_id": dialogue_id,
        "references": references,
    }))
    .expect("valid reply")
}

#[async_trait]
impl DocumentService for FakeDocumentService {
    fn base_url(&self) -> &str {
        FAKE_BASE_URL
    }

    async fn health(&self) -> Result<(), AppError> {
        self.record(Call::Health);
        match self.unreachable() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn sign_in(&self, user: &UserIdentity) -> Result<(), AppError> {
        self.record(Call::SignIn(user.uid.clone()));
        match self.unreachable() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn process_file(&self, file: RawFile, user_id: &str) -> Result<ProcessResponse, AppError> {
        self.record(Call::Process { filename: file.name, user_id: user_id.to_string() });
        if let Some(err) = self.unreachable() {
            return Err(err);
        }
        self.processes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ProcessResponse { success: true, ..Default::default() }))
    }

    async fn list_files(&self, user_id: &str) -> Result<ListFilesResponse, AppError> {
        self.record(Call::ListFiles(user_id.to_string()));
        if let Some(err) = self.unreachable() {
            return Err(err);
        }
        self.listings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ListFilesResponse { success: true, ..Default::default() }))
    }

    async fn delete_file(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<DeleteResponse, AppError> {
        self.record(Call::Delete {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
        });
        if let Some(err) = self.unreachable() {
            return Err(err);
        }
        self.deletes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DeleteResponse { success: true, message: None }))
    }

    async fn chat_query(&self, request: &ChatQueryRequest) -> Result<ChatQueryResponse, AppError> {
        self.record(Call::Chat(request.clone()));
        if let Some(err) = self.unreachable() {
            return Err(err);
        }
        self.chats
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(reply("ok", None, serde_json::json!([]))))
    }

    async fn list_dialogues(
        &self,
        _user_id: &str,
        limit: usize,
    ) -> Result<DialoguesResponse, AppError> {
        self.record(Call::Dialogues(limit));
        if let Some(err) = self.unreachable() {
            return Err(err);
        }
        Ok(DialoguesResponse { success: true, dialogues: Vec::new() })
    }
}
