use std::fmt::Write as _;

use tracing::{debug, error, info};

use crate::errors::AppError;
use crate::models::{
    AttachedFile, ChatMessage, ChatQueryRequest, ChatQueryResponse, Citation, FileRecord, Sender,
};

pub const GREETING: &str = "Hello! I'm your AI document assistant. 📚\n\n\
                            Upload PDF documents using the file window on the left, \
                            then ask me questions about their content!";

/// User id sent with queries made before anyone signed in.
pub const ANONYMOUS_USER: &str = "anonymous";

const NO_RESPONSE: &str = "Failed to get response";

/// A query that has been recorded in the transcript and is waiting for its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    pub request: ChatQueryRequest,
    epoch: u64,
    thread_epoch: u64,
}

/// The transcript plus the dialogue continuation token.
///
/// Resets bump an epoch so a reply that lands after a reset cannot write into
/// the new conversation.
#[derive(Debug, Clone)]
pub struct ConversationThread {
    previous_id: Option<String>,
    messages: Vec<ChatMessage>,
    epoch: u64,
    thread_epoch: u64,
}

impl Default for ConversationThread {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationThread {
    pub fn new() -> Self {
        Self {
            previous_id: None,
            messages: vec![ChatMessage::new(Sender::Assistant, GREETING)],
            epoch: 0,
            thread_epoch: 0,
        }
    }

    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_follow_up(&self) -> bool {
        self.previous_id.is_some()
    }

    /// Validates the query and appends the user's turn. Nothing is appended
    /// when the query is blank.
    pub fn begin_send(
        &mut self,
        query: &str,
        selection: &[FileRecord],
        user_id: &str,
    ) -> Result<PendingQuery, AppError> {
        let request = build_request(query, selection, user_id, self.previous_id.as_deref())?;

        let mut turn = ChatMessage::new(Sender::User, query);
        if !selection.is_empty() {
            turn.attached_files = Some(selection.iter().map(AttachedFile::from).collect());
        }
        self.messages.push(turn);

        Ok(PendingQuery {
            request,
            epoch: self.epoch,
            thread_epoch: self.thread_epoch,
        })
    }

    /// Turns the outcome into exactly one assistant message and appends it.
    /// A success replaces the continuation token, even with nothing; a failure
    /// leaves it alone.
    pub fn complete_send(
        &mut self,
        pending: &PendingQuery,
        outcome: Result<ChatQueryResponse, AppError>,
    ) -> ChatMessage {
        let outcome = outcome.and_then(|response| {
            if response.success {
                Ok(response)
            } else {
                Err(AppError::server(
                    response.error.clone().unwrap_or_else(|| NO_RESPONSE.to_string()),
                ))
            }
        });

        let (message, dialogue_id) = match outcome {
            Ok(response) => {
                let dialogue_id = response.dialogue_id.clone();
                (reply_message(response), Some(dialogue_id))
            }
            Err(e) => {
                error!("Error processing chat query: {e}");
                (ChatMessage::error(e.chat_notice()), None)
            }
        };

        if pending.epoch != self.epoch {
            debug!("Dropping reply to a query sent before the chat was reset");
            return message;
        }
        if let Some(dialogue_id) = dialogue_id {
            if pending.thread_epoch == self.thread_epoch {
                if let Some(id) = &dialogue_id {
                    info!("Continuing dialogue {id}");
                }
                self.previous_id = dialogue_id;
            }
        }
        self.messages.push(message.clone());
        message
    }

    /// Forgets the continuation token; the transcript stays.
    pub fn reset_thread(&mut self) {
        self.previous_id = None;
        self.thread_epoch += 1;
    }

    /// Back to a fresh transcript holding only the greeting.
    pub fn reset(&mut self) {
        self.reset_thread();
        self.epoch += 1;
        self.messages = vec![ChatMessage::new(Sender::Assistant, GREETING)];
    }
}

/// Builds the wire request. An empty selection sends `null` (search everything),
/// never an empty list.
pub fn build_request(
    query: &str,
    selection: &[FileRecord],
    user_id: &str,
    previous_id: Option<&str>,
) -> Result<ChatQueryRequest, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::EmptyField { field_name: "query".to_string() });
    }

    let document_ids = if selection.is_empty() {
        None
    } else {
        Some(
            selection
                .iter()
                .filter_map(|f| f.identity.as_deref().or(f.document_id.as_deref()))
                .map(str::to_string)
                .collect(),
        )
    };

    Ok(ChatQueryRequest {
        query: query.to_string(),
        user_id: user_id.to_string(),
        document_ids,
        previous_dialogue_id: previous_id.map(str::to_string),
    })
}

fn reply_message(response: ChatQueryResponse) -> ChatMessage {
    let citations: Vec<Citation> = response
        .references
        .unwrap_or_default()
        .into_iter()
        .map(Citation::from)
        .collect();
    let body = response.response.unwrap_or_default();

    let mut message = ChatMessage::new(Sender::Assistant, render_reply(&body, &citations));
    message.dialogue_id = response.dialogue_id;
    if !citations.is_empty() {
        message.citations = Some(citations);
    }
    message
}

/// Appends a numbered source list to the reply body when there are citations.
pub fn render_reply(body: &str, citations: &[Citation]) -> String {
    let mut text = body.to_string();
    if citations.is_empty() {
        return text;
    }
    text.push_str("\n\n📚 **Sources:**\n");
    for (index, citation) in citations.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. {} (Page {}) - {}% relevant",
            index + 1,
            citation.filename,
            citation.page,
            citation.relevance_percent()
        );
    }
    text
}

pub fn composer_hint(follow_up: bool, selected: usize) -> String {
    if follow_up {
        "Ask a follow-up question...".to_string()
    } else if selected > 0 {
        let plural = if selected > 1 { "s" } else { "" };
        format!("Ask about your {selected} selected file{plural}...")
    } else {
        "Upload files and ask questions about them...".to_string()
    }
}
