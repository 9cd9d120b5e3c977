//! Client for the remote document processing/query service.
//!
//! The service is opaque: it extracts, embeds, stores and retrieves. This module
//! only speaks its HTTP interface and classifies failures into [`AppError`].

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::errors::AppError;
use crate::models::{
    ChatQueryRequest, ChatQueryResponse, DeleteResponse, DialoguesResponse, ListFilesResponse,
    ProcessResponse, RawFile, UserIdentity,
};

/// The operations the client core consumes. Implementations return the
/// decoded body for any 2xx response; `success: false` bodies are left for
/// the caller to interpret.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Configured base address, used in "cannot reach server" messages.
    fn base_url(&self) -> &str;

    async fn health(&self) -> Result<(), AppError>;

    async fn sign_in(&self, user: &UserIdentity) -> Result<(), AppError>;

    async fn process_file(&self, file: RawFile, user_id: &str) -> Result<ProcessResponse, AppError>;

    async fn list_files(&self, user_id: &str) -> Result<ListFilesResponse, AppError>;

    async fn delete_file(&self, document_id: &str, user_id: &str)
        -> Result<DeleteResponse, AppError>;

    async fn chat_query(&self, request: &ChatQueryRequest) -> Result<ChatQueryResponse, AppError>;

    async fn list_dialogues(&self, user_id: &str, limit: usize)
        -> Result<DialoguesResponse, AppError>;
}

/// [`DocumentService`] over HTTP. Standard calls use the client-wide timeout;
/// uploads override it with the longer upload timeout.
#[derive(Clone)]
pub struct HttpDocumentService {
    client: reqwest::Client,
    base_url: String,
    upload_timeout: std::time::Duration,
}

impl HttpDocumentService {
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            upload_timeout: config.upload_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, endpoint: &str, err: reqwest::Error) -> AppError {
        error!("Request to {endpoint} failed: {err}");
        if err.is_builder() {
            AppError::Unexpected(format!("invalid request to {endpoint}: {err}"))
        } else if err.is_timeout() {
            AppError::Timeout
        } else if err.is_connect() || err.is_request() {
            AppError::Unreachable { base_url: self.base_url.clone() }
        } else if err.is_decode() || err.is_body() {
            AppError::MalformedResponse { message: err.to_string() }
        } else {
            AppError::Unexpected(err.to_string())
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        debug!("{endpoint} answered {status}");

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            error!("Undecodable body from {endpoint}: {e}");
            AppError::MalformedResponse { message: e.to_string() }
        })
    }
}

/// Turns a non-2xx body into an error, preferring the server's own words
/// (`detail`, then `error`, then `message`).
pub fn error_from_body(status: u16, body: &str) -> AppError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "error", "message"].iter().find_map(|field| {
                value
                    .get(*field)
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
            })
        });
    match message {
        Some(message) => AppError::Server { message },
        None => AppError::HttpStatus { status },
    }
}

#[async_trait]
impl DocumentService for HttpDocumentService {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> Result<(), AppError> {
        let endpoint = "/health";
        let response = self
            .client
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::HttpStatus { status: response.status().as_u16() })
        }
    }

    async fn sign_in(&self, user: &UserIdentity) -> Result<(), AppError> {
        let endpoint = "/sign-in";
        let name = user
            .display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Anonymous");
        let email = user.email.as_deref().unwrap_or("");
        self.client
            .get(self.url(endpoint))
            .query(&[("name", name), ("firebase_id", user.uid.as_str()), ("email", email)])
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        Ok(())
    }

    async fn process_file(&self, file: RawFile, user_id: &str) -> Result<ProcessResponse, AppError> {
        let endpoint = "/process-sequence";
        let part = Part::bytes(file.bytes)
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| AppError::InvalidUpload {
                message: format!("{}: invalid content type: {e}", file.name),
            })?;
        let form = Form::new().part("file", part).text("user_id", user_id.to_string());

        let request = self
            .client
            .post(self.url(endpoint))
            .multipart(form)
            .timeout(self.upload_timeout);
        self.send(endpoint, request).await
    }

    async fn list_files(&self, user_id: &str) -> Result<ListFilesResponse, AppError> {
        let endpoint = "/user-files";
        let request = self
            .client
            .get(self.url(endpoint))
            .query(&[("user_id", user_id)]);
        self.send(endpoint, request).await
    }

    async fn delete_file(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<DeleteResponse, AppError> {
        let endpoint = "/delete-file";
        let request = self
            .client
            .delete(self.url(endpoint))
            .query(&[("document_id", document_id), ("user_id", user_id)]);
        self.send(endpoint, request).await
    }

    async fn chat_query(&self, request: &ChatQueryRequest) -> Result<ChatQueryResponse, AppError> {
        let endpoint = "/chat-query-json";
        let builder = self.client.post(self.url(endpoint)).json(request);
        self.send(endpoint, builder).await
    }

    async fn list_dialogues(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<DialoguesResponse, AppError> {
        let endpoint = "/user-dialogues";
        let limit = limit.to_string();
        let request = self
            .client
            .get(self.url(endpoint))
            .query(&[("user_id", user_id), ("limit", limit.as_str())]);
        self.send(endpoint, request).await
    }
}
