use thiserror::Error;

/// Every failure the client core can observe, local or remote.
/// Variants carry a human-readable message suitable for inline display.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    // ── Local validation ─────────────────────────────────────────────────────
    #[error("Only PDF and image files are supported (PDF, JPG, JPEG, PNG, GIF, BMP, TIFF, WEBP)")]
    UnsupportedFileType { filename: String },

    #[error("File too large (max 50MB)")]
    FileTooLarge { filename: String, size: u64 },

    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Cannot delete file: missing document ID")]
    MissingDocumentId,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("File '{key}' is not in the file list")]
    FileNotFound { key: String },

    #[error("Invalid upload request: {message}")]
    InvalidUpload { message: String },

    // ── Remote service ───────────────────────────────────────────────────────
    #[error("Request timed out. Please try again.")]
    Timeout,

    #[error("Cannot connect to server. Please ensure the document service is running on {base_url}")]
    Unreachable { base_url: String },

    #[error("{message}")]
    Server { message: String },

    #[error("Server responded with status {status}")]
    HttpStatus { status: u16 },

    #[error("Malformed response from document service: {message}")]
    MalformedResponse { message: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Shown for chat failures that carry nothing more specific.
pub const GENERIC_CHAT_FAILURE: &str = "Sorry, I encountered an error processing your request.";

impl AppError {
    pub fn server(message: impl Into<String>) -> Self {
        AppError::Server { message: message.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedFileType { .. }
                | AppError::FileTooLarge { .. }
                | AppError::EmptyField { .. }
                | AppError::MissingDocumentId
                | AppError::InvalidUpload { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::FileNotFound { .. })
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AppError::NotSignedIn)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout)
    }

    /// Failures that came back from (or failed to reach) the document service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AppError::Unreachable { .. }
                | AppError::Server { .. }
                | AppError::HttpStatus { .. }
                | AppError::MalformedResponse { .. }
        )
    }

    /// The text rendered into the transcript when a chat query fails.
    pub fn chat_notice(&self) -> String {
        match self {
            AppError::Timeout | AppError::Unreachable { .. } | AppError::Server { .. } => {
                self.to_string()
            }
            _ => GENERIC_CHAT_FAILURE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_notice_follows_failure_taxonomy() {
        assert_eq!(AppError::Timeout.chat_notice(), "Request timed out. Please try again.");
        assert_eq!(
            AppError::Unreachable { base_url: "http://localhost:8000".into() }.chat_notice(),
            "Cannot connect to server. Please ensure the document service is running on http://localhost:8000"
        );
        assert_eq!(AppError::server("quota exceeded").chat_notice(), "quota exceeded");
        assert_eq!(AppError::HttpStatus { status: 500 }.chat_notice(), GENERIC_CHAT_FAILURE);
        assert_eq!(
            AppError::MalformedResponse { message: "eof".into() }.chat_notice(),
            GENERIC_CHAT_FAILURE
        );
    }

    #[test]
    fn classification_helpers() {
        assert!(AppError::MissingDocumentId.is_validation());
        assert!(AppError::FileNotFound { key: "k".into() }.is_not_found());
        assert!(AppError::HttpStatus { status: 404 }.is_remote());
        assert!(!AppError::Timeout.is_remote());
        assert!(AppError::NotSignedIn.is_unauthenticated());
    }
}
