use thiserror::Error;

use crate::auth::AuthError;
use crate::validators::ValidationError;

/// Core error types for fwpolicy
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity construction rejected its input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Entity is missing or hidden by soft deletion
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    /// Unique constraint violation
    #[error("{kind} already exists: {detail}")]
    AlreadyExists { kind: &'static str, detail: String },

    /// Token authentication failed
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: u64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn already_exists(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns a user-facing translation of this error with remediation hints.
    pub fn translate(&self) -> ErrorTranslation {
        match self {
            Error::Validation(e) => ErrorTranslation::new(format!("Invalid input: {e}"))
                .with_suggestion("Names must contain at least one non-whitespace character")
                .with_suggestion("Ports must be between 0 and 65535")
                .with_suggestion("Addresses must be IPv4 (1.1.1.1) or aligned CIDR (1.1.0.0/16)"),
            Error::NotFound { kind, id } => {
                ErrorTranslation::new(format!("No active {kind} with id {id}"))
                    .with_suggestion("Deleted entities are hidden, along with their children")
                    .with_suggestion("List entities to check the available ids")
            }
            Error::AlreadyExists { kind, .. } => {
                ErrorTranslation::new(format!("A matching {kind} already exists"))
                    .with_suggestion("Firewall names are globally unique")
                    .with_suggestion("Policy names are unique within their firewall")
                    .with_suggestion(
                        "Rules with the same action, sources, destinations and ports are duplicates",
                    )
            }
            Error::Auth(e) => ErrorTranslation::new(format!("Not authenticated: {e}"))
                .with_suggestion("Generate a token with: fwpolicy token <username>")
                .with_suggestion("Pass it with --token or the FWPOLICY_TOKEN variable"),
            Error::Config(msg) => ErrorTranslation::new(format!("Configuration problem: {msg}"))
                .with_suggestion("Set FWPOLICY_JWT_SECRET or add jwt_secret to config.json"),
            Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => {
                ErrorTranslation::new(self.to_string())
                    .with_suggestion("Check that the data directory is writable")
                    .with_suggestion("Inspect the log file for details")
            }
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

pub type Result<T> = std::result::Result<T, Error>;
