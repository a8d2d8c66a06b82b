//! Error types for outreach-mailer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when sending emails.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// No delivery channel is configured.
    #[error("Email provider not configured")]
    NotConfigured,

    /// Configuration error (missing env var, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The message is missing a required field or carries a malformed one.
    ///
    /// Raised before any channel is contacted.
    #[error("Invalid field `{field}`: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    /// An interceptor refused to let the message through.
    #[error("Message blocked: {0}")]
    Blocked(String),

    /// Attachment file not found.
    #[error("Attachment file not found: {0}")]
    AttachmentFileNotFound(String),

    /// Failed to read attachment file.
    #[error("Failed to read attachment: {0}")]
    AttachmentReadError(String),

    /// The provider rejected our credentials.
    #[error("Authentication failed ({provider}): {message}")]
    ProviderAuth { provider: String, message: String },

    /// The provider rejected the envelope or the message itself.
    #[error("Protocol error ({provider}): {message}")]
    ProviderProtocol { provider: String, message: String },

    /// Network failure, throttling or a temporary rejection.
    #[error("Transient error ({provider}): {message}")]
    ProviderTransient { provider: String, message: String },

    /// A handshake or send did not settle in time.
    #[error("Timed out after {after:?} ({provider})")]
    Timeout { provider: String, after: Duration },

    /// Every healthy channel was tried and none accepted the message.
    #[error("All providers exhausted after {attempted} attempt(s); last error: {last}")]
    AllProvidersExhausted {
        attempted: usize,
        last: Box<MailError>,
    },

    /// No channel was healthy when the send started.
    #[error("No healthy email provider available")]
    NoHealthyProvider,

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MailError {
    /// A required field is absent.
    pub fn missing(field: &'static str) -> Self {
        Self::Validation {
            field,
            reason: "is required".into(),
        }
    }

    /// A field is present but malformed.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Create an authentication error for a provider.
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderAuth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a protocol (envelope/message) error for a provider.
    pub fn protocol(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderProtocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a transient error for a provider.
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderTransient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised by message validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The provider this error came from, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::ProviderAuth { provider, .. }
            | Self::ProviderProtocol { provider, .. }
            | Self::ProviderTransient { provider, .. }
            | Self::Timeout { provider, .. } => Some(provider),
            Self::AllProvidersExhausted { last, .. } => last.provider(),
            _ => None,
        }
    }
}
