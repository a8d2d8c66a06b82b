//! Transport trait and delivery receipt.
//!
//! # Why `async_trait`?
//!
//! The mailer stores its channels as `Arc<dyn Transport>` so SMTP pools and
//! in-memory test transports can sit side by side in one ordered list. Native
//! async trait methods are not object safe; `#[async_trait]` boxes the
//! returned futures to make dynamic dispatch possible. One allocation per send
//! is noise next to an SMTP round trip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailError;
use crate::message::OutboundMessage;

/// What a transport hands back after accepting a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Message id assigned by the transport or server.
    pub message_id: String,
    /// Raw server reply, when the transport has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl DeliveryReceipt {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            response: None,
        }
    }

    pub fn with_response(message_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            response: Some(response.into()),
        }
    }
}

/// A connection to one delivery provider.
///
/// Implementations report failures through the typed [`MailError`] provider
/// variants (`ProviderAuth`, `ProviderProtocol`, `ProviderTransient`,
/// `Timeout`) so the mailer's classifier can tell a dead channel from a
/// hiccup.
///
/// ```ignore
/// use outreach_mailer::{DeliveryReceipt, MailError, OutboundMessage, Transport};
///
/// struct Relay;
///
/// #[async_trait::async_trait]
/// impl Transport for Relay {
///     async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, MailError> {
///         // hand the message to your relay
///         Ok(DeliveryReceipt::new("<id@relay>"))
///     }
///
///     async fn verify(&self) -> Result<(), MailError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait until the transport will accept another message.
    ///
    /// Rate caps live here. The mailer awaits this before starting the send
    /// timeout, so queueing behind the cap never counts as a slow provider.
    async fn ready(&self) {}

    /// Submit one message.
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, MailError>;

    /// Liveness handshake: connect, authenticate, hang up.
    async fn verify(&self) -> Result<(), MailError>;

    /// Short transport kind for logs ("smtp", "memory", ...).
    fn kind(&self) -> &'static str {
        "unknown"
    }
}
