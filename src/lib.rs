//! # outreach-mailer
//!
//! Outbound email delivery for outreach campaigns: an ordered list of SMTP
//! providers with health-aware failover, paced bulk sending, threaded
//! follow-ups and `{{placeholder}}` personalization.
//!
//! ## Quick Start
//!
//! Set environment variables:
//! ```bash
//! SMTP_PROVIDERS=primary,backup
//! SMTP_PRIMARY_HOST=smtp.acme.io
//! SMTP_PRIMARY_USERNAME=outreach
//! SMTP_PRIMARY_PASSWORD=secret
//! SMTP_BACKUP_HOST=smtp.backup-relay.io
//! SMTP_BACKUP_PORT=465
//! SMTP_BACKUP_SECURE=true
//! SMTP_BACKUP_USERNAME=outreach
//! SMTP_BACKUP_PASSWORD=secret
//! EMAIL_FROM=sam@acme.io
//! EMAIL_FROM_NAME=Sam from Acme
//! ```
//!
//! Build the mailer once and share it:
//! ```rust,ignore
//! use std::sync::Arc;
//! use outreach_mailer::{OutboundMailer, OutboundMessage};
//!
//! let mailer = Arc::new(OutboundMailer::from_env().await?);
//!
//! let result = mailer
//!     .send_email(
//!         &OutboundMessage::new()
//!             .to(("Ana Lima", "ana@prospect.com"))
//!             .subject("Quick question")
//!             .text_body("Hi Ana, ..."),
//!     )
//!     .await?;
//! ```
//!
//! See [`config`] for every variable.
//!
//! ## Failover
//!
//! Channels are tried in configuration order, skipping unhealthy ones. A
//! persistent failure (rejected credentials, rejected envelope or message)
//! takes the channel out of rotation until the next
//! [`health_check`](OutboundMailer::health_check); a transient failure
//! (timeout, dropped connection, throttling) only moves the message on to the
//! next channel. The split is decided by an [`ErrorClassifier`].
//!
//! ## Feature Flags
//!
//! - `smtp` (default) - SMTP transport via lettre
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit Prometheus-style metrics:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `outreach_mailer_emails_total` | Counter | channel, status | Delivery attempts |
//! | `outreach_mailer_delivery_duration_seconds` | Histogram | channel | Attempt duration |
//! | `outreach_mailer_channel_demotions_total` | Counter | channel | Channels taken out of rotation |
//! | `outreach_mailer_bulk_batches_total` | Counter | | Bulk waves dispatched |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the outreach-mailer crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod bulk;
mod channel;
mod classify;
mod error;
mod follow_up;
mod interceptor;
mod mailer;
mod message;
mod transport;

pub mod config;
pub mod personalize;
pub mod providers;
pub mod testing;

// Re-exports
pub use address::{Address, ToAddress};
pub use attachment::{Attachment, AttachmentType};
pub use bulk::{BulkEntry, BulkOptions, BulkSendReport};
pub use channel::{Channel, ChannelStatus, ConnectionParams};
pub use classify::{DefaultClassifier, ErrorClass, ErrorClassifier};
pub use config::{MailerConfig, PoolSettings, ProviderConfig};
pub use error::MailError;
pub use follow_up::{reply_subject, FollowUp};
pub use interceptor::{BlockDomains, Interceptor, RedirectRecipients};
pub use mailer::{MailerBuilder, OutboundMailer, SendResult, DEFAULT_SEND_TIMEOUT};
pub use message::OutboundMessage;
pub use personalize::{create_personalized_message, MessageTemplate, PersonalizedMessage};
pub use transport::{DeliveryReceipt, Transport};

/// Common imports for application code.
pub mod prelude {
    pub use crate::{
        create_personalized_message, Address, Attachment, BulkOptions, BulkSendReport, FollowUp,
        MailError, MailerConfig, MessageTemplate, OutboundMailer, OutboundMessage, SendResult,
    };
}
