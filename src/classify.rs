//! Persistent vs transient error classification.
//!
//! A persistent error takes the channel out of rotation until the next
//! [`health_check`](crate::OutboundMailer::health_check). A transient error
//! only moves the current message on to the next channel.
//!
//! Exact failure codes differ between transports, so the decision is a
//! pluggable predicate rather than string matching baked into the mailer:
//!
//! ```rust,ignore
//! use outreach_mailer::{ErrorClass, MailError, OutboundMailer};
//!
//! let mailer = OutboundMailer::builder()
//!     .channel("primary", transport)
//!     .classifier(|err: &MailError| match err {
//!         MailError::ProviderAuth { .. } => ErrorClass::Persistent,
//!         _ => ErrorClass::Transient,
//!     })
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// Outcome of classifying a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The channel cannot recover on its own; demote it.
    Persistent,
    /// Worth trying again later; keep the channel healthy.
    Transient,
}

/// Decides whether a delivery error should demote its channel.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &MailError) -> ErrorClass;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&MailError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &MailError) -> ErrorClass {
        (self)(error)
    }
}

/// Default classification.
///
/// Authentication failures and rejected envelopes/messages are persistent.
/// Everything else (timeouts, dropped connections, throttling) is transient.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &MailError) -> ErrorClass {
        match error {
            MailError::ProviderAuth { .. } | MailError::ProviderProtocol { .. } => {
                ErrorClass::Persistent
            }
            _ => ErrorClass::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_demotes_auth_and_protocol() {
        let c = DefaultClassifier;
        assert_eq!(
            c.classify(&MailError::auth("primary", "535 bad credentials")),
            ErrorClass::Persistent
        );
        assert_eq!(
            c.classify(&MailError::protocol("primary", "553 bad sender")),
            ErrorClass::Persistent
        );
    }

    #[test]
    fn default_keeps_transient_failures() {
        let c = DefaultClassifier;
        assert_eq!(
            c.classify(&MailError::transient("primary", "421 try later")),
            ErrorClass::Transient
        );
        assert_eq!(
            c.classify(&MailError::Timeout {
                provider: "primary".into(),
                after: Duration::from_secs(30),
            }),
            ErrorClass::Transient
        );
        assert_eq!(
            c.classify(&MailError::Internal("boom".into())),
            ErrorClass::Transient
        );
    }

    #[test]
    fn closures_are_classifiers() {
        let everything_persistent = |_: &MailError| ErrorClass::Persistent;
        assert_eq!(
            everything_persistent.classify(&MailError::transient("x", "y")),
            ErrorClass::Persistent
        );
    }
}
