//! Message interceptors for rewriting or blocking messages before delivery.
//!
//! Interceptors run in registration order at the start of every
//! [`send_email`](crate::OutboundMailer::send_email), before the default
//! sender is applied and before validation. Use them to add tracking headers,
//! redirect recipients in staging, or block suppressed domains.
//!
//! # Example
//!
//! ```rust,ignore
//! use outreach_mailer::OutboundMailer;
//!
//! let mailer = OutboundMailer::builder()
//!     .channel("primary", transport)
//!     .interceptor(|message: OutboundMessage| -> Result<_, MailError> {
//!         Ok(message.header("X-Campaign", "q3-launch"))
//!     })
//!     .build()?;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::MailError;
use crate::message::OutboundMessage;

/// Transforms a message before delivery, or refuses it.
///
/// For simple cases, use a closure:
///
/// ```rust,ignore
/// builder.interceptor(|m: OutboundMessage| -> Result<_, MailError> { Ok(m.header("X-Foo", "bar")) })
/// ```
///
/// For anything with state, implement the trait on a struct:
///
/// ```rust,ignore
/// struct Suppression { domains: Vec<String> }
///
/// impl Interceptor for Suppression {
///     fn intercept(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError> {
///         // ...
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync {
    /// Return `Ok(message)` to continue with the (possibly modified) message.
    /// Return `Err(...)` to stop it; no channel is contacted.
    fn intercept(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError>;
}

impl<F> Interceptor for F
where
    F: Fn(OutboundMessage) -> Result<OutboundMessage, MailError> + Send + Sync,
{
    fn intercept(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError> {
        (self)(message)
    }
}

/// Ordered list of interceptors held by the mailer.
#[derive(Clone, Default)]
pub(crate) struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub(crate) fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub(crate) fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub(crate) fn apply(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError> {
        self.interceptors
            .iter()
            .try_fold(message, |message, interceptor| interceptor.intercept(message))
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// Rewrites every recipient list to a single address.
///
/// Keeps staging environments from mailing real prospects. The original
/// recipients are preserved in an `X-Original-To` header.
#[derive(Debug, Clone)]
pub struct RedirectRecipients {
    to: String,
}

impl RedirectRecipients {
    pub fn new(to: impl Into<String>) -> Self {
        Self { to: to.into() }
    }
}

impl Interceptor for RedirectRecipients {
    fn intercept(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError> {
        let original = message
            .to
            .iter()
            .map(|a| a.email.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut message = message.header("X-Original-To", original);
        message.to = vec![self.to.as_str().into()];
        message.cc.clear();
        message.bcc.clear();
        Ok(message)
    }
}

/// Blocks messages addressed to any of the listed domains.
#[derive(Debug, Clone, Default)]
pub struct BlockDomains {
    domains: Vec<String>,
}

impl BlockDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.into().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Interceptor for BlockDomains {
    fn intercept(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError> {
        let blocked = message.all_recipients().find(|addr| {
            addr.domain()
                .is_some_and(|d| self.domains.iter().any(|b| b.eq_ignore_ascii_case(d)))
        });
        match blocked {
            Some(addr) => Err(MailError::Blocked(format!(
                "recipient '{}' is on a suppressed domain",
                addr.email
            ))),
            None => Ok(message),
        }
    }
}
