//! In-memory transport for development and testing.
//!
//! Records every accepted message instead of sending it, and can be scripted
//! to fail sends or handshakes so failover paths can be exercised without a
//! mail server.
//!
//! ```rust,ignore
//! use outreach_mailer::providers::MemoryTransport;
//! use outreach_mailer::{MailError, OutboundMailer};
//!
//! let primary = MemoryTransport::new();
//! let backup = MemoryTransport::new();
//! primary.fail_next(MailError::auth("primary", "535 bad credentials"));
//!
//! let mailer = OutboundMailer::builder()
//!     .channel("primary", primary.clone())
//!     .channel("backup", backup.clone())
//!     .default_from("sam@acme.io")
//!     .build()?;
//!
//! mailer.send_email(message).await?;
//! assert_eq!(backup.delivery_count(), 1);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;
use crate::error::MailError;
use crate::message::OutboundMessage;
use crate::transport::{DeliveryReceipt, Transport};

/// A message accepted by a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct Delivered {
    pub message_id: String,
    pub message: OutboundMessage,
    pub sent_at: DateTime<Utc>,
    /// Monotonic acceptance time; follows tokio's paused clock in tests.
    pub accepted_at: tokio::time::Instant,
}

#[derive(Default)]
struct State {
    delivered: Mutex<Vec<Delivered>>,
    queued_failures: Mutex<VecDeque<MailError>>,
    failure: Mutex<Option<MailError>>,
    verify_failure: Mutex<Option<MailError>>,
    latency: Mutex<Option<Duration>>,
    send_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

/// Transport that keeps messages in memory.
///
/// Clones share state, so keep a clone to inspect what a mailer delivered.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<State>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Failure Simulation
    // =========================================================================

    /// Fail the next send with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: MailError) {
        self.state.queued_failures.lock().push_back(error);
    }

    /// Fail every send with `error` until [`clear_failure`](Self::clear_failure).
    pub fn set_failure(&self, error: MailError) {
        *self.state.failure.lock() = Some(error);
    }

    pub fn clear_failure(&self) {
        self.state.queued_failures.lock().clear();
        *self.state.failure.lock() = None;
    }

    /// Fail every handshake with `error` until cleared.
    pub fn set_verify_failure(&self, error: MailError) {
        *self.state.verify_failure.lock() = Some(error);
    }

    pub fn clear_verify_failure(&self) {
        *self.state.verify_failure.lock() = None;
    }

    /// Delay every send and handshake, to simulate a slow server.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock() = Some(latency);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Everything accepted so far, oldest first.
    pub fn deliveries(&self) -> Vec<Delivered> {
        self.state.delivered.lock().clone()
    }

    pub fn last_delivery(&self) -> Option<Delivered> {
        self.state.delivered.lock().last().cloned()
    }

    pub fn delivery_count(&self) -> usize {
        self.state.delivered.lock().len()
    }

    /// Number of send attempts, successful or not.
    pub fn send_calls(&self) -> usize {
        self.state.send_calls.load(Ordering::SeqCst)
    }

    /// Number of handshakes performed.
    pub fn verify_calls(&self) -> usize {
        self.state.verify_calls.load(Ordering::SeqCst)
    }

    /// Whether any accepted message was addressed to `email`.
    pub fn sent_to(&self, email: &str) -> bool {
        self.state.delivered.lock().iter().any(|d| {
            d.message
                .all_recipients()
                .any(|a: &Address| a.email.eq_ignore_ascii_case(email))
        })
    }

    pub fn find<F>(&self, predicate: F) -> Vec<Delivered>
    where
        F: Fn(&OutboundMessage) -> bool,
    {
        self.state
            .delivered
            .lock()
            .iter()
            .filter(|d| predicate(&d.message))
            .cloned()
            .collect()
    }

    /// Remove and return everything accepted so far.
    pub fn flush(&self) -> Vec<Delivered> {
        std::mem::take(&mut *self.state.delivered.lock())
    }

    async fn simulate_latency(&self) {
        let latency = *self.state.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, MailError> {
        self.state.send_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.state.queued_failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.state.failure.lock().clone() {
            return Err(error);
        }

        let message_id = format!("<{}@memory.local>", uuid::Uuid::new_v4());
        self.state.delivered.lock().push(Delivered {
            message_id: message_id.clone(),
            message: message.clone(),
            sent_at: Utc::now(),
            accepted_at: tokio::time::Instant::now(),
        });
        Ok(DeliveryReceipt::new(message_id))
    }

    async fn verify(&self) -> Result<(), MailError> {
        self.state.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        match self.state.verify_failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
