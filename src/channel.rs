//! Delivery channels: one configured provider plus its health bookkeeping.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::transport::Transport;

/// Where a channel connects to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    /// Implicit TLS from the first byte (usually port 465).
    pub secure: bool,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Default)]
struct Health {
    healthy: bool,
    last_error: Option<String>,
    last_checked_at: Option<DateTime<Utc>>,
    last_sent_at: Option<DateTime<Utc>>,
}

/// A configured provider in the mailer's ordered failover list.
///
/// Health fields are shared by every concurrent send. Two sends can both see
/// a channel as healthy before either records a failure; the channel then
/// gets one extra attempt.
pub struct Channel {
    name: String,
    params: Option<ConnectionParams>,
    transport: Arc<dyn Transport>,
    health: RwLock<Health>,
    sent_count: AtomicU64,
}

impl Channel {
    /// Create a channel. It starts healthy until a handshake says otherwise.
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            params: None,
            transport,
            health: RwLock::new(Health {
                healthy: true,
                ..Health::default()
            }),
            sent_count: AtomicU64::new(0),
        }
    }

    /// Attach the connection parameters the transport was built from.
    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    pub fn is_healthy(&self) -> bool {
        self.health.read().healthy
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.health.read().last_error.clone()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Take the channel out of rotation.
    pub(crate) fn mark_unhealthy(&self, error: impl Into<String>) {
        let mut health = self.health.write();
        health.healthy = false;
        health.last_error = Some(error.into());
    }

    /// Record the outcome of a handshake.
    pub(crate) fn record_check(&self, error: Option<String>) {
        let mut health = self.health.write();
        health.healthy = error.is_none();
        health.last_error = error;
        health.last_checked_at = Some(Utc::now());
    }

    pub(crate) fn record_sent(&self) {
        self.sent_count.fetch_add(1, Ordering::Relaxed);
        self.health.write().last_sent_at = Some(Utc::now());
    }

    /// Point-in-time copy of this channel's state.
    pub fn status(&self) -> ChannelStatus {
        let health = self.health.read();
        ChannelStatus {
            name: self.name.clone(),
            kind: self.transport.kind(),
            healthy: health.healthy,
            sent_count: self.sent_count(),
            last_error: health.last_error.clone(),
            last_checked_at: health.last_checked_at,
            last_sent_at: health.last_sent_at,
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("kind", &self.transport.kind())
            .field("params", &self.params)
            .field("healthy", &self.is_healthy())
            .field("sent_count", &self.sent_count())
            .finish()
    }
}

/// Snapshot returned by [`stats`](crate::OutboundMailer::stats) and
/// [`health_check`](crate::OutboundMailer::health_check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub kind: &'static str,
    pub healthy: bool,
    pub sent_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sent_at: Option<DateTime<Utc>>,
}
