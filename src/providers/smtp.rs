//! SMTP transport using lettre.
//!
//! Each transport owns a lettre connection pool bounded by
//! [`PoolSettings`]: at most `max_connections` concurrent connections, a
//! fresh pool after every `max_messages` messages, and sends spaced to stay
//! under `rate_limit` messages per second.
//!
//! # Example
//!
//! ```rust,ignore
//! use outreach_mailer::providers::{SmtpTransport, TlsMode};
//!
//! let transport = SmtpTransport::new("primary", "smtp.example.com", 587)
//!     .credentials("username", "password")
//!     .tls(TlsMode::StartTls)
//!     .build()?;
//! ```

use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::address::Address;
use crate::attachment::AttachmentType;
use crate::channel::ConnectionParams;
use crate::config::{PoolSettings, ProviderConfig};
use crate::error::MailError;
use crate::message::OutboundMessage;
use crate::transport::{DeliveryReceipt, Transport};

/// TLS mode for SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// No TLS (only for local relays and test servers)
    None,
    /// STARTTLS - upgrade to TLS after connecting (port 587)
    #[default]
    StartTls,
    /// Implicit TLS - connect with TLS from start (port 465)
    Tls,
}

#[derive(Clone)]
struct Settings {
    name: String,
    host: String,
    port: u16,
    tls: TlsMode,
    username: Option<String>,
    password: Option<String>,
    pool: PoolSettings,
    timeout: Duration,
}

struct Pool {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sent: u32,
}

/// SMTP delivery through a pooled, rate-capped lettre transport.
pub struct SmtpTransport {
    settings: Settings,
    pool: Mutex<Pool>,
    throttle: Throttle,
}

impl SmtpTransport {
    /// Start building an SMTP transport (STARTTLS by default).
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            settings: Settings {
                name: name.into(),
                host: host.into(),
                port,
                tls: TlsMode::StartTls,
                username: None,
                password: None,
                pool: PoolSettings::default(),
                timeout: Duration::from_secs(30),
            },
        }
    }

    /// Build from a provider descriptor.
    pub fn from_provider(
        provider: &ProviderConfig,
        pool: &PoolSettings,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let mut builder = Self::new(&provider.name, &provider.host, provider.port)
            .tls(provider.tls_mode())
            .pool(pool.clone())
            .timeout(timeout);
        if let (Some(user), Some(pass)) = (&provider.username, &provider.password) {
            builder = builder.credentials(user, pass);
        }
        builder.build()
    }

    /// The parameters this transport connects with.
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.settings.host.clone(),
            port: self.settings.port,
            secure: self.settings.tls == TlsMode::Tls,
            username: self.settings.username.clone(),
            password: self.settings.password.clone(),
        }
    }

    /// Hand out the current pool, replacing it once it has carried
    /// `max_messages` messages.
    fn checkout(&self, counts_as_send: bool) -> Result<Arc<AsyncSmtpTransport<Tokio1Executor>>, MailError> {
        let mut pool = self.pool.lock();
        let limit = self.settings.pool.max_messages;
        if counts_as_send && limit > 0 && pool.sent >= limit {
            tracing::debug!(channel = %self.settings.name, sent = pool.sent, "Recycling SMTP pool");
            pool.transport = Arc::new(build_pool(&self.settings)?);
            pool.sent = 0;
        }
        if counts_as_send {
            pool.sent += 1;
        }
        Ok(Arc::clone(&pool.transport))
    }

    fn map_error(&self, err: &lettre::transport::smtp::Error) -> MailError {
        classify_smtp_error(&self.settings.name, self.settings.timeout, err)
    }
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("name", &self.settings.name)
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("tls", &self.settings.tls)
            .field("transport", &"<AsyncSmtpTransport>")
            .finish()
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, MailError> {
        let message_id = generate_message_id(message.from.as_ref());
        let email = build_message(&self.settings.name, message, &message_id)?;
        let transport = self.checkout(true)?;

        let response = transport
            .send(email)
            .await
            .map_err(|e| self.map_error(&e))?;

        let reply = response
            .message()
            .collect::<Vec<_>>()
            .join(" ");

        Ok(DeliveryReceipt::with_response(message_id, reply))
    }

    async fn ready(&self) {
        self.throttle.acquire().await;
    }

    async fn verify(&self) -> Result<(), MailError> {
        let transport = self.checkout(false)?;
        match transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::transient(
                &self.settings.name,
                "server did not answer the connection check",
            )),
            Err(e) => Err(self.map_error(&e)),
        }
    }

    fn kind(&self) -> &'static str {
        "smtp"
    }
}

/// Builder for [`SmtpTransport`].
pub struct SmtpBuilder {
    settings: Settings,
}

impl SmtpBuilder {
    /// Set SMTP credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.settings.username = Some(username.to_string());
        self.settings.password = Some(password.to_string());
        self
    }

    /// Set TLS mode.
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.settings.tls = mode;
        self
    }

    /// Set pool bounds and rate cap.
    pub fn pool(mut self, pool: PoolSettings) -> Self {
        self.settings.pool = pool;
        self
    }

    /// Network timeout for connecting and for each SMTP command.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Build the transport. Connections are opened lazily.
    pub fn build(self) -> Result<SmtpTransport, MailError> {
        let transport = Arc::new(build_pool(&self.settings)?);
        let throttle = Throttle::per_second(self.settings.pool.rate_limit);
        Ok(SmtpTransport {
            settings: self.settings,
            pool: Mutex::new(Pool { transport, sent: 0 }),
            throttle,
        })
    }
}

fn build_pool(settings: &Settings) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    let builder = match settings.tls {
        TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
        TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| {
                MailError::Configuration(format!("SMTP STARTTLS setup for {}: {e}", settings.host))
            })?,
        TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host).map_err(|e| {
            MailError::Configuration(format!("SMTP TLS setup for {}: {e}", settings.host))
        })?,
    };

    let pool = PoolConfig::new()
        .max_size(settings.pool.max_connections.max(1))
        .idle_timeout(settings.pool.idle_timeout());

    let mut builder = builder
        .port(settings.port)
        .timeout(Some(settings.timeout))
        .pool_config(pool);

    if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }

    Ok(builder.build())
}

/// Map a lettre SMTP error onto the mailer's error taxonomy.
///
/// Reply codes decide: authentication (530/534/535/538), rejected envelope
/// (501/503/553/555) and rejected message (552/554) are persistent for the
/// channel. Anything else, including 4xx replies and dropped connections, is
/// transient.
fn classify_smtp_error(
    provider: &str,
    timeout: Duration,
    err: &lettre::transport::smtp::Error,
) -> MailError {
    if err.is_timeout() {
        return MailError::Timeout {
            provider: provider.to_string(),
            after: timeout,
        };
    }

    if let Some(code) = err.status() {
        return match code.to_string().as_str() {
            "530" | "534" | "535" | "538" => MailError::auth(provider, err.to_string()),
            "501" | "503" | "553" | "555" => {
                MailError::protocol(provider, format!("envelope rejected: {err}"))
            }
            "552" | "554" => MailError::protocol(provider, format!("message rejected: {err}")),
            _ => MailError::transient(provider, err.to_string()),
        };
    }

    if err.is_client() {
        // e.g. no authentication mechanism in common with the server
        return MailError::protocol(provider, err.to_string());
    }

    MailError::transient(provider, err.to_string())
}

fn generate_message_id(from: Option<&Address>) -> String {
    let domain = from.and_then(Address::domain).unwrap_or("localhost");
    format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
}

/// Build a lettre Message from an outbound message.
fn build_message(
    provider: &str,
    message: &OutboundMessage,
    message_id: &str,
) -> Result<Message, MailError> {
    let malformed = |e: String| MailError::protocol(provider, format!("malformed message: {e}"));

    let from = message.from.as_ref().ok_or_else(|| MailError::missing("from"))?;

    let mut builder = Message::builder()
        .from(address_to_mailbox(provider, from)?)
        .subject(&message.subject)
        .message_id(Some(message_id.to_string()));

    for to in &message.to {
        builder = builder.to(address_to_mailbox(provider, to)?);
    }
    for cc in &message.cc {
        builder = builder.cc(address_to_mailbox(provider, cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(address_to_mailbox(provider, bcc)?);
    }
    if let Some(reply_to) = &message.reply_to {
        builder = builder.reply_to(address_to_mailbox(provider, reply_to)?);
    }

    if let Some(in_reply_to) = &message.in_reply_to {
        builder = builder.in_reply_to(in_reply_to.clone());
    }
    if !message.references.is_empty() {
        builder = builder.references(message.references.join(" "));
    }

    for (name, value) in &message.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| malformed(format!("header {name:?}: {e}")))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }

    let text = message.text_body.clone().filter(|b| !b.trim().is_empty());
    let html = message.html_body.clone().filter(|b| !b.trim().is_empty());

    let built = if message.attachments.is_empty() {
        match (html, text) {
            (Some(html), Some(text)) => {
                builder.multipart(MultiPart::alternative_plain_html(text, html))
            }
            (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html),
            (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text),
            (None, None) => builder.header(ContentType::TEXT_PLAIN).body(String::new()),
        }
    } else {
        let body_part = match (html, text) {
            (Some(html), Some(text)) => MultiPart::alternative_plain_html(text, html),
            (Some(html), None) => MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html),
            ),
            (None, text) => MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text.unwrap_or_default()),
            ),
        };

        let mut multipart = MultiPart::mixed().multipart(body_part);
        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .or_else(|_| ContentType::parse("application/octet-stream"))
                .map_err(|e| malformed(e.to_string()))?;

            let part = match attachment.disposition {
                AttachmentType::Inline => {
                    let cid = attachment
                        .content_id
                        .clone()
                        .unwrap_or_else(|| attachment.filename.clone());
                    LettreAttachment::new_inline(cid).body(attachment.data.clone(), content_type)
                }
                AttachmentType::Attachment => LettreAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            };
            multipart = multipart.singlepart(part);
        }

        builder.multipart(multipart)
    };

    built.map_err(|e| malformed(e.to_string()))
}

/// Convert an address to a lettre Mailbox with an ASCII domain.
fn address_to_mailbox(provider: &str, addr: &Address) -> Result<Mailbox, MailError> {
    let ascii = addr.to_ascii()?;
    let email = ascii.parse().map_err(|e: lettre::address::AddressError| {
        MailError::protocol(provider, format!("malformed envelope address '{}': {e}", addr.email))
    })?;
    Ok(Mailbox::new(addr.name.clone(), email))
}

/// Spaces sends so a channel stays under its per-second cap.
struct Throttle {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    fn per_second(rate: u32) -> Self {
        Self {
            interval: (rate > 0).then(|| Duration::from_secs(1) / rate),
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot. A waiter dropped before its slot comes
    /// up hands the slot back.
    async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + interval);
            slot
        };
        let mut booking = Booking {
            throttle: self,
            interval,
            used: false,
        };
        tokio::time::sleep_until(slot).await;
        booking.used = true;
    }
}

struct Booking<'a> {
    throttle: &'a Throttle,
    interval: Duration,
    used: bool,
}

impl Drop for Booking<'_> {
    fn drop(&mut self) {
        if self.used {
            return;
        }
        let mut next = self.throttle.next_slot.lock();
        if let Some(n) = *next {
            *next = Some(n.checked_sub(self.interval).unwrap_or(n));
        }
    }
}
