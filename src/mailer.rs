//! The outbound mailer: ordered channels with health-aware failover.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::address::{Address, ToAddress};
use crate::channel::{Channel, ChannelStatus};
use crate::classify::{DefaultClassifier, ErrorClass, ErrorClassifier};
use crate::error::MailError;
use crate::follow_up::FollowUp;
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::message::OutboundMessage;
use crate::transport::{DeliveryReceipt, Transport};

#[cfg(feature = "smtp")]
use crate::config::MailerConfig;

/// Timeout for a single handshake or send when none is configured.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one message.
///
/// [`send_email`](OutboundMailer::send_email) only returns successful
/// results; failed ones appear in bulk reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    /// Channel that accepted the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub(crate) fn delivered(channel: &str, receipt: DeliveryReceipt) -> Self {
        Self {
            success: true,
            channel: Some(channel.to_string()),
            message_id: Some(receipt.message_id),
            error: None,
        }
    }

    pub(crate) fn failed(error: &MailError) -> Self {
        Self {
            success: false,
            channel: error.provider().map(str::to_string),
            message_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Delivers outreach email across an ordered list of channels.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every task that sends.
///
/// ```rust,ignore
/// use outreach_mailer::{MailerConfig, OutboundMailer, OutboundMessage};
///
/// let mailer = OutboundMailer::from_config(&MailerConfig::from_env()?).await?;
///
/// let result = mailer
///     .send_email(
///         &OutboundMessage::new()
///             .to("ana@prospect.com")
///             .subject("Quick question")
///             .text_body("Hi Ana, ..."),
///     )
///     .await?;
/// println!("sent via {:?}", result.channel);
/// ```
pub struct OutboundMailer {
    channels: Vec<Arc<Channel>>,
    classifier: Arc<dyn ErrorClassifier>,
    interceptors: InterceptorChain,
    send_timeout: Duration,
    default_from: Option<Address>,
}

impl OutboundMailer {
    pub fn builder() -> MailerBuilder {
        MailerBuilder::default()
    }

    /// Build one SMTP channel per provider and run the startup handshake.
    ///
    /// Providers with incomplete credentials are skipped. A provider whose
    /// handshake fails is kept but starts unhealthy.
    #[cfg(feature = "smtp")]
    pub async fn from_config(config: &MailerConfig) -> Result<Self, MailError> {
        use crate::providers::SmtpTransport;

        let mut builder = Self::builder().send_timeout(config.send_timeout());
        if let Some(from) = &config.default_from {
            builder = builder.default_from(from.clone());
        }

        for provider in &config.providers {
            if !provider.has_complete_credentials() {
                tracing::warn!(
                    provider = %provider.name,
                    "Skipping provider with incomplete credentials"
                );
                continue;
            }
            let transport =
                SmtpTransport::from_provider(provider, &config.pool, config.send_timeout())?;
            let params = transport.connection_params();
            builder = builder.add_channel(
                Channel::new(&provider.name, Arc::new(transport)).with_params(params),
            );
        }

        let mailer = builder.build()?;
        mailer.connect().await;
        Ok(mailer)
    }

    /// [`from_config`](Self::from_config) with [`MailerConfig::from_env`].
    #[cfg(feature = "smtp")]
    pub async fn from_env() -> Result<Self, MailError> {
        Self::from_config(&MailerConfig::from_env()?).await
    }

    /// Handshake every channel and record which ones answered.
    ///
    /// Never fails: an unreachable provider only starts out unhealthy.
    pub async fn connect(&self) {
        let statuses = self.check_all().await;
        let healthy = statuses.iter().filter(|s| s.healthy).count();
        if healthy == 0 {
            tracing::error!(channels = statuses.len(), "No email channel passed its handshake");
        } else {
            tracing::info!(healthy, channels = statuses.len(), "Mailer connected");
        }
    }

    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Arc<Channel>> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Deliver one message through the first healthy channel that accepts it.
    ///
    /// Validation runs before any channel is contacted. Channels are tried in
    /// configuration order; a persistent failure takes a channel out of
    /// rotation, a transient one just moves on to the next channel.
    pub async fn send_email(&self, message: &OutboundMessage) -> Result<SendResult, MailError> {
        let span = tracing::info_span!(
            "outreach_mailer.send",
            to = ?message.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
            subject = %message.subject,
        );

        async {
            let message = self.prepare(message.clone())?;
            self.deliver(&message).await
        }
        .instrument(span)
        .await
    }

    /// Send a reply threaded onto `original`.
    pub async fn send_follow_up(
        &self,
        original: &OutboundMessage,
        follow_up: FollowUp,
    ) -> Result<SendResult, MailError> {
        let message = follow_up.compose(original);
        self.send_email(&message).await
    }

    fn prepare(&self, message: OutboundMessage) -> Result<OutboundMessage, MailError> {
        let mut message = self.interceptors.apply(message)?;
        if message.from.is_none() {
            message.from = self.default_from.clone();
        }
        message.validate()?;
        Ok(message)
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<SendResult, MailError> {
        let healthy: Vec<&Arc<Channel>> =
            self.channels.iter().filter(|c| c.is_healthy()).collect();
        if healthy.is_empty() {
            tracing::error!("No healthy email channel available");
            return Err(MailError::NoHealthyProvider);
        }

        let mut attempted = 0;
        let mut last_error = None;

        for channel in healthy {
            attempted += 1;
            tracing::debug!(channel = channel.name(), attempt = attempted, "Attempting delivery");

            #[cfg(feature = "metrics")]
            let start = Instant::now();

            let result = self.attempt(channel, message).await;

            #[cfg(feature = "metrics")]
            {
                let status = if result.is_ok() { "success" } else { "error" };
                metrics::counter!(
                    "outreach_mailer_emails_total",
                    "channel" => channel.name().to_string(),
                    "status" => status
                )
                .increment(1);
                metrics::histogram!(
                    "outreach_mailer_delivery_duration_seconds",
                    "channel" => channel.name().to_string()
                )
                .record(start.elapsed().as_secs_f64());
            }

            match result {
                Ok(receipt) => {
                    channel.record_sent();
                    tracing::info!(
                        channel = channel.name(),
                        message_id = %receipt.message_id,
                        "Email delivered"
                    );
                    return Ok(SendResult::delivered(channel.name(), receipt));
                }
                Err(err) => {
                    self.classify_and_maybe_demote(channel, &err);
                    last_error = Some(err);
                }
            }
        }

        let last = match last_error {
            Some(err) => err,
            None => return Err(MailError::NoHealthyProvider),
        };
        tracing::error!(attempted, error = %last, "Email delivery failed on every channel");
        Err(MailError::AllProvidersExhausted {
            attempted,
            last: Box::new(last),
        })
    }

    async fn attempt(
        &self,
        channel: &Channel,
        message: &OutboundMessage,
    ) -> Result<DeliveryReceipt, MailError> {
        channel.transport().ready().await;
        match tokio::time::timeout(self.send_timeout, channel.transport().send(message)).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout {
                provider: channel.name().to_string(),
                after: self.send_timeout,
            }),
        }
    }

    /// Classify a delivery failure and demote `channel` if it is persistent.
    ///
    /// Transient failures leave the channel healthy.
    pub fn classify_and_maybe_demote(&self, channel: &Channel, error: &MailError) -> ErrorClass {
        let class = self.classifier.classify(error);
        match class {
            ErrorClass::Persistent => {
                channel.mark_unhealthy(error.to_string());
                tracing::warn!(
                    channel = channel.name(),
                    error = %error,
                    "Persistent failure, channel taken out of rotation"
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "outreach_mailer_channel_demotions_total",
                    "channel" => channel.name().to_string()
                )
                .increment(1);
            }
            ErrorClass::Transient => {
                tracing::warn!(
                    channel = channel.name(),
                    error = %error,
                    "Transient failure, trying next channel"
                );
            }
        }
        class
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Re-run the handshake on every channel, healthy or not.
    ///
    /// This is the only way a demoted channel comes back into rotation.
    pub async fn health_check(&self) -> Vec<ChannelStatus> {
        let span = tracing::info_span!("outreach_mailer.health_check", channels = self.channels.len());
        self.check_all().instrument(span).await
    }

    async fn check_all(&self) -> Vec<ChannelStatus> {
        join_all(self.channels.iter().map(|c| self.check_channel(c))).await;
        self.stats()
    }

    async fn check_channel(&self, channel: &Channel) {
        let was_healthy = channel.is_healthy();
        let outcome = match tokio::time::timeout(self.send_timeout, channel.transport().verify()).await
        {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout {
                provider: channel.name().to_string(),
                after: self.send_timeout,
            }),
        };

        match outcome {
            Ok(()) => {
                if !was_healthy {
                    tracing::info!(channel = channel.name(), "Channel back in rotation");
                }
                channel.record_check(None);
            }
            Err(err) => {
                tracing::warn!(channel = channel.name(), error = %err, "Channel handshake failed");
                channel.record_check(Some(err.to_string()));
            }
        }
    }

    /// Snapshot of every channel, in configuration order. Changes nothing.
    pub fn stats(&self) -> Vec<ChannelStatus> {
        self.channels.iter().map(|c| c.status()).collect()
    }
}

impl fmt::Debug for OutboundMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMailer")
            .field("channels", &self.channels)
            .field("interceptors", &self.interceptors.len())
            .field("send_timeout", &self.send_timeout)
            .field("default_from", &self.default_from)
            .finish()
    }
}

/// Builder for [`OutboundMailer`].
///
/// Channels are tried in the order they are added.
#[derive(Default)]
pub struct MailerBuilder {
    channels: Vec<Channel>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
    interceptors: InterceptorChain,
    send_timeout: Option<Duration>,
    default_from: Option<Address>,
}

impl MailerBuilder {
    /// Add a channel backed by `transport`.
    pub fn channel<T>(self, name: impl Into<String>, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.channel_arc(name, Arc::new(transport))
    }

    /// Add a channel backed by a shared transport.
    pub fn channel_arc(self, name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.add_channel(Channel::new(name, transport))
    }

    /// Add a fully constructed channel.
    pub fn add_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Replace the [`DefaultClassifier`].
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Append an interceptor. Interceptors run in the order added.
    pub fn interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Sender used when a message does not set one.
    pub fn default_from(mut self, from: impl ToAddress) -> Self {
        self.default_from = Some(from.to_address());
        self
    }

    /// Fails with [`MailError::NotConfigured`] when no channel was added.
    pub fn build(self) -> Result<OutboundMailer, MailError> {
        if self.channels.is_empty() {
            return Err(MailError::NotConfigured);
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name()) {
                return Err(MailError::Configuration(format!(
                    "duplicate channel name '{}'",
                    channel.name()
                )));
            }
        }

        Ok(OutboundMailer {
            channels: self.channels.into_iter().map(Arc::new).collect(),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(DefaultClassifier)),
            interceptors: self.interceptors,
            send_timeout: self.send_timeout.unwrap_or(DEFAULT_SEND_TIMEOUT),
            default_from: self.default_from,
        })
    }
}
