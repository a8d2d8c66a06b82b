//! Batched bulk sending.
//!
//! Messages go out in waves of `batch_size`. Inside a wave every message is
//! sent concurrently; between waves the mailer pauses so providers are not
//! flooded.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::Instrument;

use crate::error::MailError;
use crate::mailer::{OutboundMailer, SendResult};
use crate::message::OutboundMessage;

/// How a bulk send is paced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOptions {
    /// Messages per wave. 0 is treated as 1.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between waves. Not applied after the last one.
    #[serde(default = "default_delay", with = "duration_millis")]
    pub delay_between_batches: Duration,
    /// Keep going after a failed message. When false, the first wave with a
    /// failure ends the run and that failure is returned.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn delay_between_batches(mut self, delay: Duration) -> Self {
        self.delay_between_batches = delay;
        self
    }

    pub fn continue_on_error(mut self, keep_going: bool) -> Self {
        self.continue_on_error = keep_going;
        self
    }

    fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_between_batches: default_delay(),
            continue_on_error: default_continue_on_error(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_continue_on_error() -> bool {
    true
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// One message's outcome in a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkEntry {
    /// Position in the input slice.
    pub index: usize,
    /// Primary `to` address.
    pub recipient: String,
    pub result: SendResult,
}

/// Everything a bulk run produced, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSendReport {
    pub sent: Vec<BulkEntry>,
    pub failed: Vec<BulkEntry>,
}

impl BulkSendReport {
    pub fn total(&self) -> usize {
        self.sent.len() + self.failed.len()
    }

    pub fn all_sent(&self) -> bool {
        self.failed.is_empty()
    }

    /// Every entry ordered by input index.
    pub fn entries(&self) -> Vec<&BulkEntry> {
        let mut all: Vec<_> = self.sent.iter().chain(self.failed.iter()).collect();
        all.sort_by_key(|e| e.index);
        all
    }
}

impl OutboundMailer {
    /// Send many messages in paced concurrent waves.
    ///
    /// Each message goes through [`send_email`](Self::send_email), failover
    /// included. Per-message failures land in the report's `failed` list
    /// unless `continue_on_error` is false, in which case the lowest-index
    /// failure of the first failing wave is returned and later waves are
    /// never started.
    pub async fn send_bulk_emails(
        &self,
        messages: &[OutboundMessage],
        options: &BulkOptions,
    ) -> Result<BulkSendReport, MailError> {
        let batch_size = options.effective_batch_size();
        let batches = messages.len().div_ceil(batch_size);
        let span = tracing::info_span!(
            "outreach_mailer.send_bulk",
            count = messages.len(),
            batch_size,
            batches,
        );

        async move {
            let mut report = BulkSendReport::default();

            for (batch_no, chunk) in messages.chunks(batch_size).enumerate() {
                if batch_no > 0 && !options.delay_between_batches.is_zero() {
                    tokio::time::sleep(options.delay_between_batches).await;
                }

                let offset = batch_no * batch_size;
                tracing::debug!(batch = batch_no + 1, size = chunk.len(), "Dispatching batch");

                let outcomes = join_all(chunk.iter().map(|m| self.send_email(m))).await;

                #[cfg(feature = "metrics")]
                metrics::counter!("outreach_mailer_bulk_batches_total").increment(1);

                let mut first_failure = None;
                for (i, (message, outcome)) in chunk.iter().zip(outcomes).enumerate() {
                    let recipient = message
                        .primary_recipient()
                        .map(|a| a.email.clone())
                        .unwrap_or_default();
                    let index = offset + i;
                    match outcome {
                        Ok(result) => report.sent.push(BulkEntry {
                            index,
                            recipient,
                            result,
                        }),
                        Err(err) => {
                            tracing::warn!(index, recipient = %recipient, error = %err, "Bulk message failed");
                            report.failed.push(BulkEntry {
                                index,
                                recipient,
                                result: SendResult::failed(&err),
                            });
                            if first_failure.is_none() {
                                first_failure = Some(err);
                            }
                        }
                    }
                }

                if !options.continue_on_error {
                    if let Some(err) = first_failure {
                        tracing::error!(
                            batch = batch_no + 1,
                            error = %err,
                            "Bulk send aborted"
                        );
                        return Err(err);
                    }
                }
            }

            tracing::info!(
                sent = report.sent.len(),
                failed = report.failed.len(),
                "Bulk send finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
