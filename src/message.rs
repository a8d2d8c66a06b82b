//! Outbound message with builder pattern and pre-send validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::{Address, ToAddress};
use crate::attachment::Attachment;
use crate::error::MailError;

/// A unit of outbound work.
///
/// ```
/// use outreach_mailer::OutboundMessage;
///
/// let message = OutboundMessage::new()
///     .from(("Sam from Acme", "sam@acme.io"))
///     .to(("Ana Lima", "ana@prospect.com"))
///     .subject("Quick question about your onboarding")
///     .text_body("Hi Ana, ...")
///     .header("List-Unsubscribe", "<mailto:unsubscribe@acme.io>");
///
/// assert!(message.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Sender. The mailer fills in its default sender when this is `None`.
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Option<Address>,
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Message-ID this message answers (`In-Reply-To`).
    pub in_reply_to: Option<String>,
    /// Thread ancestry (`References`), oldest first.
    pub references: Vec<String>,
    /// Extra headers, e.g. `List-Unsubscribe`.
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender.
    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from = Some(addr.to_address());
        self
    }

    /// Add a recipient. Can be called multiple times.
    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to.push(addr.to_address());
        self
    }

    /// Replace all recipients.
    pub fn put_to(mut self, addrs: Vec<Address>) -> Self {
        self.to = addrs;
        self
    }

    pub fn cc(mut self, addr: impl ToAddress) -> Self {
        self.cc.push(addr.to_address());
        self
    }

    pub fn bcc(mut self, addr: impl ToAddress) -> Self {
        self.bcc.push(addr.to_address());
        self
    }

    pub fn reply_to(mut self, addr: impl ToAddress) -> Self {
        self.reply_to = Some(addr.to_address());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Mark this message as a reply to `message_id`.
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Append a message id to the `References` chain.
    pub fn reference(mut self, message_id: impl Into<String>) -> Self {
        self.references.push(message_id.into());
        self
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// First `to` address, used to label bulk report entries.
    pub fn primary_recipient(&self) -> Option<&Address> {
        self.to.first()
    }

    /// All envelope recipients (to + cc + bcc).
    pub fn all_recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    pub fn has_body(&self) -> bool {
        non_blank(&self.text_body) || non_blank(&self.html_body)
    }

    /// Check the message is deliverable.
    ///
    /// Runs before any channel is contacted. The sender is required here:
    /// by the time the mailer validates, its default sender has been applied.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.to.is_empty() {
            return Err(MailError::missing("to"));
        }
        check_addresses("to", &self.to)?;
        check_addresses("cc", &self.cc)?;
        check_addresses("bcc", &self.bcc)?;

        if self.subject.trim().is_empty() {
            return Err(MailError::missing("subject"));
        }
        if !self.has_body() {
            return Err(MailError::invalid(
                "body",
                "either a text or an HTML body is required",
            ));
        }

        match &self.from {
            None => return Err(MailError::missing("from")),
            Some(from) if !from.is_valid() => {
                return Err(MailError::invalid(
                    "from",
                    format!("'{}' is not a valid email address", from.email),
                ))
            }
            Some(_) => {}
        }
        if let Some(reply_to) = &self.reply_to {
            if !reply_to.is_valid() {
                return Err(MailError::invalid(
                    "reply_to",
                    format!("'{}' is not a valid email address", reply_to.email),
                ));
            }
        }

        for attachment in &self.attachments {
            attachment.check()?;
        }
        Ok(())
    }
}

fn non_blank(body: &Option<String>) -> bool {
    body.as_deref().is_some_and(|b| !b.trim().is_empty())
}

fn check_addresses(field: &'static str, addrs: &[Address]) -> Result<(), MailError> {
    match addrs.iter().find(|a| !a.is_valid()) {
        Some(bad) => Err(MailError::invalid(
            field,
            format!("'{}' is not a valid email address", bad.email),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> OutboundMessage {
        OutboundMessage::new()
            .from("sam@acme.io")
            .to("ana@prospect.com")
            .subject("Hello")
            .text_body("Hi Ana")
    }

    fn field_of(err: MailError) -> &'static str {
        match err {
            MailError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_builder() {
        let m = valid().cc("cc@prospect.com").bcc("log@acme.io");
        assert_eq!(m.to[0].email, "ana@prospect.com");
        assert_eq!(m.all_recipients().count(), 3);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_missing_recipient() {
        let m = valid().put_to(vec![]);
        assert_eq!(field_of(m.validate().unwrap_err()), "to");
    }

    #[test]
    fn test_malformed_recipient() {
        let m = valid().to("not-an-address");
        assert_eq!(field_of(m.validate().unwrap_err()), "to");
    }

    #[test]
    fn test_blank_subject() {
        let m = valid().subject("   ");
        assert_eq!(field_of(m.validate().unwrap_err()), "subject");
    }

    #[test]
    fn test_body_required() {
        let mut m = valid();
        m.text_body = None;
        assert_eq!(field_of(m.validate().unwrap_err()), "body");

        let m = m.text_body(" \n");
        assert_eq!(field_of(m.validate().unwrap_err()), "body");

        let m = m.html_body("<p>Hi</p>");
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_sender_checks() {
        let mut m = valid();
        m.from = None;
        assert_eq!(field_of(m.validate().unwrap_err()), "from");

        let m = m.from("sam@");
        assert_eq!(field_of(m.validate().unwrap_err()), "from");
    }

    #[test]
    fn test_reply_to_checked() {
        let m = valid().reply_to("nope");
        assert_eq!(field_of(m.validate().unwrap_err()), "reply_to");
    }

    #[test]
    fn test_threading_headers() {
        let m = valid().in_reply_to("<abc@acme.io>").reference("<abc@acme.io>");
        assert_eq!(m.in_reply_to.as_deref(), Some("<abc@acme.io>"));
        assert_eq!(m.references, vec!["<abc@acme.io>".to_string()]);
    }
}
