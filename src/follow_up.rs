//! Follow-up messages threaded onto an earlier send.

use serde::{Deserialize, Serialize};

use crate::message::OutboundMessage;

/// What changes in a follow-up. Everything else is taken from the original.
///
/// ```
/// use outreach_mailer::{FollowUp, OutboundMessage};
///
/// let original = OutboundMessage::new()
///     .from("sam@acme.io")
///     .to("ana@prospect.com")
///     .subject("Quick question")
///     .text_body("Hi Ana, ...");
///
/// let reply = FollowUp::new()
///     .original_message_id("<first@acme.io>")
///     .text_body("Bumping this up in case it got buried.")
///     .compose(&original);
///
/// assert_eq!(reply.subject, "Re: Quick question");
/// assert_eq!(reply.in_reply_to.as_deref(), Some("<first@acme.io>"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    /// Message-ID of the message being followed up.
    pub original_message_id: Option<String>,
    /// Replaces the derived `Re: ...` subject.
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

impl FollowUp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.original_message_id = Some(message_id.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
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

    /// Build the follow-up message for `original`.
    ///
    /// Goes to the original `to` and `cc` recipients from the original
    /// sender. `bcc`, attachments and custom headers are not carried over.
    pub fn compose(&self, original: &OutboundMessage) -> OutboundMessage {
        let subject = match self.subject.as_deref() {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => reply_subject(&original.subject),
        };

        let mut references = original.references.clone();
        if let Some(id) = &self.original_message_id {
            if !references.contains(id) {
                references.push(id.clone());
            }
        }

        OutboundMessage {
            from: original.from.clone(),
            to: original.to.clone(),
            cc: original.cc.clone(),
            reply_to: original.reply_to.clone(),
            subject,
            text_body: self.text_body.clone(),
            html_body: self.html_body.clone(),
            in_reply_to: self.original_message_id.clone(),
            references,
            ..OutboundMessage::default()
        }
    }
}

/// `Re: <subject>`, without stacking prefixes on an existing reply.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let already_reply = trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if already_reply {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original() -> OutboundMessage {
        OutboundMessage::new()
            .from(("Sam", "sam@acme.io"))
            .to("ana@prospect.com")
            .cc("ben@prospect.com")
            .bcc("crm@acme.io")
            .subject("Quick question")
            .text_body("Hi Ana")
            .header("X-Campaign", "q3")
            .reference("<root@acme.io>")
    }

    #[test]
    fn reply_subject_is_not_doubled() {
        assert_eq!(reply_subject("Hello"), "Re: Hello");
        assert_eq!(reply_subject("Re: Hello"), "Re: Hello");
        assert_eq!(reply_subject("RE: Hello"), "RE: Hello");
        assert_eq!(reply_subject("Regarding pricing"), "Re: Regarding pricing");
    }

    #[test]
    fn compose_threads_onto_original() {
        let reply = FollowUp::new()
            .original_message_id("<first@acme.io>")
            .text_body("Following up")
            .compose(&original());

        assert_eq!(reply.from.as_ref().unwrap().email, "sam@acme.io");
        assert_eq!(reply.to[0].email, "ana@prospect.com");
        assert_eq!(reply.cc[0].email, "ben@prospect.com");
        assert!(reply.bcc.is_empty());
        assert!(reply.headers.is_empty());
        assert_eq!(reply.subject, "Re: Quick question");
        assert_eq!(reply.in_reply_to.as_deref(), Some("<first@acme.io>"));
        assert_eq!(reply.references, vec!["<root@acme.io>", "<first@acme.io>"]);
        assert_eq!(reply.text_body.as_deref(), Some("Following up"));
    }

    #[test]
    fn subject_override_wins() {
        let reply = FollowUp::new()
            .subject("One more thing")
            .html_body("<p>Hi</p>")
            .compose(&original());
        assert_eq!(reply.subject, "One more thing");
        assert_eq!(reply.in_reply_to, None);
        assert_eq!(reply.references, vec!["<root@acme.io>"]);
    }

    #[test]
    fn blank_override_falls_back() {
        let reply = FollowUp::new().subject("  ").compose(&original());
        assert_eq!(reply.subject, "Re: Quick question");
    }
}
