//! Testing utilities and assertion helpers.
//!
//! Assertions over what a [`MemoryTransport`] accepted, plus a few over the
//! mailer's channel state. Failure messages list everything that was sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use outreach_mailer::providers::MemoryTransport;
//! use outreach_mailer::testing::*;
//!
//! #[tokio::test]
//! async fn test_campaign_flow() {
//!     let primary = MemoryTransport::new();
//!     let mailer = OutboundMailer::builder()
//!         .channel("primary", primary.clone())
//!         .default_from("sam@acme.io")
//!         .build()
//!         .unwrap();
//!
//!     // ... run the campaign ...
//!
//!     assert_email_sent(&primary);
//!     assert_email_to(&primary, "ana@prospect.com");
//!     assert_email_subject_matches(&primary, r"^Quick question");
//!     assert_channel_healthy(&mailer, "primary");
//! }
//! ```

use regex::Regex;

use crate::mailer::OutboundMailer;
use crate::providers::{Delivered, MemoryTransport};

// ============================================================================
// Helper Functions
// ============================================================================

/// Format a list of deliveries for error messages.
fn format_summary(deliveries: &[Delivered]) -> String {
    if deliveries.is_empty() {
        return "  (no emails sent)".to_string();
    }

    deliveries
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let m = &d.message;
            let to = m
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let from = m
                .from
                .as_ref()
                .map(|a| a.email.as_str())
                .unwrap_or("<none>");
            format!(
                "  {}. To: [{}], From: {}, Subject: \"{}\"",
                i + 1,
                to,
                from,
                m.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_or_panic(transport: &MemoryTransport) -> Delivered {
    transport
        .last_delivery()
        .expect("Expected at least one email to be sent, but none were sent")
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(500) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// ============================================================================
// Basic Assertions
// ============================================================================

/// Assert that at least one email was sent.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn assert_email_sent(transport: &MemoryTransport) {
    assert!(
        transport.delivery_count() > 0,
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent.
///
/// # Panics
///
/// Panics if any email was sent.
pub fn assert_no_emails_sent(transport: &MemoryTransport) {
    let deliveries = transport.deliveries();
    assert!(
        deliveries.is_empty(),
        "Expected no emails to be sent, but {} were sent.\n\nEmails sent:\n{}",
        deliveries.len(),
        format_summary(&deliveries)
    );
}

/// Assert that exactly N emails were sent.
pub fn assert_email_count(transport: &MemoryTransport, expected: usize) {
    let deliveries = transport.deliveries();
    assert!(
        deliveries.len() == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        deliveries.len(),
        format_summary(&deliveries)
    );
}

/// Assert that an email was sent to a specific address (to, cc or bcc).
pub fn assert_email_to(transport: &MemoryTransport, email: &str) {
    assert!(
        transport.sent_to(email),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        email,
        format_summary(&transport.deliveries())
    );
}

/// Assert that no email was sent to a specific address.
pub fn assert_no_emails_to(transport: &MemoryTransport, email: &str) {
    let deliveries = transport.deliveries();
    let found = deliveries.iter().find(|d| {
        d.message
            .all_recipients()
            .any(|a| a.email.eq_ignore_ascii_case(email))
    });

    if let Some(found) = found {
        panic!(
            "Expected no email to be sent to '{}', but found one.\n\nMatching email:\n  Subject: \"{}\"\n\nAll emails:\n{}",
            email,
            found.message.subject,
            format_summary(&deliveries)
        );
    }
}

/// Assert that an email with the exact subject was sent.
pub fn assert_email_subject(transport: &MemoryTransport, subject: &str) {
    let deliveries = transport.deliveries();
    assert!(
        deliveries.iter().any(|d| d.message.subject == subject),
        "Expected an email with subject '{}'.\n\nEmails sent:\n{}",
        subject,
        format_summary(&deliveries)
    );
}

/// Assert the most recent email was sent from a specific address.
pub fn assert_email_from(transport: &MemoryTransport, from_email: &str) {
    let last = last_or_panic(transport);
    let actual = last
        .message
        .from
        .as_ref()
        .map(|a| a.email.as_str())
        .unwrap_or("<none>");

    assert!(
        actual.eq_ignore_ascii_case(from_email),
        "Expected last email from '{}', but was from '{}'.",
        from_email,
        actual
    );
}

/// Assert the most recent email's text body contains `text`.
pub fn assert_email_text_contains(transport: &MemoryTransport, text: &str) {
    let last = last_or_panic(transport);
    let body = last.message.text_body.as_deref().unwrap_or("");

    assert!(
        body.contains(text),
        "Expected text body to contain '{}', but it didn't.\n\nLast email:\n{}\n\nText body (first 500 chars):\n{}",
        text,
        format_summary(std::slice::from_ref(&last)),
        excerpt(body)
    );
}

/// Assert the most recent email replies to `message_id`.
pub fn assert_email_in_reply_to(transport: &MemoryTransport, message_id: &str) {
    let last = last_or_panic(transport);
    assert!(
        last.message.in_reply_to.as_deref() == Some(message_id),
        "Expected last email to reply to '{}', but In-Reply-To was {:?}.",
        message_id,
        last.message.in_reply_to
    );
}

// ============================================================================
// Regex Matching
// ============================================================================

/// Assert the most recent email subject matches a regex pattern.
///
/// # Panics
///
/// Panics on an invalid pattern, when nothing was sent, or on a mismatch.
pub fn assert_email_subject_matches(transport: &MemoryTransport, pattern: &str) {
    let last = last_or_panic(transport);
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(&last.message.subject),
        "Expected subject to match pattern '{}', but was '{}'.",
        pattern,
        last.message.subject
    );
}

/// Assert the most recent email HTML body matches a regex pattern.
pub fn assert_email_html_matches(transport: &MemoryTransport, pattern: &str) {
    let last = last_or_panic(transport);
    let html = last.message.html_body.as_deref().unwrap_or("");
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(html),
        "Expected HTML body to match pattern '{}', but it didn't.\n\nHTML body (first 500 chars):\n{}",
        pattern,
        excerpt(html)
    );
}

// ============================================================================
// Channel State
// ============================================================================

/// Assert a channel is currently in rotation.
pub fn assert_channel_healthy(mailer: &OutboundMailer, name: &str) {
    let channel = mailer
        .channel(name)
        .unwrap_or_else(|| panic!("No channel named '{name}'"));
    assert!(
        channel.is_healthy(),
        "Expected channel '{}' to be healthy, last error: {:?}",
        name,
        channel.last_error()
    );
}

/// Assert a channel has been taken out of rotation.
pub fn assert_channel_unhealthy(mailer: &OutboundMailer, name: &str) {
    let channel = mailer
        .channel(name)
        .unwrap_or_else(|| panic!("No channel named '{name}'"));
    assert!(
        !channel.is_healthy(),
        "Expected channel '{}' to be unhealthy, but it is in rotation",
        name
    );
}

/// Assert a channel's lifetime sent counter.
pub fn assert_channel_sent_count(mailer: &OutboundMailer, name: &str, expected: u64) {
    let channel = mailer
        .channel(name)
        .unwrap_or_else(|| panic!("No channel named '{name}'"));
    assert_eq!(
        channel.sent_count(),
        expected,
        "Unexpected sent_count for channel '{}'",
        name
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OutboundMessage;
    use crate::transport::Transport;

    #[tokio::test]
    async fn test_assertions() {
        let transport = MemoryTransport::new();

        transport
            .send(
                &OutboundMessage::new()
                    .from("sam@acme.io")
                    .to("ana@prospect.com")
                    .subject("Welcome aboard!")
                    .html_body("<h1>Hello</h1>")
                    .text_body("Hello")
                    .in_reply_to("<first@acme.io>"),
            )
            .await
            .unwrap();

        assert_email_sent(&transport);
        assert_email_count(&transport, 1);
        assert_email_to(&transport, "ana@prospect.com");
        assert_email_from(&transport, "sam@acme.io");
        assert_email_subject(&transport, "Welcome aboard!");
        assert_email_text_contains(&transport, "Hello");
        assert_email_subject_matches(&transport, r"^Welcome.*!$");
        assert_email_html_matches(&transport, r"<h1>.*</h1>");
        assert_email_in_reply_to(&transport, "<first@acme.io>");
        assert_no_emails_to(&transport, "other@prospect.com");
    }

    #[test]
    #[should_panic(expected = "Expected at least one email")]
    fn test_assert_sent_fails_when_empty() {
        assert_email_sent(&MemoryTransport::new());
    }

    #[tokio::test]
    async fn test_channel_assertions() {
        let transport = MemoryTransport::new();
        let mailer = OutboundMailer::builder()
            .channel("primary", transport)
            .default_from("sam@acme.io")
            .build()
            .unwrap();

        mailer
            .send_email(
                &OutboundMessage::new()
                    .to("ana@prospect.com")
                    .subject("Hi")
                    .text_body("Hi"),
            )
            .await
            .unwrap();

        assert_channel_healthy(&mailer, "primary");
        assert_channel_sent_count(&mailer, "primary", 1);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let long = "é".repeat(600);
        assert_eq!(excerpt(&long).chars().count(), 500);
        assert_eq!(excerpt("short"), "short");
    }
}
