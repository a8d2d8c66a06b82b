//! Failover and health tests.
//!
//! Every mailer here is built from `MemoryTransport` channels so failures can
//! be scripted per channel.

use outreach_mailer::providers::MemoryTransport;
use outreach_mailer::testing::*;
use outreach_mailer::{ErrorClass, MailError, OutboundMailer, OutboundMessage};

fn message() -> OutboundMessage {
    OutboundMessage::new()
        .to("ana@prospect.com")
        .subject("Quick question")
        .text_body("Hi Ana")
}

fn two_channels() -> (OutboundMailer, MemoryTransport, MemoryTransport) {
    let primary = MemoryTransport::new();
    let backup = MemoryTransport::new();
    let mailer = OutboundMailer::builder()
        .channel("primary", primary.clone())
        .channel("backup", backup.clone())
        .default_from(("Sam", "sam@acme.io"))
        .build()
        .unwrap();
    (mailer, primary, backup)
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn invalid_message_never_reaches_a_channel() {
    let (mailer, primary, backup) = two_channels();

    let cases = [
        message().put_to(vec![]),
        message().to("not-an-address"),
        message().subject(" "),
        OutboundMessage::new().to("ana@prospect.com").subject("No body"),
    ];

    for case in cases {
        let err = mailer.send_email(&case).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err:?}");
    }

    assert_eq!(primary.send_calls(), 0);
    assert_eq!(backup.send_calls(), 0);
}

#[tokio::test]
async fn interceptor_can_block_before_any_channel() {
    let transport = MemoryTransport::new();
    let mailer = OutboundMailer::builder()
        .channel("primary", transport.clone())
        .default_from("sam@acme.io")
        .interceptor(outreach_mailer::BlockDomains::new(["prospect.com"]))
        .build()
        .unwrap();

    let err = mailer.send_email(&message()).await.unwrap_err();
    assert!(matches!(err, MailError::Blocked(_)));
    assert_eq!(transport.send_calls(), 0);
}

#[tokio::test]
async fn interceptor_rewrites_are_delivered() {
    let transport = MemoryTransport::new();
    let mailer = OutboundMailer::builder()
        .channel("primary", transport.clone())
        .default_from("sam@acme.io")
        .interceptor(
            |m: OutboundMessage| -> Result<OutboundMessage, MailError> {
                Ok(m.header("X-Campaign", "q3-launch"))
            },
        )
        .interceptor(outreach_mailer::RedirectRecipients::new("qa@acme.io"))
        .build()
        .unwrap();

    mailer.send_email(&message()).await.unwrap();

    assert_email_to(&transport, "qa@acme.io");
    assert_no_emails_to(&transport, "ana@prospect.com");
    let sent = transport.last_delivery().unwrap().message;
    assert_eq!(sent.headers.get("X-Campaign").map(String::as_str), Some("q3-launch"));
}

// ============================================================================
// Failover
// ============================================================================

#[tokio::test]
async fn persistent_failure_demotes_and_fails_over() {
    let primary = MemoryTransport::new();
    let backup = MemoryTransport::new();
    let spare = MemoryTransport::new();
    let mailer = OutboundMailer::builder()
        .channel("primary", primary.clone())
        .channel("backup", backup.clone())
        .channel("spare", spare.clone())
        .default_from(("Sam", "sam@acme.io"))
        .build()
        .unwrap();
    primary.fail_next(MailError::auth("primary", "535 5.7.8 authentication failed"));

    let result = mailer.send_email(&message()).await.unwrap();

    assert!(result.success);
    assert_eq!(result.channel.as_deref(), Some("backup"));
    assert_channel_unhealthy(&mailer, "primary");
    assert_channel_sent_count(&mailer, "primary", 0);
    assert_channel_sent_count(&mailer, "backup", 1);
    assert_email_count(&backup, 1);

    // Delivery stops at the first success.
    assert_eq!(spare.send_calls(), 0);
    assert_channel_sent_count(&mailer, "spare", 0);
    assert_channel_healthy(&mailer, "spare");

    let status = &mailer.stats()[0];
    assert!(status.last_error.as_deref().unwrap().contains("535"));

    // The demoted channel is skipped from now on.
    mailer.send_email(&message()).await.unwrap();
    assert_eq!(primary.send_calls(), 1);
    assert_email_count(&backup, 2);
    assert_eq!(spare.send_calls(), 0);
}

#[tokio::test]
async fn transient_failure_keeps_channel_healthy() {
    let (mailer, primary, backup) = two_channels();
    primary.fail_next(MailError::transient("primary", "421 4.7.0 try again later"));

    let result = mailer.send_email(&message()).await.unwrap();
    assert_eq!(result.channel.as_deref(), Some("backup"));
    assert_channel_healthy(&mailer, "primary");

    // Next message goes back to the first channel.
    let result = mailer.send_email(&message()).await.unwrap();
    assert_eq!(result.channel.as_deref(), Some("primary"));
    assert_email_count(&primary, 1);
    assert_email_count(&backup, 1);
}

#[tokio::test]
async fn every_channel_failing_is_exhaustion() {
    let (mailer, primary, backup) = two_channels();
    primary.fail_next(MailError::transient("primary", "421 busy"));
    backup.fail_next(MailError::protocol("backup", "554 5.7.1 message rejected"));

    let err = mailer.send_email(&message()).await.unwrap_err();
    match err {
        MailError::AllProvidersExhausted { attempted, last } => {
            assert_eq!(attempted, 2);
            assert_eq!(last.provider(), Some("backup"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_channel_healthy(&mailer, "primary");
    assert_channel_unhealthy(&mailer, "backup");
}

#[tokio::test]
async fn no_healthy_channel_short_circuits() {
    let (mailer, primary, backup) = two_channels();
    primary.set_failure(MailError::auth("primary", "535"));
    backup.set_failure(MailError::auth("backup", "535"));

    let err = mailer.send_email(&message()).await.unwrap_err();
    assert!(matches!(err, MailError::AllProvidersExhausted { attempted: 2, .. }));

    let calls = (primary.send_calls(), backup.send_calls());
    let err = mailer.send_email(&message()).await.unwrap_err();
    assert!(matches!(err, MailError::NoHealthyProvider));
    assert_eq!((primary.send_calls(), backup.send_calls()), calls);
}

#[tokio::test]
async fn classify_and_maybe_demote_is_explicit() {
    let (mailer, _, _) = two_channels();
    let channel = mailer.channel("backup").unwrap();

    let class = mailer.classify_and_maybe_demote(channel, &MailError::transient("backup", "421"));
    assert_eq!(class, ErrorClass::Transient);
    assert!(channel.is_healthy());

    let class = mailer.classify_and_maybe_demote(channel, &MailError::protocol("backup", "553"));
    assert_eq!(class, ErrorClass::Persistent);
    assert!(!channel.is_healthy());
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_check_restores_a_recovered_channel() {
    let (mailer, primary, _) = two_channels();
    primary.fail_next(MailError::auth("primary", "535"));
    mailer.send_email(&message()).await.unwrap();
    assert_channel_unhealthy(&mailer, "primary");

    let statuses = mailer.health_check().await;
    assert!(statuses.iter().all(|s| s.healthy));
    assert!(statuses.iter().all(|s| s.last_checked_at.is_some()));
    assert_eq!(statuses[0].last_error, None);

    let result = mailer.send_email(&message()).await.unwrap();
    assert_eq!(result.channel.as_deref(), Some("primary"));
}

#[tokio::test]
async fn health_check_demotes_a_dead_channel() {
    let (mailer, primary, backup) = two_channels();
    primary.set_verify_failure(MailError::transient("primary", "connection refused"));

    let statuses = mailer.health_check().await;
    assert!(!statuses[0].healthy);
    assert!(statuses[1].healthy);
    assert_eq!(primary.verify_calls(), 1);
    assert_eq!(backup.verify_calls(), 1);

    let result = mailer.send_email(&message()).await.unwrap();
    assert_eq!(result.channel.as_deref(), Some("backup"));
}

#[tokio::test]
async fn connect_never_fails_on_a_bad_handshake() {
    let (mailer, primary, _) = two_channels();
    primary.set_verify_failure(MailError::auth("primary", "535"));

    mailer.connect().await;

    assert_channel_unhealthy(&mailer, "primary");
    assert_channel_healthy(&mailer, "backup");
}

#[tokio::test]
async fn stats_and_health_check_leave_counters_alone() {
    let (mailer, _, _) = two_channels();
    mailer.send_email(&message()).await.unwrap();
    mailer.send_email(&message()).await.unwrap();

    let first = mailer.stats();
    let second = mailer.stats();
    assert_eq!(first, second);
    assert_eq!(first[0].sent_count, 2);
    assert!(first[0].last_sent_at.is_some());

    let checked = mailer.health_check().await;
    assert_eq!(checked[0].sent_count, 2);
    assert_eq!(checked[1].sent_count, 0);
    assert_eq!(mailer.stats()[0].sent_count, 2);
}

#[tokio::test]
async fn stats_keep_configuration_order() {
    let (mailer, _, _) = two_channels();
    let names: Vec<_> = mailer.stats().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["primary", "backup"]);
    assert!(mailer.stats().iter().all(|s| s.kind == "memory"));
}
