//! Configuration loading tests.

use std::env;
use std::time::Duration;

use outreach_mailer::{MailError, MailerConfig, OutboundMailer, ProviderConfig};

const VARS: &[&str] = &[
    "SMTP_PROVIDERS",
    "SMTP_PRIMARY_HOST",
    "SMTP_PRIMARY_USERNAME",
    "SMTP_PRIMARY_PASSWORD",
    "SMTP_SEND_GRID_HOST",
    "SMTP_SEND_GRID_PORT",
    "SMTP_SEND_GRID_SECURE",
    "SMTP_HOST",
    "SMTP_PORT",
    "SMTP_TLS",
    "SMTP_USERNAME",
    "SMTP_PASSWORD",
    "EMAIL_FROM",
    "EMAIL_FROM_NAME",
    "MAILER_SEND_TIMEOUT_SECS",
    "MAILER_RATE_LIMIT",
];

fn clear() {
    for var in VARS {
        env::remove_var(var);
    }
}

/// Environment is process-global, so every env scenario runs in this one test.
#[test]
fn from_env_scenarios() {
    clear();

    // Named, ordered providers.
    env::set_var("SMTP_PROVIDERS", "primary, send-grid");
    env::set_var("SMTP_PRIMARY_HOST", "smtp.acme.io");
    env::set_var("SMTP_PRIMARY_USERNAME", "outreach");
    env::set_var("SMTP_PRIMARY_PASSWORD", "secret");
    env::set_var("SMTP_SEND_GRID_HOST", "smtp.sendgrid.net");
    env::set_var("SMTP_SEND_GRID_PORT", "465");
    env::set_var("SMTP_SEND_GRID_SECURE", "true");
    env::set_var("EMAIL_FROM", "sam@acme.io");
    env::set_var("EMAIL_FROM_NAME", "Sam from Acme");
    env::set_var("MAILER_SEND_TIMEOUT_SECS", "10");

    let config = MailerConfig::from_env().unwrap();
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[0].name, "primary");
    assert_eq!(config.providers[0].port, 587);
    assert!(!config.providers[0].secure);
    assert_eq!(config.providers[1].name, "send-grid");
    assert_eq!(config.providers[1].port, 465);
    assert!(config.providers[1].secure);
    assert_eq!(config.send_timeout(), Duration::from_secs(10));
    let from = config.default_from.clone().unwrap();
    assert_eq!(from.email, "sam@acme.io");
    assert_eq!(from.name.as_deref(), Some("Sam from Acme"));

    // The second provider has no credentials and would be skipped.
    let usable: Vec<_> = config.usable_providers().map(|p| p.name.as_str()).collect();
    assert_eq!(usable, vec!["primary"]);

    // A listed provider without a host is kept but never used.
    env::set_var("SMTP_PROVIDERS", "missing,primary");
    let config = MailerConfig::from_env().unwrap();
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[0].name, "missing");
    assert!(config.providers[0].host.is_empty());
    let usable: Vec<_> = config.usable_providers().map(|p| p.name.as_str()).collect();
    assert_eq!(usable, vec!["primary"]);

    // A zero timeout would fail every handshake.
    env::set_var("MAILER_SEND_TIMEOUT_SECS", "0");
    assert!(matches!(
        MailerConfig::from_env(),
        Err(MailError::Configuration(_))
    ));

    // Single unnamed provider.
    clear();
    env::set_var("SMTP_HOST", "localhost");
    env::set_var("SMTP_PORT", "2525");
    env::set_var("SMTP_TLS", "none");
    let config = MailerConfig::from_env().unwrap();
    assert_eq!(config.providers.len(), 1);
    assert_eq!(config.providers[0].name, "smtp");
    assert_eq!(config.providers[0].port, 2525);
    assert!(config.providers[0].plaintext);
    assert_eq!(config.send_timeout(), Duration::from_secs(30));
    assert_eq!(config.default_from, None);

    // Bad numbers are rejected rather than silently defaulted.
    env::set_var("MAILER_RATE_LIMIT", "fast");
    assert!(matches!(
        MailerConfig::from_env(),
        Err(MailError::Configuration(_))
    ));

    // Nothing set at all.
    clear();
    let config = MailerConfig::from_env().unwrap();
    assert!(config.providers.is_empty());

    clear();
}

#[tokio::test]
async fn from_config_without_usable_providers_is_not_configured() {
    let config = MailerConfig {
        providers: vec![ProviderConfig::new("primary", "smtp.acme.io")],
        ..MailerConfig::default()
    };

    let err = OutboundMailer::from_config(&config).await.unwrap_err();
    assert!(matches!(err, MailError::NotConfigured));
}

#[tokio::test]
async fn from_config_keeps_unreachable_provider_as_unhealthy() {
    let mut provider = ProviderConfig::new("local", "127.0.0.1")
        .with_port(1)
        .with_credentials("outreach", "secret");
    provider.plaintext = true;

    let config = MailerConfig {
        providers: vec![provider],
        send_timeout_secs: 2,
        ..MailerConfig::default()
    };

    let mailer = OutboundMailer::from_config(&config).await.unwrap();
    let stats = mailer.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].kind, "smtp");
    assert!(!stats[0].healthy);
    assert!(stats[0].last_error.is_some());

    let params = mailer.channel("local").unwrap().params().unwrap();
    assert_eq!(params.port, 1);
    assert!(!format!("{params:?}").contains("secret"));
}
