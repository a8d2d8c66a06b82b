//! Mailer configuration.
//!
//! Everything here is `serde::Deserialize`, so a host application can load it
//! from its own config file. [`MailerConfig::from_env`] covers the common case.
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SMTP_PROVIDERS` | Ordered, comma-separated provider names (e.g. `primary,backup`) |
//! | `SMTP_<NAME>_HOST` | Provider host |
//! | `SMTP_<NAME>_PORT` | Provider port (default: 587) |
//! | `SMTP_<NAME>_SECURE` | `true` for implicit TLS (port 465 style) |
//! | `SMTP_<NAME>_TLS` | `none` to disable TLS (local relays only) |
//! | `SMTP_<NAME>_USERNAME` | Username |
//! | `SMTP_<NAME>_PASSWORD` | Password |
//! | `SMTP_HOST`, `SMTP_PORT`, ... | Single provider named `smtp` when `SMTP_PROVIDERS` is unset |
//! | `EMAIL_FROM` | Default sender email |
//! | `EMAIL_FROM_NAME` | Default sender name |
//! | `MAILER_SEND_TIMEOUT_SECS` | Timeout for each handshake and send (default: 30) |
//! | `MAILER_MAX_CONNECTIONS` | Pool size per provider (default: 5) |
//! | `MAILER_MAX_MESSAGES` | Messages per pool before it is recycled (default: 100) |
//! | `MAILER_RATE_LIMIT` | Messages per second per provider (default: 5) |

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::address::Address;
use crate::error::MailError;

/// One outbound provider, in failover order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Implicit TLS. When false, STARTTLS is used unless `plaintext` is set.
    #[serde(default)]
    pub secure: bool,
    /// Skip TLS entirely. Only for local relays and test servers.
    #[serde(default)]
    pub plaintext: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            secure: false,
            plaintext: false,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Host, username and password are all present and non-blank.
    ///
    /// Providers failing this are skipped at startup.
    pub fn has_complete_credentials(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        !self.host.trim().is_empty() && filled(&self.username) && filled(&self.password)
    }

    #[cfg(feature = "smtp")]
    pub(crate) fn tls_mode(&self) -> crate::providers::TlsMode {
        use crate::providers::TlsMode;
        if self.secure {
            TlsMode::Tls
        } else if self.plaintext {
            TlsMode::None
        } else {
            TlsMode::StartTls
        }
    }

    /// Read `SMTP_<PREFIX>_*` variables. A missing host is left blank, which
    /// makes the provider incomplete.
    fn from_env_prefixed(name: &str, prefix: &str) -> Self {
        let var = |key: &str| env::var(format!("{prefix}_{key}")).ok();
        let host = var("HOST").unwrap_or_default();
        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(default_port);

        Self {
            name: name.to_string(),
            host,
            port,
            secure: var("SECURE").is_some_and(|v| is_truthy(&v)),
            plaintext: var("TLS").is_some_and(|v| v.eq_ignore_ascii_case("none")),
            username: var("USERNAME"),
            password: var("PASSWORD"),
        }
    }
}

/// Pool bounds and rate cap applied to every SMTP channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Concurrent connections per provider.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Messages carried by one pool before it is replaced. 0 disables recycling.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Messages per second per provider. 0 disables the cap.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Seconds an idle pooled connection is kept open.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_messages: default_max_messages(),
            rate_limit: default_rate_limit(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Everything [`OutboundMailer::from_config`](crate::OutboundMailer::from_config) needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Providers in failover order.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub default_from: Option<Address>,
    #[serde(default)]
    pub pool: PoolSettings,
    /// Timeout for each handshake and each send, in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            default_from: None,
            pool: PoolSettings::default(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl MailerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        let providers = match env::var("SMTP_PROVIDERS") {
            // Listed providers are kept even when incomplete so startup can
            // skip them by name.
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|name| {
                    ProviderConfig::from_env_prefixed(name, &format!("SMTP_{}", env_key(name)))
                })
                .collect(),
            Err(_) if env::var("SMTP_HOST").is_ok() => {
                vec![ProviderConfig::from_env_prefixed("smtp", "SMTP")]
            }
            Err(_) => Vec::new(),
        };

        let default_from = env::var("EMAIL_FROM").ok().map(|email| {
            match env::var("EMAIL_FROM_NAME") {
                Ok(name) => Address::with_name(name, email),
                Err(_) => Address::new(email),
            }
        });

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            max_connections: env_number("MAILER_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            max_messages: env_number("MAILER_MAX_MESSAGES")?.unwrap_or(defaults.max_messages),
            rate_limit: env_number("MAILER_RATE_LIMIT")?.unwrap_or(defaults.rate_limit),
            idle_timeout_secs: defaults.idle_timeout_secs,
        };

        let send_timeout_secs =
            env_number("MAILER_SEND_TIMEOUT_SECS")?.unwrap_or_else(default_send_timeout_secs);
        if send_timeout_secs == 0 {
            return Err(MailError::Configuration(
                "MAILER_SEND_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            providers,
            default_from,
            pool,
            send_timeout_secs,
        })
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Providers that can actually be connected, in order.
    pub fn usable_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.has_complete_credentials())
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, MailError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MailError::Configuration(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

const fn default_port() -> u16 {
    587
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_max_messages() -> u32 {
    100
}

const fn default_rate_limit() -> u32 {
    5
}

const fn default_idle_timeout_secs() -> u64 {
    60
}

const fn default_send_timeout_secs() -> u64 {
    30
}
