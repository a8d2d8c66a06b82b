//! Transport implementations.
//!
//! Each transport implements the [`Transport`](crate::Transport) trait.
//!
//! ## Available Transports
//!
//! | Transport | Feature Flag | Description |
//! |-----------|-------------|-------------|
//! | [`SmtpTransport`] | `smtp` (default) | Pooled, rate-capped SMTP via lettre |
//! | [`MemoryTransport`] | (none) | Records messages in memory for dev/testing |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpBuilder, SmtpTransport, TlsMode};

mod memory;
pub use memory::{Delivered, MemoryTransport};
