//! Email address type with optional display name.

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MailError;

/// A mailbox: an email address with an optional display name.
///
/// Construction is lenient so prospect data can be loaded as-is; the mailer
/// checks syntax with [`Address::is_valid`] before any send.
///
/// ```
/// use outreach_mailer::Address;
///
/// let addr: Address = ("Ana Lima", "ana@acme.io").into();
/// assert_eq!(addr.to_string(), "Ana Lima <ana@acme.io>");
/// assert!(addr.is_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name (e.g., "Ana Lima")
    pub name: Option<String>,
    /// Email address (e.g., "ana@acme.io")
    pub email: String,
}

impl Address {
    /// Create an address without a display name.
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into().trim().to_string();
        Self { name: None, email }
    }

    /// Create an address with a display name. An empty name is dropped.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: (!name.trim().is_empty()).then_some(name),
            email: email.into().trim().to_string(),
        }
    }

    /// Parse and validate an address (RFC 5321/5322 syntax).
    ///
    /// ```
    /// use outreach_mailer::Address;
    ///
    /// assert!(Address::parse("ana@acme.io").is_ok());
    /// assert!(Address::parse("ana@").is_err());
    /// ```
    pub fn parse(email: &str) -> Result<Self, MailError> {
        let addr = Self::new(email);
        if !addr.is_valid() {
            return Err(MailError::invalid(
                "address",
                format!("'{}' is not a valid email address", email),
            ));
        }
        Ok(addr)
    }

    /// Whether the address is syntactically valid.
    pub fn is_valid(&self) -> bool {
        EmailAddress::is_valid(&self.email)
    }

    /// Recipient domain, if the address has one.
    pub fn domain(&self) -> Option<&str> {
        self.email.rsplit_once('@').map(|(_, domain)| domain)
    }

    /// The address with its domain converted to ASCII (Punycode).
    ///
    /// SMTP envelopes need ASCII domains; prospect lists don't always have them.
    pub fn to_ascii(&self) -> Result<String, MailError> {
        let (local, domain) = self.email.rsplit_once('@').ok_or_else(|| {
            MailError::invalid("address", format!("'{}' is missing @ symbol", self.email))
        })?;

        let ascii_domain = idna::domain_to_ascii(domain).map_err(|e| {
            MailError::invalid(
                "address",
                format!("cannot convert domain '{}' to ASCII: {:?}", domain, e),
            )
        })?;

        Ok(format!("{}@{}", local, ascii_domain))
    }

    /// Format as "Name <email>" or just "email" if no name.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl<N: Into<String>, E: Into<String>> From<(N, E)> for Address {
    fn from((name, email): (N, E)) -> Self {
        Self::with_name(name, email)
    }
}

/// Types that know their own mailbox, such as a prospect record.
///
/// ```rust
/// use outreach_mailer::{Address, ToAddress};
///
/// struct Prospect {
///     first_name: String,
///     email: String,
/// }
///
/// impl ToAddress for Prospect {
///     fn to_address(&self) -> Address {
///         Address::with_name(&self.first_name, &self.email)
///     }
/// }
/// ```
pub trait ToAddress {
    fn to_address(&self) -> Address;
}

impl<T: ToAddress + ?Sized> ToAddress for &T {
    fn to_address(&self) -> Address {
        (*self).to_address()
    }
}

impl ToAddress for Address {
    fn to_address(&self) -> Address {
        self.clone()
    }
}

impl ToAddress for str {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl ToAddress for String {
    fn to_address(&self) -> Address {
        Address::new(self)
    }
}

impl<N: AsRef<str>, E: AsRef<str>> ToAddress for (N, E) {
    fn to_address(&self) -> Address {
        Address::with_name(self.0.as_ref(), self.1.as_ref())
    }
}
