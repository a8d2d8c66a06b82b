//! `{{placeholder}}` substitution for outreach templates.
//!
//! ```
//! use std::collections::HashMap;
//! use outreach_mailer::personalize::{create_personalized_message, MessageTemplate};
//!
//! let template = MessageTemplate::new("Hello {{firstName}}")
//!     .text_body("Saw what {{ company }} is doing in {{industry}}.");
//!
//! let vars = HashMap::from([("firstName".to_string(), "Ana".to_string())]);
//! let message = create_personalized_message(&template, &vars);
//!
//! assert_eq!(message.subject, "Hello Ana");
//! assert_eq!(message.text_body.as_deref(), Some("Saw what your company is doing in your industry."));
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::message::OutboundMessage;

/// Fallbacks for well-known placeholders. Anything else falls back to "".
const DEFAULTS: &[(&str, &str)] = &[
    ("firstName", "there"),
    ("lastName", ""),
    ("fullName", "there"),
    ("company", "your company"),
    ("jobTitle", "your role"),
    ("industry", "your industry"),
    ("website", "your website"),
    ("senderName", "our team"),
];

/// `{{ name }}`, whitespace inside the braces allowed.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex is valid")
});

/// Neutral value for a placeholder with no usable variable.
pub fn default_value(name: &str) -> &'static str {
    DEFAULTS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| *value)
        .unwrap_or("")
}

/// Subject and bodies with placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

impl MessageTemplate {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Names of every placeholder used, in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let fields = [
            Some(self.subject.as_str()),
            self.text_body.as_deref(),
            self.html_body.as_deref(),
        ];
        for text in fields.into_iter().flatten() {
            for caps in PLACEHOLDER_RE.captures_iter(text) {
                let name = &caps[1];
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

/// A template with every placeholder resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalizedMessage {
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

impl PersonalizedMessage {
    /// Copy subject and bodies onto `message`, leaving its addressing alone.
    pub fn apply_to(self, mut message: OutboundMessage) -> OutboundMessage {
        message.subject = self.subject;
        message.text_body = self.text_body;
        message.html_body = self.html_body;
        message
    }
}

/// Resolve every `{{name}}` in subject, text and HTML body.
///
/// Missing or blank variables get a neutral default (`firstName` becomes
/// "there", `company` becomes "your company", ...); unknown names become
/// an empty string. No placeholder survives.
pub fn create_personalized_message(
    template: &MessageTemplate,
    variables: &HashMap<String, String>,
) -> PersonalizedMessage {
    PersonalizedMessage {
        subject: render(&template.subject, variables),
        text_body: template.text_body.as_deref().map(|t| render(t, variables)),
        html_body: template.html_body.as_deref().map(|t| render(t, variables)),
    }
}

/// Substitute placeholders in a single string.
pub fn render(text: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match variables.get(name) {
                Some(value) if !value.trim().is_empty() => value.clone(),
                _ => default_value(name).to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_variables() {
        assert_eq!(render("Hello {{firstName}}", &vars(&[("firstName", "Ana")])), "Hello Ana");
    }

    #[test]
    fn missing_variables_use_defaults() {
        let empty = HashMap::new();
        assert_eq!(render("Hello {{firstName}}", &empty), "Hello there");
        assert_eq!(render("{{fullName}}", &empty), "there");
        assert_eq!(render("[{{lastName}}]", &empty), "[]");
        assert_eq!(render("{{company}}", &empty), "your company");
        assert_eq!(render("{{jobTitle}}", &empty), "your role");
        assert_eq!(render("{{industry}}", &empty), "your industry");
        assert_eq!(render("{{website}}", &empty), "your website");
        assert_eq!(render("{{senderName}}", &empty), "our team");
    }

    #[test]
    fn blank_values_use_defaults() {
        assert_eq!(render("Hi {{firstName}}", &vars(&[("firstName", "  ")])), "Hi there");
    }

    #[test]
    fn unknown_placeholders_are_removed() {
        assert_eq!(render("a{{mystery}}b", &HashMap::new()), "ab");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        assert_eq!(
            render("{{ firstName }} at {{  company}}", &vars(&[("company", "Acme")])),
            "there at Acme"
        );
    }

    #[test]
    fn leaves_other_braces_alone() {
        assert_eq!(render("{ firstName } {{}}", &HashMap::new()), "{ firstName } {{}}");
    }

    #[test]
    fn renders_every_field() {
        let template = MessageTemplate::new("Hi {{firstName}}")
            .text_body("{{company}} rocks")
            .html_body("<p>{{company}}</p>");
        let out = create_personalized_message(&template, &vars(&[("company", "Acme")]));

        assert_eq!(out.subject, "Hi there");
        assert_eq!(out.text_body.as_deref(), Some("Acme rocks"));
        assert_eq!(out.html_body.as_deref(), Some("<p>Acme</p>"));
        assert!(!out.subject.contains("{{"));
    }

    #[test]
    fn lists_placeholders_once() {
        let template = MessageTemplate::new("{{firstName}}")
            .text_body("{{ firstName }} {{company}}");
        assert_eq!(template.placeholders(), vec!["firstName", "company"]);
    }

    #[test]
    fn applies_onto_message() {
        let out = PersonalizedMessage {
            subject: "Hi Ana".into(),
            text_body: Some("Body".into()),
            html_body: None,
        }
        .apply_to(OutboundMessage::new().to("ana@prospect.com"));
        assert_eq!(out.subject, "Hi Ana");
        assert_eq!(out.to[0].email, "ana@prospect.com");
    }
}
