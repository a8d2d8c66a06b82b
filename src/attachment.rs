//! Message attachments (case studies, one-pagers, inline logos).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MailError;

/// How an attachment is presented to the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    /// Downloadable file.
    #[default]
    Attachment,
    /// Embedded in the HTML body via `cid:`.
    Inline,
}

/// A file attached to an outbound message.
///
/// ```
/// use outreach_mailer::Attachment;
///
/// let deck = Attachment::from_bytes("deck.pdf", b"%PDF-1.7".to_vec());
/// assert_eq!(deck.content_type, "application/pdf");
///
/// let logo = Attachment::from_bytes("logo.png", vec![0x89, 0x50])
///     .inline()
///     .content_id("brand-logo");
/// assert!(logo.is_inline());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// MIME type, guessed from the filename unless set explicitly.
    pub content_type: String,
    pub data: Vec<u8>,
    pub disposition: AttachmentType,
    /// Content-ID for inline attachments.
    pub content_id: Option<String>,
}

impl Attachment {
    /// Create an attachment from raw bytes.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        Self {
            filename,
            content_type,
            data,
            disposition: AttachmentType::Attachment,
            content_id: None,
        }
    }

    /// Read an attachment from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let data = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailError::AttachmentFileNotFound(path.display().to_string())
            } else {
                MailError::AttachmentReadError(format!("{}: {}", path.display(), e))
            }
        })?;

        Ok(Self::from_bytes(filename, data))
    }

    /// Override the guessed content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Mark as inline. The content id defaults to the filename.
    pub fn inline(mut self) -> Self {
        self.disposition = AttachmentType::Inline;
        if self.content_id.is_none() {
            self.content_id = Some(self.filename.clone());
        }
        self
    }

    /// Set the Content-ID referenced as `cid:<id>` in HTML.
    pub fn content_id(mut self, cid: impl Into<String>) -> Self {
        self.content_id = Some(cid.into());
        self
    }

    pub fn is_inline(&self) -> bool {
        self.disposition == AttachmentType::Inline
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Reject attachments that would produce an empty MIME part.
    pub(crate) fn check(&self) -> Result<(), MailError> {
        if self.filename.trim().is_empty() {
            return Err(MailError::invalid("attachments", "attachment without a filename"));
        }
        if self.data.is_empty() {
            return Err(MailError::invalid(
                "attachments",
                format!("'{}' has no content", self.filename),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_guess() {
        assert_eq!(
            Attachment::from_bytes("doc.pdf", vec![1]).content_type,
            "application/pdf"
        );
        assert_eq!(
            Attachment::from_bytes("file.unknown_ext_12345", vec![1]).content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_inline_defaults_content_id() {
        let a = Attachment::from_bytes("logo.png", vec![1, 2, 3]).inline();
        assert_eq!(a.content_id.as_deref(), Some("logo.png"));
    }

    #[test]
    fn test_empty_attachment_fails_check() {
        let a = Attachment::from_bytes("empty.txt", Vec::new());
        let err = a.check().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("empty.txt"));
    }

    #[test]
    fn test_missing_file() {
        let err = Attachment::from_path("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, MailError::AttachmentFileNotFound(_)));
    }
}
