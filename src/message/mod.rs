//! Email messages and their MIME serialization
//!
//! A [`Message`] is a plain struct: fill in the fields, then call
//! [`Message::formatted`] to get the bytes sent during the SMTP `DATA` phase.
//!
//! ```rust
//! use smtp_mailer::message::{Attachment, Content, EmailAddress, Message};
//!
//! let m = Message {
//!     from: Some(EmailAddress::new(Some("NoBody"), "nobody@domain.tld")),
//!     reply_to: Some(EmailAddress::new(Some("Yuin"), "yuin@domain.tld")),
//!     to: vec!["hei@domain.tld".to_owned()],
//!     subject: "Happy new year".to_owned(),
//!     content: Content::html("<p>Be happy!</p>"),
//!     attachments: vec![Attachment::new("hello.txt", "text/plain", "Hello")],
//!     ..Default::default()
//! };
//! let bytes = m.formatted();
//! ```
//!
//! Which produces:
//!
//! ```sh
//! From: "NoBody" <nobody@domain.tld>
//! To: hei@domain.tld
//! Reply-To: "Yuin" <yuin@domain.tld>
//! Subject: Happy new year
//! MIME-Version: 1.0
//! Content-Type: multipart/mixed; boundary="MixedBoundaryString"
//!
//! --MixedBoundaryString
//! Content-Type: multipart/related; boundary="RelatedBoundaryString"
//!
//! --RelatedBoundaryString
//! Content-Type: multipart/alternative; boundary="AlternativeBoundaryString"
//!
//! --AlternativeBoundaryString
//! Content-Type: text/html; charset=UTF-8
//!
//! <p>Be happy!</p>
//!
//! --AlternativeBoundaryString--
//!
//! --RelatedBoundaryString--
//!
//! --MixedBoundaryString
//! Content-Type: text/plain;name="hello.txt"
//! Content-Transfer-Encoding: base64
//! Content-Disposition: attachment;filename="hello.txt"
//!
//! SGVsbG8=
//! --MixedBoundaryString--
//! ```
//!
//! Every line ends with CRLF, except the final close delimiter.

pub use self::{
    attachment::Attachment,
    content::{Content, ContentKind},
    mailbox::EmailAddress,
    mimebody::{Boundaries, MultiPartKind},
};

mod attachment;
mod content;
mod mailbox;
mod mimebody;

const CRLF: &[u8] = b"\r\n";

/// Something that can be formatted as an email message
pub(crate) trait EmailFormat {
    // Use a writer?
    fn format(&self, out: &mut Vec<u8>);
}

/// Email message which can be formatted
///
/// # Recipients
///
/// `to`, `cc` and `bcc` are written to the `To`, `Cc` and `Bcc` headers,
/// comma-joined, in insertion order. Note that the `Bcc` header is part of
/// the output, so every recipient can read the blind copies. Older output of
/// this message format filled the `Bcc` header with the `cc` list; it now
/// carries the `bcc` list, so code relying on the old header must be updated.
///
/// Which lists are used for actual delivery is decided by the
/// transport's [`RecipientPolicy`](crate::RecipientPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// `From` header, required to send
    pub from: Option<EmailAddress>,
    /// `Reply-To` header
    pub reply_to: Option<EmailAddress>,
    /// `To` header
    pub to: Vec<String>,
    /// `Cc` header
    pub cc: Vec<String>,
    /// `Bcc` header
    pub bcc: Vec<String>,
    /// `Subject` header, omitted when empty
    pub subject: String,
    /// Extra headers as `(name, value)` pairs, such as `Date` or `X-Mailer`
    ///
    /// Written in order, after `Subject` and before `MIME-Version`. Names
    /// and values are used as given.
    pub headers: Vec<(String, String)>,
    /// The body, wrapped in a `multipart/alternative` part
    pub content: Content,
    /// Files appended to the `multipart/mixed` container
    pub attachments: Vec<Attachment>,
    /// Multipart boundary tokens
    pub boundaries: Boundaries,
}

impl Message {
    /// Get message content formatted for SMTP
    ///
    /// This is a pure function of the fields: the same values always give
    /// the same bytes.
    pub fn formatted(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.format(&mut out);
        out
    }

    fn format_headers(&self, out: &mut Vec<u8>) {
        if let Some(from) = &self.from {
            header(out, "From", &from.to_string());
        }
        if !self.to.is_empty() {
            header(out, "To", &self.to.join(","));
        }
        if !self.cc.is_empty() {
            header(out, "Cc", &self.cc.join(","));
        }
        if !self.bcc.is_empty() {
            header(out, "Bcc", &self.bcc.join(","));
        }
        if let Some(reply_to) = &self.reply_to {
            header(out, "Reply-To", &reply_to.to_string());
        }
        if !self.subject.is_empty() {
            header(out, "Subject", &self.subject);
        }
        for (name, value) in &self.headers {
            header(out, name, value);
        }
        header(out, "MIME-Version", "1.0");
    }
}

fn header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(CRLF);
}

impl EmailFormat for Message {
    fn format(&self, out: &mut Vec<u8>) {
        use mimebody::{close, delimiter, open};

        let boundaries = &self.boundaries;

        self.format_headers(out);

        open(out, MultiPartKind::Mixed, boundaries);

        open(out, MultiPartKind::Related, boundaries);
        open(out, MultiPartKind::Alternative, boundaries);
        self.content.format(out);
        close(out, MultiPartKind::Alternative, boundaries);
        out.extend_from_slice(b"\r\n\r\n");
        close(out, MultiPartKind::Related, boundaries);
        out.extend_from_slice(b"\r\n\r\n");

        for attachment in &self.attachments {
            delimiter(out, MultiPartKind::Mixed, boundaries);
            attachment.format(out);
        }

        close(out, MultiPartKind::Mixed, boundaries);
    }
}
