use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use super::{EmailFormat, CRLF};

/// The kind of a message body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ContentKind {
    /// `text/html`
    Html,
    /// `text/plain`
    #[default]
    Plain,
}

impl ContentKind {
    /// The `Content-Type` header value for this kind
    pub fn mime_type(self) -> &'static str {
        match self {
            ContentKind::Html => "text/html; charset=UTF-8",
            ContentKind::Plain => "text/plain; charset=UTF-8",
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentKind::Html => "html",
            ContentKind::Plain => "plain",
        })
    }
}

/// Anything but `html` is plain text.
impl FromStr for ContentKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "html" {
            ContentKind::Html
        } else {
            ContentKind::Plain
        })
    }
}

/// A message body: its kind and its text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Content {
    /// Body kind, selects the `Content-Type`
    pub kind: ContentKind,
    /// Body text
    pub body: String,
}

impl Content {
    /// Creates a new `Content`
    pub fn new<S: Into<String>>(kind: ContentKind, body: S) -> Self {
        Content {
            kind,
            body: body.into(),
        }
    }

    /// Creates a `text/plain` content
    pub fn plain<S: Into<String>>(body: S) -> Self {
        Self::new(ContentKind::Plain, body)
    }

    /// Creates a `text/html` content
    pub fn html<S: Into<String>>(body: S) -> Self {
        Self::new(ContentKind::Html, body)
    }
}

impl EmailFormat for Content {
    fn format(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"Content-Type: ");
        out.extend_from_slice(self.kind.mime_type().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(CRLF);
        out.extend_from_slice(self.body.as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(CRLF);
    }
}
