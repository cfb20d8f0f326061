use base64::{engine::general_purpose::STANDARD, Engine};

use super::{EmailFormat, CRLF};

/// A file attached to a message
///
/// Immutable once built. Always sent with `Content-Disposition: attachment`
/// and a base64 `Content-Transfer-Encoding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

impl Attachment {
    /// Creates a new attachment
    ///
    /// `content_type` is written as-is, e.g. `application/pdf`.
    pub fn new<F, C, D>(filename: F, content_type: C, data: D) -> Self
    where
        F: Into<String>,
        C: Into<String>,
        D: Into<Vec<u8>>,
    {
        Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Name of the attached file
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type of the attached file
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Raw, unencoded content
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Formats the part headers and payload, the caller writes the boundary line.
impl EmailFormat for Attachment {
    fn format(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(
            format!(
                "Content-Type: {};name=\"{}\"\r\n",
                self.content_type, self.filename
            )
            .as_bytes(),
        );
        out.extend_from_slice(b"Content-Transfer-Encoding: base64\r\n");
        out.extend_from_slice(
            format!(
                "Content-Disposition: attachment;filename=\"{}\"\r\n",
                self.filename
            )
            .as_bytes(),
        );
        out.extend_from_slice(CRLF);
        out.extend_from_slice(STANDARD.encode(&self.data).as_bytes());
        out.extend_from_slice(CRLF);
    }
}
