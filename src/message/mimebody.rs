use std::{
    fmt::{self, Display, Formatter},
    iter,
};

use super::CRLF;

/// The kind of multipart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiPartKind {
    /// Mixed kind to combine unrelated content parts
    ///
    /// For example this kind can be used to mix email message and attachments.
    Mixed,

    /// Alternative kind to join several variants of same email contents.
    ///
    /// That kind is recommended to use for joining plain (text) and rich (HTML) messages into single email message.
    Alternative,

    /// Related kind to mix content and related resources.
    ///
    /// For example, you can include images into HTML content using that.
    Related,
}

impl Display for MultiPartKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        })
    }
}

/// Boundary tokens of the three nested multipart containers
///
/// The default tokens are fixed literals, so two messages with the same
/// fields serialize to identical bytes. They are only safe as long as no
/// body or attachment contains the literal text; [`Boundaries::random`]
/// draws tokens that are practically unique instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundaries {
    /// `multipart/mixed` boundary, outermost
    pub mixed: String,
    /// `multipart/related` boundary
    pub related: String,
    /// `multipart/alternative` boundary, innermost
    pub alternative: String,
}

impl Boundaries {
    /// Draws three fresh random boundaries
    ///
    /// Call it once when building a message: the tokens are stored in the
    /// message and reused by every serialization of it.
    pub fn random() -> Self {
        let mut rng = fastrand::Rng::new();
        Boundaries {
            mixed: make_boundary(&mut rng),
            related: make_boundary(&mut rng),
            alternative: make_boundary(&mut rng),
        }
    }

    pub(super) fn get(&self, kind: MultiPartKind) -> &str {
        match kind {
            MultiPartKind::Mixed => &self.mixed,
            MultiPartKind::Related => &self.related,
            MultiPartKind::Alternative => &self.alternative,
        }
    }
}

impl Default for Boundaries {
    fn default() -> Self {
        Boundaries {
            mixed: "MixedBoundaryString".to_owned(),
            related: "RelatedBoundaryString".to_owned(),
            alternative: "AlternativeBoundaryString".to_owned(),
        }
    }
}

/// Create a random MIME boundary.
fn make_boundary(rng: &mut fastrand::Rng) -> String {
    iter::repeat_with(|| rng.alphanumeric()).take(40).collect()
}

/// Writes the container `Content-Type`, the blank line and the first delimiter
pub(super) fn open(out: &mut Vec<u8>, kind: MultiPartKind, boundaries: &Boundaries) {
    let boundary = boundaries.get(kind);
    out.extend_from_slice(
        format!("Content-Type: multipart/{kind}; boundary=\"{boundary}\"\r\n").as_bytes(),
    );
    out.extend_from_slice(CRLF);
    delimiter(out, kind, boundaries);
}

/// Writes a `--boundary` line introducing the next part
pub(super) fn delimiter(out: &mut Vec<u8>, kind: MultiPartKind, boundaries: &Boundaries) {
    out.extend_from_slice(b"--");
    out.extend_from_slice(boundaries.get(kind).as_bytes());
    out.extend_from_slice(CRLF);
}

/// Writes the `--boundary--` close delimiter, without line break
pub(super) fn close(out: &mut Vec<u8>, kind: MultiPartKind, boundaries: &Boundaries) {
    out.extend_from_slice(b"--");
    out.extend_from_slice(boundaries.get(kind).as_bytes());
    out.extend_from_slice(b"--");
}
