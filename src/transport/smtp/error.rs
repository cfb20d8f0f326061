//! Errors ending an SMTP exchange
//!
//! Every failure of a send is one [`Error`]. Its kind tells at which point
//! the exchange broke down, the source carries the details: the server text
//! for a rejection, the `io::Error` for a failed read or write.

use std::{error::Error as StdError, fmt, io, iter};

use crate::{
    transport::smtp::response::{Code, Severity},
    BoxError,
};

/// The error returned by SMTP connections, sessions and transports
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    /// A `4xx` or `5xx` reply to one of our commands
    Rejected(Code),
    /// A reply that is not valid SMTP, or not the one the step expects
    Response,
    /// A step refused locally, nothing was sent for it
    Client,
    /// No TCP connection was opened, or the address could not be used
    Connection,
    /// Reading a reply failed or timed out
    Read,
    /// Writing a command or message data failed or timed out
    Write,
    /// TLS could not be set up or the handshake failed
    Tls,
}

impl Kind {
    fn describe(self) -> &'static str {
        match self {
            Kind::Rejected(code) if code.severity == Severity::TransientNegativeCompletion => {
                "temporarily rejected"
            }
            Kind::Rejected(_) => "rejected",
            Kind::Response => "invalid reply from the server",
            Kind::Client => "refused by the client",
            Kind::Connection => "could not connect",
            Kind::Read => "failed to read from the server",
            Kind::Write => "failed to write to the server",
            Kind::Tls => "TLS failure",
        }
    }
}

impl Error {
    fn new(kind: Kind, source: Option<BoxError>) -> Self {
        Error {
            inner: Box::new(Inner { kind, source }),
        }
    }

    /// The server rejected a step with a `4xx` reply
    ///
    /// Sending the same message later may work.
    pub fn is_transient(&self) -> bool {
        matches!(self.status(), Some(code) if code.severity == Severity::TransientNegativeCompletion)
    }

    /// The server rejected a step with a `5xx` reply
    pub fn is_permanent(&self) -> bool {
        matches!(self.status(), Some(code) if code.severity == Severity::PermanentNegativeCompletion)
    }

    /// The reply code of a rejection
    pub fn status(&self) -> Option<Code> {
        match self.inner.kind {
            Kind::Rejected(code) => Some(code),
            _ => None,
        }
    }

    /// The server sent something that is not a usable reply
    ///
    /// Malformed lines, a connection closed mid-reply, or a challenge that
    /// cannot be decoded.
    pub fn is_response(&self) -> bool {
        matches!(self.inner.kind, Kind::Response)
    }

    /// The step was refused before anything went on the wire
    ///
    /// Missing sender or recipients, a session step called out of order,
    /// PLAIN over an unsafe link, an extension the server does not offer.
    pub fn is_client(&self) -> bool {
        matches!(self.inner.kind, Kind::Client)
    }

    /// No connection could be made, the server was never greeted
    pub fn is_connection(&self) -> bool {
        matches!(self.inner.kind, Kind::Connection)
    }

    /// The open connection failed, in either direction
    pub fn is_network(&self) -> bool {
        matches!(self.inner.kind, Kind::Read | Kind::Write)
    }

    /// Writing failed, a command or the message was not fully sent
    pub fn is_write(&self) -> bool {
        matches!(self.inner.kind, Kind::Write)
    }

    /// TLS setup, handshake or certificate verification failed
    pub fn is_tls(&self) -> bool {
        matches!(self.inner.kind, Kind::Tls)
    }

    /// A deadline set with [`SmtpConfig::timeout`](super::SmtpConfig::timeout) expired
    pub fn is_timeout(&self) -> bool {
        iter::successors(self.source(), |err| (*err).source()).any(|err| {
            err.downcast_ref::<io::Error>().is_some_and(|err| {
                matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
            })
        })
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.inner.kind)
            .field("source", &self.inner.source)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.kind.describe())?;
        if let Kind::Rejected(code) = self.inner.kind {
            write!(f, " ({code})")?;
        }
        match &self.inner.source {
            Some(source) => write!(f, ": {source}"),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_deref()
            .map(|source| -> &(dyn StdError + 'static) { source })
    }
}

/// Envelope problems are caught before connecting
impl From<crate::Error> for Error {
    fn from(err: crate::Error) -> Self {
        client(err)
    }
}

/// Error for a negative reply, with the server text as source
pub(crate) fn rejection(code: Code, text: Option<String>) -> Error {
    match code.severity {
        Severity::TransientNegativeCompletion | Severity::PermanentNegativeCompletion => {
            Error::new(Kind::Rejected(code), text.map(Into::into))
        }
        _ => response(format!("{code} is not a negative reply")),
    }
}

pub(crate) fn response<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Response, Some(e.into()))
}

pub(crate) fn client<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Client, Some(e.into()))
}

pub(crate) fn connection<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Connection, Some(e.into()))
}

pub(crate) fn read<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Read, Some(e.into()))
}

pub(crate) fn write<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Write, Some(e.into()))
}

pub(crate) fn tls<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Tls, Some(e.into()))
}

/// Recovers the error behind an `io::Error` returned by a `DataWriter`
///
/// Anything else is a failed write.
pub(crate) fn from_io(err: io::Error) -> Error {
    if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return write(err);
    }
    match err.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        Some(Err(inner)) => write(inner),
        None => write("data writer failed"),
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use pretty_assertions::assert_eq;

    use super::{client, from_io, read, rejection, write};
    use crate::transport::smtp::response::{Category, Code, Detail, Severity};

    fn code(severity: Severity, category: Category, detail: Detail) -> Code {
        Code::new(severity, category, detail)
    }

    #[test]
    fn rejection_by_severity() {
        let err = rejection(
            code(
                Severity::PermanentNegativeCompletion,
                Category::MailSystem,
                Detail::Zero,
            ),
            Some("no such user".to_owned()),
        );
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.status().map(u16::from), Some(550));
        assert_eq!(err.to_string(), "rejected (550): no such user");

        let err = rejection(
            code(
                Severity::TransientNegativeCompletion,
                Category::Connections,
                Detail::One,
            ),
            None,
        );
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "temporarily rejected (421)");
    }

    #[test]
    fn rejection_of_a_positive_code() {
        let err = rejection(
            code(
                Severity::PositiveCompletion,
                Category::MailSystem,
                Detail::Zero,
            ),
            None,
        );
        assert!(err.is_response());
        assert!(err.status().is_none());
    }

    #[test]
    fn read_and_write_are_network_errors() {
        let err = read(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        assert!(err.is_network());
        assert!(!err.is_write());
        assert!(err.is_timeout());

        let err = write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_network());
        assert!(err.is_write());
        assert!(!err.is_timeout());

        assert!(!client("no").is_timeout());
    }

    #[test]
    fn error_through_io_write() {
        let inner = read(io::Error::new(io::ErrorKind::WouldBlock, "timed out"));
        let err = from_io(io::Error::other(inner));
        assert!(err.is_network());
        assert!(!err.is_write());
        assert!(err.is_timeout());

        let err = from_io(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        assert!(err.is_write());
    }

    #[test]
    fn error_from_envelope() {
        let err = super::Error::from(crate::Error::MissingFrom);
        assert!(err.is_client());
        assert!(err.status().is_none());
    }
}
