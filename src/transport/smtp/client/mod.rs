//! SMTP client
//!
//! `SmtpConnection` allows manually sending SMTP commands.
//!
//! ```rust,no_run
//! use smtp_mailer::transport::smtp::{
//!     client::SmtpConnection, commands::*, extension::ClientId, SMTP_PORT,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hello = ClientId::Domain("my_hostname".to_owned());
//! let mut client = SmtpConnection::connect(&("localhost", SMTP_PORT), None, None)?;
//! client.hello(&hello)?;
//! client.command(Mail::new(Some("user@example.com".to_owned()), vec![]))?;
//! client.command(Rcpt::new("user@example.org".to_owned()))?;
//! client.command(Data)?;
//! client.message("Test email".as_bytes())?;
//! client.command(Quit)?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub use self::{
    connection::SmtpConnection,
    net::NetworkStream,
    tls::{Certificate, CertificateStore, TlsOptions, TlsParameters},
};
use crate::{
    address::Envelope,
    transport::smtp::{
        authentication::SaslMechanism, error::Error, extension::ClientId, response::Response,
    },
};

mod connection;
mod net;
mod tls;

/// Where the next byte sits in the current line
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
enum LineState {
    /// First byte of a line
    #[default]
    Start,
    /// Just after a `\r`
    Cr,
    /// Anywhere else
    Text,
}

/// The codec used for transparency
///
/// Doubles every `.` found at the start of a line ([RFC 5321, section
/// 4.5.2](https://tools.ietf.org/html/rfc5321#section-4.5.2)). Lines are
/// CRLF-terminated; the state carries over between calls to `encode`.
#[derive(Default, Clone, Copy, Debug)]
pub struct ClientCodec {
    state: LineState,
}

impl ClientCodec {
    /// Creates a new client codec, positioned at the start of a line
    pub fn new() -> Self {
        ClientCodec::default()
    }

    /// Adds transparency
    pub fn encode(&mut self, frame: &[u8], buf: &mut Vec<u8>) {
        let mut start = 0;
        for (idx, &byte) in frame.iter().enumerate() {
            if byte == b'.' && self.state == LineState::Start {
                buf.extend_from_slice(&frame[start..idx]);
                buf.push(b'.');
                start = idx;
            }
            self.state = match (self.state, byte) {
                (_, b'\r') => LineState::Cr,
                (LineState::Cr, b'\n') => LineState::Start,
                _ => LineState::Text,
            };
        }
        buf.extend_from_slice(&frame[start..]);
    }

    /// End-of-data marker, completing the current line first if needed
    pub fn end_of_data(&self) -> &'static [u8] {
        match self.state {
            LineState::Start => b".\r\n",
            LineState::Cr => b"\n.\r\n",
            LineState::Text => b"\r\n.\r\n",
        }
    }
}

/// Returns the string replacing all the CRLF with "\<CRLF\>"
/// Used for debug displays
#[cfg(feature = "tracing")]
pub(super) fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}

/// Sends one email over a plaintext connection, in a single call
///
/// Connects to `server`, reads the greeting, says hello (EHLO, then HELO if
/// refused), authenticates when a mechanism is given, runs the mail
/// transaction and quits. The first failing step ends the session and its
/// error is returned; a failing QUIT after the message was accepted is not
/// reported.
///
/// Nothing here ever encrypts the connection.
pub fn send_mail(
    server: (&str, u16),
    timeout: Option<Duration>,
    hello_name: &ClientId,
    authentication: Option<&dyn SaslMechanism>,
    envelope: &Envelope,
    email: &[u8],
) -> Result<Response, Error> {
    let mut conn = SmtpConnection::connect(server, timeout, None)?;

    match transaction(&mut conn, server.0, hello_name, authentication, envelope, email) {
        Ok(response) => {
            if let Err(_err) = conn.quit() {
                #[cfg(feature = "tracing")]
                tracing::debug!("QUIT failed after delivery: {_err}");
            }
            Ok(response)
        }
        Err(err) => {
            conn.abort();
            Err(err)
        }
    }
}

fn transaction(
    conn: &mut SmtpConnection,
    host: &str,
    hello_name: &ClientId,
    authentication: Option<&dyn SaslMechanism>,
    envelope: &Envelope,
    email: &[u8],
) -> Result<Response, Error> {
    conn.hello(hello_name)?;
    if let Some(mechanism) = authentication {
        conn.auth(mechanism, host)?;
    }
    conn.send(envelope, email)
}
