//! SMTP commands

use std::fmt::{self, Display, Formatter};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::transport::smtp::{
    error::{self, Error},
    extension::{ClientId, MailParameter},
    response::Response,
};

/// EHLO command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Ehlo {
    client_id: ClientId,
}

impl Display for Ehlo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EHLO {}\r\n", self.client_id)
    }
}

impl Ehlo {
    /// Creates a EHLO command
    pub fn new(client_id: ClientId) -> Ehlo {
        Ehlo { client_id }
    }
}

/// HELO command, for servers that do not speak ESMTP
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Helo {
    client_id: ClientId,
}

impl Display for Helo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HELO {}\r\n", self.client_id)
    }
}

impl Helo {
    /// Creates a HELO command
    pub fn new(client_id: ClientId) -> Helo {
        Helo { client_id }
    }
}

/// STARTTLS command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Starttls;

impl Display for Starttls {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("STARTTLS\r\n")
    }
}

/// MAIL command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Mail {
    sender: Option<String>,
    parameters: Vec<MailParameter>,
}

impl Display for Mail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MAIL FROM:<{}>", self.sender.as_deref().unwrap_or(""))?;
        for parameter in &self.parameters {
            write!(f, " {parameter}")?;
        }
        f.write_str("\r\n")
    }
}

impl Mail {
    /// Creates a MAIL command
    ///
    /// A `None` sender is the null reverse-path, `MAIL FROM:<>`.
    pub fn new(sender: Option<String>, parameters: Vec<MailParameter>) -> Mail {
        Mail { sender, parameters }
    }
}

/// RCPT command
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Rcpt {
    recipient: String,
}

impl Display for Rcpt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RCPT TO:<{}>\r\n", self.recipient)
    }
}

impl Rcpt {
    /// Creates an RCPT command
    pub fn new(recipient: String) -> Rcpt {
        Rcpt { recipient }
    }
}

/// DATA command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Data;

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("DATA\r\n")
    }
}

/// QUIT command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub struct Quit;

impl Display for Quit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("QUIT\r\n")
    }
}

/// AUTH command, with an optional initial response
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Auth {
    mechanism: String,
    initial_response: Option<Vec<u8>>,
}

impl Display for Auth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AUTH {}", self.mechanism)?;
        match self.initial_response.as_deref() {
            // RFC 4954: a zero-length initial response is sent as "="
            Some([]) => f.write_str(" =")?,
            Some(response) => write!(f, " {}", STANDARD.encode(response))?,
            None => (),
        }
        f.write_str("\r\n")
    }
}

impl Auth {
    /// Creates an AUTH command
    pub fn new<M: Into<String>>(mechanism: M, initial_response: Option<Vec<u8>>) -> Auth {
        Auth {
            mechanism: mechanism.into(),
            initial_response,
        }
    }
}

/// A response line to a `334` challenge
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum AuthResponse {
    /// Base64-encoded answer, possibly empty
    Answer(Vec<u8>),
    /// Cancels the exchange, `*`
    Cancel,
}

impl Display for AuthResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AuthResponse::Answer(response) => f.write_str(&STANDARD.encode(response))?,
            AuthResponse::Cancel => f.write_str("*")?,
        }
        f.write_str("\r\n")
    }
}

/// Decodes the challenge carried by a `334` reply
///
/// A reply without text is an empty challenge.
pub(crate) fn decode_challenge(response: &Response) -> Result<Vec<u8>, Error> {
    if !response.has_code(334) {
        return Err(error::response("Expecting a challenge"));
    }

    let encoded_challenge = response.first_word().unwrap_or_default();
    #[cfg(feature = "tracing")]
    tracing::debug!("auth encoded challenge: {encoded_challenge}");

    STANDARD.decode(encoded_challenge).map_err(error::response)
}
