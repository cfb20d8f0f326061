use std::{
    fmt::Display,
    io::{self, BufRead, BufReader, Write},
    net::{Shutdown, ToSocketAddrs},
    time::Duration,
};

#[cfg(feature = "tracing")]
use super::escape_crlf;
use super::{ClientCodec, NetworkStream, TlsParameters};
use crate::{
    address::Envelope,
    transport::smtp::{
        authentication::{SaslMechanism, ServerContext},
        commands::{
            decode_challenge, Auth, AuthResponse, Data, Ehlo, Helo, Mail, Quit, Rcpt, Starttls,
        },
        error::{self, Error},
        extension::{ClientId, Extension, MailBodyParameter, MailParameter, ServerInfo},
        response::{parse_response, Response},
    },
};

/// Maximum number of `334` challenges answered in one AUTH exchange
const MAX_CHALLENGES: usize = 10;

/// Structure that implements the SMTP client
///
/// Every method maps to one protocol step. A failing step leaves the
/// connection open; call [`SmtpConnection::abort`] to end it.
pub struct SmtpConnection {
    /// TCP stream between client and server
    stream: BufReader<NetworkStream>,
    /// Whether a read or write failed, nothing more can go through
    broken: bool,
    /// Whether QUIT has been sent
    sent_quit: bool,
    /// Information about the server
    server_info: ServerInfo,
}

impl SmtpConnection {
    /// Get information about the server
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Connects to the server and reads its greeting
    ///
    /// With TLS parameters the handshake happens before the greeting.
    pub fn connect<A: ToSocketAddrs>(
        server: A,
        timeout: Option<Duration>,
        tls_parameters: Option<&TlsParameters>,
    ) -> Result<SmtpConnection, Error> {
        let stream = NetworkStream::connect(server, timeout, tls_parameters)?;
        let mut conn = SmtpConnection {
            stream: BufReader::new(stream),
            broken: false,
            sent_quit: false,
            server_info: ServerInfo::default(),
        };
        conn.set_timeout(timeout).map_err(error::connection)?;

        let greeting = conn.read_response()?;
        #[cfg(feature = "tracing")]
        tracing::debug!("greeting: {}", greeting.first_line().unwrap_or_default());
        #[cfg(not(feature = "tracing"))]
        let _ = greeting;

        Ok(conn)
    }

    /// Sends EHLO, falling back to HELO when the server rejects it
    pub fn hello(&mut self, hello_name: &ClientId) -> Result<(), Error> {
        match self.ehlo(hello_name) {
            Err(err) if err.is_permanent() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("EHLO rejected ({err}), trying HELO");
                let response = self.command(Helo::new(hello_name.clone()))?;
                self.server_info = ServerInfo::from_helo(&response);
            }
            result => result?,
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("server {}", self.server_info);
        Ok(())
    }

    /// Send EHLO and update server info
    fn ehlo(&mut self, hello_name: &ClientId) -> Result<(), Error> {
        let ehlo_response = self.command(Ehlo::new(hello_name.clone()))?;
        self.server_info = ServerInfo::from_response(&ehlo_response)?;
        Ok(())
    }

    /// Upgrades the connection with STARTTLS
    ///
    /// Fails without sending anything if the server does not offer it.
    /// What the server advertised before is forgotten, say hello again
    /// once encrypted.
    pub fn starttls(&mut self, tls_parameters: &TlsParameters) -> Result<(), Error> {
        if !self.server_info.supports_feature(Extension::StartTls) {
            return Err(error::client("STARTTLS is not supported on this server"));
        }

        self.command(Starttls)?;
        self.stream.get_mut().upgrade_tls(tls_parameters)?;
        self.server_info = ServerInfo::default();
        #[cfg(feature = "tracing")]
        tracing::debug!("connection encrypted");
        Ok(())
    }

    /// Runs a SASL exchange with the given mechanism
    ///
    /// `host` is the name the connection was opened to.
    pub fn auth(&mut self, mechanism: &dyn SaslMechanism, host: &str) -> Result<Response, Error> {
        if !self.server_info.supports_feature(Extension::Authentication) {
            return Err(error::client("server doesn't support AUTH"));
        }

        let initial_response = {
            let context = ServerContext::new(host, self.is_encrypted(), &self.server_info);
            mechanism.step(&context, None)?
        };
        let mut response = self.command(Auth::new(mechanism.name(), initial_response))?;

        // Limit challenges to avoid blocking
        let mut challenges = MAX_CHALLENGES;
        while response.has_code(334) {
            if challenges == 0 {
                return Err(error::response("Unexpected number of challenges"));
            }
            challenges -= 1;

            let answer = decode_challenge(&response).and_then(|challenge| {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "auth decoded challenge: {}",
                    String::from_utf8_lossy(&challenge)
                );
                let context = ServerContext::new(host, self.is_encrypted(), &self.server_info);
                mechanism.step(&context, Some(&challenge))
            });

            response = match answer {
                Ok(answer) => self.command(AuthResponse::Answer(answer.unwrap_or_default()))?,
                Err(err) => {
                    let _ = self.command(AuthResponse::Cancel);
                    return Err(err);
                }
            };
        }

        Ok(response)
    }

    /// Sends `MAIL FROM`, announcing 8BITMIME when the server supports it
    pub fn mail(&mut self, from: Option<&str>) -> Result<Response, Error> {
        let mut mail_options = vec![];
        if self.server_info.supports_feature(Extension::EightBitMime) {
            mail_options.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }
        self.command(Mail::new(from.map(ToOwned::to_owned), mail_options))
    }

    /// Sends `RCPT TO`
    pub fn rcpt(&mut self, to: &str) -> Result<Response, Error> {
        self.command(Rcpt::new(to.to_owned()))
    }

    /// Runs a whole mail transaction, stopping at the first rejection
    pub fn send(&mut self, envelope: &Envelope, email: &[u8]) -> Result<Response, Error> {
        self.mail(envelope.from())?;

        for to_address in envelope.to() {
            self.rcpt(to_address)?;
        }

        self.command(Data)?;

        self.message(email)
    }

    /// Sends QUIT
    pub fn quit(&mut self) -> Result<Response, Error> {
        self.sent_quit = true;
        self.command(Quit)
    }

    /// Best-effort QUIT and shutdown, errors are ignored
    pub fn abort(&mut self) {
        // `write` already rejects writes on a broken connection
        if !self.sent_quit {
            let _ = self.quit();
        }
        self.shutdown();
    }

    /// Closes the stream without saying goodbye
    pub fn shutdown(&mut self) {
        if let Err(_err) = self.stream.get_mut().shutdown(Shutdown::Both) {
            #[cfg(feature = "tracing")]
            tracing::debug!("shutdown failed: {_err}");
        }
        self.broken = true;
    }

    /// Tells if the underlying stream is currently encrypted
    pub fn is_encrypted(&self) -> bool {
        self.stream.get_ref().is_encrypted()
    }

    /// Set timeout
    pub fn set_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        self.stream.get_mut().set_read_timeout(duration)?;
        self.stream.get_mut().set_write_timeout(duration)
    }

    /// Sends the message content, dot-stuffed and terminated
    pub fn message(&mut self, message: &[u8]) -> Result<Response, Error> {
        let mut codec = ClientCodec::new();
        let mut out_buf = Vec::with_capacity(message.len());
        codec.encode(message, &mut out_buf);
        self.write(out_buf.as_slice())?;
        self.end_data(&codec)
    }

    /// Writes the end-of-data marker and reads the final reply
    ///
    /// `codec` is the one the message went through, a message already ending
    /// with CRLF gets no extra line.
    pub(crate) fn end_data(&mut self, codec: &ClientCodec) -> Result<Response, Error> {
        self.write(codec.end_of_data())?;
        self.read_response()
    }

    /// Sends an SMTP command
    pub fn command<C: Display>(&mut self, command: C) -> Result<Response, Error> {
        self.write(command.to_string().as_bytes())?;
        self.read_response()
    }

    /// Writes a string to the server
    pub(crate) fn write(&mut self, string: &[u8]) -> Result<(), Error> {
        if self.broken {
            return Err(error::client("connection is broken"));
        }

        let stream = self.stream.get_mut();
        if let Err(err) = stream.write_all(string).and_then(|()| stream.flush()) {
            self.broken = true;
            return Err(error::write(err));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Wrote: {}", escape_crlf(&String::from_utf8_lossy(string)));
        Ok(())
    }

    /// Gets the SMTP response
    pub fn read_response(&mut self) -> Result<Response, Error> {
        let mut buffer = String::with_capacity(100);

        loop {
            let read = match self.stream.read_line(&mut buffer) {
                Ok(read) => read,
                Err(err) => {
                    self.broken = true;
                    return Err(error::read(err));
                }
            };
            if read == 0 {
                break;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!("<< {}", escape_crlf(&buffer));
            match parse_response(&buffer) {
                Ok((_remaining, response)) => {
                    return if response.is_positive() {
                        Ok(response)
                    } else {
                        Err(error::rejection(
                            response.code(),
                            Some(response.message().collect::<Vec<_>>().join("\n")),
                        ))
                    };
                }
                Err(nom::Err::Incomplete(_)) => { /* read more */ }
                Err(nom::Err::Failure(e)) | Err(nom::Err::Error(e)) => {
                    self.broken = true;
                    return Err(error::response(e.to_string()));
                }
            }
        }

        self.broken = true;
        Err(error::response("incomplete response"))
    }
}
