//! Step-by-step SMTP sessions

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Write},
};

use super::{
    authentication::SaslMechanism,
    client::{ClientCodec, SmtpConnection},
    commands::Data,
    error::{self, Error},
    extension::{ClientId, ServerInfo},
    response::Response,
    Security, SmtpConfig,
};

/// Where a [`Session`] stands in the mail transaction
///
/// States only move forward, in declaration order. Any state may move to
/// `Failed`, which is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the connection, TLS included
    Connecting,
    /// Greeting received, waiting for `EHLO`
    Greeting,
    /// Server features known, authentication may happen
    Authenticating,
    /// Ready for `MAIL FROM`
    SettingSender,
    /// Sender accepted, with the number of accepted recipients
    AddingRecipients(usize),
    /// `DATA` accepted, the message is being written
    StreamingData,
    /// Message accepted, only `QUIT` remains
    Closing,
    /// `QUIT` sent and connection closed
    Done,
    /// A step failed, the connection has been closed
    Failed,
}

/// An SMTP session, driven one protocol step at a time
///
/// Each method checks that it comes at the right point of the transaction:
/// calling one out of order returns a client error and changes nothing.
/// Any other failure moves the session to [`SessionState::Failed`] and ends
/// the connection with a best-effort `QUIT`.
///
/// ```rust,no_run
/// use std::io::Write;
///
/// use smtp_mailer::transport::smtp::{Security, Session, SmtpConfig, TlsOptions};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SmtpConfig::with_default_port(
///     "smtp.example.com",
///     Security::Wrapper(TlsOptions::default()),
/// );
/// let mut session = Session::connect(&config)?;
/// session.hello()?;
/// session.mail(Some("user@example.com"))?;
/// session.rcpt("user@example.org")?;
/// let mut data = session.data()?;
/// data.write_all(b"Subject: Hi\r\n\r\nHello\r\n")?;
/// data.close()?;
/// session.quit();
/// # Ok(())
/// # }
/// ```
pub struct Session {
    conn: SmtpConnection,
    state: SessionState,
    host: String,
    hello_name: ClientId,
}

impl Session {
    /// Opens the connection described by `config` and reads the greeting
    ///
    /// With [`Security::StartTls`], the first `EHLO` and the upgrade happen
    /// here, [`Session::hello`] then greets the encrypted server.
    pub fn connect(config: &SmtpConfig) -> Result<Session, Error> {
        let server = (config.host.as_str(), config.port);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "session state: {:?}, to {}:{}",
            SessionState::Connecting,
            config.host,
            config.port
        );

        let conn = match &config.security {
            Security::None => SmtpConnection::connect(server, config.timeout, None)?,
            Security::Wrapper(options) => {
                let tls_parameters = options.build(&config.host)?;
                SmtpConnection::connect(server, config.timeout, Some(&tls_parameters))?
            }
            Security::StartTls(options) => {
                let tls_parameters = options.build(&config.host)?;
                let mut conn = SmtpConnection::connect(server, config.timeout, None)?;
                let upgraded = match conn.hello(&config.hello_name) {
                    Ok(()) => conn.starttls(&tls_parameters),
                    Err(err) => Err(err),
                };
                if let Err(err) = upgraded {
                    conn.abort();
                    return Err(err);
                }
                conn
            }
        };

        let session = Session {
            conn,
            state: SessionState::Greeting,
            host: config.host.clone(),
            hello_name: config.hello_name.clone(),
        };
        #[cfg(feature = "tracing")]
        tracing::debug!("session state: {:?}", session.state);
        Ok(session)
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// What the server advertised in its last reply to `EHLO`
    pub fn server_info(&self) -> &ServerInfo {
        self.conn.server_info()
    }

    /// Tells if the connection is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.conn.is_encrypted()
    }

    /// Sends `EHLO`, or `HELO` if the server does not know `EHLO`
    pub fn hello(&mut self) -> Result<(), Error> {
        self.expect("EHLO", self.state == SessionState::Greeting)?;
        let hello_name = self.hello_name.clone();
        let result = self.conn.hello(&hello_name);
        self.advance(result, SessionState::Authenticating)
    }

    /// Authenticates with `mechanism`
    ///
    /// Optional, only allowed right after [`Session::hello`].
    pub fn authenticate(&mut self, mechanism: &dyn SaslMechanism) -> Result<Response, Error> {
        self.expect("AUTH", self.state == SessionState::Authenticating)?;
        let result = self.conn.auth(mechanism, &self.host);
        self.advance(result, SessionState::SettingSender)
    }

    /// Sends `MAIL FROM`
    pub fn mail(&mut self, from: Option<&str>) -> Result<Response, Error> {
        self.expect(
            "MAIL",
            matches!(
                self.state,
                SessionState::Authenticating | SessionState::SettingSender
            ),
        )?;
        let result = self.conn.mail(from);
        self.advance(result, SessionState::AddingRecipients(0))
    }

    /// Sends `RCPT TO`
    pub fn rcpt(&mut self, to: &str) -> Result<Response, Error> {
        let SessionState::AddingRecipients(accepted) = self.state else {
            return Err(self.out_of_order("RCPT"));
        };
        let result = self.conn.rcpt(to);
        self.advance(result, SessionState::AddingRecipients(accepted + 1))
    }

    /// Sends `DATA` and returns a writer for the message
    ///
    /// The message must be written through the returned [`DataWriter`],
    /// then [`DataWriter::close`] ends it.
    pub fn data(&mut self) -> Result<DataWriter<'_>, Error> {
        self.expect(
            "DATA",
            matches!(self.state, SessionState::AddingRecipients(n) if n > 0),
        )?;
        let result = self.conn.command(Data);
        self.advance(result, SessionState::StreamingData)?;
        Ok(DataWriter {
            session: self,
            codec: ClientCodec::new(),
            buffer: Vec::new(),
        })
    }

    /// Sends `QUIT` and closes the connection, ignoring errors
    ///
    /// A session stopped while writing data is closed without `QUIT`.
    pub fn quit(&mut self) {
        match self.state {
            SessionState::Done | SessionState::Failed => return,
            SessionState::StreamingData => self.conn.shutdown(),
            _ => {
                if let Err(_err) = self.conn.quit() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("QUIT failed: {_err}");
                }
                self.conn.shutdown();
            }
        }
        self.set_state(SessionState::Done);
    }

    fn expect(&self, step: &str, allowed: bool) -> Result<(), Error> {
        if allowed {
            Ok(())
        } else {
            Err(self.out_of_order(step))
        }
    }

    fn out_of_order(&self, step: &str) -> Error {
        error::client(format!("{step} is not allowed in state {:?}", self.state))
    }

    fn advance<T>(&mut self, result: Result<T, Error>, next: SessionState) -> Result<T, Error> {
        match result {
            Ok(value) => {
                self.set_state(next);
                Ok(value)
            }
            Err(err) => {
                self.fail();
                Err(err)
            }
        }
    }

    fn fail(&mut self) {
        self.conn.abort();
        self.set_state(SessionState::Failed);
    }

    fn set_state(&mut self, state: SessionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!("session state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Writes the message of a [`Session`], escaping lines starting with `.`
///
/// Must be finished with [`DataWriter::close`], dropping it leaves the
/// session unable to continue.
pub struct DataWriter<'a> {
    session: &'a mut Session,
    codec: ClientCodec,
    buffer: Vec<u8>,
}

impl DataWriter<'_> {
    /// Ends the message and returns the server's final reply
    pub fn close(self) -> Result<Response, Error> {
        let session = self.session;
        session.expect("end of DATA", session.state == SessionState::StreamingData)?;
        let result = session.conn.end_data(&self.codec);
        session.advance(result, SessionState::Closing)
    }
}

impl Write for DataWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.session.state != SessionState::StreamingData {
            return Err(io::Error::other(self.session.out_of_order("message data")));
        }

        self.buffer.clear();
        self.codec.encode(buf, &mut self.buffer);
        match self.session.conn.write(&self.buffer) {
            Ok(()) => Ok(buf.len()),
            Err(err) => {
                self.session.fail();
                Err(io::Error::other(err))
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // every write is flushed
        Ok(())
    }
}

impl Debug for DataWriter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataWriter")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
