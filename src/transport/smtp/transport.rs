use std::io::Write;

use super::{
    authentication::SaslMechanism, client, error, Error, Response, Security, Session, SmtpConfig,
};
use crate::{address::Envelope, RecipientPolicy, Transport};

/// Sends emails using the SMTP protocol
///
/// Every call to `send` opens its own connection and closes it before
/// returning.
#[derive(Clone, Debug)]
pub struct SmtpTransport {
    config: SmtpConfig,
}

impl Transport for SmtpTransport {
    type Ok = Response;
    type Error = Error;

    fn recipient_policy(&self) -> RecipientPolicy {
        self.config.recipient_policy
    }

    /// Sends an email
    fn send_raw(&self, envelope: &Envelope, email: &[u8]) -> Result<Self::Ok, Self::Error> {
        let config = &self.config;
        match config.security {
            Security::None => client::send_mail(
                (config.host.as_str(), config.port),
                config.timeout,
                &config.hello_name,
                config
                    .authentication
                    .as_ref()
                    .map(|auth| -> &dyn SaslMechanism { auth }),
                envelope,
                email,
            ),
            Security::StartTls(_) | Security::Wrapper(_) => self.send_in_session(envelope, email),
        }
    }
}

impl SmtpTransport {
    /// Creates a transport sending through the server described by `config`
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Configuration used for every connection
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Tests the connection
    ///
    /// Connects, says hello and quits. Returns `true` if all of it worked.
    pub fn test_connection(&self) -> Result<bool, Error> {
        let mut session = Session::connect(&self.config)?;
        let result = session.hello();
        session.quit();
        result.map(|()| true)
    }

    fn send_in_session(&self, envelope: &Envelope, email: &[u8]) -> Result<Response, Error> {
        let mut session = Session::connect(&self.config)?;

        session.hello()?;
        if let Some(authentication) = &self.config.authentication {
            session.authenticate(authentication)?;
        }
        session.mail(envelope.from())?;
        for to in envelope.to() {
            session.rcpt(to)?;
        }

        let mut data = session.data()?;
        data.write_all(email).map_err(error::from_io)?;
        let response = data.close()?;

        session.quit();
        Ok(response)
    }
}
