//! Provides limited SASL authentication mechanisms

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::transport::smtp::{
    error::{self, Error},
    extension::ServerInfo,
};

/// Contains user credentials
#[derive(PartialEq, Eq, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Credentials {
    authentication_identity: String,
    secret: String,
}

impl Credentials {
    /// Create a `Credentials` struct from username and password
    pub fn new(username: String, password: String) -> Credentials {
        Credentials {
            authentication_identity: username,
            secret: password,
        }
    }
}

impl<S, T> From<(S, T)> for Credentials
where
    S: Into<String>,
    T: Into<String>,
{
    fn from((username, password): (S, T)) -> Self {
        Credentials::new(username.into(), password.into())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").finish()
    }
}

/// What a mechanism may know about the server it authenticates to
#[derive(Debug, Clone, Copy)]
pub struct ServerContext<'a> {
    host: &'a str,
    encrypted: bool,
    info: &'a ServerInfo,
}

impl<'a> ServerContext<'a> {
    /// Creates a new context
    ///
    /// `host` is the name the client connected to, not the one from the banner.
    pub fn new(host: &'a str, encrypted: bool, info: &'a ServerInfo) -> Self {
        ServerContext {
            host,
            encrypted,
            info,
        }
    }

    /// Host name the connection was opened to
    pub fn host(&self) -> &str {
        self.host
    }

    /// Whether the connection is protected by TLS
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Features advertised in reply to `EHLO`
    pub fn server_info(&self) -> &ServerInfo {
        self.info
    }
}

/// A SASL mechanism
///
/// The exchange starts with `step(server, None)`: returning `Some` sends an
/// initial response along with `AUTH`. Each `334` challenge from the server
/// is then base64-decoded and passed as `step(server, Some(challenge))`,
/// until the server accepts or rejects the exchange.
///
/// Returning an error cancels the exchange.
pub trait SaslMechanism: Debug + Send + Sync {
    /// Mechanism name, as sent after `AUTH`
    fn name(&self) -> &str;

    /// Computes the next client response
    fn step(
        &self,
        server: &ServerContext<'_>,
        challenge: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, Error>;
}

/// Authentication mechanisms with built-in support
///
/// `Custom` plugs any other [`SaslMechanism`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Authentication {
    /// PLAIN authentication mechanism, defined in
    /// [RFC 4616](https://tools.ietf.org/html/rfc4616)
    ///
    /// Only sent over TLS or to localhost, and only to `host`.
    Plain {
        /// Authorization identity, usually empty
        identity: String,
        /// Authentication identity and password
        credentials: Credentials,
        /// Host the credentials are meant for
        host: String,
    },
    /// LOGIN authentication mechanism
    /// Obsolete but needed for some providers (like office365)
    ///
    /// Defined in [draft-murchison-sasl-login-00](https://www.ietf.org/archive/id/draft-murchison-sasl-login-00.txt).
    Login(Credentials),
    /// CRAM-MD5 authentication mechanism, defined in
    /// [RFC 2195](https://tools.ietf.org/html/rfc2195)
    CramMd5(Credentials),
    /// Caller-supplied mechanism
    Custom(Arc<dyn SaslMechanism>),
}

impl Authentication {
    /// PLAIN mechanism bound to `host`
    ///
    /// ```rust
    /// # use smtp_mailer::transport::smtp::authentication::Authentication;
    /// let auth = Authentication::plain("", "user@example.com", "password", "mail.example.com");
    /// ```
    pub fn plain<I, U, P, H>(identity: I, username: U, password: P, host: H) -> Self
    where
        I: Into<String>,
        U: Into<String>,
        P: Into<String>,
        H: Into<String>,
    {
        Authentication::Plain {
            identity: identity.into(),
            credentials: Credentials::new(username.into(), password.into()),
            host: host.into(),
        }
    }
}

impl SaslMechanism for Authentication {
    fn name(&self) -> &str {
        match self {
            Authentication::Plain { .. } => "PLAIN",
            Authentication::Login(_) => "LOGIN",
            Authentication::CramMd5(_) => "CRAM-MD5",
            Authentication::Custom(mechanism) => mechanism.name(),
        }
    }

    fn step(
        &self,
        server: &ServerContext<'_>,
        challenge: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, Error> {
        match self {
            Authentication::Plain {
                identity,
                credentials,
                host,
            } => match challenge {
                Some(_) => Err(error::client("This mechanism does not expect a challenge")),
                None => {
                    // Credentials only go out over TLS, except to localhost
                    if !server.is_encrypted() && !is_localhost(server.host()) {
                        return Err(error::client("unencrypted connection"));
                    }
                    if server.host() != host.as_str() {
                        return Err(error::client("wrong host name"));
                    }
                    Ok(Some(
                        format!(
                            "{}\u{0}{}\u{0}{}",
                            identity, credentials.authentication_identity, credentials.secret
                        )
                        .into_bytes(),
                    ))
                }
            },
            Authentication::Login(credentials) => {
                let Some(decoded_challenge) = challenge else {
                    return Ok(None);
                };

                let decoded_challenge = String::from_utf8_lossy(decoded_challenge);
                let decoded_challenge = decoded_challenge.trim();

                if ["User Name", "Username:", "Username"].contains(&decoded_challenge) {
                    return Ok(Some(credentials.authentication_identity.clone().into_bytes()));
                }

                if ["Password", "Password:"].contains(&decoded_challenge) {
                    return Ok(Some(credentials.secret.clone().into_bytes()));
                }

                Err(error::client("Unrecognized challenge"))
            }
            Authentication::CramMd5(credentials) => {
                let Some(decoded_challenge) = challenge else {
                    return Ok(None);
                };

                let mut hmac = Hmac::<Md5>::new_from_slice(credentials.secret.as_bytes())
                    .map_err(|_| error::client("invalid CRAM-MD5 key"))?;
                hmac.update(decoded_challenge);

                Ok(Some(
                    format!(
                        "{} {}",
                        credentials.authentication_identity,
                        hex::encode(hmac.finalize().into_bytes())
                    )
                    .into_bytes(),
                ))
            }
            Authentication::Custom(mechanism) => mechanism.step(server, challenge),
        }
    }
}

fn is_localhost(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}
