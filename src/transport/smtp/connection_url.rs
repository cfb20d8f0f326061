use std::borrow::Cow;

use url::Url;

use super::{
    authentication::Authentication, client::TlsOptions, error, extension::ClientId, Error,
    Security, SmtpConfig,
};

/// Create a new `SmtpConfig` from a connection URL
pub(crate) fn from_connection_url(connection_url: &str) -> Result<SmtpConfig, Error> {
    let connection_url = Url::parse(connection_url).map_err(error::connection)?;
    let tls: Option<String> = connection_url
        .query_pairs()
        .find(|(k, _)| k == "tls")
        .map(|(_, v)| v.to_string());

    let host = connection_url
        .host_str()
        .ok_or_else(|| error::connection("smtp host undefined"))?;

    let security = match (connection_url.scheme(), tls.as_deref()) {
        ("smtp", None) => Security::None,
        ("smtp", Some("required")) => Security::StartTls(TlsOptions::default()),
        ("smtps", _) => Security::Wrapper(TlsOptions::default()),
        (scheme, tls) => {
            return Err(error::connection(format!(
                "Unknown scheme '{scheme}' or tls parameter '{tls:?}'"
            )))
        }
    };

    let mut config = match connection_url.port() {
        Some(port) => SmtpConfig::new(host, port, security),
        None => SmtpConfig::with_default_port(host, security),
    };

    // use the path segment of the URL as name in the HELO / EHLO command
    if connection_url.path().len() > 1 {
        let name = connection_url.path().trim_matches('/').to_owned();
        config.hello_name = ClientId::Domain(name);
    }

    if let Some(password) = connection_url.password() {
        let percent_decode = |s: &str| {
            percent_encoding::percent_decode_str(s)
                .decode_utf8()
                .map(Cow::into_owned)
                .map_err(error::connection)
        };
        config.authentication = Some(Authentication::plain(
            "",
            percent_decode(connection_url.username())?,
            percent_decode(password)?,
            host,
        ));
    }

    Ok(config)
}
