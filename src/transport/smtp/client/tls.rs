use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{self, pem::PemObject, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use crate::transport::smtp::error::{self, Error};

/// Source for the base set of root certificates to trust
#[allow(missing_copy_implementations)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum CertificateStore {
    /// Use a hardcoded set of Mozilla roots via the `webpki-roots` crate
    #[cfg(feature = "webpki-roots")]
    #[cfg_attr(docsrs, doc(cfg(feature = "webpki-roots")))]
    #[default]
    WebpkiRoots,
    /// Only trust the certificates in [`TlsOptions::root_certs`]
    #[cfg_attr(not(feature = "webpki-roots"), default)]
    None,
}

/// A certificate that can be used with [`TlsOptions::root_certs`]
#[derive(Clone)]
pub struct Certificate(pki_types::CertificateDer<'static>);

impl Certificate {
    /// Create a `Certificate` from a DER encoded certificate
    pub fn from_der(der: Vec<u8>) -> Self {
        Self(der.into())
    }

    /// Create a `Certificate` from a PEM encoded certificate
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        pki_types::CertificateDer::from_pem_slice(pem)
            .map(Self)
            .map_err(|_| error::tls("invalid certificate"))
    }

    /// Create a list of `Certificate` from a PEM encoded bundle
    pub fn from_pem_bundle(pem: &[u8]) -> Result<Vec<Self>, Error> {
        pki_types::CertificateDer::pem_slice_iter(pem)
            .map(|cert| cert.map(Self))
            .collect::<Result<Vec<_>, pki_types::pem::Error>>()
            .map_err(|_| error::tls("invalid certificate"))
    }
}

impl Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate").finish_non_exhaustive()
    }
}

/// TLS settings for a connection
///
/// The defaults verify the server certificate against the webpki roots and
/// the name of the host being connected to.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    /// Name checked against the server certificate, instead of the host
    pub server_name: Option<String>,
    /// Base set of trusted roots
    pub cert_store: CertificateStore,
    /// Additional trusted roots
    pub root_certs: Vec<Certificate>,
    /// Accept any certificate, for any host name
    ///
    /// Makes the connection vulnerable to interception, only use it for testing.
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    /// Builds the rustls configuration for a connection to `host`
    pub(crate) fn build(&self, host: &str) -> Result<TlsParameters, Error> {
        let crypto_provider = crate::rustls_crypto::crypto_provider();
        let tls = ClientConfig::builder_with_provider(Arc::clone(&crypto_provider))
            .with_safe_default_protocol_versions()
            .map_err(error::tls)?;

        let mut root_cert_store = RootCertStore::empty();
        match self.cert_store {
            #[cfg(feature = "webpki-roots")]
            CertificateStore::WebpkiRoots => {
                root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
            CertificateStore::None => {}
        }
        for cert in &self.root_certs {
            root_cert_store.add(cert.0.clone()).map_err(error::tls)?;
        }

        let tls = if self.insecure_skip_verify {
            tls.dangerous()
                .with_custom_certificate_verifier(Arc::new(InvalidCertsVerifier { crypto_provider }))
        } else {
            tls.with_root_certificates(root_cert_store)
        };
        let tls = tls.with_no_client_auth();

        let server_name = self.server_name.as_deref().unwrap_or(host);
        let server_name = pki_types::ServerName::try_from(server_name)
            .map_err(error::tls)?
            .to_owned();

        Ok(TlsParameters {
            connector: Arc::new(tls),
            server_name,
        })
    }
}

/// Ready-to-use rustls configuration
#[derive(Clone)]
pub struct TlsParameters {
    pub(super) connector: Arc<ClientConfig>,
    pub(super) server_name: pki_types::ServerName<'static>,
}

impl Debug for TlsParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsParameters")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

/// Skips certificate and host name checks, but still checks handshake signatures
#[derive(Debug)]
struct InvalidCertsVerifier {
    crypto_provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for InvalidCertsVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &pki_types::CertificateDer<'_>,
        _intermediates: &[pki_types::CertificateDer<'_>],
        _server_name: &pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &pki_types::CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.crypto_provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &pki_types::CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.crypto_provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.crypto_provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
