use std::sync::Arc;

use rustls::crypto::CryptoProvider;

/// The crypto provider used for every TLS connection
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
