//! TLS client configuration

use crate::constants::transport::ALPN_HTTP1;
use crate::error::ServiceError;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a rustls client configuration trusting the platform's root certificates.
///
/// Certificates the platform store holds but rustls cannot parse are skipped.
/// Fails only when no usable root certificate remains.
pub fn client_config() -> Result<Arc<ClientConfig>, ServiceError> {
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        warn!("Failed to load a platform certificate: {error}");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!("Loaded {added} platform root certificates ({ignored} ignored)");

    if roots.is_empty() {
        return Err(ServiceError::tls_error(
            "No usable root certificates found in the platform store",
        ));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServiceError::tls_error(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    Ok(Arc::new(config))
}
