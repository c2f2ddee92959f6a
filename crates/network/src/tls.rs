//! Mutual-TLS identity loading and config construction (§4.E), grounded on
//! the Go prototype's `tls.X509KeyPair`/`RequireAndVerifyClientCert` setup
//! but built on `rustls`/`tokio-rustls` rather than Go's stdlib `crypto/tls`.

use std::path::Path;
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::NetworkError;

fn ensure_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, NetworkError> {
    let data = std::fs::read(path)?;
    rustls_pemfile::certs(&mut data.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| NetworkError::Tls(format!("reading certificate {}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, NetworkError> {
    let data = std::fs::read(path)?;
    rustls_pemfile::private_key(&mut data.as_slice())
        .map_err(|e| NetworkError::Tls(format!("reading private key {}: {e}", path.display())))?
        .ok_or_else(|| NetworkError::Tls(format!("no private key found in {}", path.display())))
}

fn root_store_from(peer_cert_paths: &[impl AsRef<Path>]) -> Result<RootCertStore, NetworkError> {
    let mut store = RootCertStore::empty();
    for path in peer_cert_paths {
        for cert in load_certs(path.as_ref())? {
            store
                .add(cert)
                .map_err(|e| NetworkError::Tls(format!("adding trusted peer cert: {e}")))?;
        }
    }
    Ok(store)
}

/// Build a server-side config requiring and verifying a client certificate
/// from the exact set of peer servers this node talks to.
pub fn server_config(
    identity_cert: &Path,
    identity_key: &Path,
    trusted_peer_certs: &[impl AsRef<Path>],
) -> Result<Arc<ServerConfig>, NetworkError> {
    ensure_crypto_provider();
    let chain = load_certs(identity_cert)?;
    let key = load_private_key(identity_key)?;
    let roots = Arc::new(root_store_from(trusted_peer_certs)?);

    let verifier = WebPkiClientVerifier::builder(roots)
        .build()
        .map_err(|e| NetworkError::Tls(format!("building client verifier: {e}")))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(|e| NetworkError::Tls(format!("building server config: {e}")))?;

    Ok(Arc::new(config))
}

/// Build a client-side config presenting this node's own certificate and
/// trusting exactly the one peer it is dialing.
pub fn client_config(
    identity_cert: &Path,
    identity_key: &Path,
    peer_cert: &Path,
) -> Result<Arc<ClientConfig>, NetworkError> {
    ensure_crypto_provider();
    let chain = load_certs(identity_cert)?;
    let key = load_private_key(identity_key)?;
    let roots = root_store_from(&[peer_cert])?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|e| NetworkError::Tls(format!("building client config: {e}")))?;

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_certs_from_missing_file_errors() {
        let result = load_certs(Path::new("/nonexistent/server.pem"));
        assert!(result.is_err());
    }

    #[test]
    fn loading_key_from_missing_file_errors() {
        let result = load_private_key(Path::new("/nonexistent/server.key"));
        assert!(result.is_err());
    }

    #[test]
    fn root_store_from_empty_list_is_empty() {
        let empty: [&Path; 0] = [];
        let store = root_store_from(&empty).unwrap();
        assert_eq!(store.len(), 0);
    }
}
