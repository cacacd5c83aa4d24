//! TLS material for the QUIC tunnel
//!
//! Certificates and keys are loaded once at startup into a [`TlsProvider`],
//! which then hands out rustls client and server configurations. Both sides
//! speak TLS 1.3 only and negotiate the tunnel ALPN.

use crate::config::TlsConfig;
use crate::protocol::ALPN_PROTOCOL;
use anyhow::{anyhow, Context, Result};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{self, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{
    version, ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme,
};

/// Certificate material and crypto provider shared by every connection
pub struct TlsProvider {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    roots: Arc<RootCertStore>,
    server_name: String,
    skip_verify: bool,
    provider: Arc<CryptoProvider>,
}

impl std::fmt::Debug for TlsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsProvider")
            .field("certs", &self.certs.len())
            .field("roots", &self.roots.len())
            .field("server_name", &self.server_name)
            .field("skip_verify", &self.skip_verify)
            .finish()
    }
}

impl TlsProvider {
    /// Load the certificate, key and trust anchors named in the config
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        let cert = config
            .cert
            .as_deref()
            .ok_or_else(|| anyhow!("TLS cert path is required"))?;
        let key = config
            .key
            .as_deref()
            .ok_or_else(|| anyhow!("TLS key path is required"))?;
        let ca = config
            .ca
            .as_deref()
            .ok_or_else(|| anyhow!("TLS ca path is required"))?;

        Self::from_pem(
            &read_file(cert)?,
            &read_file(key)?,
            &read_file(ca)?,
            &config.server_name,
            config.skip_verify,
        )
    }

    /// Build a provider from in-memory PEM data
    pub fn from_pem(
        cert_pem: &[u8],
        key_pem: &[u8],
        ca_pem: &[u8],
        server_name: &str,
        skip_verify: bool,
    ) -> Result<Self> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| "Failed to parse certificate chain")?;
        if certs.is_empty() {
            return Err(anyhow!("No certificate found in PEM data"));
        }

        let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
            .with_context(|| "Failed to parse private key")?
            .ok_or_else(|| anyhow!("No private key found in PEM data"))?;

        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut BufReader::new(ca_pem)) {
            let cert = cert.with_context(|| "Failed to parse CA certificate")?;
            roots
                .add(cert)
                .with_context(|| "Failed to add certificate to store")?;
        }
        if roots.is_empty() {
            return Err(anyhow!("No CA certificate found in PEM data"));
        }

        Ok(TlsProvider {
            certs,
            key,
            roots: Arc::new(roots),
            server_name: server_name.to_string(),
            skip_verify,
            provider: Arc::new(crypto::ring::default_provider()),
        })
    }

    /// Name the client expects in the server certificate
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Client configuration: presents our certificate; verifies the server
    /// against the trust anchors unless `skip_verify` is set
    pub fn client_config(&self) -> Result<ClientConfig> {
        let builder = ClientConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(&[&version::TLS13])
            .with_context(|| "Failed to select TLS 1.3")?;

        let builder = if self.skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier::new(self.provider.clone())))
        } else {
            builder.with_root_certificates(self.roots.clone())
        };

        let mut config = builder
            .with_client_auth_cert(self.certs.clone(), self.key.clone_key())
            .with_context(|| "Invalid client certificate or key")?;
        config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

        Ok(config)
    }

    /// Server configuration: requires a client certificate issued by one of
    /// the trust anchors
    pub fn server_config(&self) -> Result<ServerConfig> {
        let verifier =
            WebPkiClientVerifier::builder_with_provider(self.roots.clone(), self.provider.clone())
                .build()
                .with_context(|| "Failed to build client certificate verifier")?;

        let mut config = ServerConfig::builder_with_provider(self.provider.clone())
            .with_protocol_versions(&[&version::TLS13])
            .with_context(|| "Failed to select TLS 1.3")?
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.certs.clone(), self.key.clone_key())
            .with_context(|| "Invalid server certificate or key")?;
        config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

        Ok(config)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Server verifier that accepts any certificate but still checks the
/// handshake signature
#[derive(Debug)]
struct NoVerifier {
    provider: Arc<CryptoProvider>,
}

impl NoVerifier {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        NoVerifier { provider }
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn config(cert: &str, key: &str) -> TlsConfig {
        TlsConfig {
            cert: Some(fixture(cert)),
            key: Some(fixture(key)),
            ca: Some(fixture("ca.pem")),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_from_config() {
        let provider = TlsProvider::from_config(&config("client.pem", "client.key")).unwrap();
        assert_eq!(provider.server_name(), "localhost");
        assert_eq!(provider.certs.len(), 1);
    }

    #[test]
    fn test_client_config_has_alpn() {
        let provider = TlsProvider::from_config(&config("client.pem", "client.key")).unwrap();
        let client = provider.client_config().unwrap();
        assert_eq!(client.alpn_protocols, vec![ALPN_PROTOCOL.to_vec()]);
    }

    #[test]
    fn test_client_config_with_verification() {
        let mut tls = config("client.pem", "client.key");
        tls.skip_verify = false;
        let provider = TlsProvider::from_config(&tls).unwrap();
        assert!(provider.client_config().is_ok());
    }

    #[test]
    fn test_server_config_has_alpn() {
        let provider = TlsProvider::from_config(&config("server.pem", "server.key")).unwrap();
        let server = provider.server_config().unwrap();
        assert_eq!(server.alpn_protocols, vec![ALPN_PROTOCOL.to_vec()]);
    }

    #[test]
    fn test_provider_missing_file() {
        let mut tls = config("client.pem", "client.key");
        tls.ca = Some(fixture("missing.pem"));
        let err = TlsProvider::from_config(&tls).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read"));
    }

    #[test]
    fn test_provider_requires_paths() {
        assert!(TlsProvider::from_config(&TlsConfig::default()).is_err());
    }

    #[test]
    fn test_provider_rejects_empty_pem() {
        let err = TlsProvider::from_pem(b"", b"", b"", "localhost", true).unwrap_err();
        assert!(err.to_string().contains("No certificate"));
    }
}
