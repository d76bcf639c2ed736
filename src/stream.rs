use crate::types::{Http3Error, ProtocolError};
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{Connection, Endpoint, RecvStream, SendStream, VarInt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{DigitallySignedStruct, RootCertStore};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tracing::debug;

pub const ALPN_H3: &[u8] = b"h3";

#[derive(Debug)]
pub struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Wire form of an application error code.
pub(crate) fn error_code(code: Http3Error) -> VarInt {
    VarInt::from_u64(code.code()).unwrap_or(VarInt::MAX)
}

/// Abrupt termination of one stream half with an HTTP/3 error code.
pub trait StreamControl {
    fn abort(&mut self, code: Http3Error);
}

impl StreamControl for SendStream {
    fn abort(&mut self, code: Http3Error) {
        // Already finished or reset streams have nothing left to abort.
        let _ = self.reset(error_code(code));
    }
}

impl StreamControl for RecvStream {
    fn abort(&mut self, code: Http3Error) {
        let _ = self.stop(error_code(code));
    }
}

/// Half-closes the send side. Fails if it was already finished or reset.
pub(crate) fn finish_send(send: &mut SendStream) -> Result<(), ProtocolError> {
    send.finish()
        .map_err(|_| ProtocolError::stream(Http3Error::InternalError, "send side already closed"))
}

fn crypto_error(e: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::ConnectionFailed(format!("TLS configuration: {}", e))
}

/// Client configuration offering ALPN `h3`. With `verify` unset, server
/// certificates are accepted without checks.
pub fn client_config(verify: bool) -> Result<quinn::ClientConfig, ProtocolError> {
    // Ensure a crypto provider is installed (required for rustls >=0.23).
    let _ = default_provider().install_default();

    let builder = rustls::ClientConfig::builder();
    let mut rustls_config = if verify {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
            .with_no_client_auth()
    };
    rustls_config.alpn_protocols = vec![ALPN_H3.to_vec()];

    let quic_crypto = QuicClientConfig::try_from(rustls_config).map_err(crypto_error)?;
    Ok(quinn::ClientConfig::new(Arc::new(quic_crypto)))
}

/// Server configuration offering ALPN `h3` with a single certificate chain.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<quinn::ServerConfig, ProtocolError> {
    let _ = default_provider().install_default();

    let mut rustls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(crypto_error)?;
    rustls_config.alpn_protocols = vec![ALPN_H3.to_vec()];

    let quic_crypto = QuicServerConfig::try_from(rustls_config).map_err(crypto_error)?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic_crypto)))
}

/// Resolves `host` and dials each address in turn, IPv4 first.
pub async fn create_quic_connection(
    host: &str,
    port: u16,
    server_name: &str,
    config: quinn::ClientConfig,
) -> io::Result<Connection> {
    let mut addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("DNS lookup failed for {}:{}: {}", host, port, e),
            )
        })?
        .collect();

    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("No addresses found for {}:{}", host, port),
        ));
    }
    addrs.sort_by_key(|addr| if addr.is_ipv4() { 0 } else { 1 });

    let mut last_error: Option<io::Error> = None;
    for addr in addrs {
        let bind_addr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let mut endpoint = Endpoint::client(bind_addr)?;
        endpoint.set_default_client_config(config.clone());

        debug!(%addr, "dialing");
        match endpoint.connect(addr, server_name) {
            Ok(connecting) => match connecting.await {
                Ok(connection) => return Ok(connection),
                Err(e) => last_error = Some(io::Error::new(io::ErrorKind::ConnectionRefused, e)),
            },
            Err(e) => last_error = Some(io::Error::new(io::ErrorKind::ConnectionRefused, e)),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("Unable to connect to {}:{}", host, port),
        )
    }))
}
