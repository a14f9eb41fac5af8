//! The rustls-backed platform engine: synchronous TLS over `TcpStream`
//! with chain validation delegated to webpki and revocation answered
//! from the trust chain's static CRL set.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, ClientConfig, ClientConnection, ServerConfig, ServerConnection};
use tracing::{debug, warn};

use super::{
    ContextSettings, SslServerSocket, SslServerSocketFactory, SslSocket, SslSocketFactory,
    TlsContext, TlsEngine,
};
use crate::error::SslError;
use crate::material::{KeyMaterial, TrustChain};
use crate::x509::{Certificate, Crl};

/// The default engine: rustls with its ring provider.
#[derive(Debug, Default)]
pub struct RustlsEngine;

impl TlsEngine for RustlsEngine {
    fn init(
        &self,
        settings: &ContextSettings,
        trust: &TrustChain,
        key: Option<&KeyMaterial>,
    ) -> Result<Arc<dyn TlsContext>, SslError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = versions_for_protocol(&settings.default_protocol)?;

        let key_pair = key.map(|material| {
            let entry = material.primary();
            let chain: Vec<CertificateDer<'static>> = entry
                .chain
                .iter()
                .map(|c| CertificateDer::from(c.der().to_vec()))
                .collect();
            let key =
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(entry.key.pkcs8_der().to_vec()));
            (chain, key)
        });

        // With no trust material configured the platform default roots
        // apply, the way the platform's own factories behave.
        let anchor_source = if trust.anchors().is_empty() {
            AnchorSource::Builtin
        } else {
            AnchorSource::Certificates(
                trust
                    .anchors()
                    .iter()
                    .map(|c| CertificateDer::from(c.der().to_vec()))
                    .collect(),
            )
        };
        let verifier = Arc::new(PeerVerifier {
            provider: provider.clone(),
            permissive: trust.contains_trust_all() || !settings.do_verify,
            anchor_source,
            crls: trust.crls().into_iter().cloned().collect(),
            check_crl: settings.check_crl,
        });

        let inner = Arc::new(ContextInner {
            provider,
            versions,
            verifier,
            key_pair,
        });

        // Build a probe configuration now so defective key material or an
        // unusable protocol set explodes at init time, typed.
        inner.client_config(None, None)?;
        if inner.key_pair.is_some() {
            inner.server_config(None, None, false, false)?;
        }
        debug!(
            protocol = %settings.default_protocol,
            permissive = inner.verifier.permissive,
            "TLS context materialized"
        );
        Ok(Arc::new(RustlsContext { inner }))
    }

    fn supported_ciphers(&self) -> Vec<String> {
        rustls::crypto::ring::default_provider()
            .cipher_suites
            .iter()
            .map(suite_name)
            .collect()
    }
}

fn suite_name(suite: &rustls::SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

fn versions_for_protocol(
    protocol: &str,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, SslError> {
    match protocol {
        "TLS" | "SSL" => Ok(vec![&rustls::version::TLS13, &rustls::version::TLS12]),
        "TLSv1.3" => Ok(vec![&rustls::version::TLS13]),
        "TLSv1.2" => Ok(vec![&rustls::version::TLS12]),
        other => Err(SslError::PlatformFailure(format!(
            "protocol {other} is not supported by this platform"
        ))),
    }
}

#[derive(Debug)]
struct ContextInner {
    provider: Arc<CryptoProvider>,
    versions: Vec<&'static rustls::SupportedProtocolVersion>,
    verifier: Arc<PeerVerifier>,
    key_pair: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl ContextInner {
    fn effective_provider(
        &self,
        ciphers: Option<&[String]>,
    ) -> Result<Arc<CryptoProvider>, SslError> {
        let Some(wanted) = ciphers else {
            return Ok(self.provider.clone());
        };
        let suites: Vec<_> = self
            .provider
            .cipher_suites
            .iter()
            .filter(|s| wanted.iter().any(|w| *w == suite_name(s)))
            .copied()
            .collect();
        if suites.is_empty() {
            return Err(SslError::PlatformFailure(
                "no enabled cipher suite is usable".into(),
            ));
        }
        Ok(Arc::new(CryptoProvider {
            cipher_suites: suites,
            ..(*self.provider).clone()
        }))
    }

    fn effective_versions(
        &self,
        protocols: Option<&[String]>,
    ) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, SslError> {
        let Some(wanted) = protocols else {
            return Ok(self.versions.clone());
        };
        let versions: Vec<_> = self
            .versions
            .iter()
            .filter(|v| {
                let name = match v.version {
                    rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3",
                    rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2",
                    _ => return false,
                };
                wanted.iter().any(|w| w == name)
            })
            .copied()
            .collect();
        if versions.is_empty() {
            return Err(SslError::PlatformFailure(
                "no enabled protocol is usable on this platform".into(),
            ));
        }
        Ok(versions)
    }

    fn client_config(
        &self,
        protocols: Option<&[String]>,
        ciphers: Option<&[String]>,
    ) -> Result<ClientConfig, SslError> {
        let provider = self.effective_provider(ciphers)?;
        let versions = self.effective_versions(protocols)?;
        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|e| SslError::PlatformFailure(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(self.verifier.clone());
        match &self.key_pair {
            Some((chain, key)) => builder
                .with_client_auth_cert(chain.clone(), key.clone_key())
                .map_err(|e| SslError::PlatformFailure(e.to_string())),
            None => Ok(builder.with_no_client_auth()),
        }
    }

    fn server_config(
        &self,
        protocols: Option<&[String]>,
        ciphers: Option<&[String]>,
        want_client_auth: bool,
        need_client_auth: bool,
    ) -> Result<ServerConfig, SslError> {
        let (chain, key) = self.key_pair.as_ref().ok_or_else(|| {
            SslError::PlatformFailure("server context requires key material".into())
        })?;
        let provider = self.effective_provider(ciphers)?;
        let versions = self.effective_versions(protocols)?;
        let builder = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|e| SslError::PlatformFailure(e.to_string()))?;
        let builder = if want_client_auth || need_client_auth {
            builder.with_client_cert_verifier(Arc::new(ClientAuthVerifier {
                peer: self.verifier.clone(),
                mandatory: need_client_auth,
            }))
        } else {
            builder.with_no_client_auth()
        };
        builder
            .with_single_cert(chain.clone(), key.clone_key())
            .map_err(|e| SslError::PlatformFailure(e.to_string()))
    }
}

/// The context handle returned to the configuration core.
struct RustlsContext {
    inner: Arc<ContextInner>,
}

impl TlsContext for RustlsContext {
    fn socket_factory(&self) -> Result<Arc<dyn SslSocketFactory>, SslError> {
        Ok(Arc::new(RustlsSocketFactory {
            inner: self.inner.clone(),
        }))
    }

    fn server_socket_factory(&self) -> Result<Arc<dyn SslServerSocketFactory>, SslError> {
        Ok(Arc::new(RustlsServerSocketFactory {
            inner: self.inner.clone(),
        }))
    }
}

#[derive(Debug)]
struct RustlsSocketFactory {
    inner: Arc<ContextInner>,
}

impl SslSocketFactory for RustlsSocketFactory {
    fn create_socket(&self) -> Result<Box<dyn SslSocket>, SslError> {
        Ok(Box::new(RustlsSocket {
            inner: self.inner.clone(),
            state: SocketState::Unconnected,
            so_timeout_ms: None,
            enabled_protocols: None,
            enabled_ciphers: None,
        }))
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        self.inner.provider.cipher_suites.iter().map(suite_name).collect()
    }
}

struct RustlsServerSocketFactory {
    inner: Arc<ContextInner>,
}

impl SslServerSocketFactory for RustlsServerSocketFactory {
    fn create_server_socket(
        &self,
        bind: SocketAddr,
    ) -> Result<Box<dyn SslServerSocket>, SslError> {
        let listener = TcpListener::bind(bind)?;
        Ok(Box::new(RustlsServerSocket {
            inner: self.inner.clone(),
            listener,
            want_client_auth: false,
            need_client_auth: false,
            so_timeout_ms: None,
            enabled_protocols: None,
            enabled_ciphers: None,
            cached_config: None,
        }))
    }
}

enum SocketState {
    Unconnected,
    Client(rustls::StreamOwned<ClientConnection, TcpStream>),
    Server(rustls::StreamOwned<ServerConnection, TcpStream>),
    Closed,
}

struct RustlsSocket {
    inner: Arc<ContextInner>,
    state: SocketState,
    so_timeout_ms: Option<u64>,
    enabled_protocols: Option<Vec<String>>,
    enabled_ciphers: Option<Vec<String>>,
}

impl RustlsSocket {
    fn tcp(&self) -> Option<&TcpStream> {
        match &self.state {
            SocketState::Client(s) => Some(s.get_ref()),
            SocketState::Server(s) => Some(s.get_ref()),
            _ => None,
        }
    }

    fn peer_der(&self) -> Option<Vec<Vec<u8>>> {
        let certs = match &self.state {
            SocketState::Client(s) => s.conn.peer_certificates(),
            SocketState::Server(s) => s.conn.peer_certificates(),
            _ => None,
        };
        certs.map(|c| c.iter().map(|d| d.as_ref().to_vec()).collect())
    }
}

impl Read for RustlsSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.state {
            SocketState::Client(s) => s.read(buf),
            SocketState::Server(s) => s.read(buf),
            _ => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

impl Write for RustlsSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            SocketState::Client(s) => s.write(buf),
            SocketState::Server(s) => s.write(buf),
            _ => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            SocketState::Client(s) => s.flush(),
            SocketState::Server(s) => s.flush(),
            _ => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

impl SslSocket for RustlsSocket {
    fn set_so_timeout(&mut self, ms: u64) -> Result<(), SslError> {
        self.so_timeout_ms = Some(ms);
        if let Some(tcp) = self.tcp() {
            apply_so_timeout(tcp, ms)?;
        }
        Ok(())
    }

    fn set_enabled_protocols(&mut self, protocols: &[String]) -> Result<(), SslError> {
        if matches!(self.state, SocketState::Unconnected) {
            self.enabled_protocols = Some(protocols.to_vec());
            Ok(())
        } else {
            Err(SslError::PlatformFailure(
                "protocols are fixed once the handshake ran".into(),
            ))
        }
    }

    fn set_enabled_ciphers(&mut self, ciphers: &[String]) -> Result<(), SslError> {
        if matches!(self.state, SocketState::Unconnected) {
            self.enabled_ciphers = Some(ciphers.to_vec());
            Ok(())
        } else {
            Err(SslError::PlatformFailure(
                "cipher suites are fixed once the handshake ran".into(),
            ))
        }
    }

    fn set_use_client_mode(&mut self, client_mode: bool) -> Result<(), SslError> {
        // Sockets from the client factory are client-mode by construction.
        if client_mode {
            Ok(())
        } else {
            Err(SslError::PlatformFailure(
                "this platform cannot switch a client socket to server mode".into(),
            ))
        }
    }

    fn connect(
        &mut self,
        remote_host: &str,
        remote_port: u16,
        local: Option<SocketAddr>,
        connect_timeout_ms: u64,
    ) -> Result<(), SslError> {
        if !matches!(self.state, SocketState::Unconnected) {
            return Err(SslError::PlatformFailure("socket already connected".into()));
        }

        let tcp = open_tcp(remote_host, remote_port, local, connect_timeout_ms)?;
        if let Some(ms) = self.so_timeout_ms {
            apply_so_timeout(&tcp, ms)?;
        }

        let config = self.inner.client_config(
            self.enabled_protocols.as_deref(),
            self.enabled_ciphers.as_deref(),
        )?;
        let server_name = ServerName::try_from(remote_host.to_string())
            .map_err(|e| SslError::InvalidArgument(format!("bad hostname {remote_host}: {e}")))?;
        let conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(map_tls_error)?;
        let mut stream = rustls::StreamOwned::new(conn, tcp);
        complete_handshake(&mut stream.conn, &mut stream.sock)?;
        debug!(host = remote_host, port = remote_port, "TLS client handshake complete");
        self.state = SocketState::Client(stream);
        Ok(())
    }

    fn peer_certificate_chain(&self) -> Result<Vec<Certificate>, SslError> {
        match self.peer_der() {
            Some(ders) => ders
                .iter()
                .map(|der| Certificate::from_der(der))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> Result<(), SslError> {
        match std::mem::replace(&mut self.state, SocketState::Closed) {
            SocketState::Client(mut s) => {
                s.conn.send_close_notify();
                let _ = s.flush();
                let _ = s.sock.shutdown(std::net::Shutdown::Both);
            }
            SocketState::Server(mut s) => {
                s.conn.send_close_notify();
                let _ = s.flush();
                let _ = s.sock.shutdown(std::net::Shutdown::Both);
            }
            _ => {}
        }
        Ok(())
    }
}

struct RustlsServerSocket {
    inner: Arc<ContextInner>,
    listener: TcpListener,
    want_client_auth: bool,
    need_client_auth: bool,
    so_timeout_ms: Option<u64>,
    enabled_protocols: Option<Vec<String>>,
    enabled_ciphers: Option<Vec<String>>,
    cached_config: Option<Arc<ServerConfig>>,
}

impl SslServerSocket for RustlsServerSocket {
    fn set_so_timeout(&mut self, ms: u64) -> Result<(), SslError> {
        self.so_timeout_ms = Some(ms);
        Ok(())
    }

    fn set_enabled_protocols(&mut self, protocols: &[String]) -> Result<(), SslError> {
        self.enabled_protocols = Some(protocols.to_vec());
        self.cached_config = None;
        Ok(())
    }

    fn set_enabled_ciphers(&mut self, ciphers: &[String]) -> Result<(), SslError> {
        self.enabled_ciphers = Some(ciphers.to_vec());
        self.cached_config = None;
        Ok(())
    }

    fn set_want_client_auth(&mut self, want: bool) {
        self.want_client_auth = want;
        self.cached_config = None;
    }

    fn set_need_client_auth(&mut self, need: bool) {
        self.need_client_auth = need;
        self.cached_config = None;
    }

    fn want_client_auth(&self) -> bool {
        self.want_client_auth
    }

    fn need_client_auth(&self) -> bool {
        self.need_client_auth
    }

    fn local_addr(&self) -> Result<SocketAddr, SslError> {
        Ok(self.listener.local_addr()?)
    }

    fn accept(&mut self) -> Result<Box<dyn SslSocket>, SslError> {
        let config = match &self.cached_config {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(self.inner.server_config(
                    self.enabled_protocols.as_deref(),
                    self.enabled_ciphers.as_deref(),
                    self.want_client_auth,
                    self.need_client_auth,
                )?);
                self.cached_config = Some(config.clone());
                config
            }
        };

        let (tcp, peer) = self.listener.accept()?;
        // The I/O timeout governs the accepted stream, handshake included.
        if let Some(ms) = self.so_timeout_ms {
            apply_so_timeout(&tcp, ms)?;
        }
        let conn = ServerConnection::new(config).map_err(map_tls_error)?;
        let mut stream = rustls::StreamOwned::new(conn, tcp);
        complete_handshake(&mut stream.conn, &mut stream.sock)?;
        debug!(%peer, "TLS server handshake complete");
        Ok(Box::new(RustlsSocket {
            inner: self.inner.clone(),
            state: SocketState::Server(stream),
            so_timeout_ms: self.so_timeout_ms,
            enabled_protocols: None,
            enabled_ciphers: None,
        }))
    }
}

fn open_tcp(
    host: &str,
    port: u16,
    local: Option<SocketAddr>,
    connect_timeout_ms: u64,
) -> Result<TcpStream, SslError> {
    let mut last_error: Option<io::Error> = None;
    for addr in (host, port).to_socket_addrs()? {
        let attempt = if let Some(local) = local {
            bind_and_connect(addr, local, connect_timeout_ms)
        } else if connect_timeout_ms > 0 {
            TcpStream::connect_timeout(&addr, Duration::from_millis(connect_timeout_ms))
        } else {
            TcpStream::connect(addr)
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error
        .map(SslError::Io)
        .unwrap_or_else(|| SslError::InvalidArgument(format!("{host} resolved to no address"))))
}

fn bind_and_connect(
    remote: SocketAddr,
    local: SocketAddr,
    connect_timeout_ms: u64,
) -> io::Result<TcpStream> {
    let domain = socket2::Domain::for_address(remote);
    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, None)?;
    socket.bind(&local.into())?;
    if connect_timeout_ms > 0 {
        socket.connect_timeout(&remote.into(), Duration::from_millis(connect_timeout_ms))?;
    } else {
        socket.connect(&remote.into())?;
    }
    Ok(socket.into())
}

fn apply_so_timeout(tcp: &TcpStream, ms: u64) -> Result<(), SslError> {
    let timeout = (ms > 0).then(|| Duration::from_millis(ms));
    tcp.set_read_timeout(timeout)?;
    tcp.set_write_timeout(timeout)?;
    Ok(())
}

/// Drives the handshake to completion so the peer chain is available as
/// soon as connect/accept returns.
fn complete_handshake<Data>(
    conn: &mut rustls::ConnectionCommon<Data>,
    sock: &mut TcpStream,
) -> Result<(), SslError> {
    while conn.is_handshaking() {
        conn.complete_io(sock).map_err(map_handshake_io)?;
    }
    Ok(())
}

fn map_tls_error(error: rustls::Error) -> SslError {
    match error {
        rustls::Error::InvalidCertificate(cert_error) => match cert_error {
            CertificateError::Revoked => SslError::TrustFailure("revoked".into()),
            CertificateError::UnknownRevocationStatus => {
                SslError::TrustFailure("crl_unavailable".into())
            }
            other => SslError::TrustFailure(format!("{other:?}")),
        },
        other => SslError::PlatformFailure(other.to_string()),
    }
}

fn map_handshake_io(error: io::Error) -> SslError {
    if error.kind() == io::ErrorKind::InvalidData {
        if let Some(inner) = error
            .get_ref()
            .and_then(|r| r.downcast_ref::<rustls::Error>())
        {
            return map_tls_error(inner.clone());
        }
    }
    SslError::Io(error)
}

/// Where the verifier's trust anchors come from.
#[derive(Debug)]
enum AnchorSource {
    /// Anchors parsed from configured trust material.
    Certificates(Vec<CertificateDer<'static>>),
    /// The platform's builtin web roots; used when no material is set.
    Builtin,
}

/// Server-certificate verifier: permissive for trust-all or disabled
/// verification, webpki chain validation otherwise. Hostname checking is
/// deliberately not done here; it runs post-connect (see `verify`).
#[derive(Debug)]
struct PeerVerifier {
    provider: Arc<CryptoProvider>,
    permissive: bool,
    anchor_source: AnchorSource,
    crls: Vec<Crl>,
    check_crl: bool,
}

impl PeerVerifier {
    fn verify_chain(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
        usage: webpki::KeyUsage,
    ) -> Result<(), rustls::Error> {
        if self.permissive {
            return Ok(());
        }
        let anchors: Vec<_> = match &self.anchor_source {
            AnchorSource::Builtin => webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            AnchorSource::Certificates(ders) => ders
                .iter()
                .filter_map(|der| webpki::anchor_from_trusted_cert(der).ok())
                .collect(),
        };
        if anchors.is_empty() {
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            ));
        }
        let cert = webpki::EndEntityCert::try_from(end_entity)
            .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;
        cert.verify_for_usage(
            self.provider.signature_verification_algorithms.all,
            &anchors,
            intermediates,
            now,
            usage,
            None,
            None,
        )
        .map_err(map_webpki_error)?;

        if self.check_crl && !self.crls.is_empty() {
            self.check_revocation(end_entity)?;
        }
        Ok(())
    }

    /// Static CRL lookup: the end entity's serial against every list
    /// issued by its issuer. Absence from the set means not revoked.
    fn check_revocation(&self, end_entity: &CertificateDer<'_>) -> Result<(), rustls::Error> {
        let parsed = Certificate::from_der(end_entity.as_ref())
            .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;
        let mut issuer_covered = false;
        for crl in &self.crls {
            if crl.issuer != parsed.issuer {
                continue;
            }
            issuer_covered = true;
            if crl.find_revoked(&parsed.serial).is_some() {
                warn!(serial = %parsed.serial_hex(), "peer certificate is revoked");
                return Err(rustls::Error::InvalidCertificate(CertificateError::Revoked));
            }
        }
        if !issuer_covered {
            debug!("no CRL covers the peer's issuer; static lookup passes");
        }
        Ok(())
    }
}

fn map_webpki_error(error: webpki::Error) -> rustls::Error {
    let cert_error = match error {
        webpki::Error::CertExpired => CertificateError::Expired,
        webpki::Error::CertNotValidYet => CertificateError::NotValidYet,
        webpki::Error::UnknownIssuer => CertificateError::UnknownIssuer,
        webpki::Error::CertRevoked => CertificateError::Revoked,
        other => return rustls::Error::General(format!("certificate verification: {other}")),
    };
    rustls::Error::InvalidCertificate(cert_error)
}

impl ServerCertVerifier for PeerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.verify_chain(end_entity, intermediates, now, webpki::KeyUsage::server_auth())?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client-certificate verifier for server sockets. `mandatory` mirrors
/// need-client-auth; a verifier is only installed when want or need is
/// set.
#[derive(Debug)]
struct ClientAuthVerifier {
    peer: Arc<PeerVerifier>,
    mandatory: bool,
}

impl ClientCertVerifier for ClientAuthVerifier {
    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.peer
            .verify_chain(end_entity, intermediates, now, webpki::KeyUsage::client_auth())?;
        Ok(ClientCertVerified::assertion())
    }

    fn client_auth_mandatory(&self) -> bool {
        self.mandatory
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.peer.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.peer.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.peer.supported_verify_schemes()
    }
}
