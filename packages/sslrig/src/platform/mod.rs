//! The thin boundary over the platform TLS engine. The configuration
//! core talks only to these traits; the rustls-backed implementation
//! lives in [`rustls_engine`], and tests substitute their own engine.

pub mod rustls_engine;

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::SslError;
use crate::material::{KeyMaterial, TrustChain};
use crate::x509::Certificate;

/// The slice of configuration a context build depends on.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub default_protocol: String,
    pub do_verify: bool,
    pub check_crl: bool,
}

/// The platform TLS engine: builds contexts and reports the cipher
/// catalog.
pub trait TlsEngine: Send + Sync {
    /// Materializes a context from configuration, trust and key material.
    /// Configuration errors (bad key, unknown protocol name) surface
    /// here, typed.
    fn init(
        &self,
        settings: &ContextSettings,
        trust: &TrustChain,
        key: Option<&KeyMaterial>,
    ) -> Result<Arc<dyn TlsContext>, SslError>;

    /// The cipher suites the platform supports, by name.
    fn supported_ciphers(&self) -> Vec<String>;
}

/// A materialized TLS context, from which socket factories derive.
pub trait TlsContext: Send + Sync {
    fn socket_factory(&self) -> Result<Arc<dyn SslSocketFactory>, SslError>;
    fn server_socket_factory(&self) -> Result<Arc<dyn SslServerSocketFactory>, SslError>;
}

pub trait SslSocketFactory: Send + Sync + std::fmt::Debug {
    /// A fresh, unconnected client socket.
    fn create_socket(&self) -> Result<Box<dyn SslSocket>, SslError>;

    /// The ciphers a socket from this factory enables by default.
    fn default_cipher_suites(&self) -> Vec<String>;
}

pub trait SslServerSocketFactory: Send + Sync {
    fn create_server_socket(
        &self,
        bind: SocketAddr,
    ) -> Result<Box<dyn SslServerSocket>, SslError>;
}

/// A client socket. Settings apply before `connect`; I/O and the peer
/// chain are available after.
pub trait SslSocket: Read + Write + Send {
    fn set_so_timeout(&mut self, ms: u64) -> Result<(), SslError>;
    fn set_enabled_protocols(&mut self, protocols: &[String]) -> Result<(), SslError>;
    fn set_enabled_ciphers(&mut self, ciphers: &[String]) -> Result<(), SslError>;
    fn set_use_client_mode(&mut self, client_mode: bool) -> Result<(), SslError>;

    /// Connects, binding `local` first when given, and completes the
    /// handshake. A timeout of zero means no connect deadline.
    fn connect(
        &mut self,
        remote_host: &str,
        remote_port: u16,
        local: Option<SocketAddr>,
        connect_timeout_ms: u64,
    ) -> Result<(), SslError>;

    /// The peer chain negotiated during the handshake, head first.
    fn peer_certificate_chain(&self) -> Result<Vec<Certificate>, SslError>;

    fn close(&mut self) -> Result<(), SslError>;
}

/// A server socket. Client-auth flags apply to subsequent `accept`s.
pub trait SslServerSocket: Send {
    fn set_so_timeout(&mut self, ms: u64) -> Result<(), SslError>;
    fn set_enabled_protocols(&mut self, protocols: &[String]) -> Result<(), SslError>;
    fn set_enabled_ciphers(&mut self, ciphers: &[String]) -> Result<(), SslError>;

    fn set_want_client_auth(&mut self, want: bool);
    fn set_need_client_auth(&mut self, need: bool);
    fn want_client_auth(&self) -> bool;
    fn need_client_auth(&self) -> bool;

    fn local_addr(&self) -> Result<SocketAddr, SslError>;

    /// Accepts one connection and completes its handshake.
    fn accept(&mut self) -> Result<Box<dyn SslSocket>, SslError>;
}
