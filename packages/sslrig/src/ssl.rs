//! The stateful SSL configuration core: accumulates trust, key, cipher,
//! protocol and client-auth settings, lazily materializes a coherent TLS
//! context, and produces decorated client and server sockets.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::{debug, warn};

use crate::error::SslError;
use crate::material::{KeyMaterial, TrustChain, TrustMaterial};
use crate::platform::rustls_engine::RustlsEngine;
use crate::platform::{
    ContextSettings, SslServerSocket, SslServerSocketFactory, SslSocket, SslSocketFactory,
    TlsContext, TlsEngine,
};
use crate::verify::verify_hostname_in_chain;
use crate::wrapper::{IdentityWrapperFactory, SslWrapperFactory};
use crate::x509::Certificate;

/// Protocol names the configuration accepts, reverse-sorted. The legacy
/// names stay listed even though the platform no longer negotiates them.
pub const KNOWN_PROTOCOLS: &[&str] = &[
    "TLSv1.3",
    "TLSv1.2",
    "TLSv1.1",
    "TLSv1",
    "SSLv3",
    "SSLv2Hello",
    "SSLv2",
];

/// The first five rebuilds happen eagerly, so configuration mistakes
/// surface with their typed error at configuration time.
const EAGER_INIT_LIMIT: u32 = 5;

static SUPPORTED_CIPHERS: OnceLock<BTreeSet<String>> = OnceLock::new();

/// The process-wide cipher catalog, pulled from the platform default
/// provider on first access and frozen.
pub fn supported_ciphers_set() -> &'static BTreeSet<String> {
    SUPPORTED_CIPHERS.get_or_init(|| RustlsEngine.supported_ciphers().into_iter().collect())
}

fn known_protocols_set() -> BTreeSet<&'static str> {
    KNOWN_PROTOCOLS.iter().copied().collect()
}

struct SslState {
    trust_chain: Option<TrustChain>,
    key_material: Option<Arc<KeyMaterial>>,
    enabled_ciphers: Option<Vec<String>>,
    enabled_protocols: Option<Vec<String>>,
    default_protocol: String,
    do_verify: bool,
    check_crl: bool,
    /// `None` leaves the platform's own client/server-mode default alone.
    use_client_mode: Option<bool>,
    so_timeout_ms: u64,
    connect_timeout_ms: u64,
    want_client_auth: bool,
    need_client_auth: bool,
    wrapper_factory: Arc<dyn SslWrapperFactory>,
    current_server_chain: Option<Vec<Certificate>>,
    current_client_chain: Option<Vec<Certificate>>,
    context: Option<Arc<dyn TlsContext>>,
    socket_factory: Option<Arc<dyn SslSocketFactory>>,
    server_socket_factory: Option<Arc<dyn SslServerSocketFactory>>,
    init_count: u32,
}

/// The user-facing configuration object. Safe to share across threads;
/// every mutator and every context-derived accessor takes the instance
/// lock.
pub struct Ssl {
    engine: Arc<dyn TlsEngine>,
    state: Mutex<SslState>,
}

impl Ssl {
    /// A configuration over the default (rustls) engine, with the
    /// context built once so early mistakes explode here.
    pub fn new() -> Result<Self, SslError> {
        Self::with_engine(Arc::new(RustlsEngine))
    }

    /// A configuration over a caller-supplied engine.
    pub fn with_engine(engine: Arc<dyn TlsEngine>) -> Result<Self, SslError> {
        let ssl = Ssl {
            engine,
            state: Mutex::new(SslState {
                trust_chain: None,
                key_material: None,
                enabled_ciphers: None,
                enabled_protocols: None,
                default_protocol: "TLS".into(),
                do_verify: true,
                check_crl: true,
                use_client_mode: None,
                so_timeout_ms: 24 * 60 * 60 * 1000,
                connect_timeout_ms: 60 * 60 * 1000,
                want_client_auth: true,
                need_client_auth: false,
                wrapper_factory: Arc::new(IdentityWrapperFactory),
                current_server_chain: None,
                current_client_chain: None,
                context: None,
                socket_factory: None,
                server_socket_factory: None,
                init_count: 0,
            }),
        };
        {
            let mut state = ssl.lock();
            ssl.dirty_and_reload_if_young(&mut state)?;
        }
        Ok(ssl)
    }

    fn lock(&self) -> MutexGuard<'_, SslState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("configuration lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn dirty(state: &mut SslState) {
        state.context = None;
        state.socket_factory = None;
        state.server_socket_factory = None;
    }

    /// The first few rebuilds run eagerly so bad material explodes nice
    /// and early with its typed error; later reconfigurations stay lazy
    /// and the build happens just before the next socket.
    fn dirty_and_reload_if_young(&self, state: &mut SslState) -> Result<(), SslError> {
        Self::dirty(state);
        if state.init_count <= EAGER_INIT_LIMIT {
            self.init(state)?;
        }
        Ok(())
    }

    fn init(&self, state: &mut SslState) -> Result<(), SslError> {
        state.socket_factory = None;
        state.server_socket_factory = None;
        let settings = ContextSettings {
            default_protocol: state.default_protocol.clone(),
            do_verify: state.do_verify,
            check_crl: state.check_crl,
        };
        let empty;
        let trust = match &state.trust_chain {
            Some(chain) => chain,
            None => {
                empty = TrustChain::new();
                &empty
            }
        };
        state.context = Some(self.engine.init(
            &settings,
            trust,
            state.key_material.as_deref(),
        )?);
        state.init_count += 1;
        debug!(init_count = state.init_count, "TLS context (re)built");
        Ok(())
    }

    // ---- trust & key material ----

    /// Unions trust material in; an empty configuration or the trust-all
    /// sentinel replaces instead.
    pub fn add_trust_material(&self, material: TrustMaterial) -> Result<(), SslError> {
        let mut state = self.lock();
        match &mut state.trust_chain {
            Some(chain) if !material.contains_trust_all() => chain.add(material),
            _ => state.trust_chain = Some(material),
        }
        self.dirty_and_reload_if_young(&mut state)
    }

    pub fn set_trust_material(&self, material: TrustMaterial) -> Result<(), SslError> {
        let mut state = self.lock();
        state.trust_chain = Some(material);
        self.dirty_and_reload_if_young(&mut state)
    }

    pub fn set_key_material(&self, material: KeyMaterial) -> Result<(), SslError> {
        let mut state = self.lock();
        state.key_material = Some(Arc::new(material));
        self.dirty_and_reload_if_young(&mut state)
    }

    pub fn get_trust_chain(&self) -> Option<TrustChain> {
        self.lock().trust_chain.clone()
    }

    /// The certificate chain the context presents, when key material is
    /// set.
    pub fn get_associated_certificate_chain(&self) -> Option<Vec<Certificate>> {
        self.lock()
            .key_material
            .as_ref()
            .map(|m| m.associated_certificate_chain().to_vec())
    }

    // ---- ciphers & protocols ----

    pub fn get_enabled_ciphers(&self) -> Result<Vec<String>, SslError> {
        if let Some(ciphers) = self.lock().enabled_ciphers.clone() {
            return Ok(ciphers);
        }
        self.get_default_cipher_suites()
    }

    /// Enables a cipher list, which must be a subset of the platform
    /// catalog. Applied per-socket; the context is not rebuilt for it.
    pub fn set_enabled_ciphers(&self, ciphers: &[String]) -> Result<(), SslError> {
        let catalog = supported_ciphers_set();
        let unsupported: Vec<&String> =
            ciphers.iter().filter(|c| !catalog.contains(*c)).collect();
        if !unsupported.is_empty() {
            let names: Vec<&str> = unsupported.iter().map(|s| s.as_str()).collect();
            return Err(SslError::InvalidArgument(format!(
                "following ciphers not supported: {names:?}"
            )));
        }
        let mut state = self.lock();
        state.enabled_ciphers = Some(ciphers.to_vec());
        Self::dirty(&mut state);
        Ok(())
    }

    pub fn get_enabled_protocols(&self) -> Vec<String> {
        self.lock()
            .enabled_protocols
            .clone()
            .unwrap_or_else(|| KNOWN_PROTOCOLS.iter().map(|s| s.to_string()).collect())
    }

    /// Enables a protocol list, which must be a subset of
    /// [`KNOWN_PROTOCOLS`]. Applied per-socket.
    pub fn set_enabled_protocols(&self, protocols: &[String]) -> Result<(), SslError> {
        let catalog = known_protocols_set();
        let unsupported: Vec<&String> = protocols
            .iter()
            .filter(|p| !catalog.contains(p.as_str()))
            .collect();
        if !unsupported.is_empty() {
            let names: Vec<&str> = unsupported.iter().map(|s| s.as_str()).collect();
            return Err(SslError::InvalidArgument(format!(
                "following protocols not supported: {names:?}"
            )));
        }
        let mut state = self.lock();
        state.enabled_protocols = Some(protocols.to_vec());
        Self::dirty(&mut state);
        Ok(())
    }

    pub fn get_default_protocol(&self) -> String {
        self.lock().default_protocol.clone()
    }

    /// The context is built for this protocol name, so changing it marks
    /// the configuration dirty.
    pub fn set_default_protocol(&self, protocol: &str) {
        let mut state = self.lock();
        state.default_protocol = protocol.to_string();
        Self::dirty(&mut state);
    }

    pub fn get_default_cipher_suites(&self) -> Result<Vec<String>, SslError> {
        Ok(self.get_ssl_socket_factory()?.default_cipher_suites())
    }

    pub fn get_supported_cipher_suites(&self) -> Vec<String> {
        supported_ciphers_set().iter().cloned().collect()
    }

    // ---- scalar settings ----

    pub fn get_do_verify(&self) -> bool {
        self.lock().do_verify
    }

    pub fn set_do_verify(&self, do_verify: bool) {
        let mut state = self.lock();
        state.do_verify = do_verify;
        // The platform bakes verification policy into the context.
        Self::dirty(&mut state);
    }

    pub fn get_check_crl(&self) -> bool {
        self.lock().check_crl
    }

    pub fn set_check_crl(&self, check_crl: bool) {
        let mut state = self.lock();
        state.check_crl = check_crl;
        Self::dirty(&mut state);
    }

    pub fn get_so_timeout(&self) -> u64 {
        self.lock().so_timeout_ms
    }

    pub fn set_so_timeout(&self, ms: u64) {
        self.lock().so_timeout_ms = ms;
    }

    pub fn get_connect_timeout(&self) -> u64 {
        self.lock().connect_timeout_ms
    }

    pub fn set_connect_timeout(&self, ms: u64) {
        self.lock().connect_timeout_ms = ms;
    }

    /// Clears the "not explicitly set" shadow; the mode is applied to
    /// every socket from here on.
    pub fn set_use_client_mode(&self, client_mode: bool) {
        self.lock().use_client_mode = Some(client_mode);
    }

    pub fn get_use_client_mode(&self) -> Option<bool> {
        self.lock().use_client_mode
    }

    pub fn set_want_client_auth(&self, want: bool) {
        self.lock().want_client_auth = want;
    }

    pub fn get_want_client_auth(&self) -> bool {
        self.lock().want_client_auth
    }

    pub fn set_need_client_auth(&self, need: bool) {
        self.lock().need_client_auth = need;
    }

    pub fn get_need_client_auth(&self) -> bool {
        self.lock().need_client_auth
    }

    pub fn set_ssl_wrapper_factory(&self, factory: Arc<dyn SslWrapperFactory>) {
        self.lock().wrapper_factory = factory;
    }

    pub fn get_ssl_wrapper_factory(&self) -> Arc<dyn SslWrapperFactory> {
        self.lock().wrapper_factory.clone()
    }

    /// How many times a context has been built. Monotone.
    pub fn init_count(&self) -> u32 {
        self.lock().init_count
    }

    /// True while no context is materialized (dirty, or never built).
    pub fn is_context_empty(&self) -> bool {
        self.lock().context.is_none()
    }

    // ---- peer chains ----

    pub fn get_current_server_chain(&self) -> Option<Vec<Certificate>> {
        self.lock().current_server_chain.clone()
    }

    pub fn get_current_client_chain(&self) -> Option<Vec<Certificate>> {
        self.lock().current_client_chain.clone()
    }

    pub fn set_current_server_chain(&self, chain: Vec<Certificate>) {
        self.lock().current_server_chain = Some(chain);
    }

    pub fn set_current_client_chain(&self, chain: Vec<Certificate>) {
        self.lock().current_client_chain = Some(chain);
    }

    // ---- factories & sockets ----

    /// The socket factory for the current configuration, building the
    /// context first when it is dirty. After the eager window, this is
    /// where a defective configuration finally surfaces.
    pub fn get_ssl_socket_factory(&self) -> Result<Arc<dyn SslSocketFactory>, SslError> {
        let mut state = self.lock();
        if state.context.is_none() {
            self.init(&mut state)?;
        }
        if let Some(factory) = &state.socket_factory {
            return Ok(factory.clone());
        }
        let context = state.context.clone().ok_or_else(|| {
            SslError::PlatformFailure("context unavailable after init".into())
        })?;
        let factory = context.socket_factory()?;
        state.socket_factory = Some(factory.clone());
        Ok(factory)
    }

    pub fn get_ssl_server_socket_factory(
        &self,
    ) -> Result<Arc<dyn SslServerSocketFactory>, SslError> {
        let mut state = self.lock();
        if state.context.is_none() {
            self.init(&mut state)?;
        }
        if let Some(factory) = &state.server_socket_factory {
            return Ok(factory.clone());
        }
        let context = state.context.clone().ok_or_else(|| {
            SslError::PlatformFailure("context unavailable after init".into())
        })?;
        let factory = context.server_socket_factory()?;
        state.server_socket_factory = Some(factory.clone());
        Ok(factory)
    }

    /// A fresh, unconnected client socket, routed through the wrapper
    /// factory.
    pub fn create_socket(&self) -> Result<Box<dyn SslSocket>, SslError> {
        let socket = self.get_ssl_socket_factory()?.create_socket()?;
        Ok(self.get_ssl_wrapper_factory().wrap(socket))
    }

    /// Connects a client socket to `remote_host:remote_port`, optionally
    /// bound to a local address, applying the configuration before the
    /// handshake and hostname verification after it. A timeout of zero
    /// uses the factory-wide connect timeout.
    pub fn create_socket_to(
        &self,
        remote_host: &str,
        remote_port: u16,
        local: Option<SocketAddr>,
        timeout_ms: u64,
    ) -> Result<Box<dyn SslSocket>, SslError> {
        let factory = self.get_ssl_socket_factory()?;
        let connect_timeout = if timeout_ms == 0 {
            self.get_connect_timeout()
        } else {
            timeout_ms
        };

        let mut socket = factory.create_socket()?;
        self.do_pre_connect_socket_stuff(socket.as_mut())?;
        socket.connect(remote_host, remote_port, local, connect_timeout)?;
        self.do_post_connect_socket_stuff(socket.as_mut(), remote_host)?;
        Ok(self.get_ssl_wrapper_factory().wrap(socket))
    }

    /// A server socket bound to `bind`, with the configuration and the
    /// client-auth policy applied.
    pub fn create_server_socket(
        &self,
        bind: SocketAddr,
    ) -> Result<Box<dyn SslServerSocket>, SslError> {
        let mut server = self
            .get_ssl_server_socket_factory()?
            .create_server_socket(bind)?;
        self.do_pre_connect_server_socket_stuff(server.as_mut())?;
        Ok(server)
    }

    /// Accepts one connection on `server`, records the peer's chain as
    /// the current client chain, and routes the socket through the
    /// wrapper factory.
    pub fn accept(
        &self,
        server: &mut dyn SslServerSocket,
    ) -> Result<Box<dyn SslSocket>, SslError> {
        let socket = server.accept()?;
        let chain = socket.peer_certificate_chain()?;
        if !chain.is_empty() {
            self.set_current_client_chain(chain);
        }
        Ok(self.get_ssl_wrapper_factory().wrap(socket))
    }

    /// Applies the configuration to an unconnected client socket:
    /// explicit client mode first, then I/O timeout, protocols, ciphers.
    pub fn do_pre_connect_socket_stuff(
        &self,
        socket: &mut dyn SslSocket,
    ) -> Result<(), SslError> {
        let (use_client_mode, so_timeout, protocols, ciphers) = {
            let state = self.lock();
            (
                state.use_client_mode,
                state.so_timeout_ms,
                state.enabled_protocols.clone(),
                state.enabled_ciphers.clone(),
            )
        };
        if let Some(mode) = use_client_mode {
            socket.set_use_client_mode(mode)?;
        }
        if so_timeout > 0 {
            socket.set_so_timeout(so_timeout)?;
        }
        if let Some(protocols) = protocols {
            socket.set_enabled_protocols(&protocols)?;
        }
        if let Some(ciphers) = ciphers {
            socket.set_enabled_ciphers(&ciphers)?;
        }
        Ok(())
    }

    /// Post-connect duties: record the peer chain, then verify the
    /// hostname when verification is on. A mismatch closes the socket
    /// before the error propagates.
    pub fn do_post_connect_socket_stuff(
        &self,
        socket: &mut dyn SslSocket,
        host: &str,
    ) -> Result<(), SslError> {
        let chain = socket.peer_certificate_chain()?;
        if !chain.is_empty() {
            self.set_current_server_chain(chain.clone());
        }
        if self.get_do_verify() {
            if let Err(mismatch) = verify_hostname_in_chain(host, &chain) {
                warn!(%host, "hostname verification failed, closing socket");
                socket.close()?;
                return Err(mismatch);
            }
        }
        Ok(())
    }

    /// Applies the configuration to a server socket. The client-auth
    /// flags are written falses first, trues last: clearing "need" on
    /// the platform can silently clear "want", so "true" must win by
    /// going last.
    pub fn do_pre_connect_server_socket_stuff(
        &self,
        server: &mut dyn SslServerSocket,
    ) -> Result<(), SslError> {
        let (so_timeout, protocols, ciphers, want, need) = {
            let state = self.lock();
            (
                state.so_timeout_ms,
                state.enabled_protocols.clone(),
                state.enabled_ciphers.clone(),
                state.want_client_auth,
                state.need_client_auth,
            )
        };
        if so_timeout > 0 {
            server.set_so_timeout(so_timeout)?;
        }
        if let Some(protocols) = protocols {
            server.set_enabled_protocols(&protocols)?;
        }
        if let Some(ciphers) = ciphers {
            server.set_enabled_ciphers(&ciphers)?;
        }

        if !want {
            server.set_want_client_auth(want);
        }
        if !need {
            server.set_need_client_auth(need);
        }
        if want {
            server.set_want_client_auth(want);
        }
        if need {
            server.set_need_client_auth(need);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_protocols_are_reverse_sorted() {
        let mut sorted = KNOWN_PROTOCOLS.to_vec();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(sorted, KNOWN_PROTOCOLS);
    }

    #[test]
    fn legacy_protocol_names_stay_known() {
        let set = known_protocols_set();
        for name in ["TLSv1", "SSLv3", "SSLv2", "SSLv2Hello"] {
            assert!(set.contains(name), "{name} missing from catalog");
        }
    }
}
