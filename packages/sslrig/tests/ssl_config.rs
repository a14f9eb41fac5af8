//! Configuration state-machine properties: the eager-then-lazy reload
//! discipline, catalog validation, and the client-auth write ordering,
//! exercised over a scriptable engine.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use sslrig::material::{KeyMaterial, TrustChain};
use sslrig::platform::{
    ContextSettings, SslServerSocket, SslServerSocketFactory, SslSocket, SslSocketFactory,
    TlsContext, TlsEngine,
};
use sslrig::{Ssl, SslError};

#[derive(Default)]
struct MockEngine {
    inits: AtomicU32,
    fail_next: AtomicBool,
}

impl MockEngine {
    fn init_calls(&self) -> u32 {
        self.inits.load(Ordering::SeqCst)
    }

    fn fail_next_init(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl TlsEngine for MockEngine {
    fn init(
        &self,
        _settings: &ContextSettings,
        _trust: &TrustChain,
        _key: Option<&KeyMaterial>,
    ) -> Result<Arc<dyn TlsContext>, SslError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SslError::PlatformFailure("scripted init failure".into()));
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockContext))
    }

    fn supported_ciphers(&self) -> Vec<String> {
        vec!["MOCK_SUITE".into()]
    }
}

struct MockContext;

impl TlsContext for MockContext {
    fn socket_factory(&self) -> Result<Arc<dyn SslSocketFactory>, SslError> {
        Ok(Arc::new(MockSocketFactory))
    }

    fn server_socket_factory(&self) -> Result<Arc<dyn SslServerSocketFactory>, SslError> {
        Err(SslError::PlatformFailure("not modeled".into()))
    }
}

#[derive(Debug)]
struct MockSocketFactory;

impl SslSocketFactory for MockSocketFactory {
    fn create_socket(&self) -> Result<Box<dyn SslSocket>, SslError> {
        Err(SslError::PlatformFailure("not modeled".into()))
    }

    fn default_cipher_suites(&self) -> Vec<String> {
        vec!["MOCK_SUITE".into()]
    }
}

/// A server socket with the platform quirk the write ordering works
/// around: clearing "need" silently clears "want" too.
#[derive(Default)]
struct QuirkyServerSocket {
    want: bool,
    need: bool,
}

impl SslServerSocket for QuirkyServerSocket {
    fn set_so_timeout(&mut self, _ms: u64) -> Result<(), SslError> {
        Ok(())
    }

    fn set_enabled_protocols(&mut self, _protocols: &[String]) -> Result<(), SslError> {
        Ok(())
    }

    fn set_enabled_ciphers(&mut self, _ciphers: &[String]) -> Result<(), SslError> {
        Ok(())
    }

    fn set_want_client_auth(&mut self, want: bool) {
        self.want = want;
    }

    fn set_need_client_auth(&mut self, need: bool) {
        self.need = need;
        if !need {
            // The quirk under test.
            self.want = false;
        }
    }

    fn want_client_auth(&self) -> bool {
        self.want
    }

    fn need_client_auth(&self) -> bool {
        self.need
    }

    fn local_addr(&self) -> Result<SocketAddr, SslError> {
        Err(SslError::PlatformFailure("not bound".into()))
    }

    fn accept(&mut self) -> Result<Box<dyn SslSocket>, SslError> {
        Err(SslError::PlatformFailure("not modeled".into()))
    }
}

fn mock_ssl() -> (Arc<MockEngine>, Ssl) {
    let engine = Arc::new(MockEngine::default());
    let ssl = Ssl::with_engine(engine.clone()).expect("construct");
    (engine, ssl)
}

#[test]
fn construction_builds_eagerly_once() {
    let (engine, ssl) = mock_ssl();
    assert_eq!(engine.init_calls(), 1);
    assert_eq!(ssl.init_count(), 1);
    assert!(!ssl.is_context_empty());
}

#[test]
fn five_reloads_are_eager_then_builds_turn_lazy() {
    let (engine, ssl) = mock_ssl();

    // Five mutations after construction rebuild eagerly.
    for round in 1..=5_u32 {
        ssl.set_trust_material(TrustChain::trust_all()).expect("mutate");
        assert!(!ssl.is_context_empty(), "round {round} should rebuild");
        assert_eq!(ssl.init_count(), round + 1);
    }
    assert_eq!(engine.init_calls(), 6);

    // The sixth mutation leaves the context empty until a socket asks.
    ssl.set_trust_material(TrustChain::trust_all()).expect("mutate");
    assert!(ssl.is_context_empty());
    assert_eq!(ssl.init_count(), 6);

    let _ = ssl.get_ssl_socket_factory().expect("lazy build");
    assert!(!ssl.is_context_empty());
    assert_eq!(ssl.init_count(), 7);
}

#[test]
fn lazy_init_failure_surfaces_typed_at_the_socket_call() {
    let (engine, ssl) = mock_ssl();
    for _ in 0..5 {
        ssl.set_trust_material(TrustChain::trust_all()).expect("mutate");
    }
    // Past the eager window: the mutation succeeds even though the next
    // build is doomed.
    engine.fail_next_init();
    ssl.set_trust_material(TrustChain::trust_all())
        .expect("mutation is lazy now");
    assert!(ssl.is_context_empty());

    match ssl.get_ssl_socket_factory() {
        Err(SslError::PlatformFailure(msg)) => assert!(msg.contains("scripted")),
        other => panic!("expected PlatformFailure, got {other:?}"),
    }
    // Monotone counter: the failed build did not count.
    assert_eq!(ssl.init_count(), 6);
}

#[test]
fn eager_init_failure_surfaces_at_the_mutator() {
    let (engine, ssl) = mock_ssl();
    engine.fail_next_init();
    assert!(matches!(
        ssl.set_trust_material(TrustChain::trust_all()),
        Err(SslError::PlatformFailure(_))
    ));
}

#[test]
fn timeouts_do_not_dirty_the_context() {
    let (_, ssl) = mock_ssl();
    ssl.set_so_timeout(1_000);
    ssl.set_connect_timeout(2_000);
    ssl.set_want_client_auth(false);
    ssl.set_need_client_auth(true);
    assert!(!ssl.is_context_empty());
    assert_eq!(ssl.get_so_timeout(), 1_000);
    assert_eq!(ssl.get_connect_timeout(), 2_000);
}

#[test]
fn cipher_validation_names_the_offender() {
    let (_, ssl) = mock_ssl();
    let supported: Vec<String> = ssl.get_supported_cipher_suites();
    assert!(!supported.is_empty(), "platform catalog must not be empty");

    let mut wanted = vec![supported[0].clone()];
    wanted.push("MADE_UP".into());
    match ssl.set_enabled_ciphers(&wanted) {
        Err(SslError::InvalidArgument(msg)) => {
            assert!(msg.contains("MADE_UP"), "message was: {msg}");
            assert!(!msg.contains(&supported[0]), "message was: {msg}");
        }
        other => panic!("expected InvalidArgument, got {other:?}"),
    }

    // The legal subset sticks, order preserved.
    let legal = vec![supported[0].clone()];
    ssl.set_enabled_ciphers(&legal).expect("legal subset");
    assert_eq!(ssl.get_enabled_ciphers().expect("get"), legal);
}

#[test]
fn protocol_validation_accepts_catalog_names_only() {
    let (_, ssl) = mock_ssl();
    assert!(matches!(
        ssl.set_enabled_protocols(&["TLSv1".into(), "BOGUS".into()]),
        Err(SslError::InvalidArgument(_))
    ));
    ssl.set_enabled_protocols(&["TLSv1.2".into(), "TLSv1".into()])
        .expect("catalog subset");
    assert_eq!(ssl.get_enabled_protocols(), vec!["TLSv1.2", "TLSv1"]);
}

#[test]
fn client_auth_flags_write_falses_first_trues_last() {
    let (_, ssl) = mock_ssl();
    // (want, need) -> expected flags on the quirky platform; a `None`
    // expectation is deliberately unasserted, as the platform may or may
    // not retain it.
    for (want, need, expect_want, expect_need) in [
        (true, true, Some(true), true),
        (true, false, Some(true), false),
        (false, true, None, true),
    ] {
        ssl.set_want_client_auth(want);
        ssl.set_need_client_auth(need);
        let mut server = QuirkyServerSocket::default();
        ssl.do_pre_connect_server_socket_stuff(&mut server)
            .expect("apply");
        if let Some(expect_want) = expect_want {
            assert_eq!(server.want_client_auth(), expect_want, "want for ({want},{need})");
        }
        assert_eq!(server.need_client_auth(), expect_need, "need for ({want},{need})");
    }
}
