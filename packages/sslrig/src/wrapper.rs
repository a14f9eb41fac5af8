//! The wrapper-factory indirection: every socket a configuration
//! produces is routed through one `wrap` call, so callers can interpose
//! decorators (metrics, logging, bounded I/O) without touching the core.

use crate::platform::SslSocket;

/// Decorates sockets on their way out of the factory.
pub trait SslWrapperFactory: Send + Sync {
    fn wrap(&self, socket: Box<dyn SslSocket>) -> Box<dyn SslSocket>;
}

/// The default factory: hands the socket back untouched.
#[derive(Debug, Default)]
pub struct IdentityWrapperFactory;

impl SslWrapperFactory for IdentityWrapperFactory {
    fn wrap(&self, socket: Box<dyn SslSocket>) -> Box<dyn SslSocket> {
        socket
    }
}
