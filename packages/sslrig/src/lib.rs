//! # sslrig
//!
//! SSL/TLS configuration and connection-factory library over rustls.
//! The handshake itself belongs to the platform engine; this crate owns
//! everything around it:
//!
//! - **Coherent configuration** — trust material, key material, cipher
//!   and protocol preferences, and client-auth policy accumulate on one
//!   [`Ssl`] object that lazily rebuilds its TLS context and produces
//!   client and server sockets.
//! - **Keystore loading** — PKCS#12, JKS and JCEKS containers with the
//!   dual store/key password model.
//! - **Independent parsing** — an in-crate ASN.1 DER codec decodes
//!   X.509 certificates, private keys and CRLs without leaning on the
//!   platform's parsers.
//! - **Post-connect hostname verification** — subjectAltName first, CN
//!   fallback, leftmost-label wildcards.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod asn1;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod material;
pub mod pem;
pub mod platform;
pub mod ssl;
pub mod verify;
pub mod wrapper;
pub mod x509;

pub use error::SslError;
pub use keystore::{KeyEntry, KeyStore};
pub use material::{KeyMaterial, TrustChain, TrustMaterial};
pub use ssl::{supported_ciphers_set, Ssl, KNOWN_PROTOCOLS};
pub use verify::verify_hostname;
pub use wrapper::{IdentityWrapperFactory, SslWrapperFactory};
