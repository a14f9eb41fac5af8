//! Trust and key material: what the TLS context is built from.

mod key;
mod trust;

pub use key::KeyMaterial;
pub use trust::{TrustChain, TrustMaterial};
