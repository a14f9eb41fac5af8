//! Keystore container loading. Containers are recognized by content, not
//! filename: PKCS#12, JKS (magic 0xFEEDFEED), JCEKS (magic 0xCECECECE),
//! and the BKS layout, which is recognized and refused.
//!
//! The dual-password model applies throughout: the store password covers
//! integrity, the key password covers per-entry encryption, and a missing
//! key password falls back to the store password.

mod jks;
pub mod pbe;
mod pkcs12;

use tracing::debug;

use crate::error::SslError;
use crate::keys::PrivateKey;
use crate::x509::Certificate;

/// One private-key entry: alias, key, and its head-to-root chain.
pub struct KeyEntry {
    pub alias: String,
    pub key: PrivateKey,
    pub chain: Vec<Certificate>,
}

/// Everything a container yielded: key entries plus standalone trusted
/// certificates.
pub struct KeyStore {
    pub key_entries: Vec<KeyEntry>,
    pub trusted_certs: Vec<Certificate>,
}

/// Container types this crate recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Pkcs12,
    Jks,
    Jceks,
    Bks,
}

/// Sniffs the container type from leading bytes.
pub fn sniff(bytes: &[u8]) -> Result<ContainerKind, SslError> {
    match bytes {
        [0xfe, 0xed, 0xfe, 0xed, ..] => Ok(ContainerKind::Jks),
        [0xce, 0xce, 0xce, 0xce, ..] => Ok(ContainerKind::Jceks),
        // BKS opens with a 4-byte big-endian version of 1 or 2.
        [0x00, 0x00, 0x00, 0x01 | 0x02, ..] => Ok(ContainerKind::Bks),
        [0x30, ..] => Ok(ContainerKind::Pkcs12),
        _ => Err(SslError::UnsupportedContainer(
            "unrecognized keystore container".into(),
        )),
    }
}

/// Loads a keystore container. `key_password` of `None` reuses the store
/// password for private-key entries.
pub fn load(
    bytes: &[u8],
    store_password: &str,
    key_password: Option<&str>,
) -> Result<KeyStore, SslError> {
    let kind = sniff(bytes)?;
    let key_password = key_password.unwrap_or(store_password);
    debug!(kind = ?kind, "loading keystore container");
    match kind {
        ContainerKind::Jks | ContainerKind::Jceks => {
            jks::load(bytes, store_password, key_password)
        }
        ContainerKind::Pkcs12 => pkcs12::load(bytes, store_password, key_password),
        ContainerKind::Bks => Err(SslError::UnsupportedContainer(
            "BKS containers require a provider this platform does not have".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffing_by_magic() {
        assert_eq!(sniff(&[0xfe, 0xed, 0xfe, 0xed, 0, 0]).unwrap(), ContainerKind::Jks);
        assert_eq!(sniff(&[0xce, 0xce, 0xce, 0xce, 0, 0]).unwrap(), ContainerKind::Jceks);
        assert_eq!(sniff(&[0x00, 0x00, 0x00, 0x02, 0xaa]).unwrap(), ContainerKind::Bks);
        assert_eq!(sniff(&[0x30, 0x82, 0x01, 0x00]).unwrap(), ContainerKind::Pkcs12);
        assert!(sniff(b"garbage").is_err());
    }

    #[test]
    fn bks_is_refused() {
        assert!(matches!(
            load(&[0x00, 0x00, 0x00, 0x01, 0xaa], "pw", None),
            Err(SslError::UnsupportedContainer(_))
        ));
    }
}
