//! Key material: one or more (alias, private key, certificate chain)
//! entries pulled from a keystore container or assembled from PEM parts.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::SslError;
use crate::keys::{self, PrivateKey};
use crate::keystore::{self, KeyEntry};
use crate::x509::{parse_certificates, Certificate};

/// Private keys and their head-to-root certificate chains.
pub struct KeyMaterial {
    entries: Vec<KeyEntry>,
}

impl KeyMaterial {
    /// Loads key material from a keystore container. `key_password` of
    /// `None` reuses the store password for every private-key entry.
    pub fn from_keystore(
        bytes: &[u8],
        store_password: &str,
        key_password: Option<&str>,
    ) -> Result<Self, SslError> {
        let store = keystore::load(bytes, store_password, key_password)?;
        Self::from_entries(store.key_entries)
    }

    /// Loads key material from a keystore file.
    pub fn from_keystore_file(
        path: impl AsRef<Path>,
        store_password: &str,
        key_password: Option<&str>,
    ) -> Result<Self, SslError> {
        let bytes = std::fs::read(path)?;
        Self::from_keystore(&bytes, store_password, key_password)
    }

    /// Builds key material from a certificate chain and a private key,
    /// both PEM-armored or raw DER. `password` decrypts an encrypted key.
    pub fn from_parts(
        cert_input: &[u8],
        key_input: &[u8],
        password: Option<&str>,
    ) -> Result<Self, SslError> {
        let chain = parse_certificates(cert_input)?;
        let key = keys::parse_private_key(key_input, password)?;
        Self::from_entries(vec![KeyEntry {
            alias: "keypair-0".into(),
            key,
            chain,
        }])
    }

    fn from_entries(entries: Vec<KeyEntry>) -> Result<Self, SslError> {
        if entries.is_empty() {
            return Err(SslError::NoPrivateKey);
        }
        let entries = entries
            .into_iter()
            .map(validate_entry)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(entries = entries.len(), "key material ready");
        Ok(KeyMaterial { entries })
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.alias.as_str()).collect()
    }

    /// The certificate chain of the first entry, the one a context
    /// presents by default.
    pub fn associated_certificate_chain(&self) -> &[Certificate] {
        &self.entries[0].chain
    }

    pub(crate) fn primary(&self) -> &KeyEntry {
        &self.entries[0]
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("aliases", &self.aliases())
            .finish_non_exhaustive()
    }
}

/// Orders the chain head-to-root and checks the head's public key against
/// the private key.
fn validate_entry(entry: KeyEntry) -> Result<KeyEntry, SslError> {
    let KeyEntry { alias, key, chain } = entry;
    if chain.is_empty() {
        return Err(SslError::container(format!(
            "entry `{alias}` has no certificate chain"
        )));
    }

    let chain = order_chain(&key, chain)?;
    if !key.matches_certificate(&chain[0]) {
        return Err(SslError::container(format!(
            "private key of entry `{alias}` does not match its certificate"
        )));
    }
    Ok(KeyEntry { alias, key, chain })
}

/// Rebuilds head-to-root order by starting from the certificate the key
/// matches and following issuer links. Containers usually store chains in
/// order already; out-of-order chains are repaired, unrelated
/// certificates dropped with a warning.
fn order_chain(
    key: &PrivateKey,
    chain: Vec<Certificate>,
) -> Result<Vec<Certificate>, SslError> {
    let in_order = chain
        .first()
        .is_some_and(|head| key.matches_certificate(head));
    if in_order {
        return Ok(chain);
    }

    let head = chain
        .iter()
        .position(|cert| key.matches_certificate(cert))
        .ok_or_else(|| {
            SslError::container("no certificate in the chain matches the private key")
        })?;

    let mut remaining = chain;
    let mut ordered = vec![remaining.swap_remove(head)];
    loop {
        let issuer = ordered
            .last()
            .map(|c| c.issuer.clone())
            .filter(|_| !ordered.last().is_some_and(|c| c.is_self_issued()));
        let Some(issuer) = issuer else { break };
        match remaining.iter().position(|c| c.subject == issuer) {
            Some(i) => ordered.push(remaining.swap_remove(i)),
            None => break,
        }
    }
    if !remaining.is_empty() {
        warn!(
            dropped = remaining.len(),
            "certificates unrelated to the key chain were dropped"
        );
    }
    Ok(ordered)
}
