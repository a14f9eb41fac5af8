//! Trust anchors and CRLs, aggregated across sources, with a total
//! "trust everything" short-circuit.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::SslError;
use crate::keystore;
use crate::pem::{self, PemLabel};
use crate::x509::{Certificate, Crl};

/// A single loaded trust source. Aggregation happens in [`TrustChain`];
/// the two names describe the same shape, as composition is a union.
pub type TrustMaterial = TrustChain;

/// The trust a context validates against: either the absorbing
/// "trust everything" sentinel, or a set of anchors plus optional CRLs.
#[derive(Debug, Clone)]
pub enum TrustChain {
    /// Accept any peer certificate, regardless of other content added.
    All,
    Set {
        anchors: HashSet<Certificate>,
        crls: HashSet<Crl>,
    },
}

impl Default for TrustChain {
    fn default() -> Self {
        TrustChain::new()
    }
}

impl TrustChain {
    /// An empty trust set.
    pub fn new() -> Self {
        TrustChain::Set {
            anchors: HashSet::new(),
            crls: HashSet::new(),
        }
    }

    /// The trust-everything sentinel.
    pub fn trust_all() -> Self {
        TrustChain::All
    }

    /// Anchors (and CRLs) from PEM or raw-DER certificate input.
    pub fn from_bytes(input: &[u8]) -> Result<Self, SslError> {
        let mut anchors = HashSet::new();
        let mut crls = HashSet::new();
        for item in pem::items(input) {
            let item = item?;
            match item.label {
                PemLabel::Certificate | PemLabel::RawDer => {
                    anchors.insert(Certificate::from_der(&item.der)?);
                }
                PemLabel::X509Crl => {
                    crls.insert(Crl::from_der(&item.der)?);
                }
                _ => {}
            }
        }
        if anchors.is_empty() && crls.is_empty() {
            return Err(SslError::CertificateInvalid(
                "input contains no trust material".into(),
            ));
        }
        debug!(
            anchors = anchors.len(),
            crls = crls.len(),
            "loaded trust material"
        );
        Ok(TrustChain::Set { anchors, crls })
    }

    /// Anchors from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SslError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Anchors from a keystore container: trusted-certificate entries
    /// plus the certificates of any key entries.
    pub fn from_keystore(bytes: &[u8], store_password: &str) -> Result<Self, SslError> {
        let store = keystore::load(bytes, store_password, None)?;
        let mut anchors: HashSet<Certificate> = store.trusted_certs.into_iter().collect();
        for entry in store.key_entries {
            anchors.extend(entry.chain);
        }
        if anchors.is_empty() {
            return Err(SslError::CertificateInvalid(
                "keystore contains no certificates".into(),
            ));
        }
        Ok(TrustChain::Set {
            anchors,
            crls: HashSet::new(),
        })
    }

    /// Anchors from the operating system's certificate store.
    pub fn system() -> Result<Self, SslError> {
        let loaded = rustls_native_certs::load_native_certs();
        for error in &loaded.errors {
            warn!(%error, "system certificate store entry skipped");
        }
        let mut anchors = HashSet::new();
        for der in loaded.certs {
            match Certificate::from_der(der.as_ref()) {
                Ok(cert) => {
                    anchors.insert(cert);
                }
                // Stores carry the occasional malformed root; skip it the
                // way the platform tools do.
                Err(error) => warn!(%error, "unparseable system certificate skipped"),
            }
        }
        if anchors.is_empty() {
            return Err(SslError::TrustFailure(
                "system certificate store yielded no anchors".into(),
            ));
        }
        debug!(anchors = anchors.len(), "loaded system trust store");
        Ok(TrustChain::Set {
            anchors,
            crls: HashSet::new(),
        })
    }

    /// Adds CRLs to this trust set. No effect on the sentinel.
    pub fn add_crls(&mut self, new: impl IntoIterator<Item = Crl>) {
        if let TrustChain::Set { crls, .. } = self {
            crls.extend(new);
        }
    }

    /// Unions `material` into this chain. Once either side is the
    /// trust-all sentinel the chain stays absorbing; duplicate anchors
    /// collapse.
    pub fn add(&mut self, material: TrustMaterial) {
        match (&mut *self, material) {
            (TrustChain::All, _) => {}
            (_, TrustChain::All) => *self = TrustChain::All,
            (
                TrustChain::Set { anchors, crls },
                TrustChain::Set {
                    anchors: other_anchors,
                    crls: other_crls,
                },
            ) => {
                anchors.extend(other_anchors);
                crls.extend(other_crls);
            }
        }
    }

    pub fn contains_trust_all(&self) -> bool {
        matches!(self, TrustChain::All)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TrustChain::All => false,
            TrustChain::Set { anchors, crls } => anchors.is_empty() && crls.is_empty(),
        }
    }

    /// The anchor set; empty for the sentinel.
    pub fn anchors(&self) -> Vec<&Certificate> {
        match self {
            TrustChain::All => Vec::new(),
            TrustChain::Set { anchors, .. } => anchors.iter().collect(),
        }
    }

    /// The CRL set; empty for the sentinel.
    pub fn crls(&self) -> Vec<&Crl> {
        match self {
            TrustChain::All => Vec::new(),
            TrustChain::Set { crls, .. } => crls.iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_all_absorbs_everything() {
        let mut chain = TrustChain::new();
        assert!(!chain.contains_trust_all());
        chain.add(TrustChain::trust_all());
        assert!(chain.contains_trust_all());
        // Further adds leave the sentinel in place.
        chain.add(TrustChain::new());
        assert!(chain.contains_trust_all());
        assert!(chain.anchors().is_empty());
    }

    #[test]
    fn empty_chain_is_empty_until_material_arrives() {
        let chain = TrustChain::new();
        assert!(chain.is_empty());
        assert!(!TrustChain::trust_all().is_empty());
    }
}
