//! Certificate revocation lists: the CertificateList layout, decoded far
//! enough for static serial lookup.

use std::time::SystemTime;

use crate::asn1::{decode, tag, DerObject, DerTag, TagClass};
use crate::error::SslError;
use crate::pem::{self, PemLabel};
use crate::x509::cert::strip_leading_zeros;
use crate::x509::Name;

/// One revokedCertificates entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedCert {
    pub serial: Vec<u8>,
    pub revocation_date: SystemTime,
}

/// A decoded CertificateList. Raw DER is retained so revocation data can
/// be handed to the platform verifier unmodified.
#[derive(Debug, Clone)]
pub struct Crl {
    der: Vec<u8>,
    pub issuer: Name,
    pub this_update: SystemTime,
    pub next_update: Option<SystemTime>,
    pub revoked: Vec<RevokedCert>,
}

impl Crl {
    pub fn from_der(der: &[u8]) -> Result<Self, SslError> {
        let object = decode(der)?;
        let top = object.sequence_children()?;
        if top.len() != 3 {
            return Err(SslError::CertificateInvalid(
                "CRL is not (tbs, algorithm, signature)".into(),
            ));
        }
        let tbs = top[0].sequence_children()?;
        let mut index = 0;

        // version INTEGER OPTIONAL
        if tbs
            .first()
            .is_some_and(|o| o.tag == DerTag::universal(tag::INTEGER))
        {
            index += 1;
        }

        let field = |i: usize| -> Result<&DerObject, SslError> {
            tbs.get(i)
                .ok_or_else(|| SslError::CertificateInvalid("truncated TBSCertList".into()))
        };

        // signature AlgorithmIdentifier, then issuer.
        field(index)?.sequence_children()?;
        let issuer = Name::from_der_object(field(index + 1)?)?;
        let this_update = field(index + 2)?.as_time()?;

        let mut next_update = None;
        let mut revoked = Vec::new();
        for obj in &tbs[index + 3..] {
            if obj.tag.class == TagClass::ContextSpecific {
                // [0] crlExtensions, not interpreted.
                continue;
            }
            if !obj.tag.constructed {
                next_update = Some(obj.as_time()?);
                continue;
            }
            for entry in obj.sequence_children()? {
                let parts = entry.sequence_children()?;
                if parts.len() < 2 {
                    return Err(SslError::CertificateInvalid(
                        "truncated revokedCertificates entry".into(),
                    ));
                }
                revoked.push(RevokedCert {
                    serial: strip_leading_zeros(parts[0].as_integer_bytes()?),
                    revocation_date: parts[1].as_time()?,
                });
            }
        }

        Ok(Crl {
            der: der.to_vec(),
            issuer,
            this_update,
            next_update,
            revoked,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Looks a serial up in this list. Serial comparison ignores leading
    /// zero octets, which differ between encoders.
    pub fn find_revoked(&self, serial: &[u8]) -> Option<&RevokedCert> {
        let wanted = strip_leading_zeros(serial);
        self.revoked.iter().find(|r| r.serial == wanted)
    }
}

impl PartialEq for Crl {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Crl {}

impl std::hash::Hash for Crl {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.der.hash(state);
    }
}

/// Parses every CRL in `input`, PEM-armored (`X509 CRL`) or raw DER.
pub fn parse_crls(input: &[u8]) -> Result<Vec<Crl>, SslError> {
    let mut crls = Vec::new();
    for item in pem::items(input) {
        let item = item?;
        match item.label {
            PemLabel::X509Crl | PemLabel::RawDer => {
                crls.push(Crl::from_der(&item.der)?);
            }
            _ => {}
        }
    }
    if crls.is_empty() {
        return Err(SslError::CertificateInvalid("input contains no CRL".into()));
    }
    Ok(crls)
}
