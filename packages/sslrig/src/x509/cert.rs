//! Certificate parsing: the standard TBSCertificate layout, subjectAltName
//! and basicConstraints extraction, and the public-key details the
//! key/cert consistency check needs.

use std::net::IpAddr;
use std::time::SystemTime;

use crate::asn1::{decode, tag, DerObject, DerTag, DerValue, Oid, TagClass};
use crate::error::SslError;
use crate::pem::{self, PemLabel};

const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";
const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub(crate) const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub(crate) const OID_DSA: &str = "1.2.840.10040.4.1";
pub(crate) const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";

/// subjectPublicKeyInfo: algorithm, optional parameters, and the BIT
/// STRING payload. The full SPKI encoding is kept for anchor identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    pub algorithm: Oid,
    pub parameters: Option<DerObject>,
    pub subject_public_key: Vec<u8>,
    pub der: Vec<u8>,
}

impl PublicKeyInfo {
    pub(crate) fn from_der_object(object: &DerObject) -> Result<Self, SslError> {
        let children = object.sequence_children()?;
        if children.len() != 2 {
            return Err(SslError::CertificateInvalid(
                "subjectPublicKeyInfo is not (algorithm, key)".into(),
            ));
        }
        let alg = children[0].sequence_children()?;
        if alg.is_empty() {
            return Err(SslError::CertificateInvalid(
                "empty AlgorithmIdentifier".into(),
            ));
        }
        Ok(PublicKeyInfo {
            algorithm: alg[0].as_oid()?,
            parameters: alg.get(1).cloned(),
            subject_public_key: children[1].as_bit_string()?.to_vec(),
            der: object.encode(),
        })
    }

    /// RSA modulus (leading zero stripped), when this is an RSA key.
    pub fn rsa_modulus(&self) -> Option<Vec<u8>> {
        if self.algorithm.to_string() != OID_RSA_ENCRYPTION {
            return None;
        }
        let key = decode(&self.subject_public_key).ok()?;
        let fields = key.sequence_children().ok()?;
        let modulus = fields.first()?.as_integer_bytes().ok()?;
        Some(strip_leading_zeros(modulus))
    }

    /// DSA (p, q, g) from the algorithm parameters, when this is DSA.
    pub fn dsa_parameters(&self) -> Option<[Vec<u8>; 3]> {
        if self.algorithm.to_string() != OID_DSA {
            return None;
        }
        let params = self.parameters.as_ref()?;
        let fields = params.sequence_children().ok()?;
        if fields.len() < 3 {
            return None;
        }
        Some([
            strip_leading_zeros(fields[0].as_integer_bytes().ok()?),
            strip_leading_zeros(fields[1].as_integer_bytes().ok()?),
            strip_leading_zeros(fields[2].as_integer_bytes().ok()?),
        ])
    }
}

pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip.min(bytes.len().saturating_sub(1))..].to_vec()
}

/// subjectAltName entries this crate interprets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltNames {
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    /// True when the extension was present at all, even with no entries of
    /// an interpreted type; presence suppresses CN fallback.
    pub present: bool,
}

/// A decoded X.509 certificate. The raw DER is retained so the platform
/// layer can hand the exact bytes back to the TLS engine.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    pub version: u64,
    pub serial: Vec<u8>,
    pub signature_algorithm: Oid,
    pub issuer: super::Name,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
    pub subject: super::Name,
    pub public_key: PublicKeyInfo,
    pub subject_alt_names: SubjectAltNames,
    pub is_ca: bool,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, SslError> {
        let object = decode(der)?;
        let top = object.sequence_children()?;
        if top.len() != 3 {
            return Err(SslError::CertificateInvalid(
                "certificate is not (tbs, algorithm, signature)".into(),
            ));
        }
        let tbs = top[0].sequence_children()?;
        let mut index = 0;

        // [0] EXPLICIT version, absent for v1.
        let version = match tbs.first() {
            Some(obj) if obj.tag == DerTag::context(0, true) => {
                index += 1;
                obj.children()?
                    .first()
                    .ok_or_else(|| SslError::CertificateInvalid("empty version".into()))?
                    .as_u64()?
            }
            _ => 0,
        };

        let field = |i: usize| -> Result<&DerObject, SslError> {
            tbs.get(i)
                .ok_or_else(|| SslError::CertificateInvalid("truncated TBSCertificate".into()))
        };

        let serial = field(index)?.as_integer_bytes()?.to_vec();
        let signature_algorithm = field(index + 1)?
            .sequence_children()?
            .first()
            .ok_or_else(|| SslError::CertificateInvalid("empty signature algorithm".into()))?
            .as_oid()?;
        let issuer = super::Name::from_der_object(field(index + 2)?)?;

        let validity = field(index + 3)?.sequence_children()?;
        if validity.len() != 2 {
            return Err(SslError::CertificateInvalid(
                "validity is not (notBefore, notAfter)".into(),
            ));
        }
        let not_before = validity[0].as_time()?;
        let not_after = validity[1].as_time()?;

        let subject = super::Name::from_der_object(field(index + 4)?)?;
        let public_key = PublicKeyInfo::from_der_object(field(index + 5)?)?;

        let mut subject_alt_names = SubjectAltNames::default();
        let mut is_ca = false;
        for obj in &tbs[index + 6..] {
            // [3] EXPLICIT Extensions; unique-ID fields [1]/[2] are skipped.
            if obj.tag == DerTag::context(3, true) {
                let extensions = obj
                    .children()?
                    .first()
                    .ok_or_else(|| SslError::CertificateInvalid("empty extensions".into()))?;
                for extension in extensions.sequence_children()? {
                    parse_extension(extension, &mut subject_alt_names, &mut is_ca)?;
                }
            }
        }

        Ok(Certificate {
            der: der.to_vec(),
            version,
            serial,
            signature_algorithm,
            issuer,
            not_before,
            not_after,
            subject,
            public_key,
            subject_alt_names,
            is_ca,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Serial number as lowercase hex, for logs and error text.
    pub fn serial_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    pub fn is_valid_at(&self, when: SystemTime) -> bool {
        when >= self.not_before && when <= self.not_after
    }

    /// True when subject and issuer coincide, the usual shape of a root.
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl std::hash::Hash for Certificate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.der.hash(state);
    }
}

fn parse_extension(
    extension: &DerObject,
    san: &mut SubjectAltNames,
    is_ca: &mut bool,
) -> Result<(), SslError> {
    let parts = extension.sequence_children()?;
    if parts.len() < 2 {
        return Err(SslError::CertificateInvalid("truncated extension".into()));
    }
    let oid = parts[0].as_oid()?.to_string();
    // critical BOOLEAN DEFAULT FALSE may sit between id and value.
    let value = parts
        .last()
        .ok_or_else(|| SslError::CertificateInvalid("extension without value".into()))?
        .as_octet_string()?;

    match oid.as_str() {
        OID_SUBJECT_ALT_NAME => {
            san.present = true;
            let names = decode(value)?;
            for general_name in names.sequence_children()? {
                if general_name.tag.class != TagClass::ContextSpecific {
                    continue;
                }
                match (general_name.tag.number, &general_name.value) {
                    // dNSName [2] IMPLICIT IA5String
                    (2, DerValue::Primitive(bytes)) => {
                        let dns = String::from_utf8(bytes.clone()).map_err(|_| {
                            SslError::CertificateInvalid("dNSName is not ASCII".into())
                        })?;
                        san.dns_names.push(dns);
                    }
                    // iPAddress [7] IMPLICIT OCTET STRING, 4 or 16 bytes
                    (7, DerValue::Primitive(bytes)) => match bytes.len() {
                        4 => {
                            let octets: [u8; 4] = bytes.as_slice().try_into().unwrap_or([0; 4]);
                            san.ip_addresses.push(IpAddr::from(octets));
                        }
                        16 => {
                            let octets: [u8; 16] = bytes.as_slice().try_into().unwrap_or([0; 16]);
                            san.ip_addresses.push(IpAddr::from(octets));
                        }
                        n => {
                            return Err(SslError::CertificateInvalid(format!(
                                "iPAddress SAN of {n} bytes"
                            )))
                        }
                    },
                    // Other GeneralName forms are not interpreted.
                    _ => {}
                }
            }
        }
        OID_BASIC_CONSTRAINTS => {
            let constraints = decode(value)?;
            if let Some(flag) = constraints.sequence_children()?.first() {
                if flag.tag == DerTag::universal(tag::BOOLEAN) {
                    *is_ca = flag.as_boolean()?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parses every certificate in `input`, PEM-armored or raw DER.
pub fn parse_certificates(input: &[u8]) -> Result<Vec<Certificate>, SslError> {
    let mut certs = Vec::new();
    for item in pem::items(input) {
        let item = item?;
        match item.label {
            PemLabel::Certificate | PemLabel::RawDer => {
                certs.push(Certificate::from_der(&item.der)?);
            }
            _ => {}
        }
    }
    if certs.is_empty() {
        return Err(SslError::CertificateInvalid(
            "input contains no certificate".into(),
        ));
    }
    Ok(certs)
}
