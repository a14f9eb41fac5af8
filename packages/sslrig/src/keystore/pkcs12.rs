//! PKCS#12 container reading: MacData integrity, the authSafe nesting of
//! ContentInfos, and the three SafeBag kinds that carry keys and
//! certificates.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::debug;

use super::pbe::{bmp_password, pkcs12_kdf, Pbe};
use super::{KeyEntry, KeyStore};
use crate::asn1::{decode, DerObject, DerTag, TagClass};
use crate::error::SslError;
use crate::keys::PrivateKey;
use crate::x509::Certificate;

const OID_DATA: &str = "1.2.840.113549.1.7.1";
const OID_ENCRYPTED_DATA: &str = "1.2.840.113549.1.7.6";
const OID_KEY_BAG: &str = "1.2.840.113549.1.12.10.1.1";
const OID_SHROUDED_KEY_BAG: &str = "1.2.840.113549.1.12.10.1.2";
const OID_CERT_BAG: &str = "1.2.840.113549.1.12.10.1.3";
const OID_X509_CERT: &str = "1.2.840.113549.1.9.22.1";
const OID_FRIENDLY_NAME: &str = "1.2.840.113549.1.9.20";
const OID_LOCAL_KEY_ID: &str = "1.2.840.113549.1.9.21";
const OID_SHA1: &str = "1.3.14.3.2.26";

const BMP_STRING_TAG: u32 = 0x1e;

pub(super) fn load(
    bytes: &[u8],
    store_password: &str,
    key_password: &str,
) -> Result<KeyStore, SslError> {
    let pfx = decode(bytes)?;
    let fields = pfx.sequence_children()?;
    if fields.len() < 2 {
        return Err(SslError::container("PFX truncated"));
    }
    let version = fields[0].as_u64()?;
    if version != 3 {
        return Err(SslError::UnsupportedContainer(format!(
            "PKCS#12 version {version}"
        )));
    }

    // authSafe is a data ContentInfo whose octets are the
    // AuthenticatedSafe; the MAC covers exactly those octets.
    let (content_type, auth_safe_payload) = content_info(&fields[1])?;
    if content_type != OID_DATA {
        return Err(SslError::container("authSafe is not a data ContentInfo"));
    }
    let auth_safe_bytes = auth_safe_payload
        .ok_or_else(|| SslError::container("authSafe without content"))?
        .as_octet_string()?;

    if let Some(mac_data) = fields.get(2) {
        verify_mac(mac_data, auth_safe_bytes, store_password)?;
    }

    let mut bags = Vec::new();
    let authenticated_safe = decode(auth_safe_bytes)?;
    for info in authenticated_safe.sequence_children()? {
        let (content_type, payload) = content_info(info)?;
        let payload =
            payload.ok_or_else(|| SslError::container("ContentInfo without content"))?;
        match content_type.as_str() {
            OID_DATA => {
                let safe_contents = decode(payload.as_octet_string()?)?;
                collect_bags(&safe_contents, &mut bags)?;
            }
            OID_ENCRYPTED_DATA => {
                let plain = decrypt_encrypted_data(payload, store_password)?;
                let safe_contents = decode(&plain)?;
                collect_bags(&safe_contents, &mut bags)?;
            }
            other => {
                return Err(SslError::UnsupportedContainer(format!(
                    "authSafe entry of type {other}"
                )))
            }
        }
    }

    assemble(bags, key_password)
}

/// `ContentInfo ::= SEQUENCE { contentType OID, [0] EXPLICIT content }`.
fn content_info(object: &DerObject) -> Result<(String, Option<&DerObject>), SslError> {
    let fields = object.sequence_children()?;
    let content_type = fields
        .first()
        .ok_or_else(|| SslError::container("empty ContentInfo"))?
        .as_oid()?
        .to_string();
    let content = match fields.get(1) {
        Some(wrapper) if wrapper.tag == DerTag::context(0, true) => wrapper.children()?.first(),
        Some(_) => return Err(SslError::container("ContentInfo content is not [0]")),
        None => None,
    };
    Ok((content_type, content))
}

fn verify_mac(
    mac_data: &DerObject,
    payload: &[u8],
    store_password: &str,
) -> Result<(), SslError> {
    let fields = mac_data.sequence_children()?;
    if fields.len() < 2 {
        return Err(SslError::container("MacData truncated"));
    }
    let digest_info = fields[0].sequence_children()?;
    if digest_info.len() != 2 {
        return Err(SslError::container("DigestInfo truncated"));
    }
    let digest_alg = digest_info[0]
        .sequence_children()?
        .first()
        .ok_or_else(|| SslError::container("empty digest algorithm"))?
        .as_oid()?
        .to_string();
    if digest_alg != OID_SHA1 {
        return Err(SslError::UnsupportedContainer(format!(
            "PKCS#12 MAC digest {digest_alg}"
        )));
    }
    let expected = digest_info[1].as_octet_string()?;
    let salt = fields[1].as_octet_string()?;
    let iterations = match fields.get(2) {
        Some(obj) => obj.as_u64()? as u32,
        None => 1,
    };

    let mac_key = pkcs12_kdf::<Sha1>(&bmp_password(store_password), salt, 3, iterations, 20);
    let mut mac = Hmac::<Sha1>::new_from_slice(&mac_key)
        .map_err(|_| SslError::container("bad MAC key length"))?;
    mac.update(payload);
    mac.verify_slice(expected)
        .map_err(|_| SslError::WrongPassword)?;
    debug!(iterations, "PKCS#12 MAC verified");
    Ok(())
}

/// `EncryptedData ::= SEQUENCE { version, SEQUENCE { type, algorithm,
/// [0] IMPLICIT encryptedContent } }`.
fn decrypt_encrypted_data(
    object: &DerObject,
    store_password: &str,
) -> Result<Vec<u8>, SslError> {
    let fields = object.sequence_children()?;
    if fields.len() < 2 {
        return Err(SslError::container("EncryptedData truncated"));
    }
    let inner = fields[1].sequence_children()?;
    if inner.len() < 3 {
        return Err(SslError::container("EncryptedContentInfo truncated"));
    }
    let algorithm = inner[1].sequence_children()?;
    let oid = algorithm
        .first()
        .ok_or_else(|| SslError::container("empty content-encryption algorithm"))?
        .as_oid()?;
    let ciphertext = &inner[2];
    if ciphertext.tag.class != TagClass::ContextSpecific || ciphertext.tag.number != 0 {
        return Err(SslError::container("encryptedContent is not [0]"));
    }
    let pbe = Pbe::from_algorithm(&oid, algorithm.get(1))?;
    let plain = pbe.decrypt(store_password, ciphertext.content()?)?;
    Ok(plain.to_vec())
}

/// A SafeBag pulled out of a SafeContents, with the two attributes the
/// assembler uses.
enum BagValue {
    Key(Vec<u8>),
    ShroudedKey(Vec<u8>),
    Cert(Certificate),
}

struct Bag {
    value: BagValue,
    friendly_name: Option<String>,
    local_key_id: Option<Vec<u8>>,
}

fn collect_bags(safe_contents: &DerObject, bags: &mut Vec<Bag>) -> Result<(), SslError> {
    for bag in safe_contents.sequence_children()? {
        let fields = bag.sequence_children()?;
        if fields.len() < 2 {
            return Err(SslError::container("SafeBag truncated"));
        }
        let bag_id = fields[0].as_oid()?.to_string();
        let bag_value = fields[1]
            .children()?
            .first()
            .ok_or_else(|| SslError::container("SafeBag without value"))?;

        let value = match bag_id.as_str() {
            OID_KEY_BAG => BagValue::Key(bag_value.encode()),
            OID_SHROUDED_KEY_BAG => BagValue::ShroudedKey(bag_value.encode()),
            OID_CERT_BAG => {
                let cert_bag = bag_value.sequence_children()?;
                if cert_bag.len() != 2 {
                    return Err(SslError::container("CertBag truncated"));
                }
                let cert_id = cert_bag[0].as_oid()?.to_string();
                if cert_id != OID_X509_CERT {
                    // Non-X.509 cert bags (SDSI) are skipped, not fatal.
                    continue;
                }
                let der = cert_bag[1]
                    .children()?
                    .first()
                    .ok_or_else(|| SslError::container("CertBag without value"))?
                    .as_octet_string()?;
                BagValue::Cert(Certificate::from_der(der)?)
            }
            other => {
                debug!(bag = other, "skipping unrecognized SafeBag type");
                continue;
            }
        };

        let (friendly_name, local_key_id) = match fields.get(2) {
            Some(attributes) => bag_attributes(attributes)?,
            None => (None, None),
        };
        bags.push(Bag {
            value,
            friendly_name,
            local_key_id,
        });
    }
    Ok(())
}

fn bag_attributes(
    attributes: &DerObject,
) -> Result<(Option<String>, Option<Vec<u8>>), SslError> {
    let mut friendly_name = None;
    let mut local_key_id = None;
    for attribute in attributes.set_children()? {
        let parts = attribute.sequence_children()?;
        if parts.len() != 2 {
            continue;
        }
        let oid = parts[0].as_oid()?.to_string();
        let values = parts[1].set_children()?;
        let Some(value) = values.first() else {
            continue;
        };
        match oid.as_str() {
            OID_FRIENDLY_NAME => {
                // friendlyName is a BMPString: UTF-16BE code units.
                if value.tag.class == TagClass::Universal && value.tag.number == BMP_STRING_TAG {
                    let content = value.content()?;
                    let units: Vec<u16> = content
                        .chunks_exact(2)
                        .map(|c| u16::from_be_bytes([c[0], c[1]]))
                        .collect();
                    friendly_name = String::from_utf16(&units).ok();
                }
            }
            OID_LOCAL_KEY_ID => {
                local_key_id = Some(value.as_octet_string()?.to_vec());
            }
            _ => {}
        }
    }
    Ok((friendly_name, local_key_id))
}

/// Pairs each private key with its end-entity certificate (by localKeyId
/// when present, by public-key match otherwise) and walks issuers through
/// the cert pool to build the head-to-root chain.
fn assemble(bags: Vec<Bag>, key_password: &str) -> Result<KeyStore, SslError> {
    let mut keys = Vec::new();
    let mut certs = Vec::new();
    for bag in bags {
        match bag.value {
            BagValue::Key(der) => keys.push((
                PrivateKey::from_pkcs8_der(&der)?,
                bag.friendly_name,
                bag.local_key_id,
            )),
            BagValue::ShroudedKey(der) => keys.push((
                PrivateKey::from_encrypted_pkcs8(&der, key_password)?,
                bag.friendly_name,
                bag.local_key_id,
            )),
            BagValue::Cert(cert) => {
                certs.push((cert, bag.friendly_name, bag.local_key_id))
            }
        }
    }

    let mut key_entries = Vec::new();
    let mut used_certs = vec![false; certs.len()];
    for (index, (key, friendly_name, local_key_id)) in keys.into_iter().enumerate() {
        let head = certs
            .iter()
            .position(|(cert, _, cert_key_id)| match (&local_key_id, cert_key_id) {
                (Some(key_id), Some(cert_id)) => key_id == cert_id,
                _ => key.matches_certificate(cert),
            })
            .ok_or_else(|| {
                SslError::container("no certificate matches a private-key entry")
            })?;

        let mut chain = vec![certs[head].0.clone()];
        used_certs[head] = true;
        loop {
            let tail = chain.last().map(|c| c.issuer.clone());
            let Some(issuer) = tail else { break };
            if chain.last().is_some_and(|c| c.is_self_issued()) {
                break;
            }
            let next = certs.iter().position(|(cert, _, _)| {
                cert.subject == issuer && !chain.contains(cert)
            });
            match next {
                Some(i) => {
                    used_certs[i] = true;
                    chain.push(certs[i].0.clone());
                }
                None => break,
            }
        }

        let alias = friendly_name
            .or_else(|| certs[head].1.clone())
            .or_else(|| local_key_id.as_deref().map(hex::encode))
            .unwrap_or_else(|| format!("keypair-{index}"));
        key_entries.push(KeyEntry { alias, key, chain });
    }

    // Certificates not consumed by any chain stand alone as trust entries.
    let trusted_certs = certs
        .into_iter()
        .zip(used_certs)
        .filter(|(_, used)| !used)
        .map(|((cert, _, _), _)| cert)
        .collect();

    Ok(KeyStore {
        key_entries,
        trusted_certs,
    })
}
