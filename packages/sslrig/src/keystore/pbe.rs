//! Password-based encryption schemes the keystore containers are
//! wire-bound to: the PKCS#12 KDF and its RC2/3DES ciphers, PKCS#5 PBES1
//! and PBES2, and the two Sun key-protection algorithms.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, InnerIvInit, KeyIvInit};
use hmac::Hmac;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::asn1::{DerObject, Oid};
use crate::error::SslError;

const OID_PBE_MD5_DES: &str = "1.2.840.113549.1.5.3";
const OID_PBES2: &str = "1.2.840.113549.1.5.13";
const OID_PBKDF2: &str = "1.2.840.113549.1.5.12";
const OID_PBE_SHA1_3DES: &str = "1.2.840.113549.1.12.1.3";
const OID_PBE_SHA1_RC2_40: &str = "1.2.840.113549.1.12.1.6";
const OID_SUN_JKS_PROTECTOR: &str = "1.3.6.1.4.1.42.2.17.1.1";
const OID_SUN_JCE_MD5_3DES: &str = "1.3.6.1.4.1.42.2.19.1";
const OID_DES_EDE3_CBC: &str = "1.2.840.113549.3.7";
const OID_AES_128_CBC: &str = "2.16.840.1.101.3.4.1.2";
const OID_AES_256_CBC: &str = "2.16.840.1.101.3.4.1.42";
const OID_HMAC_SHA1: &str = "1.2.840.113549.2.7";
const OID_HMAC_SHA256: &str = "1.2.840.113549.2.9";

type DesCbc = cbc::Decryptor<des::Des>;
type TdesCbc = cbc::Decryptor<des::TdesEde3>;
type Aes128Cbc = cbc::Decryptor<aes::Aes128>;
type Aes256Cbc = cbc::Decryptor<aes::Aes256>;
type Rc2Cbc = cbc::Decryptor<rc2::Rc2>;

/// PBKDF2 pseudo-random functions accepted inside PBES2 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prf {
    HmacSha1,
    HmacSha256,
}

/// PBES2 encryption schemes accepted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes2Cipher {
    DesEde3,
    Aes128,
    Aes256,
}

impl Pbes2Cipher {
    fn key_len(self) -> usize {
        match self {
            Pbes2Cipher::DesEde3 => 24,
            Pbes2Cipher::Aes128 => 16,
            Pbes2Cipher::Aes256 => 32,
        }
    }
}

/// A resolved password-based decryption scheme.
#[derive(Debug, Clone)]
pub enum Pbe {
    /// pbeWithSHAAnd40BitRC2-CBC (PKCS#12).
    Pkcs12Rc2_40 { salt: Vec<u8>, iterations: u32 },
    /// pbeWithSHAAnd3-KeyTripleDES-CBC (PKCS#12).
    Pkcs12TripleDes { salt: Vec<u8>, iterations: u32 },
    /// pbeWithMD5AndDES-CBC (PKCS#5 PBES1).
    Md5Des { salt: Vec<u8>, iterations: u32 },
    /// Sun's JKS key protector: SHA-1 keystream XOR with integrity digest.
    JksProtector,
    /// Sun's PBEWithMD5AndTripleDES as used by JCEKS.
    JceksTripleDes { salt: Vec<u8>, iterations: u32 },
    /// PKCS#5 PBES2 with PBKDF2.
    Pbes2 {
        salt: Vec<u8>,
        iterations: u32,
        prf: Prf,
        cipher: Pbes2Cipher,
        iv: Vec<u8>,
    },
}

impl Pbe {
    /// Resolves an AlgorithmIdentifier (OID + parameters) into a scheme.
    pub fn from_algorithm(oid: &Oid, params: Option<&DerObject>) -> Result<Self, SslError> {
        let oid = oid.to_string();
        match oid.as_str() {
            OID_SUN_JKS_PROTECTOR => Ok(Pbe::JksProtector),
            OID_PBE_SHA1_RC2_40 => {
                let (salt, iterations) = salt_and_iterations(params)?;
                Ok(Pbe::Pkcs12Rc2_40 { salt, iterations })
            }
            OID_PBE_SHA1_3DES => {
                let (salt, iterations) = salt_and_iterations(params)?;
                Ok(Pbe::Pkcs12TripleDes { salt, iterations })
            }
            OID_PBE_MD5_DES => {
                let (salt, iterations) = salt_and_iterations(params)?;
                Ok(Pbe::Md5Des { salt, iterations })
            }
            OID_SUN_JCE_MD5_3DES => {
                let (salt, iterations) = salt_and_iterations(params)?;
                Ok(Pbe::JceksTripleDes { salt, iterations })
            }
            OID_PBES2 => parse_pbes2(params),
            other => Err(SslError::UnsupportedContainer(format!(
                "unsupported encryption algorithm {other}"
            ))),
        }
    }

    /// Decrypts `data` under `password`. A failed pad or integrity check
    /// reports `WrongPassword`.
    pub fn decrypt(&self, password: &str, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, SslError> {
        match self {
            Pbe::Pkcs12Rc2_40 { salt, iterations } => {
                let key = pkcs12_kdf::<Sha1>(&bmp_password(password), salt, 1, *iterations, 5);
                let iv = pkcs12_kdf::<Sha1>(&bmp_password(password), salt, 2, *iterations, 8);
                let cipher = rc2::Rc2::new_with_eff_key_len(&key, 40);
                let dec = Rc2Cbc::inner_iv_slice_init(cipher, &iv)
                    .map_err(|_| SslError::container("bad RC2 IV length"))?;
                unpad(dec.decrypt_padded_vec_mut::<Pkcs7>(data))
            }
            Pbe::Pkcs12TripleDes { salt, iterations } => {
                let key = pkcs12_kdf::<Sha1>(&bmp_password(password), salt, 1, *iterations, 24);
                let iv = pkcs12_kdf::<Sha1>(&bmp_password(password), salt, 2, *iterations, 8);
                let dec = TdesCbc::new_from_slices(&key, &iv)
                    .map_err(|_| SslError::container("bad 3DES key material"))?;
                unpad(dec.decrypt_padded_vec_mut::<Pkcs7>(data))
            }
            Pbe::Md5Des { salt, iterations } => {
                // PBES1: MD5 iterated over password||salt, split key/IV.
                let mut derived = Md5::digest(
                    [password.as_bytes(), salt.as_slice()].concat(),
                );
                for _ in 1..*iterations {
                    derived = Md5::digest(derived);
                }
                let dec = DesCbc::new_from_slices(&derived[..8], &derived[8..16])
                    .map_err(|_| SslError::container("bad DES key material"))?;
                unpad(dec.decrypt_padded_vec_mut::<Pkcs7>(data))
            }
            Pbe::JksProtector => jks_unprotect(password, data),
            Pbe::JceksTripleDes { salt, iterations } => {
                let (key, iv) = jceks_derive(password, salt, *iterations)?;
                let dec = TdesCbc::new_from_slices(&key, &iv)
                    .map_err(|_| SslError::container("bad 3DES key material"))?;
                unpad(dec.decrypt_padded_vec_mut::<Pkcs7>(data))
            }
            Pbe::Pbes2 {
                salt,
                iterations,
                prf,
                cipher,
                iv,
            } => {
                let mut key = Zeroizing::new(vec![0u8; cipher.key_len()]);
                let derived = match prf {
                    Prf::HmacSha1 => pbkdf2::pbkdf2::<Hmac<Sha1>>(
                        password.as_bytes(),
                        salt,
                        *iterations,
                        &mut key,
                    ),
                    Prf::HmacSha256 => pbkdf2::pbkdf2::<Hmac<Sha256>>(
                        password.as_bytes(),
                        salt,
                        *iterations,
                        &mut key,
                    ),
                };
                derived.map_err(|_| SslError::container("PBKDF2 output length"))?;
                let plain = match cipher {
                    Pbes2Cipher::DesEde3 => TdesCbc::new_from_slices(&key, iv)
                        .map_err(|_| SslError::container("bad 3DES key material"))?
                        .decrypt_padded_vec_mut::<Pkcs7>(data),
                    Pbes2Cipher::Aes128 => Aes128Cbc::new_from_slices(&key, iv)
                        .map_err(|_| SslError::container("bad AES key material"))?
                        .decrypt_padded_vec_mut::<Pkcs7>(data),
                    Pbes2Cipher::Aes256 => Aes256Cbc::new_from_slices(&key, iv)
                        .map_err(|_| SslError::container("bad AES key material"))?
                        .decrypt_padded_vec_mut::<Pkcs7>(data),
                };
                unpad(plain)
            }
        }
    }
}

fn unpad(
    result: Result<Vec<u8>, cbc::cipher::block_padding::UnpadError>,
) -> Result<Zeroizing<Vec<u8>>, SslError> {
    result
        .map(Zeroizing::new)
        .map_err(|_| SslError::WrongPassword)
}

/// `pkcs-12PbeParams ::= SEQUENCE { salt OCTET STRING, iterations INTEGER }`
/// — PBES1 parameters share the same shape.
fn salt_and_iterations(params: Option<&DerObject>) -> Result<(Vec<u8>, u32), SslError> {
    let params = params.ok_or_else(|| SslError::container("PBE parameters missing"))?;
    let fields = params.sequence_children()?;
    if fields.len() < 2 {
        return Err(SslError::container("PBE parameters truncated"));
    }
    let salt = fields[0].as_octet_string()?.to_vec();
    let iterations = fields[1].as_u64()? as u32;
    if iterations == 0 {
        return Err(SslError::container("PBE iteration count of zero"));
    }
    Ok((salt, iterations))
}

fn parse_pbes2(params: Option<&DerObject>) -> Result<Pbe, SslError> {
    let params = params.ok_or_else(|| SslError::container("PBES2 parameters missing"))?;
    let fields = params.sequence_children()?;
    if fields.len() != 2 {
        return Err(SslError::container("PBES2 parameters are not (kdf, scheme)"));
    }

    let kdf = fields[0].sequence_children()?;
    if kdf.is_empty() || kdf[0].as_oid()?.to_string() != OID_PBKDF2 {
        return Err(SslError::UnsupportedContainer(
            "PBES2 key derivation is not PBKDF2".into(),
        ));
    }
    let kdf_params = kdf
        .get(1)
        .ok_or_else(|| SslError::container("PBKDF2 parameters missing"))?
        .sequence_children()?;
    let salt = kdf_params
        .first()
        .ok_or_else(|| SslError::container("PBKDF2 salt missing"))?
        .as_octet_string()?
        .to_vec();
    let iterations = kdf_params
        .get(1)
        .ok_or_else(|| SslError::container("PBKDF2 iteration count missing"))?
        .as_u64()? as u32;
    // Optional keyLength INTEGER and prf AlgorithmIdentifier follow.
    let mut prf = Prf::HmacSha1;
    for extra in &kdf_params[2..] {
        if extra.is_constructed() {
            let prf_oid = extra
                .sequence_children()?
                .first()
                .ok_or_else(|| SslError::container("empty PRF AlgorithmIdentifier"))?
                .as_oid()?
                .to_string();
            prf = match prf_oid.as_str() {
                OID_HMAC_SHA1 => Prf::HmacSha1,
                OID_HMAC_SHA256 => Prf::HmacSha256,
                other => {
                    return Err(SslError::UnsupportedContainer(format!(
                        "unsupported PBKDF2 PRF {other}"
                    )))
                }
            };
        }
    }

    let scheme = fields[1].sequence_children()?;
    if scheme.len() != 2 {
        return Err(SslError::container("PBES2 scheme is not (oid, iv)"));
    }
    let cipher = match scheme[0].as_oid()?.to_string().as_str() {
        OID_DES_EDE3_CBC => Pbes2Cipher::DesEde3,
        OID_AES_128_CBC => Pbes2Cipher::Aes128,
        OID_AES_256_CBC => Pbes2Cipher::Aes256,
        other => {
            return Err(SslError::UnsupportedContainer(format!(
                "unsupported PBES2 cipher {other}"
            )))
        }
    };
    let iv = scheme[1].as_octet_string()?.to_vec();

    Ok(Pbe::Pbes2 {
        salt,
        iterations,
        prf,
        cipher,
        iv,
    })
}

/// Password as a BMPString: UTF-16BE code units plus a two-byte
/// terminator, the form the PKCS#12 KDF hashes.
pub fn bmp_password(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Vec::with_capacity(password.len() * 2 + 2);
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    Zeroizing::new(out)
}

/// Password as UTF-16BE without a terminator, the form the JKS protector
/// and store digest hash.
pub fn utf16_password(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Vec::with_capacity(password.len() * 2);
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    Zeroizing::new(out)
}

/// The PKCS#12 v1 key derivation (RFC 7292 appendix B) over a 64-byte
/// block digest. `id` selects key (1), IV (2) or MAC key (3) material.
pub fn pkcs12_kdf<D: Digest + Clone>(
    password: &[u8],
    salt: &[u8],
    id: u8,
    iterations: u32,
    out_len: usize,
) -> Zeroizing<Vec<u8>> {
    const V: usize = 64;
    let hash_len = <D as Digest>::output_size();

    let diversifier = [id; V];
    let repeat_to_block = |bytes: &[u8]| -> Vec<u8> {
        if bytes.is_empty() {
            return Vec::new();
        }
        let len = V * bytes.len().div_ceil(V);
        bytes.iter().copied().cycle().take(len).collect()
    };
    let mut i = [repeat_to_block(salt), repeat_to_block(password)].concat();

    let mut out = Zeroizing::new(Vec::with_capacity(out_len));
    while out.len() < out_len {
        let mut a = {
            let mut d = D::new();
            d.update(diversifier);
            d.update(&i);
            d.finalize()
        };
        for _ in 1..iterations {
            a = D::digest(&a);
        }
        let take = hash_len.min(out_len - out.len());
        out.extend_from_slice(&a[..take]);

        // B = A repeated to V bytes; each V-byte block of I becomes
        // (I_j + B + 1) mod 2^(V*8).
        let b: Vec<u8> = a.iter().copied().cycle().take(V).collect();
        for block in i.chunks_mut(V) {
            let mut carry = 1u16;
            for (ib, bb) in block.iter_mut().rev().zip(b.iter().rev()) {
                let sum = u16::from(*ib) + u16::from(*bb) + carry;
                *ib = sum as u8;
                carry = sum >> 8;
            }
        }
    }
    out
}

/// Sun's JKS key protector: `salt(20) || ciphertext || digest(20)` where
/// the keystream is a SHA-1 chain over password||previous and the digest
/// binds password||plaintext.
fn jks_unprotect(password: &str, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, SslError> {
    const DIGEST_LEN: usize = 20;
    if data.len() < DIGEST_LEN * 2 {
        return Err(SslError::container("JKS protected blob too short"));
    }
    let passwd = utf16_password(password);
    let salt = &data[..DIGEST_LEN];
    let encrypted = &data[DIGEST_LEN..data.len() - DIGEST_LEN];
    let check = &data[data.len() - DIGEST_LEN..];

    let mut plain = Zeroizing::new(Vec::with_capacity(encrypted.len()));
    let mut block: [u8; DIGEST_LEN] = salt
        .try_into()
        .map_err(|_| SslError::container("JKS salt length"))?;
    for chunk in encrypted.chunks(DIGEST_LEN) {
        let digest = Sha1::new_with_prefix(&*passwd).chain_update(block).finalize();
        block.copy_from_slice(&digest);
        for (cipher_byte, key_byte) in chunk.iter().zip(block.iter()) {
            plain.push(cipher_byte ^ key_byte);
        }
    }

    let expected = Sha1::new_with_prefix(&*passwd)
        .chain_update(&*plain)
        .finalize();
    if expected.as_slice() != check {
        return Err(SslError::WrongPassword);
    }
    Ok(plain)
}

/// Sun's PBEWithMD5AndTripleDES derivation: the 8-byte salt is split in
/// half, each half iterated through MD5 with the password, and the two
/// digests concatenated into key material plus IV.
fn jceks_derive(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), SslError> {
    if salt.len() != 8 {
        return Err(SslError::container("JCE PBE salt must be 8 bytes"));
    }
    let mut salt = salt.to_vec();
    // Equal halves get the first half reversed, as the original KDF does.
    if salt[..4] == salt[4..] {
        salt.swap(0, 3);
        salt.swap(1, 2);
    }

    let mut derived = Zeroizing::new(Vec::with_capacity(32));
    for half in salt.chunks(4) {
        let mut to_be_hashed = half.to_vec();
        for _ in 0..iterations {
            let digest = Md5::new_with_prefix(&to_be_hashed)
                .chain_update(password.as_bytes())
                .finalize();
            to_be_hashed = digest.to_vec();
        }
        derived.extend_from_slice(&to_be_hashed);
    }
    let iv = derived[24..32].to_vec();
    derived.truncate(24);
    Ok((derived, iv))
}
