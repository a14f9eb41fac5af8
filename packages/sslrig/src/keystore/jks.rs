//! JKS and JCEKS container reading. Both share the entry layout; they
//! differ in magic number and in the PBE protecting private keys, which
//! the EncryptedPrivateKeyInfo algorithm OID selects.

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::pbe::utf16_password;
use super::{KeyEntry, KeyStore};
use crate::error::SslError;
use crate::keys::PrivateKey;
use crate::x509::Certificate;

const MAGIC_JKS: u32 = 0xfeed_feed;
const MAGIC_JCEKS: u32 = 0xcece_cece;

/// The phrase Sun mixes into the store-integrity digest.
const INTEGRITY_PHRASE: &[u8] = b"Mighty Aphrodite";

const TAG_PRIVATE_KEY: u32 = 1;
const TAG_TRUSTED_CERT: u32 = 2;
const TAG_SECRET_KEY: u32 = 3;

const DIGEST_LEN: usize = 20;

pub(super) fn load(
    bytes: &[u8],
    store_password: &str,
    key_password: &str,
) -> Result<KeyStore, SslError> {
    verify_integrity(bytes, store_password)?;

    let mut reader = StreamReader::new(&bytes[..bytes.len() - DIGEST_LEN]);
    let magic = reader.read_u32()?;
    let version = reader.read_u32()?;
    if !(magic == MAGIC_JKS || magic == MAGIC_JCEKS) {
        return Err(SslError::container("bad JKS magic"));
    }
    if version != 1 && version != 2 {
        return Err(SslError::UnsupportedContainer(format!(
            "JKS version {version}"
        )));
    }
    let count = reader.read_u32()?;

    let mut key_entries = Vec::new();
    let mut trusted_certs = Vec::new();
    for _ in 0..count {
        let tag = reader.read_u32()?;
        let alias = reader.read_utf()?;
        let _timestamp_ms = reader.read_u64()?;
        match tag {
            TAG_PRIVATE_KEY => {
                let protected = reader.read_block()?;
                let chain_len = reader.read_u32()?;
                let mut chain = Vec::with_capacity(chain_len as usize);
                for _ in 0..chain_len {
                    chain.push(read_certificate(&mut reader, version)?);
                }
                // The blob is an EncryptedPrivateKeyInfo; its algorithm
                // OID picks the JKS protector or the JCEKS PBE.
                let key = PrivateKey::from_encrypted_pkcs8(protected, key_password)?;
                debug!(alias = %alias, chain_len, "decoded private-key entry");
                key_entries.push(KeyEntry { alias, key, chain });
            }
            TAG_TRUSTED_CERT => {
                trusted_certs.push(read_certificate(&mut reader, version)?);
            }
            TAG_SECRET_KEY => {
                // Secret-key entries are serialized SealedObjects with no
                // length framing; nothing after one can be located.
                return Err(SslError::UnsupportedContainer(format!(
                    "JCEKS secret-key entry `{alias}`"
                )));
            }
            other => {
                return Err(SslError::container(format!("unknown JKS entry tag {other}")))
            }
        }
    }
    if !reader.at_end() {
        warn!(
            trailing = reader.remaining(),
            "trailing bytes after JKS entries"
        );
    }

    Ok(KeyStore {
        key_entries,
        trusted_certs,
    })
}

/// Store integrity: SHA-1 over password (UTF-16BE), the fixed phrase, and
/// every byte up to the digest itself.
fn verify_integrity(bytes: &[u8], store_password: &str) -> Result<(), SslError> {
    if bytes.len() < DIGEST_LEN + 12 {
        return Err(SslError::container("JKS stream too short"));
    }
    let (payload, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    let computed = Sha1::new_with_prefix(&*utf16_password(store_password))
        .chain_update(INTEGRITY_PHRASE)
        .chain_update(payload)
        .finalize();
    if computed.as_slice() != digest {
        return Err(SslError::WrongPassword);
    }
    Ok(())
}

fn read_certificate(
    reader: &mut StreamReader<'_>,
    version: u32,
) -> Result<Certificate, SslError> {
    if version == 2 {
        let cert_type = reader.read_utf()?;
        if cert_type != "X.509" {
            return Err(SslError::UnsupportedContainer(format!(
                "certificate type {cert_type}"
            )));
        }
    }
    let der = reader.read_block()?;
    Certificate::from_der(der)
}

/// Big-endian reader over the Java stream primitives the format uses.
struct StreamReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> StreamReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        StreamReader { bytes, position: 0 }
    }

    fn at_end(&self) -> bool {
        self.position == self.bytes.len()
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SslError> {
        if len > self.remaining() {
            return Err(SslError::container("JKS stream truncated"));
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, SslError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, SslError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, SslError> {
        let b = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_be_bytes(out))
    }

    /// A length-prefixed UTF string. Aliases are in practice ASCII; the
    /// modified-UTF-8 corner cases collapse to standard UTF-8 there.
    fn read_utf(&mut self) -> Result<String, SslError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SslError::container("JKS alias is not UTF-8"))
    }

    /// A u32-length-prefixed byte block.
    fn read_block(&mut self) -> Result<&'a [u8], SslError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_digest_gate() {
        // A minimal JKS header (magic, version 1, zero entries) with a
        // correct digest loads; a flipped digest is WrongPassword.
        let mut payload = Vec::new();
        payload.extend_from_slice(&MAGIC_JKS.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        let digest = Sha1::new_with_prefix(&*utf16_password("changeit"))
            .chain_update(INTEGRITY_PHRASE)
            .chain_update(&payload)
            .finalize();

        let mut stream = payload.clone();
        stream.extend_from_slice(&digest);
        let store = load(&stream, "changeit", "changeit").unwrap();
        assert!(store.key_entries.is_empty());
        assert!(store.trusted_certs.is_empty());

        assert!(matches!(
            load(&stream, "not-changeit", "not-changeit"),
            Err(SslError::WrongPassword)
        ));

        let mut corrupted = stream.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        assert!(matches!(
            load(&corrupted, "changeit", "changeit"),
            Err(SslError::WrongPassword)
        ));
    }
}
