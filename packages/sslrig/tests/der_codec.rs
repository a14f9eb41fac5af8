//! DER codec laws exercised against real certificate material.

use sslrig::asn1::{decode, Oid, OidTokenizer};
use sslrig::x509::Certificate;

fn generated_cert_der() -> Vec<u8> {
    let key = rcgen::KeyPair::generate().expect("keygen");
    let mut params = rcgen::CertificateParams::new(vec!["der.example.com".to_string()])
        .expect("params");
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, "der.example.com");
    params.distinguished_name = dn;
    params.self_signed(&key).expect("self sign").der().to_vec()
}

#[test]
fn decode_encode_is_idempotent_on_real_certificates() {
    let der = generated_cert_der();
    let decoded = decode(&der).expect("certificate decodes");
    let reencoded = decoded.encode();
    // Canonical input survives one round trip byte-for-byte; either way a
    // second decode/encode cycle is a fixed point.
    let twice = decode(&reencoded).expect("re-decode").encode();
    assert_eq!(reencoded, twice);
}

#[test]
fn real_certificate_parses_structurally() {
    let der = generated_cert_der();
    let cert = Certificate::from_der(&der).expect("certificate parses");
    assert_eq!(cert.subject.most_specific_cn(), Some("der.example.com"));
    assert!(cert
        .subject_alt_names
        .dns_names
        .contains(&"der.example.com".to_string()));
    assert!(cert.not_before < cert.not_after);
    assert!(!cert.serial.is_empty());
}

#[test]
fn oid_codec_matches_the_published_vector() {
    let oid = Oid::parse("1.2.840.113549").expect("parse");
    assert_eq!(oid.to_der_content(), [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d]);
    let back = Oid::from_der_content(&[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d]).expect("decode");
    assert_eq!(back, oid);
    assert_eq!(back.to_string(), "1.2.840.113549");
}

#[test]
fn oid_tokenizer_is_lazy_and_terminal() {
    let mut tokenizer = OidTokenizer::new("2.5.4.3");
    assert!(tokenizer.has_more_tokens());
    assert_eq!(tokenizer.next_token(), Some("2"));
    assert_eq!(tokenizer.next_token(), Some("5"));
    assert_eq!(tokenizer.next_token(), Some("4"));
    assert_eq!(tokenizer.next_token(), Some("3"));
    assert!(!tokenizer.has_more_tokens());
    assert_eq!(tokenizer.next_token(), None);
}
