//! Hostname verification rules against generated certificates.

use std::net::{IpAddr, Ipv4Addr};

use sslrig::x509::Certificate;
use sslrig::{verify_hostname, SslError};

fn cert_with_sans(cn: &str, sans: Vec<rcgen::SanType>) -> Certificate {
    let key = rcgen::KeyPair::generate().expect("keygen");
    let mut params = rcgen::CertificateParams::new(Vec::new()).expect("params");
    params.subject_alt_names = sans;
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn);
    params.distinguished_name = dn;
    let cert = params.self_signed(&key).expect("self sign");
    Certificate::from_der(cert.der()).expect("parse")
}

fn dns(name: &str) -> rcgen::SanType {
    rcgen::SanType::DnsName(name.try_into().expect("dns name"))
}

#[test]
fn wildcard_san_matches_one_leftmost_label() {
    let cert = cert_with_sans("ignored.example.com", vec![dns("*.example.com")]);
    assert!(verify_hostname("a.example.com", &cert).is_ok());
    assert!(verify_hostname("A.EXAMPLE.COM", &cert).is_ok());
    assert!(verify_hostname("example.com", &cert).is_err());
    assert!(verify_hostname("a.b.example.com", &cert).is_err());
}

#[test]
fn san_presence_suppresses_cn() {
    // The CN would match, but a dNSName entry exists, so CN is ignored.
    let cert = cert_with_sans("www.example.com", vec![dns("other.example.com")]);
    let result = verify_hostname("www.example.com", &cert);
    match result {
        Err(SslError::HostnameMismatch { expected, actual }) => {
            assert_eq!(expected, "www.example.com");
            assert_eq!(actual, vec!["other.example.com".to_string()]);
        }
        other => panic!("expected HostnameMismatch, got {other:?}"),
    }
}

#[test]
fn cn_is_used_only_without_sans() {
    let cert = cert_with_sans("www.example.com", Vec::new());
    assert!(verify_hostname("www.example.com", &cert).is_ok());
    assert!(verify_hostname("other.example.com", &cert).is_err());
}

#[test]
fn ip_literal_matches_ip_san_only() {
    let cert = cert_with_sans(
        "10.0.0.1",
        vec![rcgen::SanType::IpAddress(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))],
    );
    assert!(verify_hostname("10.0.0.1", &cert).is_ok());
    assert!(verify_hostname("10.0.0.2", &cert).is_err());

    // A CN carrying the IP text does not rescue an IP-literal target.
    let cn_only = cert_with_sans("10.0.0.1", Vec::new());
    assert!(verify_hostname("10.0.0.1", &cn_only).is_err());
}

#[test]
fn mismatch_error_names_expected_and_actuals() {
    let cert = cert_with_sans("cn.example.com", vec![dns("a.example.com"), dns("b.example.com")]);
    match verify_hostname("c.example.com", &cert) {
        Err(SslError::HostnameMismatch { expected, actual }) => {
            assert_eq!(expected, "c.example.com");
            assert!(actual.contains(&"a.example.com".to_string()));
            assert!(actual.contains(&"b.example.com".to_string()));
        }
        other => panic!("expected HostnameMismatch, got {other:?}"),
    }
}
