//! End-to-end handshakes over loopback: trust-all clients, anchored
//! trust, post-connect hostname verification, and client auth.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use sslrig::material::{KeyMaterial, TrustChain};
use sslrig::{Ssl, SslError};

struct Identity {
    cert_pem: String,
    key_pem: String,
}

fn self_signed(cn: &str, sans: Vec<rcgen::SanType>) -> Identity {
    let key = rcgen::KeyPair::generate().expect("keygen");
    let mut params = rcgen::CertificateParams::new(Vec::new()).expect("params");
    params.subject_alt_names = sans;
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn);
    params.distinguished_name = dn;
    let cert = params.self_signed(&key).expect("self sign");
    Identity {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}

fn server_ssl(identity: &Identity) -> Ssl {
    let ssl = Ssl::new().expect("server config");
    ssl.set_key_material(
        KeyMaterial::from_parts(
            identity.cert_pem.as_bytes(),
            identity.key_pem.as_bytes(),
            None,
        )
        .expect("key material"),
    )
    .expect("set key material");
    // Plain echo server: no client certs wanted.
    ssl.set_want_client_auth(false);
    ssl.set_need_client_auth(false);
    ssl
}

/// Binds a server, echoes one connection in a thread, returns its
/// address.
fn spawn_echo_server(ssl: Arc<Ssl>) -> (SocketAddr, thread::JoinHandle<()>) {
    let bind: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let mut server = ssl.create_server_socket(bind).expect("server socket");
    let addr = server.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        // A failed accept just ends the thread; the client side of the
        // test asserts the interesting outcome.
        if let Ok(mut socket) = ssl.accept(server.as_mut()) {
            let mut buf = [0_u8; 128];
            if let Ok(n) = socket.read(&mut buf) {
                let _ = socket.write_all(&buf[..n]);
                let _ = socket.flush();
            }
        }
    });
    (addr, handle)
}

#[test]
fn trust_all_handshake_with_self_signed_server() {
    let identity = self_signed("selfsigned.example.com", Vec::new());
    let server = Arc::new(server_ssl(&identity));
    let (addr, handle) = spawn_echo_server(server);

    let client = Ssl::new().expect("client config");
    client
        .set_trust_material(TrustChain::trust_all())
        .expect("trust all");
    client.set_do_verify(false);
    client.set_so_timeout(5_000);

    let mut socket = client
        .create_socket_to("127.0.0.1", addr.port(), None, 5_000)
        .expect("connect");
    socket.write_all(b"ping").expect("write");
    socket.flush().expect("flush");
    let mut buf = [0_u8; 4];
    socket.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, b"ping");

    // The negotiated peer chain is retrievable from the configuration.
    let chain = client.get_current_server_chain().expect("server chain");
    assert_eq!(
        chain[0].subject.most_specific_cn(),
        Some("selfsigned.example.com")
    );

    socket.close().expect("close");
    handle.join().expect("server thread");
}

#[test]
fn hostname_mismatch_surfaces_after_connect_and_closes_the_socket() {
    // No SAN, CN for a different host: the handshake itself succeeds
    // under trust-all, then post-connect verification trips.
    let identity = self_signed("other.example.com", Vec::new());
    let server = Arc::new(server_ssl(&identity));
    let (addr, handle) = spawn_echo_server(server);

    let client = Ssl::new().expect("client config");
    client
        .set_trust_material(TrustChain::trust_all())
        .expect("trust all");
    client.set_so_timeout(5_000);
    assert!(client.get_do_verify());

    match client.create_socket_to("127.0.0.1", addr.port(), None, 5_000) {
        Err(SslError::HostnameMismatch { expected, actual }) => {
            assert_eq!(expected, "127.0.0.1");
            assert_eq!(actual, vec!["other.example.com".to_string()]);
        }
        other => panic!("expected HostnameMismatch, got {:?}", other.map(|_| ())),
    }
    // The chain was still recorded before verification failed.
    assert!(client.get_current_server_chain().is_some());
    let _ = handle.join();
}

#[test]
fn anchored_trust_validates_a_signed_chain() {
    // CA signs a leaf for localhost; the client anchors on the CA.
    let ca_key = rcgen::KeyPair::generate().expect("ca key");
    let mut ca_params = rcgen::CertificateParams::new(Vec::new()).expect("ca params");
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let mut ca_dn = rcgen::DistinguishedName::new();
    ca_dn.push(rcgen::DnType::CommonName, "sslrig test CA");
    ca_params.distinguished_name = ca_dn;
    let ca_cert = ca_params.self_signed(&ca_key).expect("ca cert");

    let leaf_key = rcgen::KeyPair::generate().expect("leaf key");
    let mut leaf_params = rcgen::CertificateParams::new(Vec::new()).expect("leaf params");
    leaf_params.subject_alt_names = vec![
        rcgen::SanType::DnsName("localhost".try_into().expect("dns")),
        rcgen::SanType::IpAddress("127.0.0.1".parse().expect("ip")),
    ];
    let mut leaf_dn = rcgen::DistinguishedName::new();
    leaf_dn.push(rcgen::DnType::CommonName, "localhost");
    leaf_params.distinguished_name = leaf_dn;
    let leaf_cert = leaf_params
        .signed_by(&leaf_key, &ca_cert, &ca_key)
        .expect("leaf cert");

    // The server presents leaf + issuer.
    let chain_pem = format!("{}{}", leaf_cert.pem(), ca_cert.pem());
    let server = Arc::new({
        let ssl = Ssl::new().expect("server config");
        ssl.set_key_material(
            KeyMaterial::from_parts(
                chain_pem.as_bytes(),
                leaf_key.serialize_pem().as_bytes(),
                None,
            )
            .expect("key material"),
        )
        .expect("set key material");
        ssl.set_want_client_auth(false);
        ssl.set_need_client_auth(false);
        ssl
    });
    let (addr, handle) = spawn_echo_server(server);

    let client = Ssl::new().expect("client config");
    client
        .set_trust_material(TrustChain::from_bytes(ca_cert.pem().as_bytes()).expect("anchor"))
        .expect("set trust");
    client.set_so_timeout(5_000);

    let mut socket = client
        .create_socket_to("127.0.0.1", addr.port(), None, 5_000)
        .expect("anchored connect");
    socket.write_all(b"hi").expect("write");
    socket.flush().expect("flush");
    let mut buf = [0_u8; 2];
    socket.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, b"hi");
    socket.close().expect("close");
    handle.join().expect("server thread");
}

#[test]
fn needed_client_auth_records_the_client_chain() {
    let server_identity = self_signed("server.example.com", Vec::new());
    let client_identity = self_signed("client.example.com", Vec::new());

    let server = Arc::new({
        let ssl = Ssl::new().expect("server config");
        ssl.set_key_material(
            KeyMaterial::from_parts(
                server_identity.cert_pem.as_bytes(),
                server_identity.key_pem.as_bytes(),
                None,
            )
            .expect("server key"),
        )
        .expect("set server key");
        // Demand a client certificate, accept any (trust-all).
        ssl.set_trust_material(TrustChain::trust_all())
            .expect("trust all");
        ssl.set_want_client_auth(true);
        ssl.set_need_client_auth(true);
        ssl
    });
    let (addr, handle) = spawn_echo_server(server.clone());

    let client = Ssl::new().expect("client config");
    client
        .set_trust_material(TrustChain::trust_all())
        .expect("trust all");
    client.set_do_verify(false);
    client
        .set_key_material(
            KeyMaterial::from_parts(
                client_identity.cert_pem.as_bytes(),
                client_identity.key_pem.as_bytes(),
                None,
            )
            .expect("client key"),
        )
        .expect("set client key");
    client.set_so_timeout(5_000);

    let mut socket = client
        .create_socket_to("127.0.0.1", addr.port(), None, 5_000)
        .expect("mutual connect");
    socket.write_all(b"mutual").expect("write");
    socket.flush().expect("flush");
    let mut buf = [0_u8; 6];
    socket.read_exact(&mut buf).expect("read");
    socket.close().expect("close");
    handle.join().expect("server thread");

    let client_chain = server.get_current_client_chain().expect("client chain");
    assert_eq!(
        client_chain[0].subject.most_specific_cn(),
        Some("client.example.com")
    );
}
