//! Post-connect hostname verification against the peer's end-entity
//! certificate: subjectAltName first, CN fallback, leftmost-label
//! wildcards, byte-equal IP matching.

use std::net::IpAddr;

use tracing::{debug, warn};

use crate::error::SslError;
use crate::x509::Certificate;

/// Verifies `hostname` against `cert`. The check is pure; callers supply
/// the peer chain's head after the handshake.
pub fn verify_hostname(hostname: &str, cert: &Certificate) -> Result<(), SslError> {
    // An IP literal is matched only against iPAddress entries, bytewise.
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        if cert.subject_alt_names.ip_addresses.contains(&ip) {
            debug!(%hostname, "peer matched by iPAddress subjectAltName");
            return Ok(());
        }
        return Err(mismatch(hostname, cert));
    }

    let dns_sans = &cert.subject_alt_names.dns_names;
    if !dns_sans.is_empty() {
        // Any dNSName entry suppresses the CN entirely.
        if dns_sans.iter().any(|pattern| matches(hostname, pattern)) {
            debug!(%hostname, "peer matched by dNSName subjectAltName");
            return Ok(());
        }
        return Err(mismatch(hostname, cert));
    }

    match cert.subject.most_specific_cn() {
        Some(cn) if matches(hostname, cn) => {
            debug!(%hostname, cn, "peer matched by subject CN");
            Ok(())
        }
        _ => Err(mismatch(hostname, cert)),
    }
}

/// Verifies `hostname` against the head of a peer chain.
pub fn verify_hostname_in_chain(
    hostname: &str,
    chain: &[Certificate],
) -> Result<(), SslError> {
    let head = chain.first().ok_or_else(|| {
        SslError::CertificateInvalid("peer presented an empty chain".into())
    })?;
    verify_hostname(hostname, head)
}

/// Leftmost-label wildcard matching, case-insensitive. A single `*`
/// covers exactly one label; `*` anywhere else never matches.
fn matches(hostname: &str, pattern: &str) -> bool {
    let hostname = hostname.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix("*.") {
        if suffix.contains('*') {
            warn!(pattern = %pattern, "wildcard outside the leftmost label never matches");
            return false;
        }
        let Some(prefix) = hostname.strip_suffix(suffix) else {
            return false;
        };
        // The prefix must be one whole non-empty label plus its dot.
        let Some(label) = prefix.strip_suffix('.') else {
            return false;
        };
        return !label.is_empty() && !label.contains('.');
    }
    if pattern.contains('*') {
        warn!(pattern = %pattern, "wildcard outside the leftmost label never matches");
        return false;
    }
    hostname == pattern
}

fn mismatch(hostname: &str, cert: &Certificate) -> SslError {
    let mut actual = cert.subject_alt_names.dns_names.clone();
    actual.extend(
        cert.subject_alt_names
            .ip_addresses
            .iter()
            .map(|ip| ip.to_string()),
    );
    if actual.is_empty() {
        actual.extend(cert.subject.common_names().iter().map(|s| s.to_string()));
    }
    SslError::HostnameMismatch {
        expected: hostname.to_string(),
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_covers_exactly_one_label() {
        assert!(matches("a.example.com", "*.example.com"));
        assert!(!matches("example.com", "*.example.com"));
        assert!(!matches("a.b.example.com", "*.example.com"));
        assert!(!matches(".example.com", "*.example.com"));
    }

    #[test]
    fn wildcard_elsewhere_never_matches() {
        assert!(!matches("frog.com", "f*.com"));
        assert!(!matches("a.b.com", "a.*.com"));
        assert!(!matches("a.b.com", "a.b.*"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(matches("WWW.Example.COM", "www.example.com"));
        assert!(matches("a.EXAMPLE.com", "*.example.Com"));
    }
}
