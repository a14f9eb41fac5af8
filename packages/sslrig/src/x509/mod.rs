//! X.509 structures decoded with the in-crate ASN.1 codec: certificates,
//! distinguished names, and revocation lists.

mod cert;
mod crl;
mod name;

pub use cert::{parse_certificates, Certificate, PublicKeyInfo, SubjectAltNames};
pub use crl::{parse_crls, Crl, RevokedCert};
pub use name::Name;
