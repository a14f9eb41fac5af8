//! Distinguished names: RDN sequences with enough attribute coverage for
//! display, CN extraction, and anchor identity.

use std::fmt;

use crate::asn1::{DerObject, Oid};
use crate::error::SslError;

const ATTRIBUTE_SHORT_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("1.2.840.113549.1.9.1", "emailAddress"),
];

/// A parsed RDN sequence. Identity (equality, hashing) is the encoded
/// form, so attribute ordering is significant, as it is on the wire.
#[derive(Clone)]
pub struct Name {
    der: Vec<u8>,
    attributes: Vec<(Oid, String)>,
}

impl Name {
    /// Parses `Name ::= SEQUENCE OF SET OF AttributeTypeAndValue`.
    pub fn from_der_object(object: &DerObject) -> Result<Self, SslError> {
        let mut attributes = Vec::new();
        for rdn in object.sequence_children()? {
            for atv in rdn.set_children()? {
                let parts = atv.sequence_children()?;
                if parts.len() != 2 {
                    return Err(SslError::CertificateInvalid(
                        "AttributeTypeAndValue is not a pair".into(),
                    ));
                }
                let oid = parts[0].as_oid()?;
                // Values of unsupported string types are kept as lossy text
                // rather than failing the whole name.
                let value = parts[1]
                    .as_string()
                    .unwrap_or_else(|_| String::from_utf8_lossy(
                        parts[1].content().unwrap_or_default(),
                    )
                    .into_owned());
                attributes.push((oid, value));
            }
        }
        Ok(Name {
            der: object.encode(),
            attributes,
        })
    }

    /// The DER encoding of this name.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn attributes(&self) -> &[(Oid, String)] {
        &self.attributes
    }

    /// All commonName values, in RDN order.
    pub fn common_names(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(oid, _)| oid.to_string() == "2.5.4.3")
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// The most specific CN: the first one in RDN order, when present.
    pub fn most_specific_cn(&self) -> Option<&str> {
        self.common_names().first().copied()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.der.hash(state);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (oid, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let dotted = oid.to_string();
            let short = ATTRIBUTE_SHORT_NAMES
                .iter()
                .find(|(o, _)| *o == dotted)
                .map(|(_, s)| *s);
            match short {
                Some(short) => write!(f, "{short}={value}")?,
                None => write!(f, "{dotted}={value}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::{decode, tag, DerObject, DerTag};

    fn attribute(oid: &str, value: &str) -> DerObject {
        DerObject::sequence(vec![
            DerObject::object_identifier(&Oid::parse(oid).unwrap()),
            DerObject::primitive(
                DerTag::universal(tag::UTF8_STRING),
                value.as_bytes().to_vec(),
            ),
        ])
    }

    fn name_of(pairs: &[(&str, &str)]) -> Name {
        let rdns = pairs
            .iter()
            .map(|(oid, value)| DerObject::set(vec![attribute(oid, value)]))
            .collect();
        let object = DerObject::sequence(rdns);
        // Round-trip through bytes so the stored DER matches the wire.
        Name::from_der_object(&decode(&object.encode()).unwrap()).unwrap()
    }

    #[test]
    fn first_cn_is_most_specific() {
        let name = name_of(&[
            ("2.5.4.3", "www.example.com"),
            ("2.5.4.3", "example.com"),
            ("2.5.4.10", "Example Corp"),
        ]);
        assert_eq!(name.most_specific_cn(), Some("www.example.com"));
        assert_eq!(name.common_names().len(), 2);
    }

    #[test]
    fn display_uses_short_attribute_names() {
        let name = name_of(&[("2.5.4.3", "host"), ("2.5.4.6", "CA")]);
        assert_eq!(name.to_string(), "CN=host, C=CA");
    }

    #[test]
    fn identity_is_the_encoding() {
        let a = name_of(&[("2.5.4.3", "host")]);
        let b = name_of(&[("2.5.4.3", "host")]);
        let c = name_of(&[("2.5.4.3", "other")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
