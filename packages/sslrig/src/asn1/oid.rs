//! Object identifiers: dotted-text form, component form, and the DER
//! base-128 wire form with the combined `40*a + b` first subidentifier.

use std::fmt;

use crate::error::SslError;

/// An object identifier: a non-empty sequence of non-negative components.
///
/// Equality is component-wise; the textual form is dot-separated.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    components: Vec<u64>,
}

impl Oid {
    /// Builds an OID from its components. At least two components are
    /// required (the wire form cannot represent fewer), the first must be
    /// 0, 1 or 2, and the second must be <= 39 unless the first is 2.
    pub fn new(components: Vec<u64>) -> Result<Self, SslError> {
        if components.len() < 2 {
            return Err(SslError::InvalidArgument(
                "OID needs at least two components".into(),
            ));
        }
        if components[0] > 2 {
            return Err(SslError::InvalidArgument(format!(
                "OID first component must be 0, 1 or 2, got {}",
                components[0]
            )));
        }
        if components[0] < 2 && components[1] > 39 {
            return Err(SslError::InvalidArgument(format!(
                "OID second component must be <= 39 under arc {}, got {}",
                components[0], components[1]
            )));
        }
        Ok(Oid { components })
    }

    /// Parses a dotted-text OID such as `"1.2.840.113549"`.
    pub fn parse(text: &str) -> Result<Self, SslError> {
        let mut components = Vec::new();
        let mut tokenizer = OidTokenizer::new(text);
        while let Some(token) = tokenizer.next_token() {
            let value: u64 = token.parse().map_err(|_| {
                SslError::InvalidArgument(format!("OID component `{token}` is not a number"))
            })?;
            components.push(value);
        }
        Oid::new(components)
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Decodes the DER content octets of an OBJECT IDENTIFIER.
    pub fn from_der_content(bytes: &[u8]) -> Result<Self, SslError> {
        if bytes.is_empty() {
            return Err(SslError::der("empty OID content"));
        }
        let mut components = Vec::new();
        let mut accumulator: u64 = 0;
        let mut first = true;
        for (i, &b) in bytes.iter().enumerate() {
            accumulator = accumulator
                .checked_mul(128)
                .and_then(|a| a.checked_add(u64::from(b & 0x7f)))
                .ok_or_else(|| SslError::der("OID subidentifier overflows 64 bits"))?;
            if b & 0x80 == 0 {
                if first {
                    // First subidentifier packs the first two components.
                    let (a, rest) = match accumulator {
                        v if v < 40 => (0, v),
                        v if v < 80 => (1, v - 40),
                        v => (2, v - 80),
                    };
                    components.push(a);
                    components.push(rest);
                    first = false;
                } else {
                    components.push(accumulator);
                }
                accumulator = 0;
            } else if i + 1 == bytes.len() {
                return Err(SslError::der("OID ends inside a subidentifier"));
            }
        }
        Oid::new(components)
    }

    /// Encodes the content octets (no tag or length).
    pub fn to_der_content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.components.len() + 4);
        let first = self.components[0] * 40 + self.components[1];
        encode_base128(first, &mut out);
        for &c in &self.components[2..] {
            encode_base128(c, &mut out);
        }
        out
    }
}

fn encode_base128(value: u64, out: &mut Vec<u8>) {
    let mut stack = [0u8; 10];
    let mut n = 0;
    let mut v = value;
    loop {
        stack[n] = (v & 0x7f) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let mut byte = stack[i];
        if i != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

/// Lazy tokenizer over the dotted-text form. Yields each dot-separated
/// token in order and signals exhaustion by returning `None`.
pub struct OidTokenizer<'a> {
    text: &'a str,
    index: Option<usize>,
}

impl<'a> OidTokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        OidTokenizer {
            text,
            index: Some(0),
        }
    }

    pub fn has_more_tokens(&self) -> bool {
        self.index.is_some()
    }

    pub fn next_token(&mut self) -> Option<&'a str> {
        let start = self.index?;
        match self.text[start..].find('.') {
            Some(offset) => {
                let end = start + offset;
                self.index = Some(end + 1);
                Some(&self.text[start..end])
            }
            None => {
                self.index = None;
                Some(&self.text[start..])
            }
        }
    }
}

impl<'a> Iterator for OidTokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.next_token()
    }
}
