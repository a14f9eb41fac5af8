//! Canonical DER encoder: minimal length octets, SET children sorted by
//! their encoded bytes, definite lengths only.

use super::{tag, DerObject, DerValue, TagClass};

pub(super) fn encode(object: &DerObject) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(object, &mut out);
    out
}

fn encode_into(object: &DerObject, out: &mut Vec<u8>) {
    let content = match &object.value {
        DerValue::Primitive(bytes) => bytes.clone(),
        DerValue::Constructed(children) => {
            let mut encoded: Vec<Vec<u8>> = children.iter().map(encode).collect();
            // DER orders SET children by their encoded octets.
            if object.tag.class == TagClass::Universal && object.tag.number == tag::SET {
                encoded.sort();
            }
            encoded.concat()
        }
    };

    encode_tag(object, out);
    encode_length(content.len(), out);
    out.extend_from_slice(&content);
}

fn encode_tag(object: &DerObject, out: &mut Vec<u8>) {
    let class_bits = match object.tag.class {
        TagClass::Universal => 0x00,
        TagClass::Application => 0x40,
        TagClass::ContextSpecific => 0x80,
        TagClass::Private => 0xc0,
    };
    let constructed_bit = if object.tag.constructed { 0x20 } else { 0x00 };
    let number = object.tag.number;

    if number < 0x1f {
        out.push(class_bits | constructed_bit | number as u8);
    } else {
        out.push(class_bits | constructed_bit | 0x1f);
        let mut stack = [0u8; 5];
        let mut n = 0;
        let mut v = number;
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
}

fn encode_length(length: usize, out: &mut Vec<u8>) {
    if length < 0x80 {
        out.push(length as u8);
        return;
    }
    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}
