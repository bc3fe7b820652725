// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

//! Order-preserving key encoding.
//!
//! Key columns compare lexicographically, column by column. Instead of a
//! bespoke comparator, every key tuple is encoded into a byte string whose
//! memcmp order equals the column-wise order. The engine stores, indexes and
//! compares keys exclusively in this form.
//!
//! * Integers are encoded big-endian, so numeric order is byte order.
//! * Byte strings escape every `0x00` as `0x00 0xFF` and terminate with
//!   `0x00 0x00`. A shorter string therefore sorts before its extensions,
//!   and a composite key never interleaves with a neighbor column.

use crate::types::Value;

const ESCAPE: u8 = 0x00;
const ESCAPED: u8 = 0xff;
const TERMINATOR: [u8; 2] = [0x00, 0x00];

pub fn encode_u32(v: u32, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn encode_u64(v: u64, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        buf.push(b);
        if b == ESCAPE {
            buf.push(ESCAPED);
        }
    }
    buf.extend_from_slice(&TERMINATOR);
}

pub fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::UInt32(v) => encode_u32(*v, buf),
        Value::UInt64(v) => encode_u64(*v, buf),
        Value::Bytes(v) => encode_bytes(v, buf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(values: &[Value]) -> Vec<u8> {
        let mut buf = vec![];
        for value in values {
            encode_value(value, &mut buf);
        }
        buf
    }

    #[test]
    fn test_integer_order() {
        assert!(encoded(&[1u32.into()]) < encoded(&[2u32.into()]));
        assert!(encoded(&[255u32.into()]) < encoded(&[256u32.into()]));
        assert!(encoded(&[u64::from(u32::MAX).into()]) < encoded(&[u64::MAX.into()]));
    }

    #[test]
    fn test_bytes_order() {
        // a prefix sorts before its extensions
        assert!(encoded(&["a".into()]) < encoded(&["ab".into()]));
        // embedded zero bytes stay ordered
        assert!(encoded(&[b"a\x00".as_slice().into()]) < encoded(&[b"a\x00a".as_slice().into()]));
        assert!(encoded(&[b"a\x00a".as_slice().into()]) < encoded(&["aa".into()]));
    }

    #[test]
    fn test_composite_does_not_interleave() {
        // ("a", 2) must sort before ("ab", 1) even though "a2" > "ab1"
        // would not hold byte-wise without the terminator.
        let left = encoded(&["a".into(), 2u32.into()]);
        let right = encoded(&["ab".into(), 1u32.into()]);
        assert!(left < right);
    }
}
