use crate::error::ValueRangeError;
use bytes::{Bytes, BytesMut};
use rusty_p4_ecn_packet::MAC;
use std::net::Ipv4Addr;

/// Big-endian encoding of a match or param value.
pub trait Encode: Copy {
    fn encode(self) -> Bytes;
}

impl Encode for Ipv4Addr {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self.octets().as_ref())
    }
}

impl Encode for MAC {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_ref())
    }
}

impl Encode for u8 {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self.to_be_bytes().as_ref())
    }
}

impl Encode for u16 {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self.to_be_bytes().as_ref())
    }
}

impl Encode for u32 {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self.to_be_bytes().as_ref())
    }
}

impl Encode for u64 {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self.to_be_bytes().as_ref())
    }
}

impl Encode for &[u8] {
    fn encode(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

fn significant_bits(value: &[u8]) -> (u32, &[u8]) {
    match value.iter().position(|b| *b != 0) {
        Some(first) => {
            let rest = &value[first..];
            let bits = (rest.len() as u32 - 1) * 8 + (8 - rest[0].leading_zeros());
            (bits, rest)
        }
        None => (0, &[]),
    }
}

pub fn byte_width(bitwidth: i32) -> usize {
    ((bitwidth.max(0) as usize) + 7) / 8
}

/// Fits `value` into a field of `bitwidth` bits.
///
/// Leading zero bytes are dropped and the result is padded back to
/// `ceil(bitwidth / 8)` bytes, so two encodings of the same number always
/// compare equal.
pub fn fit(field: &str, value: &[u8], bitwidth: i32) -> Result<Bytes, ValueRangeError> {
    let (needed, significant) = significant_bits(value);
    if needed as i64 > bitwidth as i64 {
        return Err(ValueRangeError {
            field: field.to_owned(),
            value: hex::encode(value),
            needed,
            bitwidth,
        });
    }
    let width = byte_width(bitwidth);
    let mut out = BytesMut::with_capacity(width);
    out.resize(width - significant.len(), 0);
    out.extend_from_slice(significant);
    Ok(out.freeze())
}

/// Clears every bit of a fitted value below the top `prefix_len` bits of the field.
pub fn clear_host_bits(value: &[u8], bitwidth: i32, prefix_len: i32) -> Bytes {
    let mut out = BytesMut::from(value);
    let host_bits = (bitwidth - prefix_len).max(0) as usize;
    let len = out.len();
    for i in 0..host_bits.min(len * 8) {
        out[len - 1 - i / 8] &= !(1u8 << (i % 8));
    }
    out.freeze()
}

/// Mask with the top `prefix_len` bits of a `bitwidth` field set.
pub fn prefix_mask(bitwidth: i32, prefix_len: i32) -> Bytes {
    let width = byte_width(bitwidth);
    let mut out = BytesMut::with_capacity(width);
    out.resize(width, 0);
    let host_bits = (bitwidth - prefix_len).max(0) as usize;
    for i in host_bits..bitwidth.max(0) as usize {
        out[width - 1 - i / 8] |= 1u8 << (i % 8);
    }
    out.freeze()
}
