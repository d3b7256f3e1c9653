//! Basic Encoding Rules, restricted to what SNMPv1/v2c messages use.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::oid::Oid;

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_IP_ADDRESS: u8 = 0x40;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIMETICKS: u8 = 0x43;
pub const TAG_OPAQUE: u8 = 0x44;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// BER codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BerError {
    #[error("Buffer underflow: need {needed} bytes, have {available}")]
    BufferUnderflow { needed: usize, available: usize },
    #[error("Unexpected tag: expected 0x{expected:02x}, got 0x{actual:02x}")]
    UnexpectedTag { expected: u8, actual: u8 },
    #[error("Unsupported length encoding")]
    UnsupportedLength,
    #[error("Integer does not fit in 64 bits")]
    IntegerOverflow,
    #[error("Invalid object identifier")]
    InvalidOid,
    #[error("Decode error: {0}")]
    DecodeError(String),
}

pub type BerResult<T> = Result<T, BerError>;

fn need(buf: &Bytes, needed: usize) -> BerResult<()> {
    if buf.remaining() < needed {
        return Err(BerError::BufferUnderflow {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn read_length(buf: &mut Bytes) -> BerResult<usize> {
    need(buf, 1)?;
    let first = buf.get_u8();
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }
    let octets = (first & 0x7f) as usize;
    if octets == 0 || octets > 4 {
        return Err(BerError::UnsupportedLength);
    }
    need(buf, octets)?;
    let mut len = 0usize;
    for _ in 0..octets {
        len = (len << 8) | buf.get_u8() as usize;
    }
    Ok(len)
}

/// Read one TLV, returning its tag and content.
pub fn read_tlv(buf: &mut Bytes) -> BerResult<(u8, Bytes)> {
    need(buf, 1)?;
    let tag = buf.get_u8();
    let len = read_length(buf)?;
    need(buf, len)?;
    Ok((tag, buf.split_to(len)))
}

/// Read one TLV that must carry `expected`.
pub fn expect_tlv(buf: &mut Bytes, expected: u8) -> BerResult<Bytes> {
    let (tag, content) = read_tlv(buf)?;
    if tag != expected {
        return Err(BerError::UnexpectedTag { expected, actual: tag });
    }
    Ok(content)
}

pub fn decode_integer(content: &[u8]) -> BerResult<i64> {
    if content.is_empty() {
        return Err(BerError::DecodeError("empty integer".into()));
    }
    if content.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        value = (value << 8) | b as i64;
    }
    Ok(value)
}

/// Unsigned application types (Counter32, Gauge32, TimeTicks, Counter64).
pub fn decode_unsigned(content: &[u8]) -> BerResult<u64> {
    let digits = match content {
        [0, rest @ ..] => rest,
        all => all,
    };
    if digits.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    Ok(digits.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

pub fn decode_oid(content: &[u8]) -> BerResult<Oid> {
    if content.is_empty() {
        return Err(BerError::InvalidOid);
    }
    let mut subids = Vec::with_capacity(content.len() + 1);
    let mut acc: u32 = 0;
    let mut pending = false;
    for &b in content {
        if acc > (u32::MAX >> 7) {
            return Err(BerError::InvalidOid);
        }
        acc = (acc << 7) | (b & 0x7f) as u32;
        pending = b & 0x80 != 0;
        if !pending {
            subids.push(acc);
            acc = 0;
        }
    }
    if pending {
        return Err(BerError::InvalidOid);
    }

    // The first sub-identifier packs the first two arcs as `x * 40 + y`;
    // only arc 2 may have a second arc of 40 or more.
    let first = subids[0];
    let (x, y) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = Vec::with_capacity(subids.len() + 1);
    arcs.push(x);
    arcs.push(y);
    arcs.extend_from_slice(&subids[1..]);
    Ok(Oid::new(arcs))
}

// =============================================================================
// Encoding
// =============================================================================

fn put_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.put_u8(0x80 | (4 - skip) as u8);
    out.put_slice(&bytes[skip..]);
}

pub fn put_tlv(out: &mut BytesMut, tag: u8, content: &[u8]) {
    out.put_u8(tag);
    put_length(out, content.len());
    out.put_slice(content);
}

/// Minimal two's complement encoding.
pub fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xff && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

pub fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

pub fn encode_oid(oid: &Oid) -> Vec<u8> {
    let arcs = oid.arcs();
    let mut out = Vec::with_capacity(arcs.len() + 4);
    let (a, b) = match arcs {
        [a, b, ..] => (*a, *b),
        [a] => (*a, 0),
        [] => (0, 0),
    };
    push_base128(&mut out, a * 40 + b);
    for &arc in arcs.iter().skip(2) {
        push_base128(&mut out, arc);
    }
    out
}

fn push_base128(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7f) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let more = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | more);
    }
}
