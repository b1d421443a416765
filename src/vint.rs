//! EBML variable-length integers.
//!
//! The length of a vint is one plus the number of leading zero bits in its
//! first byte. Identifiers keep the marker bit; sizes strip it. A size whose
//! data bits are all ones means "unknown".

use crate::element::{ElementId, ElementSize};
use crate::error::{DecodeError, Result};
use crate::source::Source;

pub const MAX_VINT_LEN: usize = 8;

/// Encoded length implied by the first byte, or `None` for a zero byte.
pub const fn vint_len(first: u8) -> Option<usize> {
    if first == 0 {
        None
    } else {
        Some(first.leading_zeros() as usize + 1)
    }
}

/// Largest size value encodable in `len` bytes; one above it is the unknown marker.
pub const fn max_size(len: usize) -> u64 {
    (1u64 << (7 * len)) - 2
}

/// Decodes a size from exactly the bytes of one vint.
fn size_from_bytes(bytes: &[u8]) -> ElementSize {
    let len = bytes.len();
    let mask = ((1u16 << (8 - len)) - 1) as u8;
    let mut value = (bytes[0] & mask) as u64;
    for &b in &bytes[1..] {
        value = (value << 8) | b as u64;
    }
    if value == (1u64 << (7 * len)) - 1 {
        ElementSize::Unknown
    } else {
        ElementSize::Known(value)
    }
}

/// Decodes a size vint at the start of `buf`, returning it with its encoded length.
pub fn decode_size(buf: &[u8]) -> Result<(ElementSize, usize)> {
    let first = *buf.first().ok_or(DecodeError::UnexpectedEndOfStream { offset: 0 })?;
    let len = vint_len(first).ok_or(DecodeError::MalformedLength { offset: 0 })?;
    if buf.len() < len {
        return Err(DecodeError::UnexpectedEndOfStream { offset: buf.len() as u64 });
    }
    Ok((size_from_bytes(&buf[..len]), len))
}

/// Reads the raw bytes of one vint, marker included.
fn read_raw(src: &mut Source<'_>) -> Result<([u8; MAX_VINT_LEN], usize)> {
    let start = src.position();
    let first = src.read_u8()?;
    let len = vint_len(first).ok_or(DecodeError::MalformedLength { offset: start })?;
    let mut bytes = [0u8; MAX_VINT_LEN];
    bytes[0] = first;
    src.fill(&mut bytes[1..len])?;
    Ok((bytes, len))
}

pub fn read_id(src: &mut Source<'_>) -> Result<(ElementId, usize)> {
    let start = src.position();
    let (bytes, len) = read_raw(src)?;
    let id = ElementId::from_slice(&bytes[..len]).ok_or(DecodeError::MalformedLength { offset: start })?;
    Ok((id, len))
}

pub fn read_size(src: &mut Source<'_>) -> Result<(ElementSize, usize)> {
    let (bytes, len) = read_raw(src)?;
    Ok((size_from_bytes(&bytes[..len]), len))
}

/// Encodes `value` as a size vint, in `len` bytes or the shortest that fits.
/// Returns `None` when the value does not fit.
pub fn encode_size(value: u64, len: Option<usize>) -> Option<Vec<u8>> {
    let len = match len {
        Some(l) if (1..=MAX_VINT_LEN).contains(&l) && value <= max_size(l) => l,
        Some(_) => return None,
        None => (1..=MAX_VINT_LEN).find(|&l| value <= max_size(l))?,
    };
    let marked = value | (1u64 << (7 * len));
    Some(marked.to_be_bytes()[8 - len..].to_vec())
}

/// The all-ones unknown-size marker in `len` bytes.
pub fn encode_unknown_size(len: usize) -> Vec<u8> {
    let len = len.clamp(1, MAX_VINT_LEN);
    let value = (1u64 << (7 * len)) - 1;
    (value | (1u64 << (7 * len))).to_be_bytes()[8 - len..].to_vec()
}
