//! Fixed-width and length-prefixed primitive reads on a [`Source`].
//!
//! Big-endian is the default. Little-endian variants exist for the ASF
//! framing. A short read surfaces as [`DecodeError::UnexpectedEndOfStream`]
//! carrying the offset the primitive started at.

use crate::error::{DecodeError, Result};
use crate::source::Source;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on a single allocating read when the stream length is unknown.
pub const MAX_UNBOUNDED_READ: u64 = 64 * 1024 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Numerator over denominator; a zero denominator reads as 0.0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub fn value(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl Source<'_> {
    pub fn read_u8(&mut self) -> Result<u8> {
        self.with_offset(|s| ReadBytesExt::read_u8(s))
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.with_offset(|s| s.read_u16::<BigEndian>())
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.with_offset(|s| s.read_u16::<LittleEndian>())
    }

    pub fn read_i16_be(&mut self) -> Result<i16> {
        self.with_offset(|s| s.read_i16::<BigEndian>())
    }

    pub fn read_u24_be(&mut self) -> Result<u32> {
        self.with_offset(|s| s.read_u24::<BigEndian>())
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.with_offset(|s| s.read_u32::<BigEndian>())
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.with_offset(|s| s.read_u32::<LittleEndian>())
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.with_offset(|s| s.read_i32::<LittleEndian>())
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        self.with_offset(|s| s.read_u64::<BigEndian>())
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.with_offset(|s| s.read_u64::<LittleEndian>())
    }

    /// Big-endian unsigned integer of `n` bytes; `n == 0` reads nothing and yields 0.
    pub fn read_uint_be(&mut self, n: u64) -> Result<u64> {
        match n {
            0 => Ok(0),
            1..=8 => self.with_offset(|s| s.read_uint::<BigEndian>(n as usize)),
            _ => Err(DecodeError::MalformedLength { offset: self.position() }),
        }
    }

    /// Big-endian two's complement integer of `n` bytes, sign-extended.
    pub fn read_int_be(&mut self, n: u64) -> Result<i64> {
        match n {
            0 => Ok(0),
            1..=8 => self.with_offset(|s| s.read_int::<BigEndian>(n as usize)),
            _ => Err(DecodeError::MalformedLength { offset: self.position() }),
        }
    }

    pub fn read_f32_be(&mut self) -> Result<f32> {
        self.with_offset(|s| s.read_f32::<BigEndian>())
    }

    pub fn read_f64_be(&mut self) -> Result<f64> {
        self.with_offset(|s| s.read_f64::<BigEndian>())
    }

    /// IEEE float of width 0, 4 or 8.
    pub fn read_float_be(&mut self, n: u64) -> Result<f64> {
        match n {
            0 => Ok(0.0),
            4 => self.read_f32_be().map(f64::from),
            8 => self.read_f64_be(),
            _ => Err(DecodeError::MalformedLength { offset: self.position() }),
        }
    }

    /// 16-byte GUID in the mixed-endian layout used on disk by ASF.
    pub fn read_guid(&mut self) -> Result<Uuid> {
        let mut b = [0u8; 16];
        self.fill(&mut b)?;
        Ok(Uuid::from_bytes_le(b))
    }

    pub fn read_rational(&mut self) -> Result<Rational> {
        let num = self.read_u32_be()?;
        let den = self.read_u32_be()?;
        Ok(Rational { num, den })
    }

    /// Reads `n` bytes into a fresh buffer. A length running past the end of
    /// a stream of known length is a truncation, checked before allocating.
    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>> {
        match self.remaining() {
            Some(rest) if n > rest => {
                return Err(DecodeError::UnexpectedEndOfStream { offset: self.position() });
            }
            None if n > MAX_UNBOUNDED_READ => {
                return Err(DecodeError::MalformedLength { offset: self.position() });
            }
            _ => {}
        }
        let mut v = vec![0u8; n as usize];
        self.fill(&mut v)?;
        Ok(v)
    }

    pub fn read_utf8(&mut self, n: u64) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(trim_nul(&String::from_utf8_lossy(&bytes)).to_owned())
    }

    pub fn read_latin1(&mut self, n: u64) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(trim_nul(&bytes.iter().map(|&b| b as char).collect::<String>()).to_owned())
    }

    pub fn read_utf16(&mut self, n: u64, endian: Endian) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(decode_utf16(&bytes, endian))
    }

    /// Bytes up to (not including) a NUL, reading at most `max` bytes.
    pub fn read_cstring(&mut self, max: u64) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for _ in 0..max {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            out.push(b);
        }
        Ok(out)
    }
}

/// Text fields are padded with NULs in all three container families.
fn trim_nul(s: &str) -> &str {
    s.trim_end_matches('\0')
}

/// Decodes UTF-16 code units, dropping one trailing NUL terminator.
pub fn decode_utf16(bytes: &[u8], endian: Endian) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| match endian {
            Endian::Big => u16::from_be_bytes([c[0], c[1]]),
            Endian::Little => u16::from_le_bytes([c[0], c[1]]),
        })
        .collect();
    let units = match units.split_last() {
        Some((0, rest)) => rest,
        _ => &units[..],
    };
    String::from_utf16_lossy(units)
}

/// On-disk byte layout of a GUID, the inverse of [`Source::read_guid`].
pub fn guid_wire_bytes(guid: &Uuid) -> [u8; 16] {
    guid.to_bytes_le()
}
