use serde::{Serialize, Serializer};
use std::fmt;

/// Widest identifier any framing produces (ASF GUIDs).
pub const MAX_ID_LEN: usize = 16;

/// Raw element identifier bytes, compared bytewise.
///
/// EBML identifiers keep their length-marker bit, ASF identifiers are the
/// GUID in its on-disk byte order, box identifiers are the four-character
/// code or the extended `uuid` type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    bytes: [u8; MAX_ID_LEN],
    len: u8,
}

impl ElementId {
    /// Builds an identifier from its big-endian numeric spelling,
    /// e.g. `0x1A45DFA3` for the EBML header. Leading zero bytes are dropped.
    pub const fn from_u32(v: u32) -> Self {
        let be = v.to_be_bytes();
        let mut skip = 0;
        while skip < 3 && be[skip] == 0 {
            skip += 1;
        }
        let mut bytes = [0u8; MAX_ID_LEN];
        let mut i = 0;
        while skip + i < 4 {
            bytes[i] = be[skip + i];
            i += 1;
        }
        ElementId { bytes, len: i as u8 }
    }

    pub const fn from_fourcc(cc: [u8; 4]) -> Self {
        let mut bytes = [0u8; MAX_ID_LEN];
        bytes[0] = cc[0];
        bytes[1] = cc[1];
        bytes[2] = cc[2];
        bytes[3] = cc[3];
        ElementId { bytes, len: 4 }
    }

    pub const fn from_guid_bytes(wire: [u8; 16]) -> Self {
        ElementId { bytes: wire, len: 16 }
    }

    pub fn from_slice(b: &[u8]) -> Option<Self> {
        if b.is_empty() || b.len() > MAX_ID_LEN {
            return None;
        }
        let mut bytes = [0u8; MAX_ID_LEN];
        bytes[..b.len()].copy_from_slice(b);
        Some(ElementId { bytes, len: b.len() as u8 })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_bytes()))
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self)
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Declared payload length of an element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementSize {
    Known(u64),
    /// The all-ones sentinel: the scope ends where a sibling or ancestor begins.
    Unknown,
}

impl ElementSize {
    pub fn known(self) -> Option<u64> {
        match self {
            ElementSize::Known(n) => Some(n),
            ElementSize::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, ElementSize::Unknown)
    }
}

impl fmt::Display for ElementSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementSize::Known(n) => write!(f, "{}", n),
            ElementSize::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementHeader {
    pub id: ElementId,
    pub size: ElementSize, // payload only
    pub header_len: u64,   // bytes of id + size fields
    pub start: u64,        // offset of the first header byte
}

impl ElementHeader {
    pub fn data_start(&self) -> u64 {
        self.start + self.header_len
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn parse(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }

    pub fn from_u32(v: u32) -> Self {
        FourCC(v.to_be_bytes())
    }

    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}
