//! Element header layouts for the three container families.

use crate::element::{ElementHeader, ElementId, ElementSize};
use crate::error::{DecodeError, Result};
use crate::source::Source;
use crate::vint;

/// Reads one element header at the current position.
pub trait Framing: Sync {
    fn name(&self) -> &'static str;
    fn read_header(&self, src: &mut Source<'_>) -> Result<ElementHeader>;
}

/// EBML: vint identifier followed by vint payload size.
pub struct EbmlFraming;

impl Framing for EbmlFraming {
    fn name(&self) -> &'static str {
        "ebml"
    }

    fn read_header(&self, src: &mut Source<'_>) -> Result<ElementHeader> {
        let start = src.position();
        let (id, id_len) = vint::read_id(src)?;
        let (size, size_len) = vint::read_size(src)?;
        Ok(ElementHeader { id, size, header_len: (id_len + size_len) as u64, start })
    }
}

/// ASF objects: 16-byte GUID then a little-endian u64 covering the whole object.
pub struct AsfFraming;

pub const ASF_HEADER_LEN: u64 = 24;

impl Framing for AsfFraming {
    fn name(&self) -> &'static str {
        "asf"
    }

    fn read_header(&self, src: &mut Source<'_>) -> Result<ElementHeader> {
        let start = src.position();
        let mut guid = [0u8; 16];
        src.fill(&mut guid)?;
        let total = src.read_u64_le()?;
        if total < ASF_HEADER_LEN {
            return Err(DecodeError::MalformedLength { offset: start });
        }
        Ok(ElementHeader {
            id: ElementId::from_guid_bytes(guid),
            size: ElementSize::Known(total - ASF_HEADER_LEN),
            header_len: ASF_HEADER_LEN,
            start,
        })
    }
}

/// ISO-BMFF boxes: u32 size and four-character type, with the 64-bit
/// `largesize` escape and the `uuid` extended type.
pub struct BoxFraming;

impl Framing for BoxFraming {
    fn name(&self) -> &'static str {
        "isobmff"
    }

    fn read_header(&self, src: &mut Source<'_>) -> Result<ElementHeader> {
        let start = src.position();
        let size32 = src.read_u32_be()?;
        let mut typ = [0u8; 4];
        src.fill(&mut typ)?;

        let mut size = size32 as u64;
        if size32 == 1 {
            size = src.read_u64_be()?;
        }

        let mut id = ElementId::from_fourcc(typ);
        if &typ == b"uuid" {
            let mut u = [0u8; 16];
            src.fill(&mut u)?;
            id = ElementId::from_guid_bytes(u);
        }

        let header_len = match (size32 == 1, &typ == b"uuid") {
            (true, true) => 8 + 8 + 16,
            (true, false) => 8 + 8,
            (false, true) => 8 + 16,
            (false, false) => 8,
        } as u64;

        // size 0 runs to the end of the enclosing box, or of the stream at top level
        let size = match size {
            0 => match src.remaining_in_scope() {
                Some(rest) => ElementSize::Known(rest),
                None => ElementSize::Unknown,
            },
            n if n < header_len => return Err(DecodeError::MalformedLength { offset: start }),
            n => ElementSize::Known(n - header_len),
        };

        Ok(ElementHeader { id, size, header_len, start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ebml_header_spans_both_vints() {
        let mut cur = Cursor::new(vec![0x1A, 0x45, 0xDF, 0xA3, 0x40, 0x10]);
        let mut src = Source::new(&mut cur).unwrap();
        let h = EbmlFraming.read_header(&mut src).unwrap();
        assert_eq!(h.id, ElementId::from_u32(0x1A45DFA3));
        assert_eq!(h.size, ElementSize::Known(16));
        assert_eq!(h.header_len, 6);
        assert_eq!(h.data_start(), 6);
    }

    #[test]
    fn asf_size_includes_header() {
        let mut bytes = vec![0xAB; 16];
        bytes.extend_from_slice(&30u64.to_le_bytes());
        let mut cur = Cursor::new(bytes);
        let mut src = Source::new(&mut cur).unwrap();
        let h = AsfFraming.read_header(&mut src).unwrap();
        assert_eq!(h.size, ElementSize::Known(6));
        assert_eq!(h.header_len, 24);
    }

    #[test]
    fn asf_size_below_header_is_malformed() {
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(&8u64.to_le_bytes());
        let mut cur = Cursor::new(bytes);
        let mut src = Source::new(&mut cur).unwrap();
        assert!(matches!(AsfFraming.read_header(&mut src), Err(DecodeError::MalformedLength { offset: 0 })));
    }

    #[test]
    fn box_largesize_and_to_end() {
        let mut bytes = vec![0, 0, 0, 1];
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&20u64.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(&[0u8; 3]);
        let len = bytes.len() as u64;
        let mut cur = Cursor::new(bytes);
        let mut src = Source::new(&mut cur).unwrap().with_len(Some(len));

        let h = BoxFraming.read_header(&mut src).unwrap();
        assert_eq!(h.id, ElementId::from_fourcc(*b"mdat"));
        assert_eq!(h.header_len, 16);
        assert_eq!(h.size, ElementSize::Known(4));
        src.skip(4).unwrap();

        let h = BoxFraming.read_header(&mut src).unwrap();
        assert_eq!(h.size, ElementSize::Known(3));
    }

    #[test]
    fn box_smaller_than_header_is_malformed() {
        let mut bytes = vec![0, 0, 0, 4];
        bytes.extend_from_slice(b"free");
        let mut cur = Cursor::new(bytes);
        let mut src = Source::new(&mut cur).unwrap();
        assert!(matches!(BoxFraming.read_header(&mut src), Err(DecodeError::MalformedLength { .. })));
    }
}
