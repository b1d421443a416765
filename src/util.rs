use serde::Serializer;
use std::io::{self, Read, Seek, SeekFrom};

/// Reads exactly `len` bytes at `offset`. The buffer grows with the data
/// actually read, so a bogus `len` fails with `UnexpectedEof` instead of
/// allocating it up front.
pub fn read_slice<R: Read + Seek + ?Sized>(r: &mut R, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    r.seek(SeekFrom::Start(offset))?;
    let mut v = Vec::new();
    Read::take(&mut *r, len).read_to_end(&mut v)?;
    if (v.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted {} bytes at {:#x}, got {}", len, offset, v.len()),
        ));
    }
    Ok(v)
}

/// Serialises raw bytes as a lowercase hex string.
pub fn serialize_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

/// Short printable preview of a byte field, for logs.
pub fn preview(bytes: &[u8], max: usize) -> String {
    let shown = &bytes[..bytes.len().min(max)];
    let mut out = hex::encode(shown);
    if bytes.len() > max {
        out.push_str("..");
    }
    out
}

pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn slice_past_end_fails_without_allocating_it() {
        let mut cur = Cursor::new(b"abcdef".to_vec());
        assert_eq!(read_slice(&mut cur, 2, 3).unwrap(), b"cde");
        let err = read_slice(&mut cur, 2, u64::MAX / 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn preview_truncates() {
        assert_eq!(preview(&[0xde, 0xad, 0xbe, 0xef], 2), "dead..");
        assert_eq!(preview(&[0x01], 4), "01");
    }

    #[test]
    fn dump_shows_offsets_and_ascii() {
        let d = hex_dump(b"AB\x00", 0x10);
        assert!(d.starts_with("00000010  41 42 00"));
        assert!(d.trim_end().ends_with("|AB.|"));
    }
}
