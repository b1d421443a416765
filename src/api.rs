use crate::accessor::{self, Field};
use crate::error::{DecodeError, Result};
use crate::formats::{asf, ebml, mp4, Format};
use crate::model::Container;
use crate::source::ByteSource;
use crate::util::{hex_dump, read_slice};
use log::debug;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read when sniffing a format.
const SNIFF_LEN: usize = 16;

/// Options for library callers.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Total stream length, used to reject sizes that run past the end.
    /// Measured from the reader when `None`.
    pub total_len: Option<u64>,
    /// Return what was decoded before the stream ended instead of
    /// `UnexpectedEndOfStream`.
    pub keep_partial: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions { total_len: None, keep_partial: true }
    }
}

/// Identifies the container format from the first bytes of `src`.
/// The read position is restored.
pub fn detect(src: &mut dyn ByteSource) -> Result<Option<Format>> {
    let start = src.stream_position()?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    Read::take(&mut *src, SNIFF_LEN as u64).read_to_end(&mut head)?;
    src.seek(SeekFrom::Start(start))?;
    Ok(Format::sniff(&head))
}

/// Decodes a container from any seekable reader.
///
/// # Example
/// ```no_run
/// use mediatree::{decode, DecodeOptions};
/// use std::fs::File;
///
/// let mut file = File::open("movie.mkv")?;
/// let container = decode(&mut file, &DecodeOptions::default())?;
/// println!("{:?}", container.duration());
/// # Ok::<(), mediatree::DecodeError>(())
/// ```
pub fn decode<R: Read + Seek>(reader: &mut R, options: &DecodeOptions) -> Result<Container> {
    let mut options = options.clone();
    if options.total_len.is_none() {
        let here = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(here))?;
        options.total_len = Some(end);
    }
    decode_source(reader, &options)
}

fn decode_source(src: &mut dyn ByteSource, options: &DecodeOptions) -> Result<Container> {
    let format = detect(src)?.ok_or(DecodeError::InvalidSignature("unrecognised container format"))?;
    debug!("detected {} ({:?} bytes)", format, options.total_len);
    match format {
        Format::Ebml => ebml::decode(src, options),
        Format::Asf => asf::decode(src, options),
        Format::Mp4 => mp4::decode(src, options),
    }
}

/// Opens and decodes the file at `path`.
pub fn decode_path(path: impl AsRef<Path>) -> Result<Container> {
    let file = File::open(path.as_ref())?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let options = DecodeOptions { total_len: Some(len), ..Default::default() };
    decode_source(&mut reader, &options)
}

impl Container {
    /// Resolves a friendly field name such as `artist` through the accessor
    /// table of the format that produced this container.
    pub fn field(&self, name: &str) -> Option<Field<'_>> {
        let format = self.format?;
        accessor::resolve(format.accessors(), self, name)
    }
}

/// A hex dump of a byte range.
#[derive(Debug, Serialize)]
pub struct HexDump {
    pub offset: u64,
    /// Bytes actually read; shorter than requested near the end of the data.
    pub length: u64,
    pub hex: String,
}

/// Dumps up to `max_len` bytes at `offset`, never past `size`.
pub fn hex_range<R: Read + Seek + ?Sized>(r: &mut R, size: u64, offset: u64, max_len: u64) -> Result<HexDump> {
    let to_read = size.saturating_sub(offset).min(max_len);
    if to_read == 0 {
        return Ok(HexDump { offset, length: 0, hex: String::new() });
    }
    let data = read_slice(r, offset, to_read)?;
    Ok(HexDump { offset, length: to_read, hex: hex_dump(&data, offset) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detect_restores_position() {
        let mut cur = Cursor::new(vec![0u8, 0, 0, 0x10, b'f', b't', b'y', b'p', 0, 0]);
        assert_eq!(detect(&mut cur).unwrap(), Some(Format::Mp4));
        assert_eq!(cur.position(), 0);

        let mut short = Cursor::new(vec![0x1A, 0x45]);
        assert_eq!(detect(&mut short).unwrap(), None);
        assert_eq!(short.position(), 0);
    }

    #[test]
    fn hex_range_stops_at_size() {
        let mut cur = Cursor::new(b"0123456789".to_vec());
        let d = hex_range(&mut cur, 10, 8, 16).unwrap();
        assert_eq!(d.length, 2);
        assert!(d.hex.contains("|89|"));
        assert_eq!(hex_range(&mut cur, 10, 12, 4).unwrap().length, 0);
    }
}
