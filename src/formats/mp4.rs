//! ISO base media (MP4, M4A, QuickTime) driver.

use crate::api::DecodeOptions;
use crate::element::{ElementId, FourCC};
use crate::error::{DecodeError, Result};
use crate::formats::{settle, Format};
use crate::framing::BoxFraming;
use crate::model::{Container, Entry, Locale, Stream, Value, UNKNOWN};
use crate::parser::Walker;
use crate::registry::{ElementDescriptor, ReadContext, Registry};
use crate::source::{ByteSource, Source};
use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, info};
use once_cell::sync::Lazy;
use std::io::{self, Cursor, Read};

/// 1904-01-01 (the QuickTime epoch) to the Unix epoch, in seconds.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

const NS_PER_SECOND: u64 = 1_000_000_000;

#[derive(Debug)]
pub struct Mp4State {
    pub container: Container,
}

impl Mp4State {
    fn entry(&mut self) -> Option<&mut Entry> {
        self.container.current_entry()
    }

    fn stream(&mut self) -> Option<&mut Stream> {
        self.entry()?.streams.last_mut()
    }
}

type Mp4Walker<'a> = Walker<'a, Mp4State>;

static BOXES: Lazy<Registry<Mp4State>> = Lazy::new(registry);

const fn cc(code: &[u8; 4]) -> ElementId {
    ElementId::from_fourcc(*code)
}

/// Boxes that are named in logs but never decoded.
const TITLED: &[(&[u8; 4], &str)] = &[
    (b"free", "Free Space"),
    (b"skip", "Skip"),
    (b"wide", "Wide"),
    (b"meta", "Metadata"),
    (b"pssh", "Protection System Specific Header"),
    (b"sidx", "Segment Index"),
    (b"styp", "Segment Type"),
    (b"moof", "Movie Fragment"),
    (b"mfra", "Movie Fragment Random Access"),
    (b"mvex", "Movie Extends"),
    (b"tref", "Track Reference"),
    (b"elst", "Edit List"),
    (b"vmhd", "Video Media Header"),
    (b"nmhd", "Null Media Header"),
    (b"dref", "Data Reference"),
    (b"stts", "Decoding Time to Sample"),
    (b"ctts", "Composition Time to Sample"),
    (b"stsc", "Sample to Chunk"),
    (b"stsz", "Sample Size"),
    (b"stz2", "Compact Sample Size"),
    (b"stco", "Chunk Offset"),
    (b"co64", "Chunk Large Offset"),
    (b"stss", "Sync Sample"),
    (b"sgpd", "Sample Group Description"),
    (b"sbgp", "Sample to Group"),
];

fn registry() -> Registry<Mp4State> {
    let registry = Registry::new("mp4")
        .with_element(cc(b"ftyp"), "File Type", read_ftyp)
        .with_element(cc(b"moov"), "moov", read_moov)
        .with_element(cc(b"mvhd"), "Movie Header", read_mvhd)
        .with_element(cc(b"trak"), "trak", read_trak)
        .with_element(cc(b"tkhd"), "Track Header", read_tkhd)
        .with_element(cc(b"mdia"), "mdia", read_container)
        .with_element(cc(b"mdhd"), "Media Header", read_mdhd)
        .with_element(cc(b"hdlr"), "Handler Reference", read_hdlr)
        .with_element(cc(b"minf"), "minf", read_container)
        .with_element(cc(b"smhd"), "Sound Media Header", read_smhd)
        .with_element(cc(b"dinf"), "dinf", read_container)
        .with_element(cc(b"stbl"), "stbl", read_container)
        .with_element(cc(b"stsd"), "Sample Description", read_stsd)
        .with_element(cc(b"edts"), "edts", read_container)
        .with_element(cc(b"udta"), "udta", read_container)
        .with(cc(b"mdat"), ElementDescriptor::new("Media Data").quiet());
    TITLED
        .iter()
        .fold(registry, |r, &(code, title)| r.with_title(cc(code), title))
}

/// Decodes an ISO base media file from its first box.
pub fn decode(src: &mut dyn ByteSource, options: &DecodeOptions) -> Result<Container> {
    let source = Source::new(src)?.with_len(options.total_len);
    let state = Mp4State { container: Container::new(Format::Mp4) };
    let mut walker = Walker::new(source, &BoxFraming, state);
    let outcome = walker.walk_to_end("root", &BOXES);
    settle(outcome, options)?;

    let mut container = walker.into_state().container;
    if container.mimetype.is_none() {
        container.mimetype = Some("video/mp4".into());
    }
    info!(
        "mp4: {} tracks, duration {:?}",
        container.entry().map_or(0, |e| e.streams().count()),
        container.duration()
    );
    Ok(container)
}

/// Reads the whole payload of a leaf box and parses it from memory.
/// Running out of payload means the box is too short for its fields.
fn parse_payload<T>(
    w: &mut Mp4Walker<'_>,
    ctx: &ReadContext<'_>,
    parse: impl FnOnce(&mut Cursor<&[u8]>) -> io::Result<T>,
) -> Result<(T, u64)> {
    let n = ctx.leaf_len()?;
    let buf = w.source().read_bytes(n)?;
    let mut cur = Cursor::new(buf.as_slice());
    let value = parse(&mut cur).map_err(|e| {
        debug!("{}: {}", ctx.title, e);
        DecodeError::MalformedLength { offset: ctx.header.start }
    })?;
    Ok((value, n))
}

/// FullBox version and 24-bit flags.
fn read_full_box(cur: &mut Cursor<&[u8]>) -> io::Result<(u8, u32)> {
    let version = cur.read_u8()?;
    let flags = cur.read_u24::<BigEndian>()?;
    Ok((version, flags))
}

fn read_fourcc(cur: &mut Cursor<&[u8]>) -> io::Result<FourCC> {
    let mut cc = [0u8; 4];
    cur.read_exact(&mut cc)?;
    Ok(FourCC(cc))
}

/// Packed ISO-639-2/T code: three 5-bit letters offset from 0x60.
pub fn lang_from_u16(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    let c1 = ((code >> 10) & 0x1F) as u8 + 0x60;
    let c2 = ((code >> 5) & 0x1F) as u8 + 0x60;
    let c3 = (code & 0x1F) as u8 + 0x60;
    format!("{}{}{}", c1 as char, c2 as char, c3 as char)
}

fn mac_time_to_unix_ns(secs: u64) -> i64 {
    i64::try_from(secs)
        .unwrap_or(i64::MAX)
        .saturating_sub(MAC_EPOCH_OFFSET)
        .saturating_mul(NS_PER_SECOND as i64)
}

/// Ticks and tick period for a duration counted in `timescale` units.
/// Timescales that do not divide a second into whole nanoseconds are
/// rescaled to milliseconds.
pub fn ticks_for(duration: u64, timescale: u32) -> (i64, i64) {
    if timescale == 0 {
        return (UNKNOWN, UNKNOWN);
    }
    let timescale = timescale as u64;
    if NS_PER_SECOND % timescale == 0 {
        (i64::try_from(duration).unwrap_or(i64::MAX), (NS_PER_SECOND / timescale) as i64)
    } else {
        let ms = (duration as u128 * 1000 / timescale as u128) as i64;
        (ms, 1_000_000)
    }
}

fn fixed_16_16(v: u32) -> f64 {
    v as f64 / 65536.0
}

fn read_ftyp(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let ((major, minor, brands), n) = parse_payload(w, ctx, |cur| {
        let major = read_fourcc(cur)?;
        let minor = cur.read_u32::<BigEndian>()?;
        let mut brands = Vec::new();
        while let Ok(b) = read_fourcc(cur) {
            brands.push(b);
        }
        Ok((major, minor, brands))
    })?;

    let container = &mut w.state.container;
    container.mimetype = Some(
        match &major.0 {
            b"M4A " => "audio/mp4",
            b"qt  " => "video/quicktime",
            _ => "video/mp4",
        }
        .to_owned(),
    );
    let md = &mut container.metadata;
    md.insert("major_brand".into(), Value::Text(major.as_str_lossy()));
    md.insert("minor_version".into(), Value::UInt(minor as u64));
    md.insert(
        "compatible_brands".into(),
        Value::List(brands.iter().map(|b| Value::Text(b.as_str_lossy())).collect()),
    );
    Ok(n)
}

fn read_moov(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.state.container.push_entry(Entry::new());
    w.walk("moov", ctx.size(), &BOXES, None)
}

fn read_container(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk(ctx.title, ctx.size(), &BOXES, None)
}

fn read_mvhd(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let ((creation, modification, timescale, duration, rate, volume), n) = parse_payload(w, ctx, |cur| {
        let (version, _flags) = read_full_box(cur)?;
        let (creation, modification, timescale, duration) = if version == 1 {
            let c = cur.read_u64::<BigEndian>()?;
            let m = cur.read_u64::<BigEndian>()?;
            let ts = cur.read_u32::<BigEndian>()?;
            let d = cur.read_u64::<BigEndian>()?;
            (c, m, ts, (d != u64::MAX).then_some(d))
        } else {
            let c = cur.read_u32::<BigEndian>()? as u64;
            let m = cur.read_u32::<BigEndian>()? as u64;
            let ts = cur.read_u32::<BigEndian>()?;
            let d = cur.read_u32::<BigEndian>()?;
            (c, m, ts, (d != u32::MAX).then_some(d as u64))
        };
        let rate = cur.read_u32::<BigEndian>()?;
        let volume = cur.read_i16::<BigEndian>()?;
        Ok((creation, modification, timescale, duration, rate, volume))
    })?;

    let Some(entry) = w.state.entry() else { return Ok(n) };
    if let Some(duration) = duration {
        (entry.ticks, entry.tick_period) = ticks_for(duration, timescale);
    }
    let md = &mut entry.metadata;
    md.insert("creation_time".into(), Value::Date(mac_time_to_unix_ns(creation)));
    md.insert("modification_time".into(), Value::Date(mac_time_to_unix_ns(modification)));
    md.insert("timescale".into(), Value::UInt(timescale as u64));
    md.insert("rate".into(), Value::Float(fixed_16_16(rate)));
    md.insert("volume".into(), Value::Float(volume as f64 / 256.0));
    Ok(n)
}

fn read_trak(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    if let Some(entry) = w.state.entry() {
        let number = entry.streams.len() as u32 + 1;
        entry.streams.push(Stream { number, ..Default::default() });
    }
    w.walk("trak", ctx.size(), &BOXES, None)
}

fn read_tkhd(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let ((flags, track_id, width, height), n) = parse_payload(w, ctx, |cur| {
        let (version, flags) = read_full_box(cur)?;
        // creation and modification times
        let times_len = if version == 1 { 16 } else { 8 };
        cur.set_position(cur.position() + times_len);
        let track_id = cur.read_u32::<BigEndian>()?;
        let _reserved = cur.read_u32::<BigEndian>()?;
        let _duration = if version == 1 {
            cur.read_u64::<BigEndian>()?
        } else {
            cur.read_u32::<BigEndian>()? as u64
        };
        // reserved, layer, alternate group, volume, reserved, matrix
        cur.set_position(cur.position() + 8 + 8 + 36);
        let width = cur.read_u32::<BigEndian>()?;
        let height = cur.read_u32::<BigEndian>()?;
        Ok((flags, track_id, width, height))
    })?;

    if let Some(stream) = w.state.stream() {
        stream.enabled = flags & 1 != 0;
        stream.number = track_id;
        stream.uid = track_id as u64;
        if width != 0 || height != 0 {
            stream.metadata.insert("display_width".into(), Value::UInt((width >> 16) as u64));
            stream.metadata.insert("display_height".into(), Value::UInt((height >> 16) as u64));
        }
    }
    Ok(n)
}

fn read_mdhd(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let ((timescale, duration, language), n) = parse_payload(w, ctx, |cur| {
        let (version, _flags) = read_full_box(cur)?;
        let (timescale, duration) = if version == 1 {
            cur.set_position(cur.position() + 16);
            let ts = cur.read_u32::<BigEndian>()?;
            (ts, cur.read_u64::<BigEndian>()?)
        } else {
            cur.set_position(cur.position() + 8);
            let ts = cur.read_u32::<BigEndian>()?;
            (ts, cur.read_u32::<BigEndian>()? as u64)
        };
        let language = cur.read_u16::<BigEndian>()?;
        Ok((timescale, duration, language))
    })?;

    if let Some(stream) = w.state.stream() {
        stream.metadata.insert("timescale".into(), Value::UInt(timescale as u64));
        stream.metadata.insert("duration".into(), Value::UInt(duration));
        stream.locale = Locale::parse(&lang_from_u16(language));
    }
    Ok(n)
}

fn read_hdlr(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let ((handler, name), n) = parse_payload(w, ctx, |cur| {
        let _full = read_full_box(cur)?;
        let _pre_defined = cur.read_u32::<BigEndian>()?;
        let handler = read_fourcc(cur)?;
        let mut reserved = [0u8; 12];
        cur.read_exact(&mut reserved)?;
        let mut name = Vec::new();
        cur.read_to_end(&mut name)?;
        while name.last() == Some(&0) {
            name.pop();
        }
        Ok((handler, String::from_utf8_lossy(&name).into_owned()))
    })?;

    // only handlers inside a track describe a stream
    if ctx.scope != "mdia" {
        return Ok(n);
    }
    let Some(stream) = w.state.stream() else { return Ok(n) };
    match &handler.0 {
        b"vide" => {
            stream.video_mut();
        }
        b"soun" => {
            let locale = stream.locale.clone();
            if let Some(audio) = stream.audio_mut() {
                audio.locale = locale;
            }
        }
        b"sbtl" | b"text" | b"subt" => {
            let locale = stream.locale.clone();
            if let Some(sub) = stream.subtitle_mut() {
                sub.locale = locale;
            }
        }
        _ => debug!("handler {} has no stream info", handler),
    }
    stream.metadata.insert("handler".into(), Value::Text(handler.as_str_lossy()));
    if !name.is_empty() {
        stream.name = Some(name);
    }
    Ok(n)
}

fn read_smhd(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let (balance, n) = parse_payload(w, ctx, |cur| {
        let _full = read_full_box(cur)?;
        cur.read_i16::<BigEndian>()
    })?;
    if let Some(audio) = w.state.stream().and_then(Stream::audio_mut) {
        audio.balance = balance as f64 / 256.0;
    }
    Ok(n)
}

/// First sample entry of a sample description table.
enum SampleEntry {
    Visual { format: FourCC, width: u16, height: u16, horiz_dpi: u32, vert_dpi: u32, depth: u16 },
    Audio { format: FourCC, channels: u16, sample_size: u16, sample_rate: u32 },
    Other(FourCC),
}

fn read_stsd(w: &mut Mp4Walker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let kind = w.state.stream().map(|s| (s.is_video(), s.is_audio()));
    let (entry, n) = parse_payload(w, ctx, |cur| {
        let _full = read_full_box(cur)?;
        let count = cur.read_u32::<BigEndian>()?;
        if count == 0 {
            return Ok(None);
        }
        let _size = cur.read_u32::<BigEndian>()?;
        let format = read_fourcc(cur)?;
        // reserved and data reference index
        cur.set_position(cur.position() + 8);
        let entry = match kind {
            Some((true, _)) => {
                cur.set_position(cur.position() + 16);
                let width = cur.read_u16::<BigEndian>()?;
                let height = cur.read_u16::<BigEndian>()?;
                let horiz = cur.read_u32::<BigEndian>()?;
                let vert = cur.read_u32::<BigEndian>()?;
                // reserved, frame count, compressor name
                cur.set_position(cur.position() + 4 + 2 + 32);
                let depth = cur.read_u16::<BigEndian>()?;
                SampleEntry::Visual {
                    format,
                    width,
                    height,
                    horiz_dpi: (horiz >> 16),
                    vert_dpi: (vert >> 16),
                    depth,
                }
            }
            Some((_, true)) => {
                cur.set_position(cur.position() + 8);
                let channels = cur.read_u16::<BigEndian>()?;
                let sample_size = cur.read_u16::<BigEndian>()?;
                cur.set_position(cur.position() + 4);
                let sample_rate = cur.read_u32::<BigEndian>()?;
                SampleEntry::Audio { format, channels, sample_size, sample_rate }
            }
            _ => SampleEntry::Other(format),
        };
        Ok(Some(entry))
    })?;

    let (Some(entry), Some(stream)) = (entry, w.state.stream()) else { return Ok(n) };
    match entry {
        SampleEntry::Visual { format, width, height, horiz_dpi, vert_dpi, depth } => {
            stream.codec = Some(format.as_str_lossy());
            if let Some(video) = stream.video_mut() {
                video.width = width as u32;
                video.height = height as u32;
                video.horiz_dpi = horiz_dpi;
                video.vert_dpi = vert_dpi;
                video.bit_depth = depth;
                video.fourcc = Some(format);
            }
        }
        SampleEntry::Audio { format, channels, sample_size, sample_rate } => {
            stream.codec = Some(format.as_str_lossy());
            if let Some(audio) = stream.audio_mut() {
                audio.channels = channels;
                audio.bits_per_sample = sample_size;
                audio.sample_rate = fixed_16_16(sample_rate);
            }
        }
        SampleEntry::Other(format) => stream.codec = Some(format.as_str_lossy()),
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_language() {
        // "eng" = (5, 14, 7)
        let code = (5 << 10) | (14 << 5) | 7;
        assert_eq!(lang_from_u16(code), "eng");
        assert_eq!(lang_from_u16(0), "und");
    }

    #[test]
    fn timescale_to_ticks() {
        assert_eq!(ticks_for(90_000, 1000), (90_000, 1_000_000));
        assert_eq!(ticks_for(48_000, 48_000), (1000, 1_000_000));
        assert_eq!(ticks_for(5, 0), (UNKNOWN, UNKNOWN));
    }

    #[test]
    fn mac_epoch() {
        assert_eq!(mac_time_to_unix_ns(MAC_EPOCH_OFFSET as u64), 0);
        assert_eq!(mac_time_to_unix_ns(MAC_EPOCH_OFFSET as u64 + 1), 1_000_000_000);
    }
}
