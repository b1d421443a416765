//! ASF driver: WMA, WMV and other Advanced Systems Format files.

use crate::api::DecodeOptions;
use crate::element::{ElementId, ElementSize, FourCC};
use crate::error::{DecodeError, Result};
use crate::formats::{expect_signature, settle, Format};
use crate::framing::AsfFraming;
use crate::model::{Codec, Container, Entry, Value};
use crate::parser::Walker;
use crate::primitive::{decode_utf16, guid_wire_bytes, Endian};
use crate::registry::{ReadContext, Registry};
use crate::source::{ByteSource, Source};
use byteorder::{ByteOrder, LittleEndian as LE};
use log::{debug, info};
use once_cell::sync::Lazy;
use uuid::{uuid, Uuid};

/// Header Object GUID as it appears on the wire.
pub const SIGNATURE: [u8; 16] = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];

/// FILETIME epoch (1601-01-01) to Unix epoch, in 100 ns units.
const FILETIME_UNIX_OFFSET: i64 = 116_444_736_000_000_000;

pub mod guids {
    use uuid::{uuid, Uuid};

    pub const HEADER: Uuid = uuid!("75b22630-668e-11cf-a6d9-00aa0062ce6c");
    pub const DATA: Uuid = uuid!("75b22636-668e-11cf-a6d9-00aa0062ce6c");
    pub const SIMPLE_INDEX: Uuid = uuid!("33000890-e5b1-11cf-89f4-00a0c90349cb");
    pub const INDEX: Uuid = uuid!("d6e229d3-35da-11d1-9034-00a0c90349be");
    pub const FILE_PROPERTIES: Uuid = uuid!("8cabdca1-a947-11cf-8ee4-00c00c205365");
    pub const STREAM_PROPERTIES: Uuid = uuid!("b7dc0791-a9b7-11cf-8ee6-00c00c205365");
    pub const HEADER_EXTENSION: Uuid = uuid!("5fbf03b5-a92e-11cf-8ee3-00c00c205365");
    pub const CODEC_LIST: Uuid = uuid!("86d15240-311d-11d0-a3a4-00a0c90348f6");
    pub const CONTENT_DESCRIPTION: Uuid = uuid!("75b22633-668e-11cf-a6d9-00aa0062ce6c");
    pub const EXTENDED_CONTENT_DESCRIPTION: Uuid = uuid!("d2d0a440-e307-11d2-97f0-00a0c95ea850");
    pub const STREAM_BITRATE_PROPERTIES: Uuid = uuid!("7bf875ce-468d-11d1-8d82-006097c9a2b2");
    pub const LANGUAGE_LIST: Uuid = uuid!("7c4346a9-efe0-4bfc-b229-393ede415c85");
    pub const METADATA: Uuid = uuid!("c5f8cbea-5baf-4877-8467-aa8c44fa4cca");
    pub const METADATA_LIBRARY: Uuid = uuid!("44231c94-9498-49d1-a141-1d134e457054");
    pub const RESERVED_1: Uuid = uuid!("abd3d211-a9ba-11cf-8ee6-00c00c205365");

    pub const AUDIO_MEDIA: Uuid = uuid!("f8699e40-5b4d-11cf-a8fd-00805f5c442b");
    pub const VIDEO_MEDIA: Uuid = uuid!("bc19efc0-5b4d-11cf-a8fd-00805f5c442b");
    pub const JFIF_MEDIA: Uuid = uuid!("b61be100-5b4e-11cf-a8fd-00805f5c442b");
    pub const DEGRADABLE_JPEG_MEDIA: Uuid = uuid!("35907de0-e415-11cf-a917-00805f5c442b");
}

/// Objects that are recognised but carry nothing the model needs.
const TITLED: &[(Uuid, &str)] = &[
    (guids::DATA, "Data"),
    (guids::SIMPLE_INDEX, "Simple Index"),
    (guids::INDEX, "Index"),
    (uuid!("feb103f8-12ad-4c64-840f-2a1d2f7ad48c"), "Media Object Index"),
    (uuid!("3cb73fd0-0c4a-4803-953d-edf7b6228f0c"), "Timecode Index"),
    (uuid!("1efb1a30-0b62-11d0-a39b-00a0c90348f6"), "Script Command"),
    (uuid!("f487cd01-a951-11cf-8ee6-00c00c205365"), "Marker"),
    (uuid!("d6e229dc-35da-11d1-9034-00a0c90349be"), "Bitrate Mutual Exclusion"),
    (uuid!("75b22635-668e-11cf-a6d9-00aa0062ce6c"), "Error Correction"),
    (uuid!("2211b3fa-bd23-11d2-b4b7-00a0c955fc6e"), "Content Branding"),
    (uuid!("2211b3fb-bd23-11d2-b4b7-00a0c955fc6e"), "Content Encryption"),
    (uuid!("298ae614-2622-4c17-b935-dae07ee9289c"), "Extended Content Encryption"),
    (uuid!("2211b3fc-bd23-11d2-b4b7-00a0c955fc6e"), "Digital Signature"),
    (uuid!("1806d474-cadf-4509-a4ba-9aabcb96aae8"), "Padding"),
    (uuid!("14e6a5cb-c672-4332-8399-a96952065b5a"), "Extended Stream Properties"),
    (uuid!("a08649cf-4775-4670-8a16-6e35357566cd"), "Advanced Mutual Exclusion"),
    (uuid!("d1465a40-5a79-4338-b71b-e36b8fd6c249"), "Group Mutual Exclusion"),
    (uuid!("d4fed15b-88d3-454f-81f0-ed5c45999e24"), "Stream Prioritization"),
    (uuid!("a69609e6-517b-11d2-b6af-00c04fd908e9"), "Bandwidth Sharing"),
    (uuid!("d6e229df-35da-11d1-9034-00a0c90349be"), "Index Parameters"),
    (uuid!("6b203bad-3f11-48e4-aca8-d7613de2cfa7"), "Media Object Index Parameters"),
    (uuid!("f55e496d-9797-4b5d-8c8b-604dfe9bfb24"), "Timecode Index Parameters"),
    (uuid!("43058533-6981-49e6-9b74-ad12cb86d58c"), "Advanced Content Encryption"),
];

#[derive(Debug)]
pub struct AsfState {
    pub container: Container,
}

impl AsfState {
    fn entry(&mut self) -> Result<&mut Entry> {
        self.container
            .current_entry()
            .ok_or_else(|| DecodeError::Unsupported("ASF object outside the header".into()))
    }

    /// Video outranks audio, which outranks the generic type.
    fn promote_mimetype(&mut self, mimetype: &'static str) {
        let rank = |m: &str| match m {
            "video/x-ms-wmv" => 2,
            "audio/x-ms-wma" => 1,
            _ => 0,
        };
        let current = self.container.mimetype.as_deref().map_or(-1, rank);
        if rank(mimetype) > current {
            self.container.mimetype = Some(mimetype.to_owned());
        }
    }
}

type AsfWalker<'a> = Walker<'a, AsfState>;

static OBJECTS: Lazy<Registry<AsfState>> = Lazy::new(registry);

fn guid_id(guid: &Uuid) -> ElementId {
    ElementId::from_guid_bytes(guid_wire_bytes(guid))
}

fn registry() -> Registry<AsfState> {
    let registry = Registry::new("asf")
        .with_element(guid_id(&guids::HEADER), "Header", read_header)
        .with_element(guid_id(&guids::FILE_PROPERTIES), "File Properties", read_file_properties)
        .with_element(guid_id(&guids::STREAM_PROPERTIES), "Stream Properties", read_stream_properties)
        .with_element(guid_id(&guids::HEADER_EXTENSION), "Header Extension", read_header_extension)
        .with_element(guid_id(&guids::CODEC_LIST), "Codec List", read_codec_list)
        .with_element(guid_id(&guids::CONTENT_DESCRIPTION), "Content Description", read_content_description)
        .with_element(
            guid_id(&guids::EXTENDED_CONTENT_DESCRIPTION),
            "Extended Content Description",
            read_extended_content_description,
        )
        .with_element(
            guid_id(&guids::STREAM_BITRATE_PROPERTIES),
            "Stream Bitrate Properties",
            read_stream_bitrate_properties,
        )
        .with_element(guid_id(&guids::LANGUAGE_LIST), "Language List", read_language_list)
        .with_element(guid_id(&guids::METADATA), "Metadata", read_metadata)
        .with_element(guid_id(&guids::METADATA_LIBRARY), "Metadata Library", read_metadata);
    TITLED
        .iter()
        .fold(registry, |r, &(guid, title)| r.with_title(guid_id(&guid), title))
}

/// Decodes an ASF stream positioned at its Header Object.
pub fn decode(src: &mut dyn ByteSource, options: &DecodeOptions) -> Result<Container> {
    let mut source = Source::new(src)?.with_len(options.total_len);
    expect_signature(&mut source, &SIGNATURE, "missing ASF header object")?;

    let mut state = AsfState { container: Container::new(Format::Asf) };
    state.container.push_entry(Entry::new());

    let mut walker = Walker::new(source, &AsfFraming, state);
    let outcome = walker.walk_to_end("root", &OBJECTS);
    settle(outcome, options)?;

    let mut container = walker.into_state().container;
    if container.mimetype.is_none() {
        container.mimetype = Some("video/x-ms-asf".into());
    }
    info!(
        "asf: {} streams, {} codecs",
        container.entry().map_or(0, |e| e.streams().count()),
        container.entry().map_or(0, |e| e.codecs.len())
    );
    Ok(container)
}

/// Converts a typed descriptor payload into a metadata value.
///
/// Numeric payloads shorter than their type are kept as raw bytes.
pub fn data_value(data_type: u16, data: &[u8]) -> Value {
    match data_type {
        0 => Value::Text(decode_utf16(data, Endian::Little)),
        2 => Value::Bool(data.iter().any(|&b| b != 0)),
        3 if data.len() >= 4 => Value::UInt(LE::read_u32(data) as u64),
        4 if data.len() >= 8 => Value::UInt(LE::read_u64(data)),
        5 if data.len() >= 2 => Value::UInt(LE::read_u16(data) as u64),
        6 if data.len() >= 16 => {
            let mut b = [0u8; 16];
            b.copy_from_slice(&data[..16]);
            Value::Guid(Uuid::from_bytes_le(b))
        }
        _ => Value::Bytes(data.to_vec()),
    }
}

fn filetime_to_unix_ns(filetime: u64) -> i64 {
    i64::try_from(filetime)
        .unwrap_or(i64::MAX)
        .saturating_sub(FILETIME_UNIX_OFFSET)
        .saturating_mul(100)
}

/// Objects may carry trailing padding; the walker realigns to the declared end.
fn fit(consumed: u64, ctx: &ReadContext<'_>) -> Result<u64> {
    let declared = ctx.leaf_len()?;
    if consumed > declared {
        return Err(DecodeError::InconsistentAccounting { offset: ctx.header.start, declared, consumed });
    }
    Ok(declared)
}

fn read_header(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let src = w.source();
    let count = src.read_u32_le()?;
    let reserved = (src.read_u8()?, src.read_u8()?);
    if reserved != (1, 2) {
        return Err(DecodeError::InvalidSignature("ASF header reserved bytes"));
    }
    debug!("asf header: {} objects", count);
    let body = ctx.leaf_len()?.saturating_sub(6);
    Ok(6 + w.walk("header", ElementSize::Known(body), &OBJECTS, None)?)
}

fn read_header_extension(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let src = w.source();
    let reserved = src.read_guid()?;
    if reserved != guids::RESERVED_1 {
        debug!("header extension: unexpected reserved guid {}", reserved);
    }
    let _reserved2 = src.read_u16_le()?;
    let data_len = src.read_u32_le()? as u64;
    let consumed = 22 + w.walk("header_ext", ElementSize::Known(data_len), &OBJECTS, None)?;
    fit(consumed, ctx)
}

fn read_file_properties(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let src = w.source();
    let file_id = src.read_guid()?;
    let file_size = src.read_u64_le()?;
    let creation = src.read_u64_le()?;
    let packets = src.read_u64_le()?;
    let play_duration = src.read_u64_le()?;
    let send_duration = src.read_u64_le()?;
    let preroll = src.read_u64_le()?;
    let flags = src.read_u32_le()?;
    let min_packet = src.read_u32_le()?;
    let max_packet = src.read_u32_le()?;
    let max_bitrate = src.read_u32_le()?;

    let entry = w.state.entry()?;
    entry.ticks = i64::try_from(play_duration).unwrap_or(i64::MAX);
    entry.tick_period = 100;
    let md = &mut entry.metadata;
    md.insert("file_id".into(), Value::Guid(file_id));
    md.insert("file_size".into(), Value::UInt(file_size));
    md.insert("file_creation".into(), Value::Date(filetime_to_unix_ns(creation)));
    md.insert("data_packet_count".into(), Value::UInt(packets));
    md.insert("send_duration".into(), Value::Float(send_duration as f64 / 1e7));
    md.insert("preroll".into(), Value::Float(preroll as f64 / 1e3));
    md.insert("broadcast".into(), Value::Bool(flags & 1 != 0));
    md.insert("seekable".into(), Value::Bool(flags & 2 != 0));
    md.insert("min_packet_size".into(), Value::UInt(min_packet as u64));
    md.insert("max_packet_size".into(), Value::UInt(max_packet as u64));
    md.insert("max_bitrate".into(), Value::UInt(max_bitrate as u64));
    fit(80, ctx)
}

fn read_stream_properties(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let src = w.source();
    let stream_type = src.read_guid()?;
    let _correction_type = src.read_guid()?;
    let time_offset = src.read_u64_le()?;
    let type_len = src.read_u32_le()? as u64;
    let correction_len = src.read_u32_le()? as u64;
    let flags = src.read_u16_le()?;
    let _reserved = src.read_u32_le()?;
    let type_data = src.read_bytes(type_len)?;
    src.skip(correction_len)?;

    let number = (flags & 0x7F) as u32;
    let encrypted = flags & 0x8000 != 0;
    let mimetype = match stream_type {
        guids::AUDIO_MEDIA => "audio/x-ms-wma",
        guids::VIDEO_MEDIA => "video/x-ms-wmv",
        _ => "video/x-ms-asf",
    };
    w.state.promote_mimetype(mimetype);

    let Some(stream) = w.state.entry()?.stream_slot(number) else {
        debug!("stream properties for stream 0 ignored");
        return fit(54 + type_len + correction_len, ctx);
    };
    stream.time_offset = time_offset;
    if encrypted {
        stream.metadata.insert("encrypted".into(), Value::Bool(true));
    }

    match stream_type {
        guids::AUDIO_MEDIA => {
            // WAVEFORMATEX
            if type_data.len() >= 16 {
                let d = &type_data;
                stream.codec = Some(format!("0x{:04X}", LE::read_u16(&d[0..2])));
                if let Some(audio) = stream.audio_mut() {
                    audio.channels = LE::read_u16(&d[2..4]);
                    audio.sample_rate = LE::read_u32(&d[4..8]) as f64;
                    audio.bytes_per_second = LE::read_u32(&d[8..12]);
                    audio.block_alignment = LE::read_u16(&d[12..14]);
                    audio.bits_per_sample = LE::read_u16(&d[14..16]);
                }
            } else {
                stream.audio_mut();
            }
        }
        guids::VIDEO_MEDIA => {
            let d = &type_data;
            let fourcc = (d.len() >= 51).then(|| FourCC([d[27], d[28], d[29], d[30]]));
            if let Some(fourcc) = fourcc {
                stream.codec = Some(fourcc.as_str_lossy());
            }
            if let Some(video) = stream.video_mut() {
                if d.len() >= 8 {
                    video.width = LE::read_u32(&d[0..4]);
                    video.height = LE::read_u32(&d[4..8]);
                }
                // BITMAPINFOHEADER follows the 11-byte preamble
                if d.len() >= 51 {
                    video.bit_depth = LE::read_u16(&d[25..27]);
                    video.fourcc = fourcc;
                    video.horiz_dpi = ppm_to_dpi(LE::read_i32(&d[35..39]));
                    video.vert_dpi = ppm_to_dpi(LE::read_i32(&d[39..43]));
                }
            }
        }
        guids::JFIF_MEDIA | guids::DEGRADABLE_JPEG_MEDIA => {
            if let Some(image) = stream.image_mut() {
                if type_data.len() >= 8 {
                    image.width = LE::read_u32(&type_data[0..4]);
                    image.height = LE::read_u32(&type_data[4..8]);
                }
            }
        }
        other => debug!("stream {}: unhandled stream type {}", number, other),
    }
    fit(54 + type_len + correction_len, ctx)
}

fn ppm_to_dpi(ppm: i32) -> u32 {
    (ppm.max(0) as f64 * 0.0254).round() as u32
}

fn read_stream_bitrate_properties(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let count = w.source().read_u16_le()?;
    for _ in 0..count {
        let flags = w.source().read_u16_le()?;
        let bitrate = w.source().read_u32_le()?;
        if let Some(stream) = w.state.entry()?.stream_slot((flags & 0x7F) as u32) {
            stream.average_bitrate = bitrate;
        }
    }
    fit(2 + 6 * count as u64, ctx)
}

fn read_content_description(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    const KEYS: [&str; 5] = ["title", "author", "copyright", "description", "rating"];
    let src = w.source();
    let mut lens = [0u64; 5];
    for len in lens.iter_mut() {
        *len = src.read_u16_le()? as u64;
    }
    let mut consumed = 10;
    for (key, len) in KEYS.iter().zip(lens) {
        let text = w.source().read_utf16(len, Endian::Little)?;
        w.state.entry()?.metadata.insert((*key).into(), Value::Text(text));
        consumed += len;
    }
    fit(consumed, ctx)
}

fn read_extended_content_description(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let count = w.source().read_u16_le()?;
    let mut consumed = 2;
    for _ in 0..count {
        let src = w.source();
        let name_len = src.read_u16_le()? as u64;
        let name = src.read_utf16(name_len, Endian::Little)?;
        let data_type = src.read_u16_le()?;
        let data_len = src.read_u16_le()? as u64;
        let data = src.read_bytes(data_len)?;
        consumed += 6 + name_len + data_len;

        let value = data_value(data_type, &data);
        debug!("  ecd {} = {}", name, value);
        w.state.entry()?.metadata.insert(name, value);
    }
    fit(consumed, ctx)
}

/// Metadata and Metadata Library share one record layout.
fn read_metadata(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let count = w.source().read_u16_le()?;
    let mut consumed = 2;
    for _ in 0..count {
        let src = w.source();
        let _language = src.read_u16_le()?;
        let stream = src.read_u16_le()?;
        let name_len = src.read_u16_le()? as u64;
        let data_type = src.read_u16_le()?;
        let data_len = src.read_u32_le()? as u64;
        let name = src.read_utf16(name_len, Endian::Little)?;
        let data = src.read_bytes(data_len)?;
        consumed += 12 + name_len + data_len;

        let key = if stream == 0 { name } else { format!("{}#{}", name, stream) };
        let value = data_value(data_type, &data);
        debug!("  {} {} = {}", ctx.title, key, value);
        w.state.entry()?.metadata.insert(key, value);
    }
    fit(consumed, ctx)
}

fn read_codec_list(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let src = w.source();
    let _reserved = src.read_guid()?;
    let count = src.read_u32_le()?;
    let mut consumed = 20;
    for _ in 0..count {
        let src = w.source();
        let _codec_type = src.read_u16_le()?;
        let name_chars = src.read_u16_le()? as u64;
        let name = src.read_utf16(name_chars * 2, Endian::Little)?;
        let desc_chars = src.read_u16_le()? as u64;
        let description = src.read_utf16(desc_chars * 2, Endian::Little)?;
        let data_len = src.read_u16_le()? as u64;
        let data = src.read_bytes(data_len)?;
        consumed += 8 + 2 * name_chars + 2 * desc_chars + data_len;

        w.state.entry()?.codecs.push(Codec { name, description, data });
    }
    fit(consumed, ctx)
}

fn read_language_list(w: &mut AsfWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let count = w.source().read_u16_le()?;
    let mut consumed = 2;
    let mut languages = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = w.source().read_u8()? as u64;
        languages.push(Value::Text(w.source().read_utf16(len, Endian::Little)?));
        consumed += 1 + len;
    }
    w.state.entry()?.metadata.insert("languages".into(), Value::List(languages));
    fit(consumed, ctx)
}
