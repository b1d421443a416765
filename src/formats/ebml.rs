//! EBML driver: Matroska and WebM.

use crate::api::DecodeOptions;
use crate::attachment::{normalize_image_mime, Attachment, AttachmentData, ImageProps, ImageType};
use crate::element::{ElementId, ElementSize, FourCC};
use crate::error::{DecodeError, Result};
use crate::formats::{expect_signature, settle, Format};
use crate::framing::EbmlFraming;
use crate::model::{Container, Entry, Locale, Stream, StreamInfo, Value, FLAG_INTERLACED};
use crate::parser::Walker;
use crate::registry::{ElementDescriptor, ReadContext, Registry};
use crate::resync::StopSet;
use crate::source::{ByteSource, Source};
use crate::tag::{Tag, TagGroup, TagTarget, TagValue};
use crate::util::preview;
use log::{debug, info};
use once_cell::sync::Lazy;
use uuid::Uuid;

pub const SIGNATURE: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Default nanoseconds per segment tick.
pub const DEFAULT_TIMECODE_SCALE: i64 = 1_000_000;

/// 2001-01-01T00:00:00Z in Unix nanoseconds.
const EPOCH_2001_NS: i64 = 978_307_200_000_000_000;

pub mod ids {
    use crate::element::ElementId;

    pub const EBML: ElementId = ElementId::from_u32(0x1A45DFA3);
    pub const EBML_VERSION: ElementId = ElementId::from_u32(0x4286);
    pub const EBML_READ_VERSION: ElementId = ElementId::from_u32(0x42F7);
    pub const EBML_MAX_ID_LENGTH: ElementId = ElementId::from_u32(0x42F2);
    pub const EBML_MAX_SIZE_LENGTH: ElementId = ElementId::from_u32(0x42F3);
    pub const DOC_TYPE: ElementId = ElementId::from_u32(0x4282);
    pub const DOC_TYPE_VERSION: ElementId = ElementId::from_u32(0x4287);
    pub const DOC_TYPE_READ_VERSION: ElementId = ElementId::from_u32(0x4285);
    pub const VOID: ElementId = ElementId::from_u32(0xEC);
    pub const CRC32: ElementId = ElementId::from_u32(0xBF);

    pub const SEGMENT: ElementId = ElementId::from_u32(0x18538067);
    pub const SEEK_HEAD: ElementId = ElementId::from_u32(0x114D9B74);
    pub const SEEK: ElementId = ElementId::from_u32(0x4DBB);
    pub const SEEK_ID: ElementId = ElementId::from_u32(0x53AB);
    pub const SEEK_POSITION: ElementId = ElementId::from_u32(0x53AC);

    pub const INFO: ElementId = ElementId::from_u32(0x1549A966);
    pub const SEGMENT_UID: ElementId = ElementId::from_u32(0x73A4);
    pub const TIMECODE_SCALE: ElementId = ElementId::from_u32(0x2AD7B1);
    pub const DURATION: ElementId = ElementId::from_u32(0x4489);
    pub const DATE_UTC: ElementId = ElementId::from_u32(0x4461);
    pub const TITLE: ElementId = ElementId::from_u32(0x7BA9);
    pub const MUXING_APP: ElementId = ElementId::from_u32(0x4D80);
    pub const WRITING_APP: ElementId = ElementId::from_u32(0x5741);

    pub const CLUSTER: ElementId = ElementId::from_u32(0x1F43B675);
    pub const TIMECODE: ElementId = ElementId::from_u32(0xE7);
    pub const SIMPLE_BLOCK: ElementId = ElementId::from_u32(0xA3);
    pub const BLOCK_GROUP: ElementId = ElementId::from_u32(0xA0);

    pub const TRACKS: ElementId = ElementId::from_u32(0x1654AE6B);
    pub const TRACK_ENTRY: ElementId = ElementId::from_u32(0xAE);
    pub const TRACK_NUMBER: ElementId = ElementId::from_u32(0xD7);
    pub const TRACK_UID: ElementId = ElementId::from_u32(0x73C5);
    pub const TRACK_TYPE: ElementId = ElementId::from_u32(0x83);
    pub const FLAG_ENABLED: ElementId = ElementId::from_u32(0xB9);
    pub const FLAG_DEFAULT: ElementId = ElementId::from_u32(0x88);
    pub const NAME: ElementId = ElementId::from_u32(0x536E);
    pub const LANGUAGE: ElementId = ElementId::from_u32(0x22B59C);
    pub const LANGUAGE_IETF: ElementId = ElementId::from_u32(0x22B59D);
    pub const CODEC_ID: ElementId = ElementId::from_u32(0x86);
    pub const CODEC_PRIVATE: ElementId = ElementId::from_u32(0x63A2);
    pub const CODEC_NAME: ElementId = ElementId::from_u32(0x258688);

    pub const VIDEO: ElementId = ElementId::from_u32(0xE0);
    pub const FLAG_INTERLACED: ElementId = ElementId::from_u32(0x9A);
    pub const PIXEL_WIDTH: ElementId = ElementId::from_u32(0xB0);
    pub const PIXEL_HEIGHT: ElementId = ElementId::from_u32(0xBA);
    pub const DISPLAY_WIDTH: ElementId = ElementId::from_u32(0x54B0);
    pub const DISPLAY_HEIGHT: ElementId = ElementId::from_u32(0x54BA);
    pub const COLOUR_SPACE: ElementId = ElementId::from_u32(0x2EB524);

    pub const AUDIO: ElementId = ElementId::from_u32(0xE1);
    pub const SAMPLING_FREQUENCY: ElementId = ElementId::from_u32(0xB5);
    pub const OUTPUT_SAMPLING_FREQUENCY: ElementId = ElementId::from_u32(0x78B5);
    pub const CHANNELS: ElementId = ElementId::from_u32(0x9F);
    pub const BIT_DEPTH: ElementId = ElementId::from_u32(0x6264);

    pub const CUES: ElementId = ElementId::from_u32(0x1C53BB6B);
    pub const CHAPTERS: ElementId = ElementId::from_u32(0x1043A770);

    pub const ATTACHMENTS: ElementId = ElementId::from_u32(0x1941A469);
    pub const ATTACHED_FILE: ElementId = ElementId::from_u32(0x61A7);
    pub const FILE_DESCRIPTION: ElementId = ElementId::from_u32(0x467E);
    pub const FILE_NAME: ElementId = ElementId::from_u32(0x466E);
    pub const FILE_MIME_TYPE: ElementId = ElementId::from_u32(0x4660);
    pub const FILE_DATA: ElementId = ElementId::from_u32(0x465C);
    pub const FILE_UID: ElementId = ElementId::from_u32(0x46AE);

    pub const TAGS: ElementId = ElementId::from_u32(0x1254C367);
    pub const TAG: ElementId = ElementId::from_u32(0x7373);
    pub const TARGETS: ElementId = ElementId::from_u32(0x63C0);
    pub const TARGET_TYPE_VALUE: ElementId = ElementId::from_u32(0x68CA);
    pub const TARGET_TYPE: ElementId = ElementId::from_u32(0x63CA);
    pub const TAG_TRACK_UID: ElementId = ElementId::from_u32(0x63C5);
    pub const TAG_EDITION_UID: ElementId = ElementId::from_u32(0x63C9);
    pub const TAG_CHAPTER_UID: ElementId = ElementId::from_u32(0x63C4);
    pub const TAG_ATTACHMENT_UID: ElementId = ElementId::from_u32(0x63C6);
    pub const SIMPLE_TAG: ElementId = ElementId::from_u32(0x67C8);
    pub const TAG_NAME: ElementId = ElementId::from_u32(0x45A3);
    pub const TAG_LANGUAGE: ElementId = ElementId::from_u32(0x447A);
    pub const TAG_LANGUAGE_IETF: ElementId = ElementId::from_u32(0x447B);
    pub const TAG_DEFAULT: ElementId = ElementId::from_u32(0x4484);
    pub const TAG_STRING: ElementId = ElementId::from_u32(0x4487);
    pub const TAG_BINARY: ElementId = ElementId::from_u32(0x4485);
}

/// Decode state threaded through the EBML readers.
#[derive(Debug, Default)]
pub struct EbmlState {
    pub container: Container,
    seek_name: Option<String>,
    segment_data_start: u64,
    /// Child indices from the current group's top-level tags to the open SimpleTag.
    tag_path: Vec<usize>,
}

impl EbmlState {
    fn new() -> Self {
        EbmlState {
            container: Container {
                mimetype: Some("application/x-ebml".into()),
                ..Container::new(Format::Ebml)
            },
            ..Default::default()
        }
    }

    fn entry(&mut self) -> Option<&mut Entry> {
        self.container.current_entry()
    }

    fn stream(&mut self) -> Option<&mut Stream> {
        self.entry()?.streams.last_mut()
    }

    fn attachment(&mut self) -> Option<&mut Attachment> {
        self.entry()?.attachments.last_mut()
    }

    fn tag_group(&mut self) -> Option<&mut TagGroup> {
        self.entry()?.tag_groups.last_mut()
    }

    fn target(&mut self) -> Option<&mut TagTarget> {
        self.tag_group()?.targets.last_mut()
    }

    fn tag(&mut self) -> Option<&mut Tag> {
        let group = self.container.entries.last_mut()?.tag_groups.last_mut()?;
        group.tag_at_mut(&self.tag_path)
    }

    /// Appends a SimpleTag under the open one (or at the group's top level)
    /// and makes it the open tag.
    fn open_tag(&mut self) -> bool {
        let Some(group) = self.container.entries.last_mut().and_then(|e| e.tag_groups.last_mut()) else {
            return false;
        };
        let siblings = if self.tag_path.is_empty() {
            &mut group.tags
        } else {
            match group.tag_at_mut(&self.tag_path) {
                Some(parent) => &mut parent.tags,
                None => return false,
            }
        };
        siblings.push(Tag::default());
        self.tag_path.push(siblings.len() - 1);
        true
    }

    /// Header-scope values go to the container, everything else to the entry.
    fn store(&mut self, scope: &str, key: String, value: Value) {
        if scope == "header" {
            self.container.metadata.insert(key, value);
        } else if let Some(entry) = self.entry() {
            entry.metadata.insert(key, value);
        }
    }

    /// Moves duration and timecode scale out of the metadata into the tick fields.
    fn finish_segment(&mut self) {
        let Some(entry) = self.entry() else { return };
        if let Some(d) = entry.metadata.remove("duration").and_then(|v| v.as_f64()) {
            entry.ticks = d.round() as i64;
        }
        if let Some(ts) = entry.metadata.remove("timecode_scale").and_then(|v| v.as_u64()) {
            entry.tick_period = ts as i64;
        }
    }
}

type EbmlWalker<'a> = Walker<'a, EbmlState>;

static ELEMENTS: Lazy<Registry<EbmlState>> = Lazy::new(registry);

static TOP_LEVEL: Lazy<StopSet> = Lazy::new(|| StopSet::new([ids::EBML, ids::SEGMENT]));

static SEGMENT_CHILDREN: Lazy<StopSet> = Lazy::new(|| {
    StopSet::new([
        ids::CLUSTER,
        ids::SEEK_HEAD,
        ids::INFO,
        ids::TRACKS,
        ids::CUES,
        ids::ATTACHMENTS,
        ids::CHAPTERS,
        ids::TAGS,
    ])
});

static CLUSTER_STOP: Lazy<StopSet> = Lazy::new(|| SEGMENT_CHILDREN.union(&TOP_LEVEL));

/// Name a SeekHead entry is filed under.
fn section_name(id: &ElementId) -> String {
    match *id {
        ids::INFO => "info".into(),
        ids::TRACKS => "tracks".into(),
        ids::CHAPTERS => "chapters".into(),
        ids::CUES => "cues".into(),
        ids::ATTACHMENTS => "attachments".into(),
        ids::TAGS => "tags".into(),
        ids::CLUSTER => "cluster".into(),
        ids::SEEK_HEAD => "seek_head".into(),
        other => other.to_string(),
    }
}

fn mimetype_for_doctype(doctype: &str) -> &'static str {
    match doctype {
        "webm" => "video/webm",
        "matroska" => "video/x-matroska",
        _ => "application/x-ebml",
    }
}

fn registry() -> Registry<EbmlState> {
    Registry::new("ebml")
        .with_element(ids::EBML, "EBML Header", read_header)
        .with_title(ids::VOID, "Void")
        .with_title(ids::CRC32, "CRC-32")
        .with_element(ids::DOC_TYPE, "Doctype", read_doctype)
        .with_keyed(ids::EBML_VERSION, "Version", "version", read_uint)
        .with_keyed(ids::EBML_READ_VERSION, "Read Version", "read_version", read_uint)
        .with_keyed(ids::EBML_MAX_ID_LENGTH, "Max ID Length", "max_id_len", read_uint)
        .with_keyed(ids::EBML_MAX_SIZE_LENGTH, "Max Size Length", "max_size_len", read_uint)
        .with_keyed(ids::DOC_TYPE_VERSION, "Doctype Version", "doctype_version", read_uint)
        .with_keyed(ids::DOC_TYPE_READ_VERSION, "Doctype Read Version", "doctype_read_version", read_uint)
        .with_element(ids::SEGMENT, "Segment", read_segment)
        // segment information
        .with_element(ids::INFO, "Info", read_info)
        .with_element(ids::SEGMENT_UID, "Segment UID", read_segment_uid)
        .with_keyed(ids::TIMECODE_SCALE, "Timecode Scale", "timecode_scale", read_uint)
        .with_keyed(ids::DURATION, "Duration", "duration", read_float)
        .with_keyed(ids::DATE_UTC, "Date UTC", "date_utc", read_date)
        .with_keyed(ids::TITLE, "Title", "title", read_utf8)
        .with_keyed(ids::MUXING_APP, "Muxing Application", "app_mux", read_utf8)
        .with_keyed(ids::WRITING_APP, "Writing Application", "app_write", read_utf8)
        // seeking
        .with_element(ids::SEEK_HEAD, "Seek Head", read_seek_head)
        .with_element(ids::SEEK, "Seek", read_seek)
        .with_element(ids::SEEK_ID, "Seek ID", read_seek_id)
        .with_element(ids::SEEK_POSITION, "Seek Position", read_seek_position)
        // clusters
        .with_element(ids::CLUSTER, "Cluster", read_cluster)
        .with_title(ids::TIMECODE, "Timecode")
        .with_title(ElementId::from_u32(0x5854), "Silent Tracks")
        .with_title(ElementId::from_u32(0xA7), "Position")
        .with_title(ElementId::from_u32(0xAB), "Previous Size")
        .with(ids::SIMPLE_BLOCK, ElementDescriptor::new("Simple Block").quiet())
        .with(ids::BLOCK_GROUP, ElementDescriptor::new("Block Group").quiet())
        .with_title(ElementId::from_u32(0xAF), "Encrypted Block")
        // tracks
        .with_element(ids::TRACKS, "Tracks", read_tracks)
        .with_element(ids::TRACK_ENTRY, "Track Entry", read_track_entry)
        .with_element(ids::TRACK_NUMBER, "Track Number", read_track_number)
        .with_element(ids::TRACK_UID, "Track UID", read_track_uid)
        .with_element(ids::TRACK_TYPE, "Track Type", read_track_type)
        .with_element(ids::FLAG_ENABLED, "Flag Enabled", read_track_flag)
        .with_element(ids::FLAG_DEFAULT, "Flag Default", read_track_flag)
        .with_title(ElementId::from_u32(0x55AA), "Flag Forced")
        .with_title(ElementId::from_u32(0x9C), "Flag Lacing")
        .with_title(ElementId::from_u32(0x23E383), "Default Duration")
        .with_element(ids::NAME, "Track Name", read_track_name)
        .with_element(ids::LANGUAGE, "Track Language", read_track_language)
        .with_element(ids::LANGUAGE_IETF, "Track Language (IETF)", read_track_language)
        .with_element(ids::CODEC_ID, "Codec ID", read_codec_id)
        .with_element(ids::CODEC_PRIVATE, "Codec Private", read_codec_private)
        .with_keyed(ids::CODEC_NAME, "Codec Name", "codec_name", read_stream_text)
        .with_title(ElementId::from_u32(0x6D80), "Content Encodings")
        .with_element(ids::VIDEO, "Video", read_video)
        .with_element(ids::FLAG_INTERLACED, "Flag Interlace", read_video_entry)
        .with_element(ids::PIXEL_WIDTH, "Pixel Width", read_video_entry)
        .with_element(ids::PIXEL_HEIGHT, "Pixel Height", read_video_entry)
        .with_keyed(ids::DISPLAY_WIDTH, "Display Width", "display_width", read_stream_uint)
        .with_keyed(ids::DISPLAY_HEIGHT, "Display Height", "display_height", read_stream_uint)
        .with_title(ElementId::from_u32(0x53B8), "Stereo Mode")
        .with_element(ids::COLOUR_SPACE, "Colour Space", read_colour_space)
        .with_element(ids::AUDIO, "Audio", read_audio)
        .with_element(ids::SAMPLING_FREQUENCY, "Sampling Frequency", read_audio_entry)
        .with_keyed(
            ids::OUTPUT_SAMPLING_FREQUENCY,
            "Output Sampling Frequency",
            "output_sample_rate",
            read_stream_float,
        )
        .with_element(ids::CHANNELS, "Channels", read_audio_entry)
        .with_element(ids::BIT_DEPTH, "Bit Depth", read_audio_entry)
        // indexes and chapters are not decoded
        .with_title(ids::CUES, "Cues")
        .with_title(ids::CHAPTERS, "Chapters")
        // attachments
        .with_element(ids::ATTACHMENTS, "Attachments", read_attachments)
        .with_element(ids::ATTACHED_FILE, "Attached File", read_attached_file)
        .with_element(ids::FILE_DESCRIPTION, "File Description", read_file_field)
        .with_element(ids::FILE_NAME, "File Name", read_file_field)
        .with_element(ids::FILE_MIME_TYPE, "File Mime Type", read_file_field)
        .with_element(ids::FILE_DATA, "File Data", read_file_data)
        .with_element(ids::FILE_UID, "File UID", read_file_uid)
        // tags
        .with_element(ids::TAGS, "Tags", read_tags)
        .with_element(ids::TAG, "Tag", read_tag)
        .with_element(ids::TARGETS, "Targets", read_targets)
        .with_element(ids::TARGET_TYPE_VALUE, "Target Type Value", read_target_field)
        .with_element(ids::TARGET_TYPE, "Target Type", read_target_type)
        .with_element(ids::TAG_TRACK_UID, "Tag Track UID", read_target_field)
        .with_element(ids::TAG_EDITION_UID, "Tag Edition UID", read_target_field)
        .with_element(ids::TAG_CHAPTER_UID, "Tag Chapter UID", read_target_field)
        .with_element(ids::TAG_ATTACHMENT_UID, "Tag Attachment UID", read_target_field)
        .with_element(ids::SIMPLE_TAG, "Simple Tag", read_simple_tag)
        .with_element(ids::TAG_NAME, "Tag Name", read_tag_name)
        .with_element(ids::TAG_LANGUAGE, "Tag Language", read_tag_language)
        .with_element(ids::TAG_LANGUAGE_IETF, "Tag Language (IETF)", read_tag_language)
        .with_element(ids::TAG_DEFAULT, "Tag Default", read_tag_default)
        .with_element(ids::TAG_STRING, "Tag String", read_tag_string)
        .with_element(ids::TAG_BINARY, "Tag Binary", read_tag_binary)
}

/// Decodes an EBML stream positioned at its header.
pub fn decode(src: &mut dyn ByteSource, options: &DecodeOptions) -> Result<Container> {
    let mut source = Source::new(src)?.with_len(options.total_len);
    expect_signature(&mut source, &SIGNATURE, "missing EBML header")?;

    let mut walker = Walker::new(source, &EbmlFraming, EbmlState::new());
    let outcome = walker.walk_to_end("root", &ELEMENTS);
    let stream_size = walker.position();
    settle(outcome, options)?;

    let mut container = walker.into_state().container;
    container.metadata.insert("stream_size".into(), Value::UInt(stream_size));
    info!(
        "ebml: {} entries, doctype {}",
        container.entries.len(),
        container.metadata.get("doctype").map(|v| v.to_string()).unwrap_or_default()
    );
    Ok(container)
}

// ---------- generic leaves ----------

fn read_uint(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    w.state.store(ctx.scope, ctx.key().into_owned(), Value::UInt(v));
    Ok(n)
}

fn read_float(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_float_be(n)?;
    w.state.store(ctx.scope, ctx.key().into_owned(), Value::Float(v));
    Ok(n)
}

fn read_utf8(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_utf8(n)?;
    w.state.store(ctx.scope, ctx.key().into_owned(), Value::Text(v));
    Ok(n)
}

fn read_date(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let since_2001 = w.source().read_int_be(n)?;
    let unix = since_2001.saturating_add(EPOCH_2001_NS);
    w.state.store(ctx.scope, ctx.key().into_owned(), Value::Date(unix));
    Ok(n)
}

// ---------- header and segment ----------

fn read_header(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("header", ctx.size(), &ELEMENTS, None)
}

fn read_doctype(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let doctype = w.source().read_latin1(n)?;
    let container = &mut w.state.container;
    container.mimetype = Some(mimetype_for_doctype(&doctype).to_owned());
    container.metadata.insert("doctype".into(), Value::Text(doctype));
    Ok(n)
}

fn read_segment(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let mut entry = Entry::new();
    entry.tick_period = DEFAULT_TIMECODE_SCALE;
    w.state.container.push_entry(entry);
    w.state.segment_data_start = w.position();

    let outcome = walk_segment(w, ctx.size());
    w.state.finish_segment();
    outcome
}

fn walk_segment(w: &mut EbmlWalker<'_>, size: ElementSize) -> Result<u64> {
    if !size.is_unknown() {
        return w.walk("segment", size, &ELEMENTS, None);
    }
    // an unknown-size segment may carry junk before its first child
    let clean = match w.peek_header()? {
        Some(h) => SEGMENT_CHILDREN.contains(&h.id) || h.id == ids::VOID || h.id == ids::CRC32,
        None => false,
    };
    let skipped = if clean { 0 } else { w.find_boundary(&SEGMENT_CHILDREN)? };
    if skipped > 0 {
        debug!("segment: skipped {} bytes before first child", skipped);
    }
    Ok(skipped + w.walk("segment", size, &ELEMENTS, Some(&*TOP_LEVEL))?)
}

fn read_info(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("info", ctx.size(), &ELEMENTS, None)
}

fn read_segment_uid(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let bytes = w.source().read_bytes(n)?;
    if let Some(entry) = w.state.entry() {
        match Uuid::from_slice(&bytes) {
            Ok(uid) => entry.uid = Some(uid),
            Err(_) => {
                entry.metadata.insert("segment_uid".into(), Value::Bytes(bytes));
            }
        }
    }
    Ok(n)
}

fn read_seek_head(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("seek_head", ctx.size(), &ELEMENTS, None)
}

fn read_seek(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.state.seek_name = None;
    w.walk("seek", ctx.size(), &ELEMENTS, None)
}

fn read_seek_id(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let bytes = w.source().read_bytes(n)?;
    w.state.seek_name = ElementId::from_slice(&bytes).map(|id| section_name(&id));
    Ok(n)
}

fn read_seek_position(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let relative = w.source().read_uint_be(n)?;
    let base = w.state.segment_data_start;
    let name = w.state.seek_name.clone();
    if let (Some(name), Some(entry)) = (name, w.state.entry()) {
        entry.seek.insert(name, base.saturating_add(relative));
    }
    Ok(n)
}

fn read_cluster(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    // known-size clusters ignore the stop set
    w.walk("cluster", ctx.size(), &ELEMENTS, Some(&*CLUSTER_STOP))
}

// ---------- tracks ----------

fn read_tracks(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("tracks", ctx.size(), &ELEMENTS, None)
}

fn read_track_entry(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let Some(entry) = w.state.entry() else {
        return w.walk("track_entry", ctx.size(), &ELEMENTS, None);
    };
    let number = entry.streams.len() as u32 + 1;
    entry.streams.push(Stream { number, ..Default::default() });

    let outcome = w.walk("track_entry", ctx.size(), &ELEMENTS, None);
    if let Some(stream) = w.state.stream() {
        let locale = stream.locale.clone();
        if let Some(locale) = locale {
            match &mut stream.info {
                Some(StreamInfo::Audio(a)) if a.locale.is_none() => a.locale = Some(locale),
                Some(StreamInfo::Subtitle(s)) if s.locale.is_none() => s.locale = Some(locale),
                _ => {}
            }
        }
    }
    outcome
}

fn read_track_number(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    if let Some(stream) = w.state.stream() {
        stream.number = u32::try_from(v).unwrap_or(u32::MAX);
    }
    Ok(n)
}

fn read_track_uid(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    if let Some(stream) = w.state.stream() {
        stream.uid = v;
    }
    Ok(n)
}

fn read_track_type(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let track_type = w.source().read_uint_be(n)?;
    if let Some(stream) = w.state.stream() {
        match track_type {
            1 => {
                stream.video_mut();
            }
            2 => {
                stream.audio_mut();
            }
            17 => {
                stream.subtitle_mut();
            }
            other => debug!("track type {} has no stream info", other),
        }
    }
    Ok(n)
}

fn read_track_flag(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let set = w.source().read_uint_be(n)? != 0;
    let id = ctx.id();
    if let Some(stream) = w.state.stream() {
        if id == ids::FLAG_ENABLED {
            stream.enabled = set;
        } else {
            stream.default = set;
        }
    }
    Ok(n)
}

fn read_track_name(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let name = w.source().read_utf8(n)?;
    if let Some(stream) = w.state.stream() {
        stream.name = Some(name);
    }
    Ok(n)
}

fn read_track_language(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let lang = w.source().read_latin1(n)?;
    if let Some(stream) = w.state.stream() {
        stream.locale = Locale::parse(&lang);
    }
    Ok(n)
}

fn read_codec_id(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let codec = w.source().read_latin1(n)?;
    if let Some(stream) = w.state.stream() {
        stream.codec = Some(codec);
    }
    Ok(n)
}

fn read_codec_private(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    w.source().skip(n)?;
    if let Some(stream) = w.state.stream() {
        stream.metadata.insert("codec_private_len".into(), Value::UInt(n));
    }
    Ok(n)
}

fn read_stream_text(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_utf8(n)?;
    let key = ctx.key().into_owned();
    if let Some(stream) = w.state.stream() {
        stream.metadata.insert(key, Value::Text(v));
    }
    Ok(n)
}

fn read_stream_uint(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    let key = ctx.key().into_owned();
    if let Some(stream) = w.state.stream() {
        stream.metadata.insert(key, Value::UInt(v));
    }
    Ok(n)
}

fn read_stream_float(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_float_be(n)?;
    let key = ctx.key().into_owned();
    if let Some(stream) = w.state.stream() {
        stream.metadata.insert(key, Value::Float(v));
    }
    Ok(n)
}

fn read_video(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    if let Some(stream) = w.state.stream() {
        stream.video_mut();
    }
    w.walk("video", ctx.size(), &ELEMENTS, None)
}

fn read_video_entry(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    let id = ctx.id();
    if let Some(video) = w.state.stream().and_then(Stream::video_mut) {
        match id {
            ids::PIXEL_WIDTH => video.width = u32::try_from(v).unwrap_or(u32::MAX),
            ids::PIXEL_HEIGHT => video.height = u32::try_from(v).unwrap_or(u32::MAX),
            // 1 interlaced, 2 progressive, 0 undetermined
            _ if v == 1 => video.flags |= FLAG_INTERLACED,
            _ => video.flags &= !FLAG_INTERLACED,
        }
    }
    Ok(n)
}

fn read_colour_space(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let bytes = w.source().read_bytes(n)?;
    if let Some(video) = w.state.stream().and_then(Stream::video_mut) {
        if let Ok(cc) = <[u8; 4]>::try_from(bytes.as_slice()) {
            video.fourcc = Some(FourCC(cc));
        }
    }
    Ok(n)
}

fn read_audio(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    if let Some(stream) = w.state.stream() {
        stream.audio_mut();
    }
    w.walk("audio", ctx.size(), &ELEMENTS, None)
}

fn read_audio_entry(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let id = ctx.id();
    if id == ids::SAMPLING_FREQUENCY {
        let rate = w.source().read_float_be(n)?;
        if let Some(audio) = w.state.stream().and_then(Stream::audio_mut) {
            audio.sample_rate = rate;
        }
        return Ok(n);
    }
    let v = u16::try_from(w.source().read_uint_be(n)?).unwrap_or(u16::MAX);
    if let Some(audio) = w.state.stream().and_then(Stream::audio_mut) {
        if id == ids::CHANNELS {
            audio.channels = v;
        } else {
            audio.bits_per_sample = v;
        }
    }
    Ok(n)
}

// ---------- attachments ----------

fn read_attachments(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("attachments", ctx.size(), &ELEMENTS, None)
}

fn read_attached_file(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let Some(entry) = w.state.entry() else {
        return w.walk("attached_file", ctx.size(), &ELEMENTS, None);
    };
    entry.attachments.push(Attachment::default());

    let outcome = w.walk("attached_file", ctx.size(), &ELEMENTS, None);
    if let Some(att) = w.state.attachment() {
        let is_image = att.mime_type.as_deref().is_some_and(|m| m.starts_with("image/"));
        if is_image {
            att.mime_type = att.mime_type.as_deref().map(normalize_image_mime);
            let image_type = att.name.as_deref().map(ImageType::from_file_name).unwrap_or_default();
            att.image = Some(ImageProps { image_type, ..Default::default() });
        }
    }
    outcome
}

fn read_file_field(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let id = ctx.id();
    let text = if id == ids::FILE_MIME_TYPE {
        w.source().read_latin1(n)?
    } else {
        w.source().read_utf8(n)?
    };
    if let Some(att) = w.state.attachment() {
        match id {
            ids::FILE_NAME => att.name = Some(text),
            ids::FILE_MIME_TYPE => att.mime_type = Some(text),
            _ => att.description = Some(text),
        }
    }
    Ok(n)
}

fn read_file_data(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let offset = w.position();
    if w.source().remaining().is_some_and(|rest| n > rest) {
        return Err(DecodeError::UnexpectedEndOfStream { offset });
    }
    w.source().skip(n)?;
    if let Some(att) = w.state.attachment() {
        att.data = AttachmentData::Range { offset, len: n };
    }
    Ok(n)
}

fn read_file_uid(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    if let Some(att) = w.state.attachment() {
        att.uid = Some(v);
    }
    Ok(n)
}

// ---------- tags ----------

fn read_tags(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("tags", ctx.size(), &ELEMENTS, None)
}

fn read_tag(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    if let Some(entry) = w.state.entry() {
        entry.tag_groups.push(TagGroup::default());
    }
    w.state.tag_path.clear();
    w.walk("tag", ctx.size(), &ELEMENTS, None)
}

fn read_targets(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    if let Some(group) = w.state.tag_group() {
        group.targets.push(TagTarget::default());
    }
    w.walk("targets", ctx.size(), &ELEMENTS, None)
}

fn read_target_field(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    let id = ctx.id();
    if let Some(target) = w.state.target() {
        match id {
            ids::TARGET_TYPE_VALUE => target.type_value = v,
            ids::TAG_TRACK_UID => target.track_uid = Some(v),
            ids::TAG_EDITION_UID => target.edition_uid = Some(v),
            ids::TAG_CHAPTER_UID => target.chapter_uid = Some(v),
            _ => target.attachment_uid = Some(v),
        }
    }
    Ok(n)
}

fn read_target_type(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_latin1(n)?;
    if let Some(target) = w.state.target() {
        target.target_type = Some(v);
    }
    Ok(n)
}

fn read_simple_tag(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let opened = w.state.open_tag();
    let outcome = w.walk("simple_tag", ctx.size(), &ELEMENTS, None);
    if opened {
        w.state.tag_path.pop();
    }
    outcome
}

fn read_tag_name(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let name = w.source().read_utf8(n)?;
    if let Some(tag) = w.state.tag() {
        tag.name = name;
    }
    Ok(n)
}

fn read_tag_string(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let value = w.source().read_utf8(n)?;
    if let Some(tag) = w.state.tag() {
        tag.value = Some(TagValue::Text(value));
    }
    Ok(n)
}

fn read_tag_binary(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let bytes = w.source().read_bytes(n)?;
    debug!("tag binary {}", preview(&bytes, 16));
    if let Some(tag) = w.state.tag() {
        tag.value = Some(TagValue::Binary(bytes));
    }
    Ok(n)
}

fn read_tag_language(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let lang = w.source().read_utf8(n)?;
    if let Some(tag) = w.state.tag() {
        tag.locale = Locale::parse(&lang);
    }
    Ok(n)
}

fn read_tag_default(w: &mut EbmlWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    if let Some(tag) = w.state.tag() {
        tag.default = v != 0;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_sections_are_named() {
        assert_eq!(section_name(&ids::INFO), "info");
        assert_eq!(section_name(&ids::TAGS), "tags");
        assert_eq!(section_name(&ElementId::from_u32(0x4321)), "4321");
    }

    #[test]
    fn cluster_stop_set_covers_segment_and_top_level() {
        assert!(CLUSTER_STOP.contains(&ids::CLUSTER));
        assert!(CLUSTER_STOP.contains(&ids::SEGMENT));
        assert!(CLUSTER_STOP.contains(&ids::EBML));
        assert!(!CLUSTER_STOP.contains(&ids::SIMPLE_BLOCK));
        assert_eq!(CLUSTER_STOP.width(), 4);
    }

    #[test]
    fn registry_knows_the_master_elements() {
        for id in [ids::SEGMENT, ids::INFO, ids::TRACKS, ids::TRACK_ENTRY, ids::TAGS, ids::SIMPLE_TAG] {
            assert!(ELEMENTS.get(&id).and_then(|d| d.reader).is_some(), "{}", id);
        }
        assert!(ELEMENTS.get(&ids::CUES).is_some_and(|d| d.reader.is_none()));
    }

    #[test]
    fn doctype_picks_mimetype() {
        assert_eq!(mimetype_for_doctype("webm"), "video/webm");
        assert_eq!(mimetype_for_doctype("matroska"), "video/x-matroska");
        assert_eq!(mimetype_for_doctype("other"), "application/x-ebml");
    }
}
