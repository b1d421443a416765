//! Decoded metadata model shared by all container drivers.

use crate::attachment::Attachment;
use crate::element::FourCC;
use crate::formats::Format;
use crate::tag::{Tag, TagGroup};
use crate::util::serialize_hex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Sentinel for an unknown tick count or tick period.
pub const UNKNOWN: i64 = -1;

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    #[serde(serialize_with = "serialize_hex")]
    Bytes(Vec<u8>),
    /// Nanoseconds since the Unix epoch.
    Date(i64),
    Guid(Uuid),
    List(Vec<Value>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(v) => Some(v),
            Value::Int(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::UInt(v) => Some(v as f64),
            Value::Int(v) => Some(v as f64),
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "{}", hex::encode(b)),
            Value::Date(ns) => write!(f, "{}s since epoch", *ns as f64 / 1e9),
            Value::Guid(g) => write!(f, "{}", g),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

pub type Metadata = BTreeMap<String, Value>;

/// Language with optional country, written `eng` or `eng-US`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locale {
    pub language: String,
    pub country: Option<String>,
}

impl Locale {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim_end_matches('\0').trim();
        if s.is_empty() {
            return None;
        }
        let mut parts = s.splitn(2, ['-', '_']);
        let language = parts.next()?.to_ascii_lowercase();
        let country = parts.next().filter(|c| !c.is_empty()).map(str::to_owned);
        Some(Locale { language, country })
    }

    pub fn undetermined() -> Self {
        Locale { language: "und".into(), country: None }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(c) => write!(f, "{}-{}", self.language, c),
            None => f.write_str(&self.language),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioInfo {
    pub sample_rate: f64,
    pub sample_count: u64,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub flags: u32,
    pub volume: f64,
    pub balance: f64,
    pub bytes_per_second: u32,
    pub block_alignment: u16,
    pub locale: Option<Locale>,
}

impl Default for AudioInfo {
    fn default() -> Self {
        AudioInfo {
            sample_rate: 0.0,
            sample_count: 0,
            channels: 0,
            bits_per_sample: 0,
            flags: 0,
            volume: 100.0,
            balance: 0.0,
            bytes_per_second: 0,
            block_alignment: 0,
            locale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub color: bool,
    pub bit_depth: u16,
    pub horiz_dpi: u32,
    pub vert_dpi: u32,
    pub fourcc: Option<FourCC>,
    pub flags: u32,
}

impl Default for VideoInfo {
    fn default() -> Self {
        VideoInfo {
            width: 0,
            height: 0,
            color: true,
            bit_depth: 0,
            horiz_dpi: 0,
            vert_dpi: 0,
            fourcc: None,
            flags: 0,
        }
    }
}

/// Flag bit set in [`VideoInfo::flags`] and [`ImageInfo::flags`] for interlaced content.
pub const FLAG_INTERLACED: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u16,
    pub interlaced: bool,
    pub horiz_dpi: u32,
    pub vert_dpi: u32,
    pub fourcc: Option<FourCC>,
    pub flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubtitleInfo {
    pub locale: Option<Locale>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamInfo {
    Audio(AudioInfo),
    Video(VideoInfo),
    Image(ImageInfo),
    Subtitle(SubtitleInfo),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Codec {
    pub name: String,
    pub description: String,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    pub uid: u64,
    /// 1-based stream number; 0 marks a placeholder slot.
    pub number: u32,
    pub name: Option<String>,
    pub metadata: Metadata,
    pub codec: Option<String>,
    pub time_offset: u64,
    pub average_bitrate: u32,
    pub enabled: bool,
    pub default: bool,
    pub locale: Option<Locale>,
    pub info: Option<StreamInfo>,
}

impl Default for Stream {
    fn default() -> Self {
        Stream {
            uid: 0,
            number: 0,
            name: None,
            metadata: Metadata::new(),
            codec: None,
            time_offset: 0,
            average_bitrate: 0,
            enabled: true,
            default: true,
            locale: None,
            info: None,
        }
    }
}

impl Stream {
    pub fn is_placeholder(&self) -> bool {
        self.number == 0
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.info, Some(StreamInfo::Audio(_)))
    }

    pub fn is_video(&self) -> bool {
        matches!(self.info, Some(StreamInfo::Video(_)))
    }

    pub fn is_image(&self) -> bool {
        matches!(self.info, Some(StreamInfo::Image(_)))
    }

    pub fn is_subtitle(&self) -> bool {
        matches!(self.info, Some(StreamInfo::Subtitle(_)))
    }

    pub fn audio(&self) -> Option<&AudioInfo> {
        match &self.info {
            Some(StreamInfo::Audio(a)) => Some(a),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoInfo> {
        match &self.info {
            Some(StreamInfo::Video(v)) => Some(v),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<&ImageInfo> {
        match &self.info {
            Some(StreamInfo::Image(i)) => Some(i),
            _ => None,
        }
    }

    /// Audio info, created if the stream has no info yet.
    /// `None` if the stream already carries another kind.
    pub fn audio_mut(&mut self) -> Option<&mut AudioInfo> {
        if self.info.is_none() {
            self.info = Some(StreamInfo::Audio(AudioInfo::default()));
        }
        match &mut self.info {
            Some(StreamInfo::Audio(a)) => Some(a),
            _ => None,
        }
    }

    pub fn video_mut(&mut self) -> Option<&mut VideoInfo> {
        if self.info.is_none() {
            self.info = Some(StreamInfo::Video(VideoInfo::default()));
        }
        match &mut self.info {
            Some(StreamInfo::Video(v)) => Some(v),
            _ => None,
        }
    }

    pub fn image_mut(&mut self) -> Option<&mut ImageInfo> {
        if self.info.is_none() {
            self.info = Some(StreamInfo::Image(ImageInfo::default()));
        }
        match &mut self.info {
            Some(StreamInfo::Image(i)) => Some(i),
            _ => None,
        }
    }

    pub fn subtitle_mut(&mut self) -> Option<&mut SubtitleInfo> {
        if self.info.is_none() {
            self.info = Some(StreamInfo::Subtitle(SubtitleInfo::default()));
        }
        match &mut self.info {
            Some(StreamInfo::Subtitle(s)) => Some(s),
            _ => None,
        }
    }
}

/// One logical presentation within a container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub uid: Option<Uuid>,
    pub metadata: Metadata,
    /// Named section to absolute byte offset.
    pub seek: BTreeMap<String, u64>,
    pub streams: Vec<Stream>,
    pub tag_groups: Vec<TagGroup>,
    pub attachments: Vec<Attachment>,
    pub codecs: Vec<Codec>,
    pub ticks: i64,
    /// Nanoseconds per tick.
    pub tick_period: i64,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            uid: None,
            metadata: Metadata::new(),
            seek: BTreeMap::new(),
            streams: Vec::new(),
            tag_groups: Vec::new(),
            attachments: Vec::new(),
            codecs: Vec::new(),
            ticks: UNKNOWN,
            tick_period: UNKNOWN,
        }
    }
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration in seconds, when both ticks and tick period are known.
    pub fn duration(&self) -> Option<f64> {
        if self.ticks == UNKNOWN || self.tick_period == UNKNOWN {
            return None;
        }
        Some(self.ticks as f64 * self.tick_period as f64 / 1e9)
    }

    /// Slot for stream `number` (1-based), growing the array with
    /// placeholders as needed. An existing stream at that slot is kept.
    /// `None` for stream number 0.
    pub fn stream_slot(&mut self, number: u32) -> Option<&mut Stream> {
        let index = (number as usize).checked_sub(1)?;
        if self.streams.len() <= index {
            self.streams.resize_with(index + 1, Stream::default);
        }
        let stream = &mut self.streams[index];
        if stream.is_placeholder() {
            stream.number = number;
        }
        Some(stream)
    }

    /// Streams that are not placeholders.
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(|s| !s.is_placeholder())
    }

    pub fn find_tag(&self, name: &str, target_type: Option<u64>) -> Option<&Tag> {
        crate::tag::find_tag(&self.tag_groups, name, target_type)
    }
}

/// Top-level result of decoding one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Container {
    pub format: Option<Format>,
    pub mimetype: Option<String>,
    pub metadata: Metadata,
    pub entries: Vec<Entry>,
    pub attachments: Vec<Attachment>,
}

impl Container {
    pub fn new(format: Format) -> Self {
        Container { format: Some(format), ..Default::default() }
    }

    /// The first entry, which is what single-presentation files have.
    pub fn entry(&self) -> Option<&Entry> {
        self.entries.first()
    }

    /// The entry currently being decoded.
    pub fn current_entry(&mut self) -> Option<&mut Entry> {
        self.entries.last_mut()
    }

    pub fn push_entry(&mut self, entry: Entry) -> &mut Entry {
        self.entries.push(entry);
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn duration(&self) -> Option<f64> {
        self.entry().and_then(Entry::duration)
    }

    /// Tag lookup across every entry's tag groups, in container order.
    pub fn find_tag(&self, name: &str, target_type: Option<u64>) -> Option<&Tag> {
        let groups: Vec<&TagGroup> = self.entries.iter().flat_map(|e| e.tag_groups.iter()).collect();
        crate::tag::find_tag(groups, name, target_type)
    }

    /// Container-level attachments followed by each entry's.
    pub fn all_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments
            .iter()
            .chain(self.entries.iter().flat_map(|e| e.attachments.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_needs_both_parts() {
        let mut e = Entry::new();
        assert_eq!(e.duration(), None);
        e.ticks = 1500;
        assert_eq!(e.duration(), None);
        e.tick_period = 1_000_000;
        assert_eq!(e.duration(), Some(1.5));
    }

    #[test]
    fn stream_slot_grows_with_placeholders_and_preserves() {
        let mut e = Entry::new();
        e.stream_slot(5).unwrap().average_bitrate = 128_000;
        assert_eq!(e.streams.len(), 5);
        assert!(e.streams[..4].iter().all(Stream::is_placeholder));
        assert_eq!(e.streams().count(), 1);

        let s = e.stream_slot(5).unwrap();
        s.audio_mut().unwrap().channels = 2;
        assert_eq!(e.streams[4].average_bitrate, 128_000);
        assert_eq!(e.streams[4].number, 5);
        assert!(e.streams[4].is_audio());

        assert!(e.stream_slot(0).is_none());
        e.stream_slot(2).unwrap();
        assert_eq!(e.streams.len(), 5);
        assert!(!e.streams[1].is_placeholder());
    }

    #[test]
    fn info_kind_is_fixed_once_set() {
        let mut s = Stream::default();
        assert!(s.video_mut().is_some());
        assert!(s.audio_mut().is_none());
        assert!(s.is_video());
        assert!(!s.is_audio());
    }

    #[test]
    fn audio_defaults() {
        let a = AudioInfo::default();
        assert_eq!(a.volume, 100.0);
        assert_eq!(a.balance, 0.0);
    }

    #[test]
    fn locale_parsing() {
        assert_eq!(Locale::parse("eng-US").unwrap().to_string(), "eng-US");
        assert_eq!(Locale::parse("ENG").unwrap().language, "eng");
        assert_eq!(Locale::parse("\0"), None);
    }
}
