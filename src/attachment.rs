use crate::source::ByteSource;
use crate::util::read_slice;
use serde::{Serialize, Serializer};

fn serialize_len<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(bytes.len() as u64)
}

/// Attachment payload: inline bytes, or where to find them in the source.
/// Inline payloads serialise as their length only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentData {
    Bytes(#[serde(serialize_with = "serialize_len")] Vec<u8>),
    Range { offset: u64, len: u64 },
}

impl Default for AttachmentData {
    fn default() -> Self {
        AttachmentData::Bytes(Vec::new())
    }
}

impl AttachmentData {
    pub fn len(&self) -> u64 {
        match self {
            AttachmentData::Bytes(b) => b.len() as u64,
            AttachmentData::Range { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Picture role, numbered as in ID3v2 APIC frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    #[default]
    Other,
    FileIcon,
    OtherFileIcon,
    FrontCover,
    BackCover,
    Leaflet,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    ScreenCapture,
    BrightFish,
    Illustration,
    BandLogo,
    PublisherLogo,
}

impl ImageType {
    const ALL: [ImageType; 21] = [
        ImageType::Other,
        ImageType::FileIcon,
        ImageType::OtherFileIcon,
        ImageType::FrontCover,
        ImageType::BackCover,
        ImageType::Leaflet,
        ImageType::Media,
        ImageType::LeadArtist,
        ImageType::Artist,
        ImageType::Conductor,
        ImageType::Band,
        ImageType::Composer,
        ImageType::Lyricist,
        ImageType::RecordingLocation,
        ImageType::DuringRecording,
        ImageType::DuringPerformance,
        ImageType::ScreenCapture,
        ImageType::BrightFish,
        ImageType::Illustration,
        ImageType::BandLogo,
        ImageType::PublisherLogo,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Role implied by a Matroska-style attachment file name such as
    /// `cover.jpg` or `small_cover_land.png`.
    pub fn from_file_name(name: &str) -> Self {
        let stem = name.rsplit_once('.').map_or(name, |(s, _)| s).to_ascii_lowercase();
        match stem.as_str() {
            "cover" | "cover_land" => ImageType::FrontCover,
            "small_cover" | "small_cover_land" => ImageType::FileIcon,
            "back" | "back_cover" => ImageType::BackCover,
            "icon" => ImageType::FileIcon,
            _ => ImageType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageProps {
    pub image_type: ImageType,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attachment {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    pub uid: Option<u64>,
    pub item_id: Option<String>,
    pub library_id: Option<String>,
    pub data: AttachmentData,
    /// Set when the attachment is a picture.
    pub image: Option<ImageProps>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.image.is_some()
    }

    /// Name without its extension.
    pub fn stem(&self) -> Option<&str> {
        let name = self.name.as_deref()?;
        Some(name.rsplit_once('.').map_or(name, |(s, _)| s))
    }

    /// Loads the payload, reading it from `src` when only its location was recorded.
    pub fn load(&self, src: &mut dyn ByteSource) -> std::io::Result<Vec<u8>> {
        match &self.data {
            AttachmentData::Bytes(b) => Ok(b.clone()),
            AttachmentData::Range { offset, len } => read_slice(src, *offset, *len),
        }
    }
}

/// Normalises an image MIME type: a bare subtype gets `image/`, and `jpg` becomes `jpeg`.
pub fn normalize_image_mime(mime: &str) -> String {
    let mime = mime.trim().to_ascii_lowercase();
    let (main, sub) = match mime.split_once('/') {
        Some((m, s)) => (m.to_owned(), s.to_owned()),
        None => ("image".to_owned(), mime),
    };
    let sub = if sub == "jpg" { "jpeg".to_owned() } else { sub };
    format!("{}/{}", main, sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn mime_normalisation() {
        assert_eq!(normalize_image_mime("jpg"), "image/jpeg");
        assert_eq!(normalize_image_mime("image/JPG"), "image/jpeg");
        assert_eq!(normalize_image_mime("image/png"), "image/png");
    }

    #[test]
    fn image_type_from_name_and_number() {
        assert_eq!(ImageType::from_file_name("cover.jpg"), ImageType::FrontCover);
        assert_eq!(ImageType::from_file_name("cover_land.png"), ImageType::FrontCover);
        assert_eq!(ImageType::from_file_name("Small_Cover_Land.png"), ImageType::FileIcon);
        assert_eq!(ImageType::from_file_name("booklet.png"), ImageType::Other);
        assert_eq!(ImageType::from_u8(3), Some(ImageType::FrontCover));
        assert_eq!(ImageType::from_u8(20), Some(ImageType::PublisherLogo));
        assert_eq!(ImageType::from_u8(21), None);
    }

    #[test]
    fn range_payload_is_loaded_from_source() {
        let a = Attachment {
            name: Some("cover.jpg".into()),
            data: AttachmentData::Range { offset: 2, len: 3 },
            ..Default::default()
        };
        assert_eq!(a.stem(), Some("cover"));
        let mut cur = Cursor::new(b"xxabcyy".to_vec());
        assert_eq!(a.load(&mut cur).unwrap(), b"abc");
    }
}
