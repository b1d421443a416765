//! Metadata extraction for hierarchical binary media containers.
//!
//! Matroska/WebM (EBML), ASF and ISO base media files are all trees of
//! size-prefixed elements. A [`Walker`] reads such a tree using a format's
//! [`Framing`] and dispatches each element through a static [`Registry`] of
//! readers, which fill in a shared [`Container`] model.

pub mod accessor;
pub mod api;
pub mod attachment;
pub mod element;
pub mod error;
pub mod formats;
pub mod framing;
pub mod model;
pub mod parser;
pub mod primitive;
pub mod registry;
pub mod resync;
pub mod source;
pub mod tag;
pub mod util;
pub mod vint;

pub use accessor::Field;
pub use api::{decode, decode_path, detect, hex_range, DecodeOptions, HexDump};
pub use attachment::{Attachment, AttachmentData, ImageType};
pub use element::{ElementHeader, ElementId, ElementSize, FourCC};
pub use error::{DecodeError, Result};
pub use formats::Format;
pub use framing::{AsfFraming, BoxFraming, EbmlFraming, Framing};
pub use model::{AudioInfo, Codec, Container, Entry, ImageInfo, Locale, Stream, StreamInfo, SubtitleInfo, Value, VideoInfo};
pub use parser::{Step, Walker, MAX_DEPTH};
pub use registry::{ElementDescriptor, ReadContext, Registry};
pub use resync::{find_boundary, Boundary, StopSet};
pub use source::{ByteSource, Source};
pub use tag::{Tag, TagGroup, TagTarget, TagValue};
