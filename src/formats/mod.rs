pub mod asf;
pub mod ebml;
pub mod mp4;

use crate::accessor::{self, Accessor};
use crate::api::DecodeOptions;
use crate::error::{DecodeError, Result};
use crate::source::Source;
use log::warn;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Ebml,
    Asf,
    Mp4,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Ebml => "ebml",
            Format::Asf => "asf",
            Format::Mp4 => "mp4",
        }
    }

    pub fn accessors(self) -> &'static [Accessor] {
        match self {
            Format::Ebml => accessor::EBML_FIELDS,
            Format::Asf => accessor::ASF_FIELDS,
            Format::Mp4 => accessor::MP4_FIELDS,
        }
    }

    /// Recognises a format from the first bytes of a stream.
    pub fn sniff(head: &[u8]) -> Option<Format> {
        if head.starts_with(&ebml::SIGNATURE) {
            Some(Format::Ebml)
        } else if head.starts_with(&asf::SIGNATURE) {
            Some(Format::Asf)
        } else if head.len() >= 8 && &head[4..8] == b"ftyp" {
            Some(Format::Mp4)
        } else {
            None
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Turns a walk outcome into the driver result. Truncation keeps what was
/// decoded unless the caller asked for strict decoding.
pub(crate) fn settle(outcome: Result<u64>, options: &DecodeOptions) -> Result<()> {
    match outcome {
        Ok(_) => Ok(()),
        Err(e) if e.is_end_of_stream() && options.keep_partial => {
            warn!("stream truncated, keeping partial result: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Checks that the stream starts with `signature`, leaving the cursor where it was.
pub(crate) fn expect_signature(src: &mut Source<'_>, signature: &[u8], what: &'static str) -> Result<()> {
    let start = src.position();
    let mut head = vec![0u8; signature.len()];
    let read = src.fill(&mut head);
    src.seek_to(start)?;
    match read {
        Ok(()) if head == signature => Ok(()),
        Ok(()) => Err(DecodeError::InvalidSignature(what)),
        Err(e) if e.is_end_of_stream() => Err(DecodeError::InvalidSignature(what)),
        Err(e) => Err(e),
    }
}
