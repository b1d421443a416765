//! Byte-level recovery for scopes whose end is not declared.
//!
//! When a scope has unknown size, or its contents stop parsing, the decoder
//! scans forward one byte at a time until the bytes just read spell one of a
//! set of identifiers that can legally follow the scope.

use crate::element::ElementId;
use crate::error::{DecodeError, Result};
use crate::source::Source;
use log::{debug, info};

/// Identifiers that end an unknown-size scope.
#[derive(Debug, Clone, Default)]
pub struct StopSet {
    ids: Vec<ElementId>,
    width: usize,
}

impl StopSet {
    pub fn new(ids: impl IntoIterator<Item = ElementId>) -> Self {
        let mut unique: Vec<ElementId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        let width = unique.iter().map(ElementId::len).max().unwrap_or(0);
        StopSet { ids: unique, width }
    }

    /// Union of two sets, keeping the order of `self` first.
    pub fn union(&self, other: &StopSet) -> StopSet {
        let mut ids = self.ids.clone();
        for id in &other.ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        StopSet::new(ids)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Length of the longest identifier in the set.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementId> {
        self.ids.iter()
    }

    /// First identifier that `window` ends with.
    fn match_suffix(&self, window: &[u8]) -> Option<ElementId> {
        self.ids.iter().copied().find(|id| window.ends_with(id.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Bytes passed over before the match (or before end of stream).
    pub skipped: u64,
    /// The identifier found, or `None` if the stream ended first.
    pub found: Option<ElementId>,
}

/// Scans forward until the most recently read bytes equal a stop identifier,
/// then rewinds so the cursor sits on the first byte of that identifier.
///
/// Reaching end of stream is not an error: the whole remainder counts as
/// skipped and `found` is `None`.
pub fn find_boundary(src: &mut Source<'_>, stop: &StopSet) -> Result<Boundary> {
    if stop.is_empty() {
        return Err(DecodeError::UnknownSizeWithoutStopSet { offset: src.position() });
    }
    let start = src.position();
    let width = stop.width();
    let mut window: Vec<u8> = Vec::with_capacity(width);
    let mut read = 0u64;

    while let Some(b) = src.read_byte()? {
        read += 1;
        if window.len() == width {
            window.remove(0);
        }
        window.push(b);

        if let Some(id) = stop.match_suffix(&window) {
            let n = id.len() as u64;
            src.rewind(n)?;
            info!("resync: found {} after skipping {} bytes from {:#x}", id, read - n, start);
            return Ok(Boundary { skipped: read - n, found: Some(id) });
        }
    }

    debug!("resync: end of stream after {} bytes from {:#x}", read, start);
    Ok(Boundary { skipped: read, found: None })
}
