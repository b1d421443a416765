use crate::element::{ElementHeader, ElementSize};
use crate::error::{DecodeError, Result};
use crate::framing::Framing;
use crate::registry::{ReadContext, Registry};
use crate::resync::{self, StopSet};
use crate::source::Source;
use log::{debug, trace, warn};

/// Deepest scope nesting a walk will descend into.
pub const MAX_DEPTH: usize = 128;

/// Outcome of reading one element at a sibling boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An element was read or skipped; header plus payload bytes.
    Element(u64),
    /// The next identifier is in the stop set; the cursor is back on it.
    Boundary,
    /// The stream ended cleanly before another header began.
    End,
}

/// Registry-driven element tree walker.
///
/// The walker owns the cursor and the decode state `S`. Readers registered
/// for master elements call [`Walker::walk`] to descend; readers for leaves
/// pull primitives from [`Walker::source`] and write into `state`.
pub struct Walker<'a, S> {
    src: Source<'a>,
    framing: &'a dyn Framing,
    pub state: S,
    ended: bool,
    depth: usize,
}

impl<'a, S> Walker<'a, S> {
    pub fn new(src: Source<'a>, framing: &'a dyn Framing, state: S) -> Self {
        Walker { src, framing, state, ended: false, depth: 0 }
    }

    pub fn source(&mut self) -> &mut Source<'a> {
        &mut self.src
    }

    pub fn position(&self) -> u64 {
        self.src.position()
    }

    /// True once a clean end of stream was seen at a sibling boundary.
    /// Enclosing scopes stop reading and skip their accounting checks.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// Header at the cursor without consuming it. `None` if none can be read.
    pub fn peek_header(&mut self) -> Result<Option<ElementHeader>> {
        let start = self.src.position();
        let result = self.framing.read_header(&mut self.src);
        self.src.seek_to(start)?;
        match result {
            Ok(h) => Ok(Some(h)),
            Err(DecodeError::UnexpectedEndOfStream { .. }) | Err(DecodeError::MalformedLength { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Walks the children of a scope.
    ///
    /// A known-size scope must be covered exactly by its children. An
    /// unknown-size scope needs `stop` and ends just before the first child
    /// whose identifier is in it, or at end of stream.
    pub fn walk(
        &mut self,
        scope: &'static str,
        size: ElementSize,
        registry: &Registry<S>,
        stop: Option<&StopSet>,
    ) -> Result<u64> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep { offset: self.src.position(), depth: self.depth });
        }
        self.depth += 1;
        let result = match size {
            ElementSize::Known(total) => {
                let end = self.src.position().saturating_add(total);
                let outer = self.src.set_scope_end(Some(end));
                let result = self.walk_known(scope, total, registry);
                self.src.set_scope_end(outer);
                result
            }
            ElementSize::Unknown => match stop {
                Some(stop) if !stop.is_empty() => self.walk_unknown(scope, registry, stop),
                _ => Err(DecodeError::UnknownSizeWithoutStopSet { offset: self.src.position() }),
            },
        };
        self.depth -= 1;
        result
    }

    /// Reads top-level elements until the stream ends.
    pub fn walk_to_end(&mut self, scope: &'static str, registry: &Registry<S>) -> Result<u64> {
        let start = self.src.position();
        while let Step::Element(_) = self.read_element(scope, registry, None)? {}
        Ok(self.src.position().saturating_sub(start))
    }

    /// Scans for the next stop identifier. Reaching end of stream marks the walk ended.
    pub fn find_boundary(&mut self, stop: &StopSet) -> Result<u64> {
        let boundary = resync::find_boundary(&mut self.src, stop)?;
        if boundary.found.is_none() {
            self.ended = true;
        }
        Ok(boundary.skipped)
    }

    fn walk_known(&mut self, scope: &'static str, total: u64, registry: &Registry<S>) -> Result<u64> {
        let start = self.src.position();
        let mut consumed = 0u64;
        while consumed < total && !self.ended {
            match self.read_element(scope, registry, None)? {
                Step::Element(n) => consumed += n,
                Step::Boundary | Step::End => break,
            }
        }
        if !self.ended && consumed != total {
            return Err(DecodeError::InconsistentAccounting { offset: start, declared: total, consumed });
        }
        Ok(consumed)
    }

    fn walk_unknown(&mut self, scope: &'static str, registry: &Registry<S>, stop: &StopSet) -> Result<u64> {
        let start = self.src.position();
        while !self.ended {
            let at = self.src.position();
            match self.read_element(scope, registry, Some(stop)) {
                Ok(Step::Element(_)) => {}
                Ok(Step::Boundary) | Ok(Step::End) => break,
                Err(DecodeError::MalformedLength { offset }) => {
                    warn!("malformed length at {:#x} in {}, resynchronising", offset, scope);
                    self.src.seek_to(at)?;
                    let skipped = self.find_boundary(stop)?;
                    if skipped == 0 && !self.ended {
                        // the bad header itself opens with a stop id; leave it to the parent
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.src.position().saturating_sub(start))
    }

    /// Reads one header and dispatches it.
    ///
    /// With a stop set, an identifier in the set is not consumed: the cursor
    /// is restored and [`Step::Boundary`] returned.
    pub fn read_element(
        &mut self,
        scope: &'static str,
        registry: &Registry<S>,
        stop: Option<&StopSet>,
    ) -> Result<Step> {
        if self.ended {
            return Ok(Step::End);
        }
        let start = self.src.position();
        let header = match self.framing.read_header(&mut self.src) {
            Ok(h) => h,
            Err(e) if e.is_end_of_stream() && self.src.position() == start => {
                trace!("end of stream at {:#x} in {}", start, scope);
                self.ended = true;
                return Ok(Step::End);
            }
            Err(e) => return Err(e),
        };

        if let Some(stop) = stop {
            if stop.contains(&header.id) {
                self.src.seek_to(start)?;
                return Ok(Step::Boundary);
            }
        }

        let consumed = self.dispatch(scope, &header, registry, stop)?;
        Ok(Step::Element(header.header_len + consumed))
    }

    fn dispatch(
        &mut self,
        scope: &'static str,
        header: &ElementHeader,
        registry: &Registry<S>,
        stop: Option<&StopSet>,
    ) -> Result<u64> {
        let indent = self.depth * 2;
        let Some(descriptor) = registry.get(&header.id) else {
            trace!(
                "{:indent$}unknown {} in {} ({} bytes at {:#x})",
                "", header.id, scope, header.size, header.start, indent = indent
            );
            return match header.size {
                ElementSize::Known(n) => {
                    self.src.skip(n)?;
                    Ok(n)
                }
                ElementSize::Unknown => match stop {
                    Some(stop) => self.find_boundary(stop),
                    None => Err(DecodeError::UnknownSizeWithoutStopSet { offset: header.start }),
                },
            };
        };

        if descriptor.log {
            debug!(
                "{:indent$}{} [{}] ({} bytes at {:#x})",
                "", descriptor.title, header.id, header.size, header.start, indent = indent
            );
        }

        let ctx = ReadContext::new(scope, header, descriptor.title, descriptor.key);
        match (header.size, descriptor.reader) {
            // empty elements are accounted but not dispatched
            (ElementSize::Known(0), _) => Ok(0),
            (ElementSize::Known(n), None) => {
                self.src.skip(n)?;
                Ok(n)
            }
            (ElementSize::Known(n), Some(read)) => {
                let consumed = read(self, &ctx)?;
                if self.ended {
                    return Ok(consumed.min(n));
                }
                if consumed != n {
                    return Err(DecodeError::InconsistentAccounting {
                        offset: header.start,
                        declared: n,
                        consumed,
                    });
                }
                let end = header.data_start() + n;
                if self.src.position() != end {
                    self.src.seek_to(end)?;
                }
                Ok(n)
            }
            (ElementSize::Unknown, Some(read)) => read(self, &ctx),
            (ElementSize::Unknown, None) => match stop {
                Some(stop) => self.find_boundary(stop),
                None => Err(DecodeError::UnknownSizeWithoutStopSet { offset: header.start }),
            },
        }
    }
}
