use crate::element::{ElementHeader, ElementId, ElementSize};
use crate::error::{DecodeError, Result};
use crate::parser::Walker;
use std::borrow::Cow;
use std::collections::HashMap;

/// Reads the payload of one element and returns how many payload bytes it consumed.
///
/// For a known-size element the walker checks the returned count against the
/// declared size. For an unknown-size element the count is what the walk
/// actually covered.
pub type ReadFn<S> = fn(&mut Walker<'_, S>, &ReadContext<'_>) -> Result<u64>;

/// What a reader is told about the element it was dispatched for.
pub struct ReadContext<'r> {
    pub scope: &'static str,
    pub header: &'r ElementHeader,
    pub title: &'static str,
    key: Option<&'static str>,
}

impl<'r> ReadContext<'r> {
    pub fn new(scope: &'static str, header: &'r ElementHeader, title: &'static str, key: Option<&'static str>) -> Self {
        ReadContext { scope, header, title, key }
    }

    pub fn id(&self) -> ElementId {
        self.header.id
    }

    pub fn size(&self) -> ElementSize {
        self.header.size
    }

    /// Metadata key for the element; the hex identifier when none was registered.
    pub fn key(&self) -> Cow<'static, str> {
        match self.key {
            Some(k) => Cow::Borrowed(k),
            None => Cow::Owned(self.header.id.to_string()),
        }
    }

    /// Payload length of a leaf. Leaves cannot have unknown size.
    pub fn leaf_len(&self) -> Result<u64> {
        self.header
            .size
            .known()
            .ok_or(DecodeError::MalformedLength { offset: self.header.start })
    }
}

pub struct ElementDescriptor<S> {
    pub title: &'static str,
    pub reader: Option<ReadFn<S>>,
    pub key: Option<&'static str>,
    pub log: bool,
}

impl<S> ElementDescriptor<S> {
    /// A titled element with no reader; its payload is skipped.
    pub fn new(title: &'static str) -> Self {
        ElementDescriptor { title, reader: None, key: None, log: true }
    }

    pub fn reader(mut self, f: ReadFn<S>) -> Self {
        self.reader = Some(f);
        self
    }

    pub fn key(mut self, key: &'static str) -> Self {
        self.key = Some(key);
        self
    }

    /// Suppresses per-element debug logging for high-volume elements.
    pub fn quiet(mut self) -> Self {
        self.log = false;
        self
    }
}

/// Identifier-keyed table of element descriptors, generic over the decode
/// state its readers mutate.
///
/// Registries are immutable once built; use [`Registry::with`] and
/// [`Registry::with_element`] to build one fluently.
pub struct Registry<S> {
    name: &'static str,
    map: HashMap<ElementId, ElementDescriptor<S>>,
}

impl<S> Registry<S> {
    pub fn new(name: &'static str) -> Self {
        Registry { name, map: HashMap::new() }
    }

    pub fn with(mut self, id: ElementId, descriptor: ElementDescriptor<S>) -> Self {
        self.map.insert(id, descriptor);
        self
    }

    pub fn with_element(self, id: ElementId, title: &'static str, reader: ReadFn<S>) -> Self {
        self.with(id, ElementDescriptor::new(title).reader(reader))
    }

    pub fn with_keyed(self, id: ElementId, title: &'static str, key: &'static str, reader: ReadFn<S>) -> Self {
        self.with(id, ElementDescriptor::new(title).key(key).reader(reader))
    }

    /// Registers a title only, so the element is named in logs but skipped.
    pub fn with_title(self, id: ElementId, title: &'static str) -> Self {
        self.with(id, ElementDescriptor::new(title))
    }

    pub fn get(&self, id: &ElementId) -> Option<&ElementDescriptor<S>> {
        self.map.get(id)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.map.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ElementId> {
        self.map.keys()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
