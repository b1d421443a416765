//! Hierarchical name/value tags, grouped under targets.
//!
//! A tag group says what it describes through its targets (a whole
//! collection, an album, a track, ...). Lookup prefers groups whose targets
//! carry the requested target-type value, then falls back to every group
//! in container order.

use crate::model::Locale;
use crate::util::serialize_hex;
use serde::Serialize;

/// Target-type value a target has when none is declared (album, movie, episode).
pub const DEFAULT_TARGET_TYPE: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Bool(bool),
    #[serde(serialize_with = "serialize_hex")]
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub value: Option<TagValue>,
    pub locale: Option<Locale>,
    pub application: Option<String>,
    pub default: bool,
    pub tags: Vec<Tag>,
}

impl Default for Tag {
    fn default() -> Self {
        Tag {
            name: String::new(),
            value: None,
            locale: None,
            application: None,
            default: true,
            tags: Vec::new(),
        }
    }
}

impl Tag {
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Some(TagValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// This tag if it has `name`, else the first match among its children, depth-first.
    pub fn find(&self, name: &str) -> Option<&Tag> {
        if self.name == name {
            return Some(self);
        }
        self.tags.iter().find_map(|t| t.find(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagTarget {
    pub type_value: u64,
    pub target_type: Option<String>,
    pub track_uid: Option<u64>,
    pub edition_uid: Option<u64>,
    pub chapter_uid: Option<u64>,
    pub attachment_uid: Option<u64>,
}

impl Default for TagTarget {
    fn default() -> Self {
        TagTarget {
            type_value: DEFAULT_TARGET_TYPE,
            target_type: None,
            track_uid: None,
            edition_uid: None,
            chapter_uid: None,
            attachment_uid: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagGroup {
    pub name: Option<String>,
    pub targets: Vec<TagTarget>,
    pub tags: Vec<Tag>,
}

impl TagGroup {
    /// Whether the group describes the given target level. A group without
    /// explicit targets describes the default level.
    pub fn targets_type(&self, type_value: u64) -> bool {
        if self.targets.is_empty() {
            return type_value == DEFAULT_TARGET_TYPE;
        }
        self.targets.iter().any(|t| t.type_value == type_value)
    }

    pub fn find(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find_map(|t| t.find(name))
    }

    /// The tag reached by following child indices from the top level.
    pub fn tag_at_mut(&mut self, path: &[usize]) -> Option<&mut Tag> {
        let (first, rest) = path.split_first()?;
        let mut tag = self.tags.get_mut(*first)?;
        for &i in rest {
            tag = tag.tags.get_mut(i)?;
        }
        Some(tag)
    }
}

/// Finds a tag by name, trying groups that target `target_type` first.
pub fn find_tag<'a, I>(groups: I, name: &str, target_type: Option<u64>) -> Option<&'a Tag>
where
    I: IntoIterator<Item = &'a TagGroup>,
    I::IntoIter: Clone,
{
    let groups = groups.into_iter();
    if let Some(tt) = target_type {
        let hit = groups.clone().filter(|g| g.targets_type(tt)).find_map(|g| g.find(name));
        if hit.is_some() {
            return hit;
        }
    }
    groups.into_iter().find_map(|g| g.find(name))
}
