//! Friendly field names mapped onto where each format keeps the value.

use crate::attachment::Attachment;
use crate::model::{Container, Value};
use crate::tag::Tag;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Key in the container-level metadata.
    Header(&'static str),
    /// Key in the first entry's metadata.
    Entry(&'static str),
    /// Tag name, optionally preferring one target level.
    Tag(&'static str, Option<u64>),
    /// Attachment whose file name stem matches.
    Attachment(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Accessor {
    pub field: &'static str,
    pub lookup: Lookup,
}

const fn field(field: &'static str, lookup: Lookup) -> Accessor {
    Accessor { field, lookup }
}

pub static EBML_FIELDS: &[Accessor] = &[
    field("doctype", Lookup::Header("doctype")),
    field("segment_title", Lookup::Entry("title")),
    field("date", Lookup::Entry("date_utc")),
    field("muxing_app", Lookup::Entry("app_mux")),
    field("writing_app", Lookup::Entry("app_write")),
    field("title", Lookup::Tag("TITLE", Some(30))),
    field("artist", Lookup::Tag("ARTIST", Some(30))),
    field("album_artist", Lookup::Tag("ARTIST", Some(50))),
    field("album", Lookup::Tag("TITLE", Some(50))),
    field("track", Lookup::Tag("PART_NUMBER", Some(30))),
    field("release_date", Lookup::Tag("DATE_RELEASE", None)),
    field("writer", Lookup::Tag("LYRICIST", None)),
    field("comment", Lookup::Tag("COMMENT", None)),
    field("lead_performer", Lookup::Tag("LEAD_PERFORMER", None)),
    field("cover", Lookup::Attachment("cover")),
    field("thumbnail", Lookup::Attachment("small_cover")),
];

pub static ASF_FIELDS: &[Accessor] = &[
    field("title", Lookup::Entry("title")),
    field("author", Lookup::Entry("author")),
    field("description", Lookup::Entry("description")),
    field("artist", Lookup::Entry("WM/AlbumArtist")),
    field("album", Lookup::Entry("WM/AlbumTitle")),
    field("track", Lookup::Entry("WM/TrackNumber")),
    field("release_date", Lookup::Entry("WM/Year")),
    field("composer", Lookup::Entry("WM/Composer")),
    field("genre", Lookup::Entry("WM/Genre")),
    field("copyright", Lookup::Entry("copyright")),
    field("lyrics", Lookup::Entry("WM/Lyrics")),
    field("rating", Lookup::Entry("rating")),
    field("date", Lookup::Entry("file_creation")),
];

pub static MP4_FIELDS: &[Accessor] = &[
    field("doctype", Lookup::Header("major_brand")),
    field("brands", Lookup::Header("compatible_brands")),
    field("date", Lookup::Entry("creation_time")),
    field("timescale", Lookup::Entry("timescale")),
];

/// What a field resolved to.
#[derive(Debug, Clone, Copy)]
pub enum Field<'a> {
    Value(&'a Value),
    Tag(&'a Tag),
    Attachment(&'a Attachment),
}

impl fmt::Display for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(v) => write!(f, "{}", v),
            Field::Tag(t) => match &t.value {
                Some(crate::tag::TagValue::Text(s)) => f.write_str(s),
                Some(crate::tag::TagValue::Bool(b)) => write!(f, "{}", b),
                Some(crate::tag::TagValue::Binary(b)) => write!(f, "<{} bytes>", b.len()),
                None => Ok(()),
            },
            Field::Attachment(a) => write!(
                f,
                "{} ({}, {} bytes)",
                a.name.as_deref().unwrap_or("?"),
                a.mime_type.as_deref().unwrap_or("application/octet-stream"),
                a.data.len()
            ),
        }
    }
}

/// Resolves `name` through `table` against a decoded container.
pub fn resolve<'a>(table: &[Accessor], container: &'a Container, name: &str) -> Option<Field<'a>> {
    let accessor = table.iter().find(|a| a.field == name)?;
    match accessor.lookup {
        Lookup::Header(key) => container.metadata.get(key).map(Field::Value),
        Lookup::Entry(key) => container.entry()?.metadata.get(key).map(Field::Value),
        Lookup::Tag(tag, target) => container.find_tag(tag, target).map(Field::Tag),
        Lookup::Attachment(stem) => container
            .all_attachments()
            .find(|a| a.stem().is_some_and(|s| s.eq_ignore_ascii_case(stem)))
            .map(Field::Attachment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Format;
    use crate::model::Entry;

    #[test]
    fn resolves_header_and_entry_keys() {
        let mut c = Container::new(Format::Ebml);
        c.metadata.insert("doctype".into(), Value::from("webm"));
        let mut e = Entry::new();
        e.metadata.insert("title".into(), Value::from("Clip"));
        c.entries.push(e);

        assert_eq!(resolve(EBML_FIELDS, &c, "doctype").unwrap().to_string(), "webm");
        assert_eq!(resolve(EBML_FIELDS, &c, "segment_title").unwrap().to_string(), "Clip");
        assert!(resolve(EBML_FIELDS, &c, "artist").is_none());
        assert!(resolve(EBML_FIELDS, &c, "nonsense").is_none());
    }

    #[test]
    fn field_names_are_unique_per_table() {
        for table in [EBML_FIELDS, ASF_FIELDS, MP4_FIELDS] {
            let mut names: Vec<_> = table.iter().map(|a| a.field).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), table.len());
        }
    }
}
