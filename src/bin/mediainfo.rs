use clap::Parser;
use mediatree::{
    decode_path, hex_range, Attachment, AttachmentData, Container, Entry, Stream, StreamInfo, Tag, TagGroup,
};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Media container metadata (Matroska, WebM, ASF, MP4)")]
struct Args {
    /// Media file path
    path: PathBuf,

    /// Output the decoded container as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Print a named field such as `title` or `artist` (repeatable)
    #[arg(long = "field")]
    fields: Vec<String>,

    /// Look up a tag by name
    #[arg(long)]
    tag: Option<String>,

    /// Target type value the tag must apply to (e.g. 50 for an album)
    #[arg(long, requires = "tag")]
    target: Option<u64>,

    /// List attachments with a hex preview of their payload
    #[arg(long)]
    attachments: bool,
}

/// Bytes shown per attachment preview.
const PREVIEW_LEN: u64 = 64;

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let container = decode_path(&args.path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&container)?);
        return Ok(());
    }

    if !args.fields.is_empty() || args.tag.is_some() {
        for name in &args.fields {
            match container.field(name) {
                Some(value) => println!("{}: {}", name, value),
                None => println!("{}: (not present)", name),
            }
        }
        if let Some(name) = &args.tag {
            match container.find_tag(name, args.target) {
                Some(tag) => println!("{}", describe_tag(tag)),
                None => println!("{}: (no such tag)", name),
            }
        }
        return Ok(());
    }

    print_human(&args.path, &container);

    if args.attachments {
        print_attachments(&args.path, &container)?;
    }
    Ok(())
}

// ---- human-readable output -----------------------------------------

fn print_human(path: &std::path::Path, c: &Container) {
    println!("File: {}", path.display());
    if let Some(format) = c.format {
        println!("Format: {}", format);
    }
    if let Some(mime) = &c.mimetype {
        println!("Mimetype: {}", mime);
    }
    for (key, value) in &c.metadata {
        println!("  {}: {}", key, value);
    }

    for (i, entry) in c.entries.iter().enumerate() {
        println!("Entry {}:", i + 1);
        print_entry(entry);
    }
}

fn print_entry(e: &Entry) {
    if let Some(uid) = e.uid {
        println!("  uid: {}", uid);
    }
    if let Some(secs) = e.duration() {
        println!("  duration: {} ticks x {} ns -> {:.3} s", e.ticks, e.tick_period, secs);
    }
    for (key, value) in &e.metadata {
        println!("  {}: {}", key, value);
    }
    for (name, offset) in &e.seek {
        println!("  seek {}: {:#x}", name, offset);
    }

    let streams: Vec<&Stream> = e.streams().collect();
    if streams.is_empty() {
        println!("  Streams: (none)");
    } else {
        println!("  Streams:");
        for s in streams {
            print_stream(s);
        }
    }

    for codec in &e.codecs {
        println!("  Codec: {} ({})", codec.name, codec.description);
    }

    if !e.tag_groups.is_empty() {
        println!("  Tags:");
        for group in &e.tag_groups {
            print_tag_group(group);
        }
    }

    for a in &e.attachments {
        println!("  Attachment: {}", describe_attachment(a));
    }
}

fn print_stream(s: &Stream) {
    println!("    Stream {} ({}):", s.number, stream_kind(s));
    if let Some(name) = &s.name {
        println!("      name: {}", name);
    }
    if let Some(codec) = &s.codec {
        println!("      codec: {}", codec);
    }
    if let Some(locale) = &s.locale {
        println!("      language: {}", locale);
    }
    if s.average_bitrate != 0 {
        println!("      bitrate: {} bit/s", s.average_bitrate);
    }
    if !s.enabled {
        println!("      disabled");
    }
    match &s.info {
        Some(StreamInfo::Video(v)) => {
            println!("      size: {}x{}", v.width, v.height);
            if v.bit_depth != 0 {
                println!("      depth: {} bits", v.bit_depth);
            }
        }
        Some(StreamInfo::Audio(a)) => {
            println!("      {} Hz, {} channels", a.sample_rate, a.channels);
            if a.bits_per_sample != 0 {
                println!("      {} bits per sample", a.bits_per_sample);
            }
        }
        Some(StreamInfo::Image(i)) => println!("      size: {}x{}", i.width, i.height),
        Some(StreamInfo::Subtitle(_)) | None => {}
    }
    for (key, value) in &s.metadata {
        println!("      {}: {}", key, value);
    }
}

fn stream_kind(s: &Stream) -> &'static str {
    match s.info {
        Some(StreamInfo::Video(_)) => "video",
        Some(StreamInfo::Audio(_)) => "audio",
        Some(StreamInfo::Image(_)) => "image",
        Some(StreamInfo::Subtitle(_)) => "subtitle",
        None => "other",
    }
}

fn print_tag_group(group: &TagGroup) {
    let level = group.targets.first().map_or(mediatree::tag::DEFAULT_TARGET_TYPE, |t| t.type_value);
    println!("    [target {}]", level);
    for tag in &group.tags {
        print_tag(tag, 3);
    }
}

fn print_tag(tag: &Tag, depth: usize) {
    println!("{}{}", "  ".repeat(depth), describe_tag(tag));
    for child in &tag.tags {
        print_tag(child, depth + 1);
    }
}

fn describe_tag(tag: &Tag) -> String {
    let value = match &tag.value {
        Some(mediatree::TagValue::Text(s)) => s.clone(),
        Some(mediatree::TagValue::Bool(b)) => b.to_string(),
        Some(mediatree::TagValue::Binary(b)) => format!("<{} bytes>", b.len()),
        None => String::new(),
    };
    match &tag.locale {
        Some(locale) => format!("{} [{}] = {}", tag.name, locale, value),
        None => format!("{} = {}", tag.name, value),
    }
}

fn describe_attachment(a: &Attachment) -> String {
    let mut out = format!(
        "{} ({}, {} bytes)",
        a.name.as_deref().unwrap_or("(unnamed)"),
        a.mime_type.as_deref().unwrap_or("application/octet-stream"),
        a.data.len()
    );
    if let Some(image) = &a.image {
        out.push_str(&format!(" image:{:?}", image.image_type));
    }
    out
}

fn print_attachments(path: &std::path::Path, c: &Container) -> anyhow::Result<()> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    for a in c.all_attachments() {
        println!("\n== {} ==", describe_attachment(a));
        match &a.data {
            AttachmentData::Range { offset, len } => {
                let dump = hex_range(&mut file, size, *offset, (*len).min(PREVIEW_LEN))?;
                print!("{}", dump.hex);
            }
            AttachmentData::Bytes(bytes) => {
                let shown = &bytes[..bytes.len().min(PREVIEW_LEN as usize)];
                print!("{}", mediatree::util::hex_dump(shown, 0));
            }
        }
    }
    Ok(())
}
