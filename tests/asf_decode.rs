use mediatree::formats::asf::{self, guids};
use mediatree::primitive::guid_wire_bytes;
use mediatree::{decode, DecodeError, DecodeOptions, Format, FourCC, StreamInfo, Value};
use std::io::Cursor;
use uuid::Uuid;

fn obj(guid: &Uuid, payload: &[u8]) -> Vec<u8> {
    let mut out = guid_wire_bytes(guid).to_vec();
    out.extend((payload.len() as u64 + 24).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn utf16z(s: &str) -> Vec<u8> {
    let mut out: Vec<u8> = s.encode_utf16().flat_map(u16::to_le_bytes).collect();
    out.extend([0, 0]);
    out
}

fn header_object(children: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = (children.len() as u32).to_le_bytes().to_vec();
    payload.extend([1, 2]);
    payload.extend(children.concat());
    obj(&guids::HEADER, &payload)
}

// 2020-01-01T00:00:00Z as a FILETIME
const CREATED: u64 = 132_223_104_000_000_000;

fn file_properties() -> Vec<u8> {
    let mut p = Vec::new();
    p.extend(guid_wire_bytes(&Uuid::from_u128(0x1234)));
    p.extend(4096u64.to_le_bytes()); // file size
    p.extend(CREATED.to_le_bytes());
    p.extend(3u64.to_le_bytes()); // data packets
    p.extend(123_450_000u64.to_le_bytes()); // play duration, 100 ns units
    p.extend(120_000_000u64.to_le_bytes()); // send duration
    p.extend(3000u64.to_le_bytes()); // preroll ms
    p.extend(2u32.to_le_bytes()); // seekable
    p.extend(3200u32.to_le_bytes());
    p.extend(3200u32.to_le_bytes());
    p.extend(128_000u32.to_le_bytes());
    obj(&guids::FILE_PROPERTIES, &p)
}

fn stream_properties(stream_type: &Uuid, number: u16, type_data: &[u8]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend(guid_wire_bytes(stream_type));
    p.extend([0u8; 16]); // error correction type
    p.extend(0u64.to_le_bytes());
    p.extend((type_data.len() as u32).to_le_bytes());
    p.extend(0u32.to_le_bytes());
    p.extend(number.to_le_bytes());
    p.extend(0u32.to_le_bytes());
    p.extend_from_slice(type_data);
    obj(&guids::STREAM_PROPERTIES, &p)
}

fn waveformatex() -> Vec<u8> {
    let mut d = Vec::new();
    d.extend(0x0161u16.to_le_bytes()); // WMA v2
    d.extend(2u16.to_le_bytes());
    d.extend(44_100u32.to_le_bytes());
    d.extend(16_000u32.to_le_bytes());
    d.extend(4459u16.to_le_bytes());
    d.extend(16u16.to_le_bytes());
    d.extend(0u16.to_le_bytes());
    d
}

fn video_format() -> Vec<u8> {
    let mut d = Vec::new();
    d.extend(320u32.to_le_bytes());
    d.extend(240u32.to_le_bytes());
    d.push(2);
    d.extend(40u16.to_le_bytes());
    // BITMAPINFOHEADER
    d.extend(40u32.to_le_bytes());
    d.extend(320i32.to_le_bytes());
    d.extend(240i32.to_le_bytes());
    d.extend(1u16.to_le_bytes());
    d.extend(24u16.to_le_bytes());
    d.extend(b"WMV3");
    d.extend(0u32.to_le_bytes());
    d.extend(2835i32.to_le_bytes()); // 72 dpi
    d.extend(2835i32.to_le_bytes());
    d.extend([0u8; 8]);
    d
}

fn bitrate_properties(records: &[(u16, u32)]) -> Vec<u8> {
    let mut p = (records.len() as u16).to_le_bytes().to_vec();
    for (number, bitrate) in records {
        p.extend(number.to_le_bytes());
        p.extend(bitrate.to_le_bytes());
    }
    obj(&guids::STREAM_BITRATE_PROPERTIES, &p)
}

fn content_description(fields: [&str; 5]) -> Vec<u8> {
    let encoded: Vec<Vec<u8>> = fields.iter().map(|f| utf16z(f)).collect();
    let mut p = Vec::new();
    for e in &encoded {
        p.extend((e.len() as u16).to_le_bytes());
    }
    p.extend(encoded.concat());
    obj(&guids::CONTENT_DESCRIPTION, &p)
}

fn extended_content(records: &[(&str, u16, Vec<u8>)]) -> Vec<u8> {
    let mut p = (records.len() as u16).to_le_bytes().to_vec();
    for (name, data_type, data) in records {
        let name = utf16z(name);
        p.extend((name.len() as u16).to_le_bytes());
        p.extend(name);
        p.extend(data_type.to_le_bytes());
        p.extend((data.len() as u16).to_le_bytes());
        p.extend(data);
    }
    obj(&guids::EXTENDED_CONTENT_DESCRIPTION, &p)
}

fn metadata_object(records: &[(u16, &str, u16, Vec<u8>)]) -> Vec<u8> {
    let mut p = (records.len() as u16).to_le_bytes().to_vec();
    for (stream, name, data_type, data) in records {
        let name = utf16z(name);
        p.extend(0u16.to_le_bytes());
        p.extend(stream.to_le_bytes());
        p.extend((name.len() as u16).to_le_bytes());
        p.extend(data_type.to_le_bytes());
        p.extend((data.len() as u32).to_le_bytes());
        p.extend(name);
        p.extend(data);
    }
    obj(&guids::METADATA, &p)
}

fn language_list(langs: &[&str]) -> Vec<u8> {
    let mut p = (langs.len() as u16).to_le_bytes().to_vec();
    for l in langs {
        let l = utf16z(l);
        p.push(l.len() as u8);
        p.extend(l);
    }
    obj(&guids::LANGUAGE_LIST, &p)
}

fn header_extension(children: &[Vec<u8>]) -> Vec<u8> {
    let body = children.concat();
    let mut p = guid_wire_bytes(&guids::RESERVED_1).to_vec();
    p.extend(6u16.to_le_bytes());
    p.extend((body.len() as u32).to_le_bytes());
    p.extend(body);
    obj(&guids::HEADER_EXTENSION, &p)
}

fn codec_list() -> Vec<u8> {
    let mut p = [0u8; 16].to_vec();
    p.extend(1u32.to_le_bytes());
    let name: Vec<u8> = "WMA".encode_utf16().flat_map(u16::to_le_bytes).collect();
    let desc: Vec<u8> = "64 kbps".encode_utf16().flat_map(u16::to_le_bytes).collect();
    p.extend(2u16.to_le_bytes());
    p.extend(3u16.to_le_bytes());
    p.extend(name);
    p.extend(7u16.to_le_bytes());
    p.extend(desc);
    p.extend(2u16.to_le_bytes());
    p.extend([0x61, 0x01]);
    obj(&guids::CODEC_LIST, &p)
}

fn make_wmv() -> Vec<u8> {
    let mut file = header_object(&[
        file_properties(),
        // bitrate for stream 5 arrives before its properties
        bitrate_properties(&[(1, 64_000), (5, 800_000)]),
        stream_properties(&guids::AUDIO_MEDIA, 1, &waveformatex()),
        stream_properties(&guids::VIDEO_MEDIA, 5, &video_format()),
        content_description(["Clip", "Someone", "(c) 2020", "A test", ""]),
        extended_content(&[
            ("WM/AlbumTitle", 0, utf16z("Album")),
            ("WM/TrackNumber", 3, 4u32.to_le_bytes().to_vec()),
            ("IsVBR", 2, vec![1, 0, 0, 0]),
        ]),
        header_extension(&[
            metadata_object(&[(5, "AspectRatioX", 3, 16u32.to_le_bytes().to_vec())]),
            language_list(&["en-us"]),
        ]),
        codec_list(),
    ]);
    // data object with opaque packets
    file.extend(obj(&guids::DATA, &[0u8; 50]));
    file
}

#[test]
fn decodes_file_properties() {
    let container = decode(&mut Cursor::new(make_wmv()), &DecodeOptions::default()).expect("decode");
    assert_eq!(container.format, Some(Format::Asf));
    assert_eq!(container.mimetype.as_deref(), Some("video/x-ms-wmv"));

    let entry = container.entry().unwrap();
    assert_eq!(entry.ticks, 123_450_000);
    assert_eq!(entry.tick_period, 100);
    assert_eq!(container.duration(), Some(12.345));
    assert_eq!(entry.metadata.get("file_creation"), Some(&Value::Date(1_577_836_800_000_000_000)));
    assert_eq!(entry.metadata.get("seekable"), Some(&Value::Bool(true)));
    assert_eq!(entry.metadata.get("broadcast"), Some(&Value::Bool(false)));
    assert_eq!(entry.metadata.get("max_bitrate"), Some(&Value::UInt(128_000)));
    assert_eq!(entry.metadata.get("file_id"), Some(&Value::Guid(Uuid::from_u128(0x1234))));
}

#[test]
fn sparse_stream_numbers_keep_early_bitrates() {
    let container = decode(&mut Cursor::new(make_wmv()), &DecodeOptions::default()).unwrap();
    let entry = container.entry().unwrap();
    assert_eq!(entry.streams.len(), 5);

    let streams: Vec<_> = entry.streams().collect();
    assert_eq!(streams.len(), 2);

    let audio = streams[0];
    assert_eq!(audio.number, 1);
    assert_eq!(audio.average_bitrate, 64_000);
    assert_eq!(audio.codec.as_deref(), Some("0x0161"));
    let a = audio.audio().unwrap();
    assert_eq!((a.channels, a.sample_rate, a.bits_per_sample), (2, 44_100.0, 16));
    assert_eq!(a.block_alignment, 4459);

    let video = streams[1];
    assert_eq!(video.number, 5);
    assert_eq!(video.average_bitrate, 800_000);
    assert_eq!(video.codec.as_deref(), Some("WMV3"));
    match &video.info {
        Some(StreamInfo::Video(v)) => {
            assert_eq!((v.width, v.height, v.bit_depth), (320, 240, 24));
            assert_eq!(v.fourcc, Some(FourCC(*b"WMV3")));
            assert_eq!((v.horiz_dpi, v.vert_dpi), (72, 72));
        }
        other => panic!("expected video, got {:?}", other),
    }
}

#[test]
fn descriptions_and_metadata() {
    let container = decode(&mut Cursor::new(make_wmv()), &DecodeOptions::default()).unwrap();
    assert_eq!(container.field("title").unwrap().to_string(), "Clip");
    assert_eq!(container.field("author").unwrap().to_string(), "Someone");
    assert_eq!(container.field("copyright").unwrap().to_string(), "(c) 2020");
    assert_eq!(container.field("album").unwrap().to_string(), "Album");
    assert_eq!(container.field("track").unwrap().to_string(), "4");

    let md = &container.entry().unwrap().metadata;
    assert_eq!(md.get("rating"), Some(&Value::Text(String::new())));
    assert_eq!(md.get("IsVBR"), Some(&Value::Bool(true)));
    assert_eq!(md.get("AspectRatioX#5"), Some(&Value::UInt(16)));
    assert_eq!(md.get("languages"), Some(&Value::List(vec![Value::Text("en-us".into())])));

    let codecs = &container.entry().unwrap().codecs;
    assert_eq!(codecs.len(), 1);
    assert_eq!(codecs[0].name, "WMA");
    assert_eq!(codecs[0].description, "64 kbps");
    assert_eq!(codecs[0].data, vec![0x61, 0x01]);
}

#[test]
fn audio_only_files_are_wma() {
    let data = header_object(&[stream_properties(&guids::AUDIO_MEDIA, 1, &waveformatex())]);
    let container = decode(&mut Cursor::new(data), &DecodeOptions::default()).unwrap();
    assert_eq!(container.mimetype.as_deref(), Some("audio/x-ms-wma"));
}

#[test]
fn generic_mimetype_without_media_streams() {
    let data = header_object(&[file_properties()]);
    let container = decode(&mut Cursor::new(data), &DecodeOptions::default()).unwrap();
    assert_eq!(container.mimetype.as_deref(), Some("video/x-ms-asf"));
}

#[test]
fn object_padding_is_skipped() {
    let mut padded = bitrate_properties(&[(1, 1000)]);
    padded.extend([0u8; 4]);
    let size = padded.len() as u64;
    padded[16..24].copy_from_slice(&size.to_le_bytes());

    let data = header_object(&[padded, content_description(["T", "", "", "", ""])]);
    let container = decode(&mut Cursor::new(data), &DecodeOptions::default()).unwrap();
    let entry = container.entry().unwrap();
    assert_eq!(entry.streams[0].average_bitrate, 1000);
    assert_eq!(entry.metadata.get("title"), Some(&Value::Text("T".into())));
}

#[test]
fn bad_reserved_bytes_are_rejected() {
    let mut data = header_object(&[]);
    data[28] = 0;
    let err = decode(&mut Cursor::new(data), &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidSignature(_)));
}

#[test]
fn rejects_other_formats() {
    let err = asf::decode(&mut Cursor::new(vec![0u8; 32]), &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidSignature(_)));
}
