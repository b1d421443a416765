use mediatree::vint::encode_size;
use mediatree::{decode, decode_path, detect, hex_range, DecodeError, DecodeOptions, ElementId, Format};
use std::io::{Cursor, Seek, SeekFrom, Write};

fn el(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = ElementId::from_u32(id).as_bytes().to_vec();
    out.extend(encode_size(payload.len() as u64, None).unwrap());
    out.extend_from_slice(payload);
    out
}

fn make_minimal_mkv() -> Vec<u8> {
    let mut file = el(0x1A45DFA3, &el(0x4282, b"matroska"));
    let info = el(0x1549A966, &[el(0x2AD7B1, &[0x0F, 0x42, 0x40]), el(0x4489, &1000.0f64.to_be_bytes())].concat());
    file.extend(el(0x18538067, &info));
    file
}

fn make_minimal_mp4() -> Vec<u8> {
    let mut data = vec![0, 0, 0, 16];
    data.extend(b"ftypisom");
    data.extend(0u32.to_be_bytes());
    data
}

#[test]
fn detect_each_format() {
    assert_eq!(detect(&mut Cursor::new(make_minimal_mkv())).unwrap(), Some(Format::Ebml));
    assert_eq!(detect(&mut Cursor::new(make_minimal_mp4())).unwrap(), Some(Format::Mp4));

    let mut asf = mediatree::formats::asf::SIGNATURE.to_vec();
    asf.extend(30u64.to_le_bytes());
    assert_eq!(detect(&mut Cursor::new(asf)).unwrap(), Some(Format::Asf));

    assert_eq!(detect(&mut Cursor::new(b"RIFF....WAVE".to_vec())).unwrap(), None);
}

#[test]
fn unknown_format_is_an_invalid_signature() {
    let err = decode(&mut Cursor::new(vec![0u8; 64]), &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidSignature(_)));
}

#[test]
fn decode_starts_at_the_current_position() {
    let mut data = vec![0xEE; 8];
    data.extend(make_minimal_mkv());
    let mut cur = Cursor::new(data);
    cur.seek(SeekFrom::Start(8)).unwrap();

    let container = decode(&mut cur, &DecodeOptions::default()).expect("decode");
    assert_eq!(container.duration(), Some(1.0));
}

#[test]
fn decode_path_reads_a_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(&make_minimal_mkv()).unwrap();
    file.flush().unwrap();

    let container = decode_path(file.path()).expect("decode file");
    assert_eq!(container.format, Some(Format::Ebml));
    assert_eq!(container.mimetype.as_deref(), Some("video/x-matroska"));
    assert_eq!(container.field("doctype").unwrap().to_string(), "matroska");
}

#[test]
fn decode_path_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let err = decode_path(dir.path().join("absent.mkv")).unwrap_err();
    assert!(matches!(err, DecodeError::Io(_)));
}

#[test]
fn container_serialises_to_json() {
    let container = decode(&mut Cursor::new(make_minimal_mkv()), &DecodeOptions::default()).unwrap();
    let json = serde_json::to_value(&container).expect("serialise");

    assert_eq!(json["format"], "ebml");
    assert_eq!(json["mimetype"], "video/x-matroska");
    assert_eq!(json["metadata"]["doctype"], "matroska");
    assert_eq!(json["entries"][0]["ticks"], 1000);
    assert_eq!(json["entries"][0]["tick_period"], 1_000_000);
    assert!(json["entries"][0]["streams"].as_array().unwrap().is_empty());

    let text = serde_json::to_string_pretty(&container).unwrap();
    assert!(text.contains("\"doctype\": \"matroska\""));
}

#[test]
fn hex_range_over_a_file() {
    let mut file = tempfile::tempfile().unwrap();
    let data = make_minimal_mp4();
    file.write_all(&data).unwrap();

    let dump = hex_range(&mut file, data.len() as u64, 4, 8).unwrap();
    assert_eq!(dump.offset, 4);
    assert_eq!(dump.length, 8);
    assert!(dump.hex.contains("66 74 79 70"));
}
