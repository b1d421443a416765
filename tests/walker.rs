use mediatree::vint::{encode_size, encode_unknown_size};
use mediatree::{
    DecodeError, EbmlFraming, ElementId, ElementSize, ReadContext, Registry, Result, Source, StopSet, Walker,
    MAX_DEPTH,
};
use once_cell::sync::Lazy;
use std::io::Cursor;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const ROOT: u32 = 0x1A45DFA3;
const CLUSTER: u32 = 0x1F43B675;
const X: u32 = 0x4286;
const UNKEYED: u32 = 0x4287;
const SHORT: u32 = 0xE7;
const BARE: u32 = 0x4DBB;
const UNREGISTERED: u32 = 0x4321;

#[derive(Debug, Default)]
struct Record {
    values: Vec<(String, u64)>,
    masters: Vec<&'static str>,
}

type TestWalker<'a> = Walker<'a, Record>;

static REG: Lazy<Registry<Record>> = Lazy::new(|| {
    Registry::new("test")
        .with_element(ElementId::from_u32(ROOT), "Root", read_root)
        .with_element(ElementId::from_u32(CLUSTER), "Cluster", read_cluster)
        .with_keyed(ElementId::from_u32(X), "X", "x", read_uint)
        .with_element(ElementId::from_u32(UNKEYED), "Unkeyed", read_uint)
        .with_element(ElementId::from_u32(SHORT), "Short", read_short)
        .with_element(ElementId::from_u32(BARE), "Bare", read_bare)
});

static STOP: Lazy<StopSet> =
    Lazy::new(|| StopSet::new([ElementId::from_u32(CLUSTER), ElementId::from_u32(ROOT)]));

fn read_root(w: &mut TestWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.state.masters.push(ctx.title);
    w.walk("root", ctx.size(), &REG, Some(&*STOP))
}

fn read_cluster(w: &mut TestWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.state.masters.push(ctx.title);
    w.walk("cluster", ctx.size(), &REG, Some(&*STOP))
}

fn read_bare(w: &mut TestWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    w.walk("bare", ctx.size(), &REG, None)
}

fn read_uint(w: &mut TestWalker<'_>, ctx: &ReadContext<'_>) -> Result<u64> {
    let n = ctx.leaf_len()?;
    let v = w.source().read_uint_be(n)?;
    w.state.values.push((ctx.key().into_owned(), v));
    Ok(n)
}

// Reads one byte whatever the declared size.
fn read_short(w: &mut TestWalker<'_>, _ctx: &ReadContext<'_>) -> Result<u64> {
    w.source().read_u8()?;
    Ok(1)
}

fn el(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = ElementId::from_u32(id).as_bytes().to_vec();
    out.extend(encode_size(payload.len() as u64, None).expect("size fits"));
    out.extend_from_slice(payload);
    out
}

fn unknown(id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = ElementId::from_u32(id).as_bytes().to_vec();
    out.extend(encode_unknown_size(1));
    out.extend_from_slice(body);
    out
}

fn walk_all(data: Vec<u8>) -> (Result<u64>, Record, u64, bool) {
    let total = data.len() as u64;
    let mut cur = Cursor::new(data);
    let src = Source::new(&mut cur).expect("source").with_len(Some(total));
    let mut walker = Walker::new(src, &EbmlFraming, Record::default());
    let outcome = walker.walk_to_end("top", &REG);
    let pos = walker.position();
    let ended = walker.is_ended();
    (outcome, walker.into_state(), pos, ended)
}

#[test]
fn known_master_is_consumed_exactly() {
    let mut body = el(X, &[42]);
    body.extend(el(UNREGISTERED, &[1, 2, 3]));
    let data = el(ROOT, &body);
    let len = data.len() as u64;

    let (outcome, rec, pos, ended) = walk_all(data);
    assert_eq!(outcome.expect("walk"), len);
    assert_eq!(pos, len);
    assert!(ended);
    assert_eq!(rec.values, vec![("x".to_string(), 42)]);
    assert_eq!(rec.masters, vec!["Root"]);
}

#[test]
fn missing_key_falls_back_to_hex_id() {
    let (outcome, rec, _, _) = walk_all(el(UNKEYED, &[0x01, 0x00]));
    outcome.expect("walk");
    assert_eq!(rec.values, vec![("4287".to_string(), 256)]);
}

#[test]
fn truncated_master_ends_gracefully() {
    // root claims 10 bytes of payload; only one 4-byte child is present
    let mut data = ElementId::from_u32(ROOT).as_bytes().to_vec();
    data.push(0x8A);
    data.extend(el(X, &[7]));

    let (outcome, rec, pos, ended) = walk_all(data.clone());
    outcome.expect("clean end of stream is not an error");
    assert!(ended);
    assert_eq!(pos, data.len() as u64);
    assert_eq!(rec.values, vec![("x".to_string(), 7)]);
}

#[test]
fn truncation_inside_a_leaf_is_reported() {
    let mut data = ElementId::from_u32(X).as_bytes().to_vec();
    data.extend([0x84, 0x01]);
    let (outcome, _, _, _) = walk_all(data);
    assert!(outcome.unwrap_err().is_end_of_stream());
}

#[test]
fn reader_that_under_reads_is_inconsistent() {
    let (outcome, _, _, _) = walk_all(el(SHORT, &[1, 2]));
    match outcome {
        Err(DecodeError::InconsistentAccounting { offset, declared, consumed }) => {
            assert_eq!((offset, declared, consumed), (0, 2, 1));
        }
        other => panic!("expected accounting error, got {:?}", other),
    }
}

#[test]
fn children_overrunning_their_parent_are_inconsistent() {
    let child = el(X, &[9]);
    let mut data = ElementId::from_u32(ROOT).as_bytes().to_vec();
    data.push(0x80 | (child.len() as u8 - 1));
    data.extend(&child);
    data.extend(el(X, &[1]));

    let (outcome, _, _, _) = walk_all(data);
    assert!(matches!(
        outcome,
        Err(DecodeError::InconsistentAccounting { declared: 3, consumed: 4, .. })
    ));
}

#[test]
fn empty_elements_are_not_dispatched() {
    let mut data = el(SHORT, &[]);
    data.extend(el(X, &[5]));
    let (outcome, rec, pos, _) = walk_all(data);
    assert_eq!(outcome.expect("walk"), 6);
    assert_eq!(pos, 6);
    assert_eq!(rec.values.len(), 1);
}

#[test]
fn unknown_size_without_stop_set_fails() {
    let (outcome, _, _, _) = walk_all(unknown(BARE, &el(X, &[1])));
    assert!(matches!(outcome, Err(DecodeError::UnknownSizeWithoutStopSet { .. })));

    let (outcome, _, _, _) = walk_all(unknown(UNREGISTERED, &[0; 4]));
    assert!(matches!(outcome, Err(DecodeError::UnknownSizeWithoutStopSet { offset: 0 })));
}

#[test]
fn unknown_size_scope_ends_at_stop_id() {
    let mut data = unknown(CLUSTER, &el(X, &[1]));
    data.extend(unknown(CLUSTER, &el(X, &[2])));
    let len = data.len() as u64;

    let (outcome, rec, pos, _) = walk_all(data);
    outcome.expect("walk");
    assert_eq!(pos, len);
    assert_eq!(rec.masters, vec!["Cluster", "Cluster"]);
    let values: Vec<u64> = rec.values.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn unregistered_unknown_size_child_skips_to_boundary() {
    let mut body = el(X, &[1]);
    body.extend(unknown(UNREGISTERED, &[0x10, 0x20, 0x30]));
    let mut data = unknown(CLUSTER, &body);
    data.extend(unknown(CLUSTER, &el(X, &[2])));

    let (outcome, rec, _, _) = walk_all(data);
    outcome.expect("walk");
    assert_eq!(rec.masters.len(), 2);
    assert_eq!(rec.values.len(), 2);
}

#[test]
fn malformed_length_in_unknown_scope_resynchronises() {
    let mut body = el(X, &[7]);
    body.extend([0x00, 0x11, 0x22]);
    let mut data = unknown(CLUSTER, &body);
    data.extend(unknown(CLUSTER, &el(X, &[8])));

    let (outcome, rec, _, _) = walk_all(data);
    outcome.expect("walk");
    let values: Vec<u64> = rec.values.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![7, 8]);
    assert_eq!(rec.masters.len(), 2);
}

#[test]
fn find_boundary_reports_skipped_bytes() {
    let mut data = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00];
    data.extend(unknown(CLUSTER, &[]));
    let mut cur = Cursor::new(data);
    let src = Source::new(&mut cur).unwrap();
    let mut walker = Walker::new(src, &EbmlFraming, Record::default());

    assert_eq!(walker.find_boundary(&STOP).unwrap(), 5);
    assert_eq!(walker.position(), 5);
    assert!(!walker.is_ended());

    let header = walker.peek_header().unwrap().expect("header at boundary");
    assert_eq!(header.id, ElementId::from_u32(CLUSTER));
    assert_eq!(header.size, ElementSize::Unknown);
    assert_eq!(walker.position(), 5);
}

#[test]
fn find_boundary_at_end_of_stream_ends_the_walk() {
    let mut cur = Cursor::new(vec![1, 2, 3]);
    let src = Source::new(&mut cur).unwrap();
    let mut walker = Walker::new(src, &EbmlFraming, Record::default());
    assert_eq!(walker.find_boundary(&STOP).unwrap(), 3);
    assert!(walker.is_ended());
}

// Runs `walk_all` on another thread so a walk that never returns fails the test.
fn walk_all_within(data: Vec<u8>, limit: Duration) -> (Result<u64>, Record, u64, bool) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(walk_all(data));
    });
    rx.recv_timeout(limit).expect("walk did not finish")
}

#[test]
fn stop_id_with_malformed_size_ends_the_scope() {
    let mut data = unknown(CLUSTER, &el(X, &[1]));
    data.extend(ElementId::from_u32(CLUSTER).as_bytes());
    data.extend([0x00, 0x11, 0x22]);

    let (outcome, rec, _, _) = walk_all_within(data, Duration::from_secs(5));
    assert!(matches!(outcome, Err(DecodeError::MalformedLength { .. })), "got {:?}", outcome);
    assert_eq!(rec.masters, vec!["Cluster"]);
    assert_eq!(rec.values, vec![("x".to_string(), 1)]);
}

fn nested_bare(levels: usize) -> Vec<u8> {
    let mut data = el(X, &[3]);
    for _ in 0..levels {
        data = el(BARE, &data);
    }
    data
}

#[test]
fn nesting_deeper_than_the_limit_is_refused() {
    let (outcome, rec, _, _) = walk_all(nested_bare(MAX_DEPTH / 2));
    outcome.expect("walk");
    assert_eq!(rec.values.len(), 1);

    let (outcome, _, _, _) = walk_all(nested_bare(MAX_DEPTH + 10));
    match outcome {
        Err(DecodeError::NestingTooDeep { depth, .. }) => assert_eq!(depth, MAX_DEPTH),
        other => panic!("expected nesting error, got {:?}", other),
    }
}
