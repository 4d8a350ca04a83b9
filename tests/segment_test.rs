use std::fs;
use std::path::PathBuf;

use calamus::codec::{HEADER_LEN, SegmentFileKind};
use calamus::index::btrie::BTrieReader;
use calamus::index::skipindex::{KeyEncoding, SkipIndexReader};
use calamus::segment::{POSTING_FILE, ROW_INDEX_FILE, ROWS_FILE, field_index_file};
use calamus::{
    Event, FieldType, IndexInfo, Segment, SegmentReader, SegmentWriter, SegmentWriterConfig,
};
use tempfile::tempdir;

const BASE_TS: u64 = 1_700_000_000_000;

fn make_info() -> IndexInfo {
    IndexInfo::builder("access_logs")
        .add_field("ts", FieldType::Timestamp, true)
        .add_field("message", FieldType::Text, true)
        .add_field("host", FieldType::Keyword, true)
        .add_field("latency", FieldType::Float, true)
        .add_field("bytes", FieldType::Int, true)
        .build()
        .unwrap()
}

fn event_at(i: u64) -> Event {
    Event::new()
        .add_timestamp("ts", BASE_TS + i * 250)
        .add_text("message", format!("worker {} finished batch {}", i % 7, i))
        .add_keyword("host", format!("web-{}", i % 5))
        .add_float("latency", i as f64 * 0.25)
        .add_int("bytes", i * 512)
}

fn seal(dir: &std::path::Path, count: u64, config: SegmentWriterConfig) -> PathBuf {
    let mut segment = Segment::new(make_info());
    for i in 0..count {
        segment.add(event_at(i)).unwrap();
    }
    SegmentWriter::new(config).write(&segment, dir).unwrap()
}

#[test]
fn test_round_trip_all_field_types() {
    let dir = tempdir().unwrap();
    // small interval and buckets so every structure goes multi-level
    let config = SegmentWriterConfig {
        ixl: 4,
        bucket_capacity: 4,
        ..Default::default()
    };
    let sealed = seal(dir.path(), 50, config);
    let reader = SegmentReader::open(&sealed).unwrap();

    assert_eq!(reader.schema().name(), "access_logs");
    assert_eq!(reader.event_count(), 50);
    assert_eq!(reader.min_timestamp(), BASE_TS);
    assert_eq!(reader.max_timestamp(), BASE_TS + 49 * 250);

    // keyword terms
    let hits = reader.term_postings("host", "web-2").unwrap().unwrap();
    let expected: Vec<u32> = (0..50).filter(|i| i % 5 == 2).collect();
    assert_eq!(hits.iter().collect::<Vec<_>>(), expected);

    // tokenized text terms
    let hits = reader.term_postings("message", "batch").unwrap().unwrap();
    assert_eq!(hits.len(), 50);
    let hits = reader.term_postings("message", "3").unwrap().unwrap();
    let expected: Vec<u32> = (0..50).filter(|i| i % 7 == 3 || *i == 3).collect();
    assert_eq!(hits.iter().collect::<Vec<_>>(), expected);
    assert!(reader.term_postings("message", "missing").unwrap().is_none());

    // integer seeks, including key zero
    let (key, hits) = reader.seek_unsigned("bytes", 0).unwrap().unwrap();
    assert_eq!(key, 0);
    assert_eq!(hits.iter().collect::<Vec<_>>(), [0]);
    let (key, hits) = reader.seek_unsigned("bytes", 513).unwrap().unwrap();
    assert_eq!(key, 1024);
    assert_eq!(hits.iter().collect::<Vec<_>>(), [2]);
    assert!(reader.seek_unsigned("bytes", 49 * 512 + 1).unwrap().is_none());

    // timestamp seeks
    let (key, hits) = reader.seek_unsigned("ts", BASE_TS + 251).unwrap().unwrap();
    assert_eq!(key, BASE_TS + 500);
    assert_eq!(hits.iter().collect::<Vec<_>>(), [2]);

    // float seeks
    let (key, hits) = reader.seek_float("latency", 0.13).unwrap().unwrap();
    assert_eq!(key, 0.25);
    assert_eq!(hits.iter().collect::<Vec<_>>(), [1]);
    let (key, hits) = reader.seek_float("latency", 12.25).unwrap().unwrap();
    assert_eq!(key, 12.25);
    assert_eq!(hits.iter().collect::<Vec<_>>(), [49]);

    // stored rows come back intact
    for i in 0..50 {
        let event = reader.event(i as u32).unwrap().unwrap();
        assert_eq!(event, event_at(i));
    }
    assert!(reader.event(50).unwrap().is_none());
}

#[test]
fn test_field_indexes_reference_flushed_postings() {
    let dir = tempdir().unwrap();
    let config = SegmentWriterConfig {
        ixl: 4,
        bucket_capacity: 4,
        ..Default::default()
    };
    let sealed = seal(dir.path(), 50, config);

    let posting_len = fs::metadata(sealed.join(POSTING_FILE)).unwrap().len();
    let in_posting_body =
        |offset: u64| offset >= HEADER_LEN as u64 && offset < posting_len;

    // every trie leaf points inside the posting file body
    let host_buf = fs::read(sealed.join(field_index_file("host"))).unwrap();
    let trie = BTrieReader::open(&host_buf).unwrap();
    for h in 0..5 {
        let offset = trie.lookup(&format!("web-{h}")).unwrap().unwrap();
        assert!(in_posting_body(offset), "trie offset {offset} escapes posting file");
    }

    // every skip index payload points inside the posting file body
    let bytes_buf = fs::read(sealed.join(field_index_file("bytes"))).unwrap();
    let index =
        SkipIndexReader::open(&bytes_buf, SegmentFileKind::SkipIndex, KeyEncoding::Unsigned)
            .unwrap();
    for i in 0..50u64 {
        let offset = index.get(i * 512).unwrap().unwrap();
        assert!(in_posting_body(offset), "skip offset {offset} escapes posting file");
    }

    // row index payloads stay inside the row file body, before the
    // statistics block
    let rows_len = fs::metadata(sealed.join(ROWS_FILE)).unwrap().len();
    let rows_idx = fs::read(sealed.join(ROW_INDEX_FILE)).unwrap();
    let index =
        SkipIndexReader::open(&rows_idx, SegmentFileKind::RowIndex, KeyEncoding::Unsigned).unwrap();
    for id in 0..50u64 {
        let offset = index.get(id).unwrap().unwrap();
        assert!(offset >= HEADER_LEN as u64 && offset < rows_len - 32);
    }
}

#[test]
fn test_many_distinct_terms_and_deep_levels() {
    let dir = tempdir().unwrap();
    let info = IndexInfo::builder("hosts")
        .add_field("ts", FieldType::Timestamp, true)
        .add_field("host", FieldType::Keyword, true)
        .build()
        .unwrap();
    let mut segment = Segment::new(info);
    for i in 0..500u64 {
        segment
            .add(
                Event::new()
                    .add_timestamp("ts", i)
                    .add_keyword("host", format!("host-{i}")),
            )
            .unwrap();
    }
    // interval 3 and capacity 2 force deep skip levels and repeated
    // bucket bursts
    let config = SegmentWriterConfig {
        ixl: 3,
        bucket_capacity: 2,
        ..Default::default()
    };
    let sealed = SegmentWriter::new(config).write(&segment, dir.path()).unwrap();
    let reader = SegmentReader::open(&sealed).unwrap();

    for i in [0u64, 123, 499] {
        let hits = reader
            .term_postings("host", &format!("host-{i}"))
            .unwrap()
            .unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), [i as u32]);
    }
    assert!(reader.term_postings("host", "host-500").unwrap().is_none());

    for target in [0u64, 7, 250, 499] {
        let (key, hits) = reader.seek_unsigned("ts", target).unwrap().unwrap();
        assert_eq!(key, target);
        assert_eq!(hits.iter().collect::<Vec<_>>(), [target as u32]);
    }
    assert!(reader.seek_unsigned("ts", 500).unwrap().is_none());

    let event = reader.event(321).unwrap().unwrap();
    assert_eq!(event.get("host").unwrap().as_str(), Some("host-321"));
}
