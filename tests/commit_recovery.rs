use std::fs;

use lucerna::{
    Document, Field, IndexReader, IndexSearcher, IndexWriter, IndexWriterConfig, LucernaError,
    OpenMode, Query,
};
use tempfile::TempDir;

fn config() -> IndexWriterConfig {
    IndexWriterConfig::default()
        .with_merge_on_flush(false)
        .with_max_concurrent_merges(1)
}

fn doc(body: &str) -> Document {
    Document::new().with_field(Field::text("body", body))
}

fn count(reader: &IndexReader, text: &str) -> u64 {
    IndexSearcher::new(reader.clone())
        .count(&Query::term("body", text))
        .unwrap()
}

#[test]
fn test_leftover_temp_files_ignored_and_cleaned() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("durable")).unwrap();
    writer.commit().unwrap();
    writer.close().unwrap();

    // a crash mid-commit leaves temp files behind
    fs::write(dir.path().join("segments_2.tmp"), b"partial manifest").unwrap();
    fs::create_dir(dir.path().join("segment_1.tmp")).unwrap();
    fs::write(dir.path().join("segment_1.tmp").join("postings.bin"), b"junk").unwrap();

    let reader = IndexReader::open(dir.path()).unwrap();
    assert_eq!(reader.generation(), 1);
    assert_eq!(count(&reader, "durable"), 1);

    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    assert!(!dir.path().join("segments_2.tmp").exists());
    assert!(!dir.path().join("segment_1.tmp").exists());
    writer.add_document(&doc("after")).unwrap();
    assert_eq!(writer.commit().unwrap(), 2);
}

#[test]
fn test_corrupt_newest_manifest_falls_back() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("first")).unwrap();
    writer.commit().unwrap();
    let first_manifest = fs::read(dir.path().join("segments_1")).unwrap();

    writer.add_document(&doc("second")).unwrap();
    writer.commit().unwrap();
    writer.close().unwrap();

    fs::write(dir.path().join("segments_1"), &first_manifest).unwrap();
    let newest = dir.path().join("segments_2");
    let mut bytes = fs::read(&newest).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&newest, &bytes).unwrap();

    let reader = IndexReader::open(dir.path()).unwrap();
    assert_eq!(reader.generation(), 1);
    assert_eq!(reader.num_docs(), 1);
    assert_eq!(count(&reader, "second"), 0);

    // the writer recovers the same commit and drops what it does not reference
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    assert_eq!(writer.generation(), 1);
    assert_eq!(writer.num_docs(), 1);
    assert!(!newest.exists());
    assert!(!dir.path().join("segment_1").exists());
}

#[test]
fn test_all_manifests_corrupt() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("only")).unwrap();
    writer.commit().unwrap();
    writer.close().unwrap();

    fs::write(dir.path().join("segments_1"), b"LSEGgarbage").unwrap();
    assert!(matches!(
        IndexReader::open(dir.path()),
        Err(LucernaError::Corrupt(_))
    ));
    assert!(matches!(
        IndexWriter::open(dir.path(), config()),
        Err(LucernaError::Corrupt(_))
    ));
}

#[test]
fn test_failed_flush_keeps_buffer() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("one")).unwrap();
    writer.add_document(&doc("two")).unwrap();

    fs::create_dir(dir.path().join("segment_0")).unwrap();
    let err = writer.commit().unwrap_err();
    assert!(err.is_retriable());
    assert_eq!(writer.buffered_docs(), 2);
    assert_eq!(writer.segment_count(), 0);
    assert!(!dir.path().join("segments_1").exists());
    assert!(!dir.path().join("segment_0.tmp").exists());

    fs::remove_dir(dir.path().join("segment_0")).unwrap();
    assert_eq!(writer.commit().unwrap(), 1);
    assert_eq!(writer.buffered_docs(), 0);
    let reader = IndexReader::open(dir.path()).unwrap();
    assert_eq!(reader.num_docs(), 2);
}

#[test]
fn test_crash_between_flush_and_commit() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("committed")).unwrap();
    writer.commit().unwrap();
    writer.add_document(&doc("flushed")).unwrap();
    writer.flush().unwrap();
    assert!(dir.path().join("segment_1").exists());
    // simulate process death: no rollback, no lock release
    std::mem::forget(writer);

    let reader = IndexReader::open(dir.path()).unwrap();
    assert_eq!(reader.generation(), 1);
    assert_eq!(count(&reader, "committed"), 1);
    assert_eq!(count(&reader, "flushed"), 0);

    assert!(matches!(
        IndexWriter::open(dir.path(), config()),
        Err(LucernaError::LockHeld(_))
    ));
    fs::remove_file(dir.path().join("write.lock")).unwrap();

    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    assert!(!dir.path().join("segment_1").exists());
    assert_eq!(writer.num_docs(), 1);
}

#[test]
fn test_open_modes() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        IndexWriter::open(dir.path(), config().with_open_mode(OpenMode::Append)),
        Err(LucernaError::IndexNotFound(_))
    ));

    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("old")).unwrap();
    writer.close().unwrap();

    let writer = IndexWriter::open(dir.path(), config().with_open_mode(OpenMode::Create)).unwrap();
    assert_eq!(writer.num_docs(), 0);
    // the previous commit stays readable until the new one lands
    assert_eq!(IndexReader::open(dir.path()).unwrap().num_docs(), 1);
    writer.add_document(&doc("new")).unwrap();
    writer.commit().unwrap();

    let reader = IndexReader::open(dir.path()).unwrap();
    assert_eq!(count(&reader, "old"), 0);
    assert_eq!(count(&reader, "new"), 1);
}

#[test]
fn test_manifest_json_dump() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc("json")).unwrap();
    writer.commit().unwrap();

    let manifest = writer.last_commit();
    let json = manifest.to_json().unwrap();
    assert!(json.contains("\"generation\": 1"));
    let parsed = lucerna::segment::SegmentManifest::from_json(&json).unwrap();
    assert_eq!(parsed, *manifest);
}
