use std::fs;

use lucerna::segment::MergePolicyConfig;
use lucerna::testing::prelude::*;
use lucerna::{
    DocId, Document, Field, IndexReader, IndexSearcher, IndexWriter, IndexWriterConfig,
    LucernaError, Query, Term,
};
use tempfile::TempDir;

fn config() -> IndexWriterConfig {
    IndexWriterConfig::default()
        .with_merge_on_flush(false)
        .with_max_concurrent_merges(1)
}

fn doc(id: usize, body: &str) -> Document {
    Document::new()
        .with_field(Field::keyword("id", id.to_string()))
        .with_field(Field::text("body", body))
}

fn postings(reader: &IndexReader, text: &str) -> Vec<u32> {
    let segment = &reader.segments()[0];
    let mut docs = Vec::new();
    if let Some(mut iter) = segment.postings(&Term::new("body", text)).unwrap() {
        while let Some(doc) = iter.next_doc().unwrap() {
            docs.push(doc.0);
        }
    }
    docs
}

#[test]
fn test_merge_renumbers_segments_in_order() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc(0, "x")).unwrap();
    writer.add_document(&doc(1, "x")).unwrap();
    writer.flush().unwrap();
    writer.add_document(&doc(2, "x y")).unwrap();
    writer.flush().unwrap();
    assert_eq!(writer.segment_count(), 2);

    writer.force_merge(1).unwrap();
    let reader = writer.reader().unwrap();
    assert_eq!(reader.segment_count(), 1);
    assert_eq!(postings(&reader, "x"), vec![0, 1, 2]);
    assert_eq!(postings(&reader, "y"), vec![2]);
    assert_eq!(reader.document(2).unwrap().get_text("id"), Some("2"));
}

#[test]
fn test_merge_conserves_live_docs() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    let mut id = 0;
    for batch in 0..4 {
        for n in 0..5 {
            let body = if n % 2 == 0 { "even shared" } else { "odd shared" };
            writer.add_document(&doc(id, &format!("{} b{}", body, batch))).unwrap();
            id += 1;
        }
        writer.flush().unwrap();
    }
    writer.delete_documents(&Term::new("body", "b1")).unwrap();
    writer.delete_documents(&Term::new("id", "0")).unwrap();
    let live_before = writer.num_docs();
    assert_eq!(live_before, 14);

    writer.force_merge(1).unwrap();
    writer.commit().unwrap();
    writer.close().unwrap();

    let reader = IndexReader::open(dir.path()).unwrap();
    assert_eq!(reader.segment_count(), 1);
    assert_eq!(reader.num_docs(), live_before);
    assert_eq!(reader.max_doc(), live_before);
    assert_eq!(reader.doc_freq(&Term::new("body", "shared")), live_before);
    assert_eq!(reader.doc_freq(&Term::new("body", "b1")), 0);
    assert_eq!(reader.doc_freq(&Term::new("body", "even")), 8);
    let violations = check_all_invariants(&reader, &default_invariants());
    assert!(violations.is_empty(), "{:?}", violations);
}

#[test]
fn test_background_merges_keep_deletes() {
    let dir = TempDir::new().unwrap();
    let policy = MergePolicyConfig {
        segments_per_tier: 2,
        min_merge_count: 2,
        max_merge_count: 4,
        floor_segment_docs: 10,
        ..MergePolicyConfig::default()
    };
    let writer = IndexWriter::open(
        dir.path(),
        IndexWriterConfig::default()
            .with_merge_policy(policy)
            .with_max_buffered_docs(3)
            .with_max_concurrent_merges(2),
    )
    .unwrap();

    for id in 0..60 {
        writer.add_document(&doc(id, &format!("common t{}", id % 7))).unwrap();
        if id % 10 == 9 {
            // deletes race with merges that may already hold the segment
            writer.delete_documents(&Term::new("id", (id - 5).to_string())).unwrap();
        }
    }
    writer.wait_for_merges().unwrap();
    writer.commit().unwrap();

    let reader = writer.reader().unwrap();
    assert_eq!(reader.num_docs(), 54);
    assert!(reader.segment_count() < 20);
    let searcher = IndexSearcher::new(reader.clone());
    for deleted in [4, 14, 24, 34, 44, 54] {
        let hits = searcher
            .matching_docs(&Query::term("id", deleted.to_string()))
            .unwrap();
        assert!(hits.is_empty(), "doc {} still visible", deleted);
    }
    assert_eq!(searcher.count(&Query::term("body", "common")).unwrap(), 54);
    writer.close().unwrap();

    let reopened = IndexReader::open(dir.path()).unwrap();
    assert_eq!(reopened.num_docs(), 54);
    let violations = check_all_invariants(&reopened, &default_invariants());
    assert!(violations.is_empty(), "{:?}", violations);
}

#[test]
fn test_snapshot_survives_merge_until_released() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc(0, "old one")).unwrap();
    writer.flush().unwrap();
    writer.add_document(&doc(1, "old two")).unwrap();
    writer.commit().unwrap();

    let snapshot = writer.reader().unwrap();
    writer.force_merge(1).unwrap();
    writer.commit().unwrap();

    // merged-away segments stay on disk while the snapshot holds them
    assert!(dir.path().join("segment_0").exists());
    assert_eq!(snapshot.segment_count(), 2);
    assert_eq!(snapshot.document(1).unwrap().get_text("body"), Some("old two"));
    assert_eq!(writer.reader().unwrap().segment_count(), 1);

    drop(snapshot);
    assert!(!dir.path().join("segment_0").exists());
    assert!(!dir.path().join("segment_1").exists());
}

#[test]
fn test_failed_merge_leaves_index_unchanged() {
    let dir = TempDir::new().unwrap();
    let writer = IndexWriter::open(dir.path(), config()).unwrap();
    writer.add_document(&doc(0, "p")).unwrap();
    writer.flush().unwrap();
    writer.add_document(&doc(1, "q")).unwrap();
    writer.flush().unwrap();

    // the merge output directory is already taken
    fs::create_dir(dir.path().join("segment_2")).unwrap();
    let err = writer.force_merge(1).unwrap_err();
    assert!(matches!(err, LucernaError::Io(_)));
    assert!(err.is_retriable());
    assert_eq!(writer.segment_count(), 2);
    assert_eq!(writer.num_docs(), 2);
    assert!(!dir.path().join("segment_2.tmp").exists());

    fs::remove_dir(dir.path().join("segment_2")).unwrap();
    writer.force_merge(1).unwrap();
    assert_eq!(writer.segment_count(), 1);
    let reader = writer.reader().unwrap();
    assert_eq!(reader.segments()[0].id().0, 3);
    assert_eq!(reader.document(1).unwrap().get_text("body"), Some("q"));
    assert!(reader.segments()[0].postings(&Term::new("body", "p")).unwrap().is_some());
    assert_eq!(reader.resolve(1), Some((0, DocId(1))));
}
