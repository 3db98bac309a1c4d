//! Index writer: buffering, deletes, flush, background merges and commits
//!
//! All mutations go through one mutex-protected `WriterState`. Merges read
//! immutable segment snapshots and run on worker threads outside the lock;
//! only installing a finished merge takes the lock again. A commit writes
//! live-docs files for segments with new deletes, then a new
//! `segments_<gen>` manifest, and only then updates in-memory state.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::analysis::Analyzer;
use crate::config::{IndexWriterConfig, OpenMode};
use crate::error::{LucernaError, Result};
use crate::models::Document;
use crate::segment::{
    self, validate_document, DocId, DocMap, DocumentsBuffer, LiveDocs, ManifestHolder,
    MergeCandidate, MergeEngine, MergeScheduler, PostingsFormat, SegmentCommitInfo,
    SegmentFiles, SegmentId, SegmentManifest, SegmentReader, SegmentStore, SegmentWriter, Term,
    TieredMergePolicy, WriteLock,
};

use super::reader::IndexReader;

/// Foreground state of the writer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterStatus {
    /// Opened, nothing done yet
    Open,
    Adding,
    Deleting,
    /// Buffered documents were written as a segment
    Flushing,
    /// Last operation was a successful commit
    Committed,
    /// Closed or rolled back; every operation fails with `AlreadyClosed`
    Closed,
}

/// A segment owned by the writer
struct WriterSegment {
    reader: SegmentReader,
    files: Arc<SegmentFiles>,
    /// Newest live-docs generation on disk
    disk_del_gen: u64,
    /// In-memory deletes not yet written to disk
    dirty: bool,
}

impl WriterSegment {
    fn new(reader: SegmentReader, files: Arc<SegmentFiles>, disk_del_gen: u64) -> Self {
        Self {
            reader,
            files,
            disk_del_gen,
            dirty: false,
        }
    }

    fn id(&self) -> SegmentId {
        self.reader.id()
    }

    /// Publish a new live-docs version; older reader snapshots keep theirs
    fn apply_live_docs(&mut self, live_docs: LiveDocs) {
        self.reader = self
            .reader
            .with_live_docs(Arc::new(live_docs), self.disk_del_gen + 1);
        self.dirty = true;
    }

    /// Delete the live postings of `term`; returns how many docs were deleted
    fn delete_term(&mut self, term: &Term) -> Result<u32> {
        let mut docs = Vec::new();
        if let Some(mut postings) = self.reader.postings(term)? {
            while let Some(doc) = postings.next_doc()? {
                if !self.reader.is_deleted(doc) {
                    docs.push(doc);
                }
            }
        }
        if docs.is_empty() {
            return Ok(0);
        }
        let mut live = self.reader.live_docs().clone();
        for doc in &docs {
            live.delete(*doc);
        }
        self.apply_live_docs(live);
        Ok(docs.len() as u32)
    }
}

/// A merge handed to a worker thread
struct MergeTask {
    output_id: SegmentId,
    /// Input snapshots in index order, taken when the merge was scheduled
    inputs: Vec<SegmentReader>,
    cancel: Arc<AtomicBool>,
}

/// A merge whose output is on disk but not yet part of the segment set
struct CompletedMerge {
    /// `None` when every input document was deleted
    segment: Option<(SegmentReader, Arc<SegmentFiles>)>,
    doc_maps: Vec<DocMap>,
}

struct WriterState {
    status: WriterStatus,
    buffer: DocumentsBuffer,
    segments: Vec<WriterSegment>,
    next_segment_id: SegmentId,
    /// Generation of the last commit
    generation: u64,
    committed_ids: HashSet<SegmentId>,
    /// Segments dropped from the set that the last commit still references
    files_to_release: Vec<Arc<SegmentFiles>>,
    scheduler: MergeScheduler,
    merge_tx: Option<Sender<MergeTask>>,
    merge_errors: Vec<String>,
    /// Anything to commit since the last commit
    changed: bool,
}

impl WriterState {
    fn ensure_open(&self) -> Result<()> {
        if self.status == WriterStatus::Closed {
            Err(LucernaError::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    fn position(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id() == id)
    }

    /// Drop a segment from the set; its files go once no commit needs them
    fn release(&mut self, segment: WriterSegment) {
        if self.committed_ids.contains(&segment.id()) {
            self.files_to_release.push(segment.files);
        } else {
            segment.files.mark_obsolete();
        }
    }
}

struct WriterInner {
    store: SegmentStore,
    config: IndexWriterConfig,
    format: PostingsFormat,
    analyzer: Arc<dyn Analyzer>,
    policy: TieredMergePolicy,
    state: Mutex<WriterState>,
    merges_done: Condvar,
    committed: ManifestHolder,
    lock: Mutex<Option<WriteLock>>,
}

/// Single writer over an index directory
pub struct IndexWriter {
    inner: Arc<WriterInner>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl IndexWriter {
    /// Open a writer on `path`, taking the directory's write lock
    pub fn open<P: AsRef<Path>>(path: P, config: IndexWriterConfig) -> Result<Self> {
        let analyzer = config.analyzer.build();
        Self::open_with_analyzer(path, config, analyzer)
    }

    /// Open a writer that tokenizes text fields with `analyzer`.
    ///
    /// `config.analyzer` is ignored.
    pub fn open_with_analyzer<P: AsRef<Path>>(
        path: P,
        config: IndexWriterConfig,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self> {
        config.validate()?;
        let format = segment::lookup(&config.postings_format)?;
        let store = SegmentStore::open(path.as_ref())?;
        let lock = store.acquire_lock()?;

        let latest = store.load_latest_manifest()?;
        let mut segments = Vec::new();
        let mut files_to_release = Vec::new();
        let (base, changed) = match (config.open_mode, latest) {
            (OpenMode::Append, None) => {
                return Err(LucernaError::IndexNotFound(store.path().to_path_buf()))
            }
            (OpenMode::Create, Some(previous)) => {
                store.cleanup_orphans(&previous)?;
                for info in previous.iter() {
                    files_to_release.push(Arc::new(SegmentFiles::new(store.segment_dir(info.id()))));
                }
                (previous, true)
            }
            (_, Some(previous)) => {
                store.cleanup_orphans(&previous)?;
                for info in previous.iter() {
                    let files = Arc::new(SegmentFiles::new(store.segment_dir(info.id())));
                    let reader = store.read_segment(info, Some(Arc::clone(&files)))?;
                    segments.push(WriterSegment::new(reader, files, info.del_gen));
                }
                (previous, false)
            }
            (_, None) => {
                let empty = SegmentManifest::new();
                store.cleanup_orphans(&empty)?;
                (empty, true)
            }
        };

        // segments of a replaced commit are released by the first new commit
        let committed_ids: HashSet<SegmentId> = segments.iter().map(|s| s.id()).collect();

        info!(
            "Opened index writer on {} at generation {} with {} segments",
            store.path().display(),
            base.generation,
            segments.len()
        );

        let (merge_tx, merge_rx) = channel::unbounded();
        let inner = Arc::new(WriterInner {
            analyzer,
            policy: TieredMergePolicy::new(config.merge_policy.clone()),
            state: Mutex::new(WriterState {
                status: WriterStatus::Open,
                buffer: DocumentsBuffer::new(),
                segments,
                next_segment_id: base.next_segment_id,
                generation: base.generation,
                committed_ids,
                files_to_release,
                scheduler: MergeScheduler::new(config.max_concurrent_merges),
                merge_tx: Some(merge_tx),
                merge_errors: Vec::new(),
                changed,
            }),
            merges_done: Condvar::new(),
            committed: ManifestHolder::new(base),
            lock: Mutex::new(Some(lock)),
            store,
            format,
            config,
        });

        let mut workers = Vec::with_capacity(inner.config.max_concurrent_merges);
        for i in 0..inner.config.max_concurrent_merges {
            let worker_inner = Arc::clone(&inner);
            let rx = merge_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("lucerna-merge-{}", i))
                .spawn(move || merge_worker(worker_inner, rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    inner.state.lock().merge_tx = None;
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
        })
    }

    /// Buffer a document; flushes automatically when the buffer is full
    pub fn add_document(&self, doc: &Document) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        state.buffer.add_document(doc, self.inner.analyzer.as_ref())?;
        state.status = WriterStatus::Adding;
        state.changed = true;
        self.inner.maybe_auto_flush(&mut state)
    }

    /// Delete every document containing `term`, buffered ones included.
    ///
    /// Returns the number of documents that were live before the call.
    pub fn delete_documents(&self, term: &Term) -> Result<u32> {
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        let deleted = self.inner.delete_locked(&mut state, term)?;
        state.status = WriterStatus::Deleting;
        debug!(term = %term, deleted, "deleted documents");
        Ok(deleted)
    }

    /// Replace the documents matching `term` with `doc` in one step
    pub fn update_document(&self, term: &Term, doc: &Document) -> Result<u32> {
        validate_document(doc)?;
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        let deleted = self.inner.delete_locked(&mut state, term)?;
        state.buffer.add_document(doc, self.inner.analyzer.as_ref())?;
        state.status = WriterStatus::Adding;
        state.changed = true;
        self.inner.maybe_auto_flush(&mut state)?;
        Ok(deleted)
    }

    /// Write buffered documents as a new segment (not yet committed)
    pub fn flush(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        if self.inner.flush_locked(&mut state)? && self.inner.config.merge_on_flush {
            self.inner.schedule_merges(&mut state);
        }
        Ok(())
    }

    /// Flush and durably publish the current segment set; returns its generation
    pub fn commit(&self) -> Result<u64> {
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        self.inner.commit_locked(&mut state)
    }

    /// Point-in-time reader over everything added so far, committed or not
    pub fn reader(&self) -> Result<IndexReader> {
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        if self.inner.flush_locked(&mut state)? && self.inner.config.merge_on_flush {
            self.inner.schedule_merges(&mut state);
        }
        let segments = state.segments.iter().map(|s| s.reader.clone()).collect();
        Ok(IndexReader::from_segments(segments, state.generation))
    }

    /// Ask the merge policy for work and hand it to the merge threads
    pub fn maybe_merge(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_open()?;
        self.inner.schedule_merges(&mut state);
        Ok(())
    }

    /// Merge on the calling thread until at most `max_segments` remain
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        if max_segments == 0 {
            return Err(LucernaError::InvalidArgument(
                "max_segments must be at least 1".to_string(),
            ));
        }
        loop {
            self.inner.wait_idle();
            let task = {
                let mut state = self.inner.state.lock();
                state.ensure_open()?;
                self.inner.flush_locked(&mut state)?;
                if state.scheduler.has_running() {
                    continue;
                }
                let readers: Vec<SegmentReader> =
                    state.segments.iter().map(|s| s.reader.clone()).collect();
                let Some(candidate) = self.inner.policy.find_forced_merge(&readers, max_segments)
                else {
                    return Ok(());
                };
                match self.inner.start_merge(&mut state, &candidate) {
                    Some(task) => task,
                    None => continue,
                }
            };
            self.inner.run_merge(task, false)?;
        }
    }

    /// Block until no merge is running; reports failed background merges
    pub fn wait_for_merges(&self) -> Result<()> {
        self.inner.wait_idle();
        let errors = std::mem::take(&mut self.inner.state.lock().merge_errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LucernaError::MergeFailed(errors.join("; ")))
        }
    }

    /// Discard everything since the last commit and close the writer
    pub fn rollback(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.status == WriterStatus::Closed {
                return Ok(());
            }
            state.scheduler.cancel_all();
            state.merge_tx = None;
            state.status = WriterStatus::Closed;
            state.buffer.clear();
            for segment in std::mem::take(&mut state.segments) {
                if !state.committed_ids.contains(&segment.id()) {
                    segment.files.mark_obsolete();
                }
            }
            state.files_to_release.clear();
            info!("Rolled back index writer to generation {}", state.generation);
        }
        self.shutdown();
        Ok(())
    }

    /// Wait for merges, commit if configured to, and release the write lock.
    ///
    /// A failed commit leaves the writer open so the caller can retry or roll back.
    pub fn close(&self) -> Result<()> {
        if self.inner.state.lock().status == WriterStatus::Closed {
            return Ok(());
        }
        if !self.inner.config.commit_on_close {
            return self.rollback();
        }

        self.inner.wait_idle();
        {
            let mut state = self.inner.state.lock();
            state.ensure_open()?;
            self.inner.commit_locked(&mut state)?;
            state.scheduler.cancel_all();
            state.merge_tx = None;
            state.status = WriterStatus::Closed;
            info!("Closed index writer at generation {}", state.generation);
        }
        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                warn!("Merge worker panicked");
            }
        }
        self.inner.lock.lock().take();
    }

    /// Live documents across segments and the buffer
    pub fn num_docs(&self) -> u64 {
        let state = self.inner.state.lock();
        state
            .segments
            .iter()
            .map(|s| s.reader.live_doc_count() as u64)
            .sum::<u64>()
            + state.buffer.live_doc_count() as u64
    }

    /// Documents across segments and the buffer, deleted ones included
    pub fn max_doc(&self) -> u64 {
        let state = self.inner.state.lock();
        state
            .segments
            .iter()
            .map(|s| s.reader.max_doc() as u64)
            .sum::<u64>()
            + state.buffer.doc_count() as u64
    }

    pub fn segment_count(&self) -> usize {
        self.inner.state.lock().segments.len()
    }

    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.inner.state.lock().segments.iter().map(|s| s.id()).collect()
    }

    pub fn buffered_docs(&self) -> u32 {
        self.inner.state.lock().buffer.doc_count()
    }

    pub fn status(&self) -> WriterStatus {
        self.inner.state.lock().status
    }

    /// Generation of the last commit
    pub fn generation(&self) -> u64 {
        self.inner.committed.generation()
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.inner.state.lock().changed
    }

    pub fn last_commit(&self) -> Arc<SegmentManifest> {
        self.inner.committed.load()
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.inner.config
    }

    pub fn path(&self) -> &Path {
        self.inner.store.path()
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if let Err(e) = self.rollback() {
            warn!("Rollback on drop failed: {}", e);
        }
    }
}

impl WriterInner {
    fn maybe_auto_flush(&self, state: &mut WriterState) -> Result<()> {
        if state
            .buffer
            .should_flush(self.config.max_buffered_docs, self.config.max_buffered_bytes)
            && self.flush_locked(state)?
            && self.config.merge_on_flush
        {
            self.schedule_merges(state);
        }
        Ok(())
    }

    fn delete_locked(&self, state: &mut WriterState, term: &Term) -> Result<u32> {
        let mut deleted = state.buffer.delete_term(term);
        for segment in state.segments.iter_mut() {
            deleted += segment.delete_term(term)?;
        }
        if deleted > 0 {
            state.changed = true;
        }
        Ok(deleted)
    }

    /// Turn the buffer into a segment; returns whether anything was flushed.
    ///
    /// On failure the buffer and the segment id counter are left unchanged.
    fn flush_locked(&self, state: &mut WriterState) -> Result<bool> {
        if state.buffer.is_empty() {
            return Ok(false);
        }
        let previous = state.status;
        state.status = WriterStatus::Flushing;
        let id = state.next_segment_id;

        match self.write_buffer(&state.buffer, id) {
            Ok((reader, files)) => {
                info!(
                    "Flushed {} with {} docs ({} deleted)",
                    id,
                    reader.max_doc(),
                    reader.deleted_doc_count()
                );
                state.next_segment_id = id.next();
                state.buffer.clear();
                state.segments.push(WriterSegment::new(reader, files, 0));
                state.changed = true;
                Ok(true)
            }
            Err(e) => {
                warn!("Flush of {} failed: {}", id, e);
                state.status = previous;
                Err(e)
            }
        }
    }

    fn write_buffer(
        &self,
        buffer: &DocumentsBuffer,
        id: SegmentId,
    ) -> Result<(SegmentReader, Arc<SegmentFiles>)> {
        let data = SegmentWriter::new(id, self.format).write_from_buffer(buffer)?;
        let files = self.store.write_segment(&data)?;
        match SegmentReader::from_data(data, Some(Arc::clone(&files))) {
            Ok(reader) => Ok((reader, files)),
            Err(e) => {
                files.mark_obsolete();
                Err(e)
            }
        }
    }

    fn commit_locked(&self, state: &mut WriterState) -> Result<u64> {
        self.flush_locked(state)?;
        if !state.changed && state.generation > 0 {
            state.status = WriterStatus::Committed;
            return Ok(state.generation);
        }

        let mut entries = Vec::with_capacity(state.segments.len());
        let mut written: Vec<(usize, u64)> = Vec::new();
        let mut dropped: Vec<usize> = Vec::new();
        for (idx, segment) in state.segments.iter().enumerate() {
            let id = segment.id();
            if segment.reader.live_doc_count() == 0 && !state.scheduler.is_merging(id) {
                dropped.push(idx);
                continue;
            }
            let del_gen = if segment.dirty {
                let del_gen = segment.disk_del_gen + 1;
                self.store
                    .write_live_docs(id, del_gen, segment.reader.live_docs())?;
                written.push((idx, del_gen));
                del_gen
            } else {
                segment.disk_del_gen
            };
            entries.push(SegmentCommitInfo {
                meta: segment.reader.meta().clone(),
                del_gen,
                live_doc_count: segment.reader.live_doc_count(),
            });
        }

        let manifest = self
            .committed
            .load()
            .next_generation(state.next_segment_id, entries);
        self.store.write_manifest(&manifest)?;

        // the commit is durable; from here on only bookkeeping and cleanup
        for (idx, del_gen) in written {
            let segment = &mut state.segments[idx];
            let stale = segment.disk_del_gen;
            segment.disk_del_gen = del_gen;
            segment.dirty = false;
            if let Err(e) = self.store.remove_live_docs(segment.id(), stale) {
                warn!("Failed to remove stale live docs of {}: {}", segment.id(), e);
            }
        }
        for idx in dropped.into_iter().rev() {
            let segment = state.segments.remove(idx);
            debug!(segment = %segment.id(), "dropped fully deleted segment");
            state.release(segment);
        }
        for files in state.files_to_release.drain(..) {
            files.mark_obsolete();
        }
        if let Err(e) = self.store.prune_manifests(manifest.generation) {
            warn!("Failed to prune old manifests: {}", e);
        }

        state.committed_ids = manifest.iter().map(|s| s.id()).collect();
        state.generation = manifest.generation;
        state.changed = false;
        state.status = WriterStatus::Committed;
        info!(
            "Committed generation {} with {} segments ({} live docs)",
            manifest.generation,
            manifest.segment_count(),
            manifest.total_live_doc_count()
        );
        let generation = manifest.generation;
        self.committed.store(manifest);
        Ok(generation)
    }

    fn schedule_merges(&self, state: &mut WriterState) {
        if state.status == WriterStatus::Closed || state.merge_tx.is_none() {
            return;
        }
        while state.scheduler.has_capacity() {
            let eligible: Vec<SegmentReader> = state
                .segments
                .iter()
                .filter(|s| !state.scheduler.is_merging(s.id()))
                .map(|s| s.reader.clone())
                .collect();
            let Some(candidate) = self.policy.find_merges(&eligible).into_iter().next() else {
                break;
            };
            let Some(task) = self.start_merge(state, &candidate) else {
                break;
            };
            let output_id = task.output_id;
            let sent = state
                .merge_tx
                .as_ref()
                .is_some_and(|tx| tx.send(task).is_ok());
            if !sent {
                state.scheduler.finish(output_id);
                break;
            }
            debug!(segment = %output_id, reason = ?candidate.reason, "scheduled merge");
        }
    }

    fn start_merge(&self, state: &mut WriterState, candidate: &MergeCandidate) -> Option<MergeTask> {
        let inputs: Vec<SegmentReader> = candidate
            .segment_ids
            .iter()
            .filter_map(|id| state.position(*id))
            .map(|pos| state.segments[pos].reader.clone())
            .collect();
        if inputs.len() != candidate.segment_ids.len() {
            return None;
        }
        let output_id = state.next_segment_id;
        let cancel = state.scheduler.start(candidate, output_id)?;
        state.allocate_segment_id();
        Some(MergeTask {
            output_id,
            inputs,
            cancel,
        })
    }

    /// Run a merge and install its output; `background` merges record their
    /// errors for `wait_for_merges` and schedule follow-up merges.
    fn run_merge(&self, task: MergeTask, background: bool) -> Result<()> {
        let result = self.execute_merge(&task);

        let mut state = self.state.lock();
        state.scheduler.finish(task.output_id);
        let outcome = match result {
            Ok(completed) => {
                self.install_merge(&mut state, &task, completed);
                Ok(())
            }
            Err(LucernaError::MergeAborted) => {
                info!("Merge into {} aborted", task.output_id);
                Err(LucernaError::MergeAborted)
            }
            Err(e) => {
                warn!("Merge into {} failed: {}", task.output_id, e);
                if background {
                    state.merge_errors.push(format!("{}: {}", task.output_id, e));
                }
                Err(e)
            }
        };
        if background {
            self.schedule_merges(&mut state);
        }
        drop(state);
        self.merges_done.notify_all();
        outcome
    }

    fn execute_merge(&self, task: &MergeTask) -> Result<CompletedMerge> {
        let output = MergeEngine::new(self.format).merge(task.output_id, &task.inputs, &task.cancel)?;
        if task.cancel.load(Ordering::Acquire) {
            return Err(LucernaError::MergeAborted);
        }
        if output.data.meta.max_doc == 0 {
            return Ok(CompletedMerge {
                segment: None,
                doc_maps: output.doc_maps,
            });
        }

        let files = self.store.write_segment(&output.data)?;
        match SegmentReader::from_data(output.data, Some(Arc::clone(&files))) {
            Ok(reader) => Ok(CompletedMerge {
                segment: Some((reader, files)),
                doc_maps: output.doc_maps,
            }),
            Err(e) => {
                files.mark_obsolete();
                Err(e)
            }
        }
    }

    /// Swap the merge inputs for the merged segment, carrying over deletes
    /// made to the inputs while the merge was running.
    fn install_merge(&self, state: &mut WriterState, task: &MergeTask, completed: CompletedMerge) {
        let positions: Option<Vec<usize>> =
            task.inputs.iter().map(|input| state.position(input.id())).collect();
        let positions = match positions {
            Some(positions) if state.status != WriterStatus::Closed => positions,
            _ => {
                if let Some((_, files)) = completed.segment {
                    files.mark_obsolete();
                }
                debug!(segment = %task.output_id, "discarded merge output");
                return;
            }
        };

        let mut merged = completed
            .segment
            .map(|(reader, files)| WriterSegment::new(reader, files, 0));
        if let Some(merged) = merged.as_mut() {
            let mut carried: Option<LiveDocs> = None;
            for ((snapshot, map), &pos) in task.inputs.iter().zip(&completed.doc_maps).zip(&positions) {
                for doc in state.segments[pos].reader.live_docs().deleted().iter() {
                    let doc = DocId(doc);
                    if snapshot.is_deleted(doc) {
                        continue;
                    }
                    if let Some(new_doc) = map.get(doc) {
                        carried
                            .get_or_insert_with(|| merged.reader.live_docs().clone())
                            .delete(new_doc);
                    }
                }
            }
            if let Some(live) = carried {
                debug!(
                    segment = %merged.id(),
                    deleted = live.deleted_count(),
                    "carried deletes over to merged segment"
                );
                merged.apply_live_docs(live);
            }
        }

        let first = positions.iter().copied().min().unwrap_or(0);
        let mut descending = positions;
        descending.sort_unstable_by(|a, b| b.cmp(a));
        for pos in descending {
            let input = state.segments.remove(pos);
            state.release(input);
        }
        if let Some(merged) = merged {
            info!(
                "Installed merged {} with {} live docs",
                merged.id(),
                merged.reader.live_doc_count()
            );
            state.segments.insert(first, merged);
        }
        state.changed = true;
    }

    /// Block until no merge is running
    fn wait_idle(&self) {
        let mut state = self.state.lock();
        while state.scheduler.has_running() {
            self.merges_done.wait(&mut state);
        }
    }
}

fn merge_worker(inner: Arc<WriterInner>, rx: Receiver<MergeTask>) {
    while let Ok(task) = rx.recv() {
        // failures are recorded for wait_for_merges
        let _ = inner.run_merge(task, true);
    }
}
