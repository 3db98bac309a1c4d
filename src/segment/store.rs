//! On-disk layout of an index directory
//!
//! ```text
//! <index>/
//!   write.lock
//!   segments_<gen>
//!   segment_<id>/
//!     postings.bin  terms.fst  terms.info  stored.bin
//!     live_<delgen>.bin
//! ```
//!
//! Everything is written under a temporary name, fsynced and renamed into
//! place. Segment files are never edited once renamed; deletions produce a
//! new `live_<delgen>.bin` instead.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{LucernaError, Result};

use super::live_docs::LiveDocs;
use super::manifest::{SegmentCommitInfo, SegmentManifest};
use super::reader::SegmentReader;
use super::term_dict::TermDictionary;
use super::types::SegmentId;
use super::writer::SegmentData;

const POSTINGS_FILE: &str = "postings.bin";
const TERMS_FST_FILE: &str = "terms.fst";
const TERMS_INFO_FILE: &str = "terms.info";
const STORED_FILE: &str = "stored.bin";
const LOCK_FILE: &str = "write.lock";
const TMP_SUFFIX: &str = ".tmp";

/// Persistent storage for segment files and commit manifests
#[derive(Clone, Debug)]
pub struct SegmentStore {
    base_dir: PathBuf,
}

impl SegmentStore {
    /// Open (creating if needed) an index directory
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    /// Open an existing directory without creating it
    pub fn open_existing<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.is_dir() {
            return Err(LucernaError::IndexNotFound(base_dir));
        }
        Ok(Self { base_dir })
    }

    pub fn path(&self) -> &Path {
        &self.base_dir
    }

    pub fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    /// Persist a complete segment atomically.
    ///
    /// Fails without side effects if the segment directory already exists.
    pub fn write_segment(&self, data: &SegmentData) -> Result<Arc<SegmentFiles>> {
        let final_dir = self.segment_dir(data.meta.id);
        if final_dir.exists() {
            return Err(LucernaError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", final_dir.display()),
            )));
        }

        let tmp_dir = self
            .base_dir
            .join(format!("{}{}", data.meta.id, TMP_SUFFIX));
        match self.write_segment_files(data, &tmp_dir, &final_dir) {
            Ok(()) => {
                debug!(segment = %data.meta.id, bytes = data.meta.size_bytes, "segment persisted");
                Ok(Arc::new(SegmentFiles::new(final_dir)))
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&tmp_dir);
                Err(e)
            }
        }
    }

    fn write_segment_files(
        &self,
        data: &SegmentData,
        tmp_dir: &Path,
        final_dir: &Path,
    ) -> Result<()> {
        if tmp_dir.exists() {
            fs::remove_dir_all(tmp_dir)?;
        }
        fs::create_dir(tmp_dir)?;

        write_file_synced(&tmp_dir.join(POSTINGS_FILE), &data.postings)?;
        write_file_synced(&tmp_dir.join(TERMS_FST_FILE), &data.terms_fst)?;
        write_file_synced(&tmp_dir.join(TERMS_INFO_FILE), &data.term_infos)?;
        write_file_synced(&tmp_dir.join(STORED_FILE), &data.stored)?;
        write_file_synced(&tmp_dir.join(live_file_name(0)), &data.live_docs.serialize()?)?;
        sync_dir(tmp_dir)?;

        fs::rename(tmp_dir, final_dir)?;
        sync_dir(&self.base_dir)
    }

    /// Open a committed segment, verifying its checksum
    pub fn read_segment(
        &self,
        info: &SegmentCommitInfo,
        files: Option<Arc<SegmentFiles>>,
    ) -> Result<SegmentReader> {
        let dir = self.segment_dir(info.meta.id);
        let postings = fs::read(dir.join(POSTINGS_FILE))?;
        let terms_fst = fs::read(dir.join(TERMS_FST_FILE))?;
        let term_infos = fs::read(dir.join(TERMS_INFO_FILE))?;
        let stored = fs::read(dir.join(STORED_FILE))?;

        let checksum = SegmentData::compute_checksum(&postings, &terms_fst, &term_infos, &stored);
        if checksum != info.meta.checksum {
            return Err(LucernaError::Corrupt(format!(
                "{} checksum mismatch: expected {:08x}, found {:08x}",
                info.meta.id, info.meta.checksum, checksum
            )));
        }

        let live_docs = self.read_live_docs(info.meta.id, info.del_gen)?;
        if live_docs.live_count() != info.live_doc_count {
            return Err(LucernaError::Corrupt(format!(
                "{} has {} live docs, commit recorded {}",
                info.meta.id,
                live_docs.live_count(),
                info.live_doc_count
            )));
        }

        let terms = TermDictionary::from_bytes(terms_fst, &term_infos)?;
        SegmentReader::open(
            info.meta.clone(),
            terms,
            postings,
            stored,
            live_docs,
            info.del_gen,
            files,
        )
    }

    pub fn read_live_docs(&self, id: SegmentId, del_gen: u64) -> Result<LiveDocs> {
        let bytes = fs::read(self.segment_dir(id).join(live_file_name(del_gen)))?;
        LiveDocs::deserialize(&bytes)
    }

    /// Persist a new live-docs generation for a segment
    pub fn write_live_docs(&self, id: SegmentId, del_gen: u64, live_docs: &LiveDocs) -> Result<()> {
        let dir = self.segment_dir(id);
        let name = live_file_name(del_gen);
        let tmp = dir.join(format!("{}{}", name, TMP_SUFFIX));
        if let Err(e) = write_file_synced(&tmp, &live_docs.serialize()?) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, dir.join(name))?;
        sync_dir(&dir)
    }

    /// Remove a live-docs generation no commit refers to anymore
    pub fn remove_live_docs(&self, id: SegmentId, del_gen: u64) -> Result<()> {
        match fs::remove_file(self.segment_dir(id).join(live_file_name(del_gen))) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Durably publish a commit manifest
    pub fn write_manifest(&self, manifest: &SegmentManifest) -> Result<()> {
        let name = SegmentManifest::file_name(manifest.generation);
        let tmp = self.base_dir.join(format!("{}{}", name, TMP_SUFFIX));
        if let Err(e) = write_file_synced(&tmp, &manifest.encode()?) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, self.base_dir.join(name))?;
        sync_dir(&self.base_dir)
    }

    /// Generations of all manifest files present, highest first
    pub fn manifest_generations(&self) -> Result<Vec<u64>> {
        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if let Some(generation) = entry
                .file_name()
                .to_str()
                .and_then(SegmentManifest::parse_generation)
            {
                generations.push(generation);
            }
        }
        generations.sort_unstable_by(|a, b| b.cmp(a));
        Ok(generations)
    }

    /// Load the newest manifest whose checksum validates.
    ///
    /// Returns `None` when the directory holds no commit at all.
    pub fn load_latest_manifest(&self) -> Result<Option<SegmentManifest>> {
        let generations = self.manifest_generations()?;
        if generations.is_empty() {
            return Ok(None);
        }
        for generation in &generations {
            let path = self.base_dir.join(SegmentManifest::file_name(*generation));
            match fs::read(&path)
                .map_err(LucernaError::from)
                .and_then(|bytes| SegmentManifest::decode(&bytes))
            {
                Ok(manifest) if manifest.generation == *generation => return Ok(Some(manifest)),
                Ok(manifest) => warn!(
                    "Manifest {} claims generation {}, skipping",
                    path.display(),
                    manifest.generation
                ),
                Err(e) => warn!("Skipping unreadable manifest {}: {}", path.display(), e),
            }
        }
        Err(LucernaError::Corrupt(format!(
            "no valid commit among {} manifests in {}",
            generations.len(),
            self.base_dir.display()
        )))
    }

    /// Delete every manifest except `keep`
    pub fn prune_manifests(&self, keep: u64) -> Result<usize> {
        let mut removed = 0;
        for generation in self.manifest_generations()? {
            if generation != keep {
                fs::remove_file(self.base_dir.join(SegmentManifest::file_name(generation)))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove files the given commit does not reference: unreferenced segment
    /// directories, temp files, stale live-docs generations and other manifests.
    pub fn cleanup_orphans(&self, manifest: &SegmentManifest) -> Result<usize> {
        let referenced: HashSet<SegmentId> = manifest.iter().map(|s| s.id()).collect();
        let mut removed = 0;

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let path = entry.path();

            if name.ends_with(TMP_SUFFIX) {
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
                removed += 1;
            } else if let Some(id) = parse_segment_dir(name) {
                if !referenced.contains(&id) {
                    fs::remove_dir_all(&path)?;
                    removed += 1;
                }
            } else if let Some(generation) = SegmentManifest::parse_generation(name) {
                if generation != manifest.generation {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }

        for info in manifest.iter() {
            removed += self.cleanup_live_files(info.id(), Some(info.del_gen))?;
        }

        if removed > 0 {
            info!(removed, generation = manifest.generation, "removed orphaned index files");
        }
        Ok(removed)
    }

    /// Remove temp files and every live-docs generation except `keep`
    pub fn cleanup_live_files(&self, id: SegmentId, keep: Option<u64>) -> Result<usize> {
        let dir = self.segment_dir(id);
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let stale = name.ends_with(TMP_SUFFIX)
                || parse_live_generation(name).is_some_and(|generation| Some(generation) != keep);
            if stale {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Take the directory's write lock
    pub fn acquire_lock(&self) -> Result<WriteLock> {
        let path = self.base_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                file.sync_all()?;
                Ok(WriteLock { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(LucernaError::LockHeld(path)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.base_dir.join(LOCK_FILE).exists()
    }
}

/// Exclusive write access to an index directory; released on drop
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release write lock {}: {}", self.path.display(), e);
        }
    }
}

/// Reference-counted handle on a segment directory.
///
/// Once marked obsolete the directory is deleted when the last handle is
/// dropped, so readers still holding the segment keep working.
#[derive(Debug)]
pub struct SegmentFiles {
    dir: PathBuf,
    obsolete: AtomicBool,
}

impl SegmentFiles {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            obsolete: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }
}

impl Drop for SegmentFiles {
    fn drop(&mut self) {
        if self.is_obsolete() {
            match fs::remove_dir_all(&self.dir) {
                Ok(()) => debug!(dir = %self.dir.display(), "deleted obsolete segment"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete obsolete segment {}: {}", self.dir.display(), e),
            }
        }
    }
}

pub fn live_file_name(del_gen: u64) -> String {
    format!("live_{}.bin", del_gen)
}

fn parse_live_generation(name: &str) -> Option<u64> {
    name.strip_prefix("live_")?.strip_suffix(".bin")?.parse().ok()
}

fn parse_segment_dir(name: &str) -> Option<SegmentId> {
    name.strip_prefix("segment_")?.parse().ok().map(SegmentId)
}

fn write_file_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}
