use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::AnalyzerConfig;
use crate::error::{LucernaError, Result};
use crate::segment::{self, MergePolicyConfig, DEFAULT_POSTINGS_FORMAT};

/// How `IndexWriter::open` treats an existing index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Start an empty index; the previous commit is replaced on first commit
    Create,
    /// Open the last commit; fails if there is none
    Append,
    /// Append when a commit exists, create otherwise
    CreateOrAppend,
}

/// Index writer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWriterConfig {
    pub open_mode: OpenMode,
    /// Buffered documents that trigger an automatic flush
    pub max_buffered_docs: usize,
    /// Approximate buffer size in bytes that triggers an automatic flush
    pub max_buffered_bytes: usize,
    /// Registry name of the postings format for new segments
    pub postings_format: String,
    pub merge_policy: MergePolicyConfig,
    /// Background merge threads
    pub max_concurrent_merges: usize,
    /// Ask the merge policy for work after every flush
    pub merge_on_flush: bool,
    /// Commit pending changes in `close`; otherwise they are discarded
    pub commit_on_close: bool,
    pub analyzer: AnalyzerConfig,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        Self {
            open_mode: OpenMode::CreateOrAppend,
            max_buffered_docs: 10_000,
            max_buffered_bytes: 16 * 1024 * 1024,
            postings_format: DEFAULT_POSTINGS_FORMAT.to_string(),
            merge_policy: MergePolicyConfig::default(),
            max_concurrent_merges: 2,
            merge_on_flush: true,
            commit_on_close: true,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl IndexWriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LucernaError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LucernaError::Config(format!("cannot serialize configuration: {}", e)))
    }

    /// Reject values the writer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_buffered_docs == 0 {
            return Err(LucernaError::Config("max_buffered_docs must be at least 1".into()));
        }
        if self.max_buffered_bytes == 0 {
            return Err(LucernaError::Config("max_buffered_bytes must be at least 1".into()));
        }
        if self.max_concurrent_merges == 0 {
            return Err(LucernaError::Config(
                "max_concurrent_merges must be at least 1".into(),
            ));
        }
        segment::lookup(&self.postings_format)
            .map_err(|e| LucernaError::Config(e.to_string()))?;

        let policy = &self.merge_policy;
        if policy.segments_per_tier < 2 {
            return Err(LucernaError::Config("segments_per_tier must be at least 2".into()));
        }
        if policy.min_merge_count < 2 || policy.min_merge_count > policy.max_merge_count {
            return Err(LucernaError::Config(format!(
                "merge counts must satisfy 2 <= min ({}) <= max ({})",
                policy.min_merge_count, policy.max_merge_count
            )));
        }
        if !(0.0..=1.0).contains(&policy.delete_ratio_threshold) {
            return Err(LucernaError::Config(
                "delete_ratio_threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.analyzer.min_token_length > self.analyzer.max_token_length {
            return Err(LucernaError::Config(
                "analyzer min_token_length exceeds max_token_length".into(),
            ));
        }
        Ok(())
    }

    pub fn with_open_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = mode;
        self
    }

    pub fn with_max_buffered_docs(mut self, docs: usize) -> Self {
        self.max_buffered_docs = docs;
        self
    }

    pub fn with_max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.max_buffered_bytes = bytes;
        self
    }

    pub fn with_postings_format(mut self, name: impl Into<String>) -> Self {
        self.postings_format = name.into();
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicyConfig) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_max_concurrent_merges(mut self, merges: usize) -> Self {
        self.max_concurrent_merges = merges;
        self
    }

    pub fn with_merge_on_flush(mut self, enabled: bool) -> Self {
        self.merge_on_flush = enabled;
        self
    }

    pub fn with_commit_on_close(mut self, enabled: bool) -> Self {
        self.commit_on_close = enabled;
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Apply a workload profile to this configuration
    pub fn with_profile(mut self, profile: IndexingProfile) -> Self {
        profile.apply_to(&mut self);
        self
    }
}

/// Configuration presets for different workloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingProfile {
    /// Small buffers so new documents reach segments quickly
    LowLatency,
    Balanced,
    /// Large buffers and wide merges for bulk loads
    Bulk,
}

impl IndexingProfile {
    pub fn max_buffered_docs(&self) -> usize {
        match self {
            IndexingProfile::LowLatency => 1_000,
            IndexingProfile::Balanced => 10_000,
            IndexingProfile::Bulk => 100_000,
        }
    }

    pub fn max_buffered_bytes(&self) -> usize {
        match self {
            IndexingProfile::LowLatency => 4 * 1024 * 1024,
            IndexingProfile::Balanced => 16 * 1024 * 1024,
            IndexingProfile::Bulk => 256 * 1024 * 1024,
        }
    }

    pub fn segments_per_tier(&self) -> usize {
        match self {
            IndexingProfile::LowLatency => 5,
            IndexingProfile::Balanced => 10,
            IndexingProfile::Bulk => 20,
        }
    }

    pub fn apply_to(&self, config: &mut IndexWriterConfig) {
        config.max_buffered_docs = self.max_buffered_docs();
        config.max_buffered_bytes = self.max_buffered_bytes();
        config.merge_policy.segments_per_tier = self.segments_per_tier();
        config.merge_policy.max_merge_count = config
            .merge_policy
            .max_merge_count
            .max(self.segments_per_tier());
    }
}
