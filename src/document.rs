//! Content identity and the content-addressed process cache.
//!
//! Document identity is the hex SHA-256 of the file's raw bytes: two uploads
//! with identical bytes are the same document regardless of name, and two
//! files with the same name but different bytes are distinct. The hash is a
//! fingerprint only, never a security claim.
//!
//! Derived results (extraction + chunking or clause extraction) are memoized
//! per file under `<stem>_<hash>.json` — the stem keeps cache files
//! inspectable while collisions are governed by the hash. An entry is served
//! only while the live file's (size, hash) still matches the stored
//! snapshot; any mismatch or corrupt record is a miss and forces
//! recomputation. Writes go through a temp file plus rename so a
//! still-processing document is never observable as processed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::chunk::split_text;
use crate::clause::extract_clauses;
use crate::config::Config;
use crate::extract::extract_text;
use crate::models::{FileMetadata, ProcessedRegulatory, ProcessedSop};

/// Hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content hash of a file, the document's stable identifier.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hash_bytes(&bytes))
}

/// Current (mtime, size, hash) snapshot of a file.
pub fn file_metadata(path: &Path) -> Result<FileMetadata> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat file: {}", path.display()))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(FileMetadata {
        mtime,
        size: meta.len(),
        hash: file_hash(path)?,
    })
}

/// Whether the live file differs from a stored snapshot. Only size and hash
/// gate validity; mtime is informational.
pub fn has_file_changed(current: &FileMetadata, stored: &FileMetadata) -> bool {
    current.size != stored.size || current.hash != stored.hash
}

/// Current Unix time with millisecond precision, as stored in records
/// and reports.
pub fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Access to the staleness snapshot stored inside a cached record.
pub trait CachedRecord {
    fn metadata(&self) -> &FileMetadata;
}

impl CachedRecord for ProcessedSop {
    fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }
}

impl CachedRecord for ProcessedRegulatory {
    fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }
}

/// Content-addressed cache of processed documents under one directory.
pub struct ProcessCache {
    dir: PathBuf,
}

impl ProcessCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Stable cache path for a source file: `<stem>_<hash>.json`.
    pub fn entry_path(&self, source: &Path, hash: &str) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.dir.join(format!("{}_{}.json", stem, hash))
    }

    /// Return the cached record iff it exists and its snapshot matches the
    /// live file exactly. Corrupt cache files are treated as misses.
    pub fn get<T: DeserializeOwned + CachedRecord>(
        &self,
        source: &Path,
        current: &FileMetadata,
    ) -> Option<T> {
        let path = self.entry_path(source, &current.hash);
        let raw = std::fs::read_to_string(&path).ok()?;
        let record: T = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry, recomputing");
                return None;
            }
        };
        if has_file_changed(current, record.metadata()) {
            return None;
        }
        Some(record)
    }

    /// Persist a processed record atomically (temp file, then rename).
    pub fn put<T: Serialize>(&self, source: &Path, hash: &str, record: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;
        let path = self.entry_path(source, hash);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to finalize cache file: {}", path.display()))?;
        Ok(())
    }
}

/// Process an SOP document: extract text and chunk it, memoized by content.
pub fn process_sop(config: &Config, path: &Path) -> Result<ProcessedSop> {
    let cache = ProcessCache::new(config.storage.processed_dir());
    let current = file_metadata(path)?;

    if let Some(cached) = cache.get::<ProcessedSop>(path, &current) {
        return Ok(cached);
    }

    let text = extract_text(path);
    let chunks = split_text(&text, config.chunking.chunk_size, config.chunking.overlap);

    let record = ProcessedSop {
        file_path: path.display().to_string(),
        file_name: file_name_of(path),
        text_length: text.len(),
        num_chunks: chunks.len(),
        text,
        chunks,
        processed_at: now_epoch(),
        metadata: current,
    };

    cache.put(path, &record.metadata.hash, &record)?;
    Ok(record)
}

/// Process a regulatory document: extract text and pull candidate clauses,
/// memoized by content.
pub fn process_regulatory(config: &Config, path: &Path) -> Result<ProcessedRegulatory> {
    let cache = ProcessCache::new(config.storage.processed_dir());
    let current = file_metadata(path)?;

    if let Some(cached) = cache.get::<ProcessedRegulatory>(path, &current) {
        return Ok(cached);
    }

    let text = extract_text(path);
    let clauses = extract_clauses(&text);

    let record = ProcessedRegulatory {
        file_path: path.display().to_string(),
        file_name: file_name_of(path),
        text_length: text.len(),
        num_clauses: clauses.len(),
        clauses,
        processed_at: now_epoch(),
        metadata: current,
    };

    cache.put(path, &record.metadata.hash, &record)?;
    Ok(record)
}
