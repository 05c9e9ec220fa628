//! Content-addressed upload stores for SOP and regulatory documents.
//!
//! Uploads are stored as `<hash>__<original-name>`, so the same bytes are
//! stored once no matter how many times or under how many names they are
//! uploaded, and the same name with different bytes stores independently.
//! Per-item failures (empty body, oversized body) are reported per upload
//! and never abort the rest of a batch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::document::hash_bytes;

/// Which of the two upload stores a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Sop,
    Regulatory,
}

impl FileKind {
    pub fn dir(self, config: &Config) -> PathBuf {
        match self {
            FileKind::Sop => config.storage.sop_dir(),
            FileKind::Regulatory => config.storage.regulatory_dir(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Sop => "sop",
            FileKind::Regulatory => "regulatory",
        }
    }
}

/// Outcome of storing one uploaded file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Stored { filename: String, path: String },
    Duplicate { filename: String, path: String },
    Rejected { filename: String, reason: String },
}

/// One stored file as returned by listings.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub mtime: f64,
}

/// Store one upload. A body hashing to an already-stored document reports
/// the existing path as a duplicate rather than writing anything.
pub fn store_upload(
    config: &Config,
    kind: FileKind,
    filename: &str,
    bytes: &[u8],
) -> Result<UploadOutcome> {
    let filename = sanitize_name(filename);

    if bytes.is_empty() {
        return Ok(UploadOutcome::Rejected {
            filename,
            reason: "empty upload".to_string(),
        });
    }
    if bytes.len() > config.server.max_upload_bytes {
        return Ok(UploadOutcome::Rejected {
            filename,
            reason: format!(
                "upload exceeds {} byte limit",
                config.server.max_upload_bytes
            ),
        });
    }

    let dir = kind.dir(config);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let hash = hash_bytes(bytes);
    if let Some(existing) = find_by_hash(&dir, &hash)? {
        return Ok(UploadOutcome::Duplicate {
            filename,
            path: existing.display().to_string(),
        });
    }

    let path = dir.join(format!("{}__{}", hash, filename));
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(UploadOutcome::Stored {
        filename,
        path: path.display().to_string(),
    })
}

/// All stored files of one kind, with the hash prefix stripped from the
/// reported name.
pub fn list_files(config: &Config, kind: FileKind) -> Result<Vec<StoredFile>> {
    let dir = kind.dir(config);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let meta = entry.metadata()?;
        let stored_name = entry.file_name().to_string_lossy().into_owned();
        let name = stored_name
            .split_once("__")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or(stored_name);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        files.push(StoredFile {
            name,
            path: path.display().to_string(),
            size: meta.len(),
            mtime,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn find_by_hash(dir: &Path, hash: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{}__", hash);
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_name(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(root: &std::path::Path) -> Config {
        let mut cfg = Config::minimal();
        cfg.storage.root = root.to_path_buf();
        cfg
    }

    #[test]
    fn stores_under_hash_prefixed_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());

        let outcome = store_upload(&cfg, FileKind::Sop, "sop_v1.txt", b"procedure body").unwrap();
        let path = match outcome {
            UploadOutcome::Stored { path, .. } => PathBuf::from(path),
            other => panic!("expected stored, got {:?}", other),
        };
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("__sop_v1.txt"));
        assert_eq!(name.split("__").next().unwrap().len(), 64);
    }

    #[test]
    fn identical_bytes_under_a_new_name_report_duplicate() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());

        let first = store_upload(&cfg, FileKind::Regulatory, "gmp.txt", b"rule body").unwrap();
        let first_path = match first {
            UploadOutcome::Stored { path, .. } => path,
            other => panic!("expected stored, got {:?}", other),
        };

        let second = store_upload(&cfg, FileKind::Regulatory, "renamed.txt", b"rule body").unwrap();
        match second {
            UploadOutcome::Duplicate { path, .. } => assert_eq!(path, first_path),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(list_files(&cfg, FileKind::Regulatory).unwrap().len(), 1);
    }

    #[test]
    fn same_name_different_bytes_stores_independently() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());

        store_upload(&cfg, FileKind::Sop, "sop.txt", b"version one").unwrap();
        store_upload(&cfg, FileKind::Sop, "sop.txt", b"version two").unwrap();

        let files = list_files(&cfg, FileKind::Sop).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.name == "sop.txt"));
    }

    #[test]
    fn empty_and_oversized_uploads_are_rejected_per_item() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cfg = cfg(tmp.path());
        cfg.server.max_upload_bytes = 8;

        match store_upload(&cfg, FileKind::Sop, "empty.txt", b"").unwrap() {
            UploadOutcome::Rejected { reason, .. } => assert!(reason.contains("empty")),
            other => panic!("expected rejection, got {:?}", other),
        }
        match store_upload(&cfg, FileKind::Sop, "big.txt", b"way past the cap").unwrap() {
            UploadOutcome::Rejected { reason, .. } => assert!(reason.contains("limit")),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(list_files(&cfg, FileKind::Sop).unwrap().is_empty());
    }

    #[test]
    fn listing_strips_the_hash_prefix() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());
        store_upload(&cfg, FileKind::Sop, "nested/path/sop.txt", b"body").unwrap();

        let files = list_files(&cfg, FileKind::Sop).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "sop.txt");
        assert_eq!(files[0].size, 4);
    }
}
