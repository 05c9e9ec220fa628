//! Job status tracking.
//!
//! Status files under the reports directory are the writer of record; the
//! in-memory map is only a read-through cache warmed on access. A status
//! survives process restarts, and when a status file is missing but the
//! job's report exists, the status is reconstructed from the report rather
//! than reported as unknown.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::Config;
use crate::models::{JobState, JobStatus, Report};

pub struct StatusStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, JobStatus>>,
}

impl StatusStore {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.storage.reports_dir(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn status_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}_status.json", job_id))
    }

    fn report_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    /// Persist a status, then update the cache. The file write is the
    /// commit point; a cache entry never exists for a status that was not
    /// written out.
    pub async fn put(&self, job_id: &str, status: JobStatus) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let path = self.status_path(job_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&status)?;
        std::fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;

        self.cache.lock().await.insert(job_id.to_string(), status);
        Ok(())
    }

    /// Look up a job's status: cache, then status file, then
    /// reconstruction from the report file. `None` means the job id is
    /// unknown on every level.
    pub async fn get(&self, job_id: &str) -> Option<JobStatus> {
        if let Some(status) = self.cache.lock().await.get(job_id) {
            return Some(status.clone());
        }

        if let Some(status) = self.read_status_file(job_id) {
            self.cache
                .lock()
                .await
                .insert(job_id.to_string(), status.clone());
            return Some(status);
        }

        let status = self.reconstruct_from_report(job_id)?;
        self.cache
            .lock()
            .await
            .insert(job_id.to_string(), status.clone());
        Some(status)
    }

    /// Drop a job from the cache and delete its status file. Used when the
    /// job's report is deleted.
    pub async fn remove(&self, job_id: &str) -> Result<()> {
        self.cache.lock().await.remove(job_id);
        let path = self.status_path(job_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    fn read_status_file(&self, job_id: &str) -> Option<JobStatus> {
        let path = self.status_path(job_id);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable status file");
                None
            }
        }
    }

    /// A report on disk implies the job ran to completion; a degraded
    /// analysis still completed, with its error recorded inside the
    /// report. Failed jobs never produce a report to reconstruct from.
    fn reconstruct_from_report(&self, job_id: &str) -> Option<JobStatus> {
        let bytes = std::fs::read(self.report_path(job_id)).ok()?;
        let report: Report = match serde_json::from_slice(&bytes) {
            Ok(report) => report,
            Err(e) => {
                warn!(job_id, error = %e, "unreadable report file during status reconstruction");
                return None;
            }
        };

        let end_time = report.timestamp;
        Some(JobStatus::completed(report, end_time))
    }
}

/// True when the status represents a job that is still running.
pub fn is_active(status: &JobStatus) -> bool {
    status.status == JobState::Processing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Analysis, Report};

    fn store(root: &std::path::Path) -> StatusStore {
        let mut cfg = Config::minimal();
        cfg.storage.root = root.to_path_buf();
        StatusStore::new(&cfg)
    }

    fn sample_report(job_id: &str, error: Option<&str>) -> Report {
        Report {
            job_id: job_id.to_string(),
            sop_file: "sop.txt".to_string(),
            regulatory_files: vec!["gmp.txt".to_string()],
            analysis: Analysis {
                compliance_summary: "ok".to_string(),
                discrepancies: Vec::new(),
                recommended_adjustments: Vec::new(),
                compliance_score: 80,
                error: error.map(str::to_string),
            },
            relevant_clauses: Vec::new(),
            timestamp: 1_700_000_000.0,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store
            .put("job_1", JobStatus::processing(1_700_000_000.0))
            .await
            .unwrap();
        let status = store.get("job_1").await.unwrap();
        assert_eq!(status.status, JobState::Processing);
        assert!(is_active(&status));
    }

    #[tokio::test]
    async fn status_survives_a_fresh_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        {
            let store = store(tmp.path());
            store
                .put(
                    "job_1",
                    JobStatus::completed(sample_report("job_1", None), 1_700_000_100.0),
                )
                .await
                .unwrap();
        }

        // New store, empty cache: must come off disk.
        let fresh = store(tmp.path());
        let status = fresh.get("job_1").await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert!(status.result.is_some());
    }

    #[tokio::test]
    async fn reconstructs_completed_status_from_report_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        std::fs::create_dir_all(store.dir.clone()).unwrap();
        std::fs::write(
            store.report_path("job_2"),
            serde_json::to_vec(&sample_report("job_2", None)).unwrap(),
        )
        .unwrap();

        let status = store.get("job_2").await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.result.unwrap().job_id, "job_2");
    }

    #[tokio::test]
    async fn degraded_report_reconstructs_as_completed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        std::fs::create_dir_all(store.dir.clone()).unwrap();
        std::fs::write(
            store.report_path("job_3"),
            serde_json::to_vec(&sample_report("job_3", Some("provider timeout"))).unwrap(),
        )
        .unwrap();

        // The job finished; the analysis error rides inside the report.
        let status = store.get("job_3").await.unwrap();
        assert_eq!(status.status, JobState::Completed);
        let report = status.result.unwrap();
        assert_eq!(report.analysis.error.as_deref(), Some("provider timeout"));
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        assert!(store.get("job_missing").await.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_the_status_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        store
            .put("job_1", JobStatus::processing(0.0))
            .await
            .unwrap();
        assert!(store.status_path("job_1").exists());

        store.remove("job_1").await.unwrap();
        assert!(!store.status_path("job_1").exists());
        assert!(store.get("job_1").await.is_none());
    }
}
