//! Report persistence: listing, loading, and deleting completed reports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::Config;
use crate::models::{Report, ReportSummary};

pub fn report_path(config: &Config, job_id: &str) -> PathBuf {
    config.storage.reports_dir().join(format!("{}.json", job_id))
}

/// Write a report atomically to its canonical location.
pub fn save_report(config: &Config, report: &Report) -> Result<()> {
    let dir = config.storage.reports_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let path = report_path(config, &report.job_id);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(report)?)
        .with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

pub fn load_report(config: &Config, job_id: &str) -> Result<Option<Report>> {
    let path = report_path(config, job_id);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let report =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(report))
}

/// Summaries of every readable report, newest first. Files that fail to
/// read or parse are skipped with a warning so one corrupt report cannot
/// hide the rest.
pub fn list_reports(config: &Config) -> Result<Vec<ReportSummary>> {
    let dir = config.storage.reports_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut summaries = Vec::new();

    for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        // Status files share the directory; reports are plain `<job_id>.json`.
        if !name.ends_with(".json") || name.ends_with("_status.json") {
            continue;
        }

        let report: Report = match std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(anyhow::Error::from))
        {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable report");
                continue;
            }
        };

        // A report on disk means the job ran to completion. A degraded
        // analysis carries its error alongside the (zero) score; "failed"
        // is reserved for job-boundary errors, which never produce a
        // report file.
        summaries.push(ReportSummary {
            job_id: report.job_id,
            sop_file: report.sop_file,
            timestamp: report.timestamp,
            status: "completed".to_string(),
            compliance_score: Some(report.analysis.compliance_score),
            error: report.analysis.error,
        });
    }

    summaries.sort_by(|a, b| {
        b.timestamp
            .partial_cmp(&a.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(summaries)
}

/// Delete a report and its status file. Returns whether the report
/// existed. Only ever invoked on explicit external request.
pub fn delete_report(config: &Config, job_id: &str) -> Result<bool> {
    let path = report_path(config, job_id);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;

    let status_path = config
        .storage
        .reports_dir()
        .join(format!("{}_status.json", job_id));
    if status_path.exists() {
        std::fs::remove_file(&status_path)
            .with_context(|| format!("removing {}", status_path.display()))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Analysis;

    fn cfg(root: &std::path::Path) -> Config {
        let mut cfg = Config::minimal();
        cfg.storage.root = root.to_path_buf();
        cfg
    }

    fn sample(job_id: &str, timestamp: f64, error: Option<&str>) -> Report {
        Report {
            job_id: job_id.to_string(),
            sop_file: "sop.txt".to_string(),
            regulatory_files: vec!["gmp.txt".to_string()],
            analysis: Analysis {
                compliance_summary: "summary".to_string(),
                discrepancies: Vec::new(),
                recommended_adjustments: Vec::new(),
                compliance_score: 72,
                error: error.map(str::to_string),
            },
            relevant_clauses: Vec::new(),
            timestamp,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());
        save_report(&cfg, &sample("job_a", 10.0, None)).unwrap();

        let loaded = load_report(&cfg, "job_a").unwrap().unwrap();
        assert_eq!(loaded.job_id, "job_a");
        assert_eq!(loaded.analysis.compliance_score, 72);
        assert!(load_report(&cfg, "job_missing").unwrap().is_none());
    }

    #[test]
    fn listing_is_newest_first_and_skips_noise() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());
        save_report(&cfg, &sample("job_old", 10.0, None)).unwrap();
        save_report(&cfg, &sample("job_new", 20.0, Some("boom"))).unwrap();

        // Corrupt report and a status file in the same directory.
        let dir = cfg.storage.reports_dir();
        std::fs::write(dir.join("job_bad.json"), b"{not json").unwrap();
        std::fs::write(dir.join("job_new_status.json"), b"{}").unwrap();

        let summaries = list_reports(&cfg).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].job_id, "job_new");
        // Degraded analysis: completed, with the error surfaced.
        assert_eq!(summaries[0].status, "completed");
        assert_eq!(summaries[0].error.as_deref(), Some("boom"));
        assert_eq!(summaries[1].job_id, "job_old");
        assert_eq!(summaries[1].status, "completed");
        assert_eq!(summaries[1].error, None);
        assert_eq!(summaries[1].compliance_score, Some(72));
    }

    #[test]
    fn delete_removes_report_and_status_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = cfg(tmp.path());
        save_report(&cfg, &sample("job_a", 10.0, None)).unwrap();
        let status_path = cfg.storage.reports_dir().join("job_a_status.json");
        std::fs::write(&status_path, b"{}").unwrap();

        assert!(delete_report(&cfg, "job_a").unwrap());
        assert!(!report_path(&cfg, "job_a").exists());
        assert!(!status_path.exists());
        assert!(!delete_report(&cfg, "job_a").unwrap());
    }
}
