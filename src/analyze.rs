//! Analysis job orchestration.
//!
//! A job runs the whole pipeline for one SOP against a set of regulatory
//! documents: process (cached), index (idempotent by content hash),
//! retrieve, analyze, persist. The job boundary converts every error into
//! a failed status with a message, so no job is ever left stuck in
//! processing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::Config;
use crate::document::{self, process_regulatory, process_sop};
use crate::index::VectorIndex;
use crate::llm::LlmService;
use crate::models::{JobStatus, Report};
use crate::report::save_report;
use crate::retrieve::find_relevant_clauses;
use crate::status::StatusStore;

/// Allocate a job id: creation-ordered prefix plus a random suffix so two
/// jobs started in the same second never collide.
pub fn allocate_job_id() -> String {
    let ts = chrono::Utc::now().timestamp();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("job_{}_{}", ts, &suffix[..8])
}

/// Run one analysis job end to end, maintaining its status around the
/// pipeline. Always leaves a terminal status behind.
pub async fn run_analysis(
    config: &Config,
    index: &VectorIndex,
    llm: &LlmService,
    status: &StatusStore,
    job_id: &str,
    sop_path: &Path,
    regulatory_paths: &[PathBuf],
) -> Result<Report> {
    status
        .put(job_id, JobStatus::processing(document::now_epoch()))
        .await?;

    match run_pipeline(config, index, llm, job_id, sop_path, regulatory_paths).await {
        Ok(report) => {
            status
                .put(
                    job_id,
                    JobStatus::completed(report.clone(), document::now_epoch()),
                )
                .await?;
            info!(job_id, score = report.analysis.compliance_score, "analysis completed");
            Ok(report)
        }
        Err(e) => {
            error!(job_id, error = %e, "analysis failed");
            status
                .put(
                    job_id,
                    JobStatus::failed(e.to_string(), document::now_epoch()),
                )
                .await?;
            Err(e)
        }
    }
}

async fn run_pipeline(
    config: &Config,
    index: &VectorIndex,
    llm: &LlmService,
    job_id: &str,
    sop_path: &Path,
    regulatory_paths: &[PathBuf],
) -> Result<Report> {
    let sop = {
        let cfg = config.clone();
        let path = sop_path.to_path_buf();
        tokio::task::spawn_blocking(move || process_sop(&cfg, &path))
            .await
            .context("sop processing task panicked")??
    };
    info!(
        job_id,
        file = %sop.file_name,
        chunks = sop.num_chunks,
        "processed sop"
    );

    // Extraction and clause splitting are CPU and file bound; fan the
    // regulatory documents out to the blocking pool and collect them all
    // before any indexing starts.
    let mut handles = Vec::with_capacity(regulatory_paths.len());
    for path in regulatory_paths {
        let cfg = config.clone();
        let path = path.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            process_regulatory(&cfg, &path)
        }));
    }
    let mut regulatory_docs = Vec::with_capacity(handles.len());
    for handle in handles {
        regulatory_docs.push(handle.await.context("regulatory processing task panicked")??);
    }

    for doc in &regulatory_docs {
        let wrote = index
            .upsert(&doc.metadata.hash, &doc.file_name, &doc.clauses)
            .await?;
        info!(
            job_id,
            file = %doc.file_name,
            clauses = doc.num_clauses,
            indexed = wrote,
            "regulatory document ready"
        );
    }

    let mut relevant = find_relevant_clauses(
        &sop.chunks,
        index,
        config.retrieval.top_k,
        config.retrieval.threshold,
    )
    .await?;

    let analysis = llm.analyze(&sop.text, &relevant).await;

    relevant.truncate(config.retrieval.report_clause_limit);
    let report = Report {
        job_id: job_id.to_string(),
        sop_file: sop.file_name,
        regulatory_files: regulatory_docs.iter().map(|d| d.file_name.clone()).collect(),
        analysis,
        relevant_clauses: relevant,
        timestamp: document::now_epoch(),
    };

    save_report(config, &report)?;
    Ok(report)
}
