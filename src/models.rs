//! Core data models used throughout Compliance Harness.
//!
//! These types represent the documents, clauses, retrieval results, and
//! reports that flow through the processing and analysis pipeline. The
//! serialized shapes double as the on-disk JSON formats for the process
//! cache, job status files, and reports.

use serde::{Deserialize, Serialize};

/// Snapshot of a source file used to detect staleness of derived data.
/// A cache entry is valid only while the live file's (size, hash) still
/// matches; mtime is recorded for inspection but does not gate validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub mtime: f64,
    pub size: u64,
    pub hash: String,
}

/// Derived form of an SOP document: full text plus ordered chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedSop {
    pub file_path: String,
    pub file_name: String,
    pub text: String,
    pub chunks: Vec<String>,
    pub text_length: usize,
    pub num_chunks: usize,
    pub processed_at: f64,
    pub metadata: FileMetadata,
}

/// Derived form of a regulatory document: ordered candidate clauses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRegulatory {
    pub file_path: String,
    pub file_name: String,
    pub text_length: usize,
    pub clauses: Vec<String>,
    pub num_clauses: usize,
    pub processed_at: f64,
    pub metadata: FileMetadata,
}

/// A clause returned from the vector index for one query.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub clause: String,
    pub source: String,
    pub clause_index: i64,
    /// Cosine distance; lower is more similar.
    pub score: f32,
}

/// A retrieved clause tagged with the SOP chunk that surfaced it.
/// Transient: produced fresh per query, persisted only inside a [`Report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedClause {
    pub clause: String,
    pub source: String,
    pub relevance_score: f32,
    pub sop_chunk: String,
}

/// One compliance gap reported by the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    #[serde(default)]
    pub regulatory_reference: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub severity: String,
}

/// One recommended SOP edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(default)]
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_text: Option<String>,
    #[serde(default)]
    pub suggested_text: String,
    #[serde(default)]
    pub explanation: String,
}

/// Structured analysis produced by the LLM. On any provider or parse
/// failure a degraded-but-valid instance is returned with `error` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub compliance_summary: String,
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
    #[serde(default)]
    pub recommended_adjustments: Vec<Adjustment>,
    #[serde(default)]
    pub compliance_score: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Analysis {
    /// The degraded analysis object used whenever the LLM path fails.
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            compliance_summary: "Error in analysis".to_string(),
            discrepancies: Vec::new(),
            recommended_adjustments: Vec::new(),
            compliance_score: 0,
            error: Some(error.into()),
        }
    }
}

/// A completed analysis report as persisted under the reports directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub job_id: String,
    pub sop_file: String,
    pub regulatory_files: Vec<String>,
    pub analysis: Analysis,
    pub relevant_clauses: Vec<RetrievedClause>,
    pub timestamp: f64,
}

/// Summary row for report listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub job_id: String,
    pub sop_file: String,
    pub timestamp: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_score: Option<i64>,
    /// Set when the analysis degraded; the job itself still completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Durable job status record, written at every state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Report>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn processing(start_time: f64) -> Self {
        Self {
            status: JobState::Processing,
            start_time: Some(start_time),
            end_time: None,
            result: None,
            error: None,
        }
    }

    pub fn completed(report: Report, end_time: f64) -> Self {
        Self {
            status: JobState::Completed,
            start_time: None,
            end_time: Some(end_time),
            result: Some(report),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, end_time: f64) -> Self {
        Self {
            status: JobState::Failed,
            start_time: None,
            end_time: Some(end_time),
            result: None,
            error: Some(error.into()),
        }
    }
}
