use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Directory layout rooted at `storage.root`. Every derived path has a
/// default relative to the root so a two-line config is enough.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub index_db: Option<PathBuf>,
    #[serde(default)]
    pub sop_dir: Option<PathBuf>,
    #[serde(default)]
    pub regulatory_dir: Option<PathBuf>,
    #[serde(default)]
    pub processed_dir: Option<PathBuf>,
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn index_db(&self) -> PathBuf {
        self.index_db
            .clone()
            .unwrap_or_else(|| self.root.join("index.sqlite"))
    }
    pub fn sop_dir(&self) -> PathBuf {
        self.sop_dir.clone().unwrap_or_else(|| self.root.join("sop"))
    }
    pub fn regulatory_dir(&self) -> PathBuf {
        self.regulatory_dir
            .clone()
            .unwrap_or_else(|| self.root.join("regulations"))
    }
    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir
            .clone()
            .unwrap_or_else(|| self.root.join("processed"))
    }
    pub fn reports_dir(&self) -> PathBuf {
        self.reports_dir
            .clone()
            .unwrap_or_else(|| self.root.join("reports"))
    }

    /// Create every storage directory. Idempotent.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.sop_dir(),
            self.regulatory_dir(),
            self.processed_dir(),
            self.reports_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Nearest clauses fetched per SOP chunk.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Acceptance threshold on cosine distance; lower score = more similar,
    /// results at or above the threshold are dropped.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Clauses embedded in the LLM prompt.
    #[serde(default = "default_prompt_clause_limit")]
    pub prompt_clause_limit: usize,
    /// Clauses included verbatim in the persisted report.
    #[serde(default = "default_report_clause_limit")]
    pub report_clause_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
            prompt_clause_limit: default_prompt_clause_limit(),
            report_clause_limit: default_report_clause_limit(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_threshold() -> f32 {
    0.75
}
fn default_prompt_clause_limit() -> usize {
    20
}
fn default_report_clause_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Words longer than this many characters also contribute a prefix
    /// component, so inflected forms overlap.
    #[serde(default = "default_prefix_width")]
    pub prefix_width: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
            prefix_width: default_prefix_width(),
        }
    }
}

fn default_dims() -> usize {
    1536
}
fn default_prefix_width() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"anthropic"` or `"disabled"`. Disabled yields the degraded analysis
    /// object instead of calling out.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_model() -> String {
    "claude-3-5-sonnet-20240620".to_string()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_llm_max_retries() -> u32 {
    2
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upload size ceiling in bytes; larger uploads are rejected per item.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl Config {
    /// Minimal in-memory config for tools that run without a config file.
    pub fn minimal() -> Self {
        Self {
            storage: StorageConfig {
                root: PathBuf::from("./data"),
                index_db: None,
                sop_dir: None,
                regulatory_dir: None,
                processed_dir: None,
                reports_dir: None,
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [0.0, 2.0] (cosine distance)");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.prefix_width == 0 {
        anyhow::bail!("embedding.prefix_width must be > 0");
    }

    match config.llm.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }

    Ok(config)
}
