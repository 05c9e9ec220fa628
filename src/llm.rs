//! Compliance analysis via the Anthropic messages API.
//!
//! The LLM path never fails the surrounding job: any provider, network, or
//! parse failure degrades to [`Analysis::degraded`] with the failure text
//! recorded, and the same degraded object is returned when the provider is
//! configured as `"disabled"`.
//!
//! Retry strategy mirrors the transient/permanent split used elsewhere:
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - other 4xx → fail immediately
//! - network error → retry

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::{LlmConfig, RetrievalConfig};
use crate::models::{Analysis, RetrievedClause};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How much of the SOP text goes into the prompt. Clauses are capped
/// separately via `retrieval.prompt_clause_limit`.
const MAX_SOP_PROMPT_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str =
    "You are a regulatory compliance expert who provides detailed analysis in JSON format.";

pub struct LlmService {
    config: LlmConfig,
    prompt_clause_limit: usize,
}

impl LlmService {
    pub fn new(llm: &LlmConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            config: llm.clone(),
            prompt_clause_limit: retrieval.prompt_clause_limit,
        }
    }

    /// Analyze an SOP against retrieved clauses. Always returns a valid
    /// [`Analysis`]; look at its `error` field to tell a real result from
    /// a degraded one.
    pub async fn analyze(&self, sop_text: &str, clauses: &[RetrievedClause]) -> Analysis {
        if !self.config.is_enabled() {
            return Analysis::degraded("llm provider disabled");
        }

        let prompt = build_prompt(sop_text, clauses, self.prompt_clause_limit);

        match self.complete(&prompt).await {
            Ok(content) => match parse_analysis(&content) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(error = %e, "failed to parse analysis response");
                    Analysis::degraded(format!("unparseable analysis response: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "llm request failed");
                Analysis::degraded(e.to_string())
            }
        }
    }

    /// Send one messages-API request with retry/backoff and return the
    /// first text block of the response.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(ANTHROPIC_MESSAGES_URL)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return extract_text_block(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Anthropic API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Anthropic API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("llm request failed after retries")))
    }
}

/// Pull the first text content block out of a messages-API response.
fn extract_text_block(json: &serde_json::Value) -> Result<String> {
    json.get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.iter().find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text")))
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Anthropic response: missing text content"))
}

fn build_prompt(sop_text: &str, clauses: &[RetrievedClause], clause_limit: usize) -> String {
    let mut clauses_text = String::new();
    for (i, c) in clauses.iter().take(clause_limit).enumerate() {
        clauses_text.push_str(&format!(
            "Clause {} (from {}):\n{}\n\n",
            i + 1,
            c.source,
            c.clause
        ));
    }

    let sop_excerpt: String = sop_text.chars().take(MAX_SOP_PROMPT_CHARS).collect();

    format!(
        r#"You are a regulatory compliance expert. I need you to analyze a Standard Operating Procedure (SOP) document against relevant regulatory clauses.

REGULATORY CLAUSES:
{clauses_text}
SOP DOCUMENT:
{sop_excerpt}

Please analyze the SOP against these regulatory clauses and provide:
1. A summary of compliance status
2. Specific discrepancies or gaps between the SOP and regulatory requirements
3. Recommended adjustments to make the SOP fully compliant
4. A compliance score from 0-100

Format your response as JSON with the following structure:
{{
  "compliance_summary": "Overall assessment of compliance",
  "discrepancies": [
    {{
      "regulatory_reference": "Reference to the specific clause",
      "issue": "Description of the compliance gap",
      "severity": "High/Medium/Low"
    }}
  ],
  "recommended_adjustments": [
    {{
      "section": "Relevant SOP section",
      "current_text": "Current text if applicable",
      "suggested_text": "Suggested compliant text",
      "explanation": "Explanation of the change"
    }}
  ],
  "compliance_score": 85
}}"#
    )
}

/// Parse the model's reply into an [`Analysis`]. Accepts a fenced
/// ```json block, a bare JSON object embedded in prose, or a reply that
/// is pure JSON.
fn parse_analysis(content: &str) -> Result<Analysis> {
    let json_str = if let Some(fenced) = extract_fenced_json(content) {
        fenced
    } else if let Some(bare) = extract_bare_object(content) {
        bare
    } else {
        content.trim()
    };

    Ok(serde_json::from_str(json_str)?)
}

fn extract_fenced_json(content: &str) -> Option<&str> {
    let start = content.find("```json")? + "```json".len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn extract_bare_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end > start {
        Some(&content[start..=end])
    } else {
        None
    }
}
