//! # Compliance Harness
//!
//! SOP-to-regulation compliance analysis: extract text from procedure and
//! regulation documents, split regulations into clauses, index the clauses
//! as deterministic embedding vectors in SQLite, retrieve the clauses
//! relevant to an SOP, and produce an LLM-backed compliance report.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │ SOP + Reg    │──▶│   Pipeline     │──▶│  SQLite   │
//! │ PDF/DOCX/TXT │   │ Extract+Chunk │   │ Vectors   │
//! └──────────────┘   │ Clause+Embed  │   └────┬─────┘
//!                    └───────────────┘        │
//!                       ┌─────────────────────┤
//!                       ▼                     ▼
//!                  ┌──────────┐        ┌──────────┐
//!                  │   CLI    │        │   HTTP   │
//!                  │ (comply) │        │  (axum)  │
//!                  └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! comply init                              # create storage + database
//! comply analyze sop.pdf --regulatory-dir ./regs
//! comply reports                           # list saved reports
//! comply index verify                      # check index consistency
//! comply serve                             # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF/DOCX/plain-text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`clause`] | Regulatory clause extraction |
//! | [`document`] | Content hashing and the process cache |
//! | [`embedding`] | Deterministic hash embedder |
//! | [`index`] | Persistent vector index |
//! | [`retrieve`] | Relevance retrieval |
//! | [`llm`] | LLM-backed analysis |
//! | [`analyze`] | Job orchestration |
//! | [`status`] | Durable job status store |
//! | [`report`] | Report persistence |
//! | [`files`] | Content-addressed upload stores |
//! | [`server`] | HTTP server |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod chunk;
pub mod clause;
pub mod config;
pub mod document;
pub mod embedding;
pub mod extract;
pub mod files;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod report;
pub mod retrieve;
pub mod server;
pub mod status;
