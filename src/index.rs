//! Persistent vector index over regulatory clauses.
//!
//! [`VectorIndex`] is an explicitly constructed handle owning a SQLite pool
//! and an [`Embedder`]; callers pass it where needed rather than reaching
//! for process-wide state. Vectors and the indexed-document-id set live in
//! the same database file and every mutation touches both inside one
//! transaction, so a crash cannot claim an id is indexed with zero vectors
//! or leave vectors orphaned from the set. The set is the sole source of
//! truth for "skip re-embedding": [`VectorIndex::upsert`] is a no-op for an
//! already-present document id, which makes indexing idempotent under
//! repeated ingestion of the same content. Mutations within one process
//! queue on an internal write lock, and a conflicting claim from another
//! process reads as the same benign already-indexed skip, so concurrent
//! jobs sharing the index never fail each other.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob, Embedder, HashEmbedder};
use crate::migrate;
use crate::models::IndexMatch;

/// Metadata type tag stored with every vector.
const KIND_REGULATORY_CLAUSE: &str = "regulatory_clause";

/// How long a blocked SQLite writer waits for the current one to finish
/// before giving up. Only reached when another process holds the lock;
/// writers within this process queue on [`VectorIndex::write_lock`].
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct VectorIndex {
    pool: SqlitePool,
    embedder: Box<dyn Embedder>,
    // SQLite permits one writer at a time; a second deferred transaction
    // that tries to upgrade to a write fails with SQLITE_BUSY rather than
    // queueing. Mutations take this lock so concurrent jobs serialize
    // instead of erroring.
    write_lock: Mutex<()>,
}

async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = config.storage.index_db();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// One disagreement between the vector table and the indexed-document set,
/// as detected by [`VectorIndex::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// The id is in the set but no vectors carry it.
    MissingVectors { doc_id: String },
    /// Vectors carry the id but the set does not contain it.
    Orphaned { doc_id: String, vector_count: i64 },
}

impl std::fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inconsistency::MissingVectors { doc_id } => {
                write!(f, "{}: indexed but has no vectors", doc_id)
            }
            Inconsistency::Orphaned {
                doc_id,
                vector_count,
            } => write!(
                f,
                "{}: {} vectors present but not in the indexed set",
                doc_id, vector_count
            ),
        }
    }
}

impl VectorIndex {
    /// Open (and if necessary create) the index under the configured
    /// storage root, with the default deterministic embedder.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder: Box<dyn Embedder> = Box::new(HashEmbedder::new(&config.embedding));
        Self::open_with_embedder(config, embedder).await
    }

    /// Open the index with a caller-supplied embedder. Query and document
    /// embeddings must come from the same implementation.
    pub async fn open_with_embedder(config: &Config, embedder: Box<dyn Embedder>) -> Result<Self> {
        let pool = connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            embedder,
            write_lock: Mutex::new(()),
        })
    }

    /// Index a batch of clauses for one document. Skips the entire batch
    /// when `doc_id` is already in the indexed set; returns whether
    /// anything was written. An empty clause list writes nothing and does
    /// not mark the id as indexed.
    pub async fn upsert(&self, doc_id: &str, source: &str, clauses: &[String]) -> Result<bool> {
        if clauses.is_empty() {
            return Ok(false);
        }

        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let already: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM indexed_documents WHERE doc_id = ?")
                .bind(doc_id)
                .fetch_one(&mut *tx)
                .await?;
        if already {
            return Ok(false);
        }

        // Claim the id first. A writer in another process can slip in
        // between the membership check and here; its win surfaces as a
        // unique-constraint conflict, which is the same already-indexed
        // case as the check above.
        let claimed = sqlx::query("INSERT INTO indexed_documents (doc_id) VALUES (?)")
            .bind(doc_id)
            .execute(&mut *tx)
            .await;
        match claimed {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        for (i, clause) in clauses.iter().enumerate() {
            let vector = self.embedder.embed(clause);
            sqlx::query(
                r#"
                INSERT INTO clause_vectors (doc_id, source, clause_index, clause_text, embedding, kind)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(doc_id)
            .bind(source)
            .bind(i as i64)
            .bind(clause)
            .bind(vec_to_blob(&vector))
            .bind(KIND_REGULATORY_CLAUSE)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Embed `text` and return the `k` nearest stored clauses by cosine
    /// distance, closest first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexMatch>> {
        let query_vec = self.embedder.embed(text);

        let rows = sqlx::query(
            "SELECT doc_id, source, clause_index, clause_text, embedding FROM clause_vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<IndexMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                IndexMatch {
                    clause: row.get("clause_text"),
                    source: row.get("source"),
                    clause_index: row.get("clause_index"),
                    score: cosine_distance(&query_vec, &vector),
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);

        Ok(matches)
    }

    /// Remove every vector for `doc_id` and drop the id from the indexed
    /// set. Returns whether anything was actually removed.
    pub async fn delete(&self, doc_id: &str) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let vectors = sqlx::query("DELETE FROM clause_vectors WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let ids = sqlx::query("DELETE FROM indexed_documents WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(vectors > 0 || ids > 0)
    }

    pub async fn is_indexed(&self, doc_id: &str) -> Result<bool> {
        let found: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM indexed_documents WHERE doc_id = ?")
                .bind(doc_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found)
    }

    /// Total stored vectors for one document id.
    pub async fn vector_count(&self, doc_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clause_vectors WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All document ids currently in the indexed set.
    pub async fn indexed_documents(&self) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT doc_id FROM indexed_documents ORDER BY doc_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    /// Compare per-id vector counts against the indexed set in both
    /// directions. Detection only; repair is an explicit operator action.
    pub async fn verify(&self) -> Result<Vec<Inconsistency>> {
        let mut findings = Vec::new();

        let rows =
            sqlx::query("SELECT doc_id, COUNT(*) AS n FROM clause_vectors GROUP BY doc_id")
                .fetch_all(&self.pool)
                .await?;
        let set = self.indexed_documents().await?;

        for row in &rows {
            let doc_id: String = row.get("doc_id");
            let n: i64 = row.get("n");
            if !set.contains(&doc_id) {
                findings.push(Inconsistency::Orphaned {
                    doc_id,
                    vector_count: n,
                });
            }
        }

        for doc_id in set {
            if !rows
                .iter()
                .any(|row| row.get::<String, _>("doc_id") == doc_id)
            {
                findings.push(Inconsistency::MissingVectors { doc_id });
            }
        }

        Ok(findings)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
