use anyhow::Result;
use sqlx::SqlitePool;

/// Create the vector-index schema. Idempotent.
///
/// `clause_vectors` holds one row per indexed clause; `indexed_documents`
/// is the set of document ids represented in the index, persisted
/// separately so re-ingestion of unchanged content can be skipped without
/// scanning vectors.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clause_vectors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT NOT NULL,
            source TEXT NOT NULL,
            clause_index INTEGER NOT NULL,
            clause_text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            kind TEXT NOT NULL DEFAULT 'regulatory_clause'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_documents (
            doc_id TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_clause_vectors_doc_id ON clause_vectors(doc_id)")
        .execute(pool)
        .await?;

    Ok(())
}
