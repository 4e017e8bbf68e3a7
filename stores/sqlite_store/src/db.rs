use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use store_api::{Document, Fields};
use tracing::warn;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
  collection TEXT NOT NULL,
  id TEXT NOT NULL,
  fields TEXT NOT NULL,
  PRIMARY KEY (collection, id)
);
"#;

/// Create the schema on a fresh or existing database.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Insert or overwrite a document. Returns true when a document with the same
/// key already existed.
pub fn upsert_document(conn: &Connection, collection: &str, doc: &Document) -> Result<bool> {
    let fields = serde_json::to_string(&doc.fields).context("encoding fields")?;
    let existed = conn
        .query_row(
            "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, doc.id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    conn.execute(
        "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, ?3) \
         ON CONFLICT(collection, id) DO UPDATE SET fields = excluded.fields",
        params![collection, doc.id, fields],
    )?;
    Ok(existed)
}

/// Load every document of a collection. Rows whose fields no longer decode
/// are skipped.
pub fn load_collection(conn: &Connection, collection: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare("SELECT id, fields FROM documents WHERE collection = ?1")?;
    let rows = stmt.query_map([collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut docs = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        match serde_json::from_str::<Fields>(&raw) {
            Ok(fields) => docs.push(Document::new(id, fields)),
            Err(err) => warn!("skipping undecodable document {collection}/{id}: {err}"),
        }
    }
    Ok(docs)
}

/// Counter that changes whenever another connection commits.
pub fn data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}
