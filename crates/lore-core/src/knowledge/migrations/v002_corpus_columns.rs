//! V002: corpus partitioning.
//! Adds nodes.corpus and nodes.data_type, plus the per-corpus chunk index
//! uniqueness constraint.

use rusqlite::Connection;

pub const INDEX_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_nodes_corpus ON nodes(corpus);
CREATE INDEX IF NOT EXISTS idx_nodes_data_type ON nodes(data_type)
    WHERE data_type IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_corpus_chunk
    ON nodes(corpus, chunk_index) WHERE chunk_index IS NOT NULL;
"#;

/// Apply the step. ALTER TABLE has no IF NOT EXISTS, so each column is
/// checked first.
pub fn apply(conn: &Connection) -> rusqlite::Result<()> {
    if !column_exists(conn, "nodes", "corpus")? {
        conn.execute_batch("ALTER TABLE nodes ADD COLUMN corpus TEXT NOT NULL DEFAULT 'code';")?;
    }
    if !column_exists(conn, "nodes", "data_type")? {
        conn.execute_batch("ALTER TABLE nodes ADD COLUMN data_type TEXT;")?;
    }
    conn.execute_batch(INDEX_SQL)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}
