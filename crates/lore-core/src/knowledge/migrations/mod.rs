//! Schema migrations using PRAGMA user_version.
//!
//! Every pending step runs inside one `BEGIN IMMEDIATE` transaction, and the
//! version is read after the write lock is taken, so two processes opening
//! the same file never apply a step twice.

pub mod v001_initial;
pub mod v002_corpus_columns;

use rusqlite::{params, Connection, TransactionBehavior};

use super::error::KnowledgeError;

/// Latest schema version this build knows about.
pub const LATEST_VERSION: u32 = 2;

type Step = fn(&Connection) -> rusqlite::Result<()>;

fn v001(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(v001_initial::MIGRATION_SQL)
}

const MIGRATIONS: &[(u32, Step)] = &[(1, v001), (2, v002_corpus_columns::apply)];

/// Run all pending migrations. Returns the number of steps applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize, KnowledgeError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| KnowledgeError::Migration {
            version: 0,
            message: format!("could not take write lock: {}", e),
        })?;

    let current: u32 = tx
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| KnowledgeError::Migration {
            version: 0,
            message: e.to_string(),
        })?;

    if current > LATEST_VERSION {
        return Err(KnowledgeError::Migration {
            version: current,
            message: format!("store schema is newer than this build (max {})", LATEST_VERSION),
        });
    }

    let mut applied = 0;
    for (version, step) in MIGRATIONS {
        if current >= *version {
            continue;
        }

        let fail = |e: rusqlite::Error| KnowledgeError::Migration {
            version: *version,
            message: e.to_string(),
        };

        step(&tx).map_err(fail)?;
        tx.pragma_update(None, "user_version", version).map_err(fail)?;
        tx.execute(
            "INSERT OR REPLACE INTO schema_history (version, applied_at) VALUES (?1, ?2)",
            params![version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(fail)?;

        tracing::info!(version = version, "applied migration");
        applied += 1;
    }

    tx.commit().map_err(|e| KnowledgeError::Migration {
        version: LATEST_VERSION,
        message: e.to_string(),
    })?;

    Ok(applied)
}

/// Get the current schema version.
pub fn current_version(conn: &Connection) -> Result<u32, KnowledgeError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&mut conn).unwrap(), 2);
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);

        let history: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(history, 2);
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(run_migrations(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_v002_tolerates_existing_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(v001_initial::MIGRATION_SQL).unwrap();
        // Column added out of band, version still 0
        conn.execute_batch("ALTER TABLE nodes ADD COLUMN corpus TEXT NOT NULL DEFAULT 'code';")
            .unwrap();

        run_migrations(&mut conn).unwrap();
        assert!(v002_corpus_columns::column_exists(&conn, "nodes", "corpus").unwrap());
        assert!(v002_corpus_columns::column_exists(&conn, "nodes", "data_type").unwrap());
    }

    #[test]
    fn test_chunk_index_unique_per_corpus() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let insert = "INSERT INTO nodes (id, node_type, display_name, corpus, chunk_index) VALUES (?1, 't', 'n', ?2, ?3)";
        conn.execute(insert, params!["a", "code", 0]).unwrap();
        conn.execute(insert, params!["b", "docs", 0]).unwrap();
        assert!(conn.execute(insert, params!["c", "code", 0]).is_err());
        // Unembedded nodes carry no chunk index and never collide
        conn.execute(insert, params!["d", "code", rusqlite::types::Null]).unwrap();
        conn.execute(insert, params!["e", "code", rusqlite::types::Null]).unwrap();
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
        let err = run_migrations(&mut conn).unwrap_err();
        assert!(matches!(err, KnowledgeError::Migration { version: 99, .. }));
    }
}
