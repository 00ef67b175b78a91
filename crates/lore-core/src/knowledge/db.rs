//! SQLite graph store for the knowledge graph.
//!
//! One writer connection serializes all writes; a small round-robin pool of
//! read-only connections serves queries concurrently. In-memory stores route
//! everything through the writer since separate in-memory connections do
//! not share data.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Params, Row, Transaction, TransactionBehavior};

use super::error::KnowledgeError;
use super::migrations;
use super::models::{Edge, Node};
use super::ontology::Corpus;
use crate::config::{StorageConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_READ_POOL_SIZE};

const MAX_POOL_SIZE: usize = 8;

/// Column list for node projections. Queries alias `nodes` as `n`.
pub(crate) const NODE_COLUMNS: &str = "n.id, n.node_type, n.display_name, n.corpus, n.data_type, \
     n.file_path, n.line_start, n.line_end, n.content, n.embedding_text, n.chunk_index, \
     n.owning_file, n.metadata";

/// Map a row selected with [`NODE_COLUMNS`] into a [`Node`].
pub(crate) fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    let corpus: String = row.get(3)?;
    let corpus = corpus
        .parse::<Corpus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let metadata: String = row.get(12)?;
    let metadata = serde_json::from_str(&metadata)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;

    Ok(Node {
        id: row.get(0)?,
        node_type: row.get(1)?,
        display_name: row.get(2)?,
        corpus,
        data_type: row.get(4)?,
        file_path: row.get(5)?,
        line_start: row.get(6)?,
        line_end: row.get(7)?,
        content: row.get(8)?,
        embedding_text: row.get(9)?,
        chunk_index: row.get(10)?,
        owning_file: row.get(11)?,
        metadata,
    })
}

/// Round-robin read-only connections.
struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    fn open(path: &Path, size: usize, busy_timeout: Duration) -> Result<Self, KnowledgeError> {
        let size = size.clamp(1, MAX_POOL_SIZE);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA query_only = ON;")?;
            connections.push(Mutex::new(conn));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, KnowledgeError>
    where
        F: FnOnce(&Connection) -> Result<T, KnowledgeError>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let guard = self.connections[idx]
            .lock()
            .map_err(|_| KnowledgeError::Database("read pool lock poisoned".to_string()))?;
        f(&guard)
    }
}

/// Persistent typed node/edge store.
pub struct GraphStore {
    writer: Mutex<Connection>,
    readers: Option<ReadPool>,
    path: Option<PathBuf>,
}

impl GraphStore {
    /// Open or create a store at the given path with default pool settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        Self::open_with(
            path,
            DEFAULT_READ_POOL_SIZE,
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        )
    }

    /// Open the store configured by `storage`.
    pub fn open_with_config(storage: &StorageConfig) -> Result<Self, KnowledgeError> {
        Self::open_with(
            storage.db_path(),
            storage.read_pool_size,
            Duration::from_millis(storage.busy_timeout_ms),
        )
    }

    /// Open a store, apply pragmas and run pending migrations.
    pub fn open_with(
        path: impl AsRef<Path>,
        read_pool_size: usize,
        busy_timeout: Duration,
    ) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KnowledgeError::io(parent, e))?;
        }

        let mut writer = Connection::open(path)?;
        writer.busy_timeout(busy_timeout)?;
        check_integrity(&writer, path)?;
        writer.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = OFF;
            ",
        )?;

        let applied = migrations::run_migrations(&mut writer)?;
        let readers = ReadPool::open(path, read_pool_size, busy_timeout)?;

        tracing::info!(path = %path.display(), migrations = applied, "opened graph store");

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Some(readers),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, KnowledgeError> {
        let mut writer = Connection::open_in_memory()?;
        migrations::run_migrations(&mut writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: None,
            path: None,
        })
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute a write operation with the serialized writer connection.
    fn with_writer<F, T>(&self, f: F) -> Result<T, KnowledgeError>
    where
        F: FnOnce(&mut Connection) -> Result<T, KnowledgeError>,
    {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| KnowledgeError::Database("write lock poisoned".to_string()))?;
        f(&mut guard)
    }

    /// Execute a read operation with a pooled read connection.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T, KnowledgeError>
    where
        F: FnOnce(&Connection) -> Result<T, KnowledgeError>,
    {
        match &self.readers {
            Some(pool) => pool.with_conn(f),
            None => self.with_writer(|conn| f(conn)),
        }
    }

    /// Run a read query, mapping every row.
    pub fn query<T, P, F>(&self, sql: &str, params: P, mut map: F) -> Result<Vec<T>, KnowledgeError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params, |row| map(row))?;
            let collected = rows.collect::<rusqlite::Result<Vec<T>>>()?;
            Ok(collected)
        })
    }

    /// Execute a single write statement. Returns rows changed.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, KnowledgeError> {
        self.with_writer(|conn| Ok(conn.execute(sql, params)?))
    }

    /// Run `f` in an immediate transaction; commit on `Ok`, roll back on `Err`.
    pub fn in_transaction<F, T>(&self, f: F) -> Result<T, KnowledgeError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, KnowledgeError>,
    {
        self.with_writer(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Current schema version.
    pub fn schema_version(&self) -> Result<u32, KnowledgeError> {
        self.with_reader(migrations::current_version)
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Insert or update nodes by id, in one transaction.
    pub fn upsert_nodes(&self, nodes: &[Node]) -> Result<usize, KnowledgeError> {
        self.in_transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO nodes (id, node_type, display_name, corpus, data_type, file_path,
                    line_start, line_end, content, embedding_text, chunk_index, owning_file, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                    node_type = excluded.node_type,
                    display_name = excluded.display_name,
                    corpus = excluded.corpus,
                    data_type = excluded.data_type,
                    file_path = excluded.file_path,
                    line_start = excluded.line_start,
                    line_end = excluded.line_end,
                    content = excluded.content,
                    embedding_text = excluded.embedding_text,
                    chunk_index = excluded.chunk_index,
                    owning_file = excluded.owning_file,
                    metadata = excluded.metadata",
            )?;

            for node in nodes {
                stmt.execute(params![
                    node.id,
                    node.node_type,
                    node.display_name,
                    node.corpus.as_str(),
                    node.data_type,
                    node.file_path,
                    node.line_start,
                    node.line_end,
                    node.content,
                    node.embedding_text,
                    node.chunk_index,
                    node.owning_file,
                    serde_json::to_string(&node.metadata)?,
                ])?;
            }
            Ok(nodes.len())
        })
    }

    /// Insert edges; an existing `(source, target, type)` row is updated in place.
    pub fn upsert_edges(&self, edges: &[Edge]) -> Result<usize, KnowledgeError> {
        self.in_transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO edges (source_id, target_id, edge_type, owning_file_id, target_resolved, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
                    owning_file_id = excluded.owning_file_id,
                    target_resolved = excluded.target_resolved,
                    metadata = excluded.metadata",
            )?;

            for edge in edges {
                stmt.execute(params![
                    edge.source_id,
                    edge.target_id,
                    edge.edge_type.as_str(),
                    edge.owning_file_id,
                    edge.target_resolved,
                    serde_json::to_string(&edge.metadata)?,
                ])?;
            }
            Ok(edges.len())
        })
    }

    /// Remove every node and edge produced by one source file.
    pub fn remove_file(&self, owning_file: &str) -> Result<usize, KnowledgeError> {
        self.in_transaction(|tx| {
            let edges = tx.execute(
                "DELETE FROM edges WHERE owning_file_id = ?1
                    OR source_id IN (SELECT id FROM nodes WHERE owning_file = ?1)",
                [owning_file],
            )?;
            let nodes = tx.execute("DELETE FROM nodes WHERE owning_file = ?1", [owning_file])?;
            tracing::debug!(owning_file, nodes, edges, "removed file from graph store");
            Ok(nodes)
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_node(&self, id: &str) -> Result<Option<Node>, KnowledgeError> {
        let sql = format!("SELECT {} FROM nodes n WHERE n.id = ?1", NODE_COLUMNS);
        Ok(self.query(&sql, [id], node_from_row)?.into_iter().next())
    }

    /// Hydrate vector ordinals into nodes of one corpus.
    pub fn nodes_by_chunk_indices(
        &self,
        corpus: Corpus,
        chunk_indices: &[u32],
    ) -> Result<HashMap<u32, Node>, KnowledgeError> {
        if chunk_indices.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; chunk_indices.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM nodes n WHERE n.corpus = ? AND n.chunk_index IN ({})",
            NODE_COLUMNS, placeholders
        );

        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk_indices.len() + 1);
        values.push(corpus.as_str().to_string().into());
        values.extend(chunk_indices.iter().map(|&c| i64::from(c).into()));

        let nodes = self.query(&sql, rusqlite::params_from_iter(values), node_from_row)?;
        Ok(nodes
            .into_iter()
            .filter_map(|n| n.chunk_index.map(|c| (c, n)))
            .collect())
    }

    /// Case-sensitive existence check: exact display name or dotted suffix.
    pub fn entity_exists(&self, name: &str) -> Result<bool, KnowledgeError> {
        let count: Vec<i64> = self.query(
            "SELECT COUNT(*) FROM nodes
             WHERE display_name = ?1
                OR substr(display_name, -(length(?1) + 1)) = '.' || ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count.first().copied().unwrap_or(0) > 0)
    }

    /// Resolve a name to node ids, ignoring case. Exact matches come first.
    pub fn resolve_node_ids(&self, name: &str) -> Result<Vec<String>, KnowledgeError> {
        self.query(
            "SELECT id FROM nodes
             WHERE display_name = ?1 COLLATE NOCASE
                OR lower(substr(display_name, -(length(?1) + 1))) = '.' || lower(?1)
             ORDER BY (display_name = ?1 COLLATE NOCASE) DESC, id",
            [name],
            |row| row.get(0),
        )
    }

    /// `(chunk_index, text)` for every embedded node in a corpus, ordered.
    pub fn embedding_inputs(&self, corpus: Corpus) -> Result<Vec<(u32, String)>, KnowledgeError> {
        self.query(
            "SELECT chunk_index, COALESCE(embedding_text, content) FROM nodes
             WHERE corpus = ?1 AND chunk_index IS NOT NULL
             ORDER BY chunk_index",
            [corpus.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    pub fn count_nodes(&self, corpus: Corpus) -> Result<u64, KnowledgeError> {
        let rows: Vec<i64> = self.query(
            "SELECT COUNT(*) FROM nodes WHERE corpus = ?1",
            [corpus.as_str()],
            |row| row.get(0),
        )?;
        Ok(rows.first().copied().unwrap_or(0) as u64)
    }

    /// node_type counts; gamedata also reports `data_type:<name>` counts.
    pub fn type_breakdown(&self, corpus: Corpus) -> Result<BTreeMap<String, u64>, KnowledgeError> {
        let mut breakdown: BTreeMap<String, u64> = self
            .query(
                "SELECT node_type, COUNT(*) FROM nodes WHERE corpus = ?1 GROUP BY node_type",
                [corpus.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
            )?
            .into_iter()
            .collect();

        if corpus == Corpus::Gamedata {
            let by_data_type = self.query(
                "SELECT data_type, COUNT(*) FROM nodes
                 WHERE corpus = ?1 AND data_type IS NOT NULL GROUP BY data_type",
                [corpus.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
            )?;
            for (data_type, count) in by_data_type {
                breakdown.insert(format!("data_type:{}", data_type), count);
            }
        }

        Ok(breakdown)
    }

    /// Edges whose source node belongs to the corpus.
    pub fn count_edges(&self, corpus: Corpus) -> Result<u64, KnowledgeError> {
        let rows: Vec<i64> = self.query(
            "SELECT COUNT(*) FROM edges e JOIN nodes n ON n.id = e.source_id WHERE n.corpus = ?1",
            [corpus.as_str()],
            |row| row.get(0),
        )?;
        Ok(rows.first().copied().unwrap_or(0) as u64)
    }
}

/// Fail fast on files that are not SQLite databases.
fn check_integrity(conn: &Connection, path: &Path) -> Result<(), KnowledgeError> {
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|e| {
            KnowledgeError::Database(format!("{} is not a usable store: {}", path.display(), e))
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ontology::EdgeType;
    use tempfile::TempDir;

    fn sample_nodes() -> Vec<Node> {
        vec![
            Node::new("code:registry", "JavaClass", "com.example.ItemRegistry", Corpus::Code)
                .with_embedding(0, "class ItemRegistry"),
            Node::new("gd:torch", "GameData", "Torch", Corpus::Gamedata)
                .with_data_type("item")
                .with_embedding(0, "Torch item"),
            Node::new("gd:goblin", "GameData", "Goblin", Corpus::Gamedata)
                .with_data_type("npc")
                .with_embedding(1, "Goblin npc"),
        ]
    }

    #[test]
    fn test_upsert_and_get_node() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_nodes(&sample_nodes()).unwrap();

        let torch = store.get_node("gd:torch").unwrap().unwrap();
        assert_eq!(torch.corpus, Corpus::Gamedata);
        assert_eq!(torch.data_type.as_deref(), Some("item"));

        // Re-ingesting updates in place
        let renamed = torch.clone().with_content("bright");
        store.upsert_nodes(&[renamed]).unwrap();
        assert_eq!(store.get_node("gd:torch").unwrap().unwrap().content, "bright");
        assert_eq!(store.count_nodes(Corpus::Gamedata).unwrap(), 2);
    }

    #[test]
    fn test_edge_upsert_is_unique() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_nodes(&sample_nodes()).unwrap();
        let edge = Edge::new("gd:goblin", "gd:torch", EdgeType::DropsItem);
        store.upsert_edges(&[edge.clone(), edge.clone().unresolved()]).unwrap();

        let rows: Vec<bool> = store
            .query("SELECT target_resolved FROM edges", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, vec![false]);
        assert_eq!(store.count_edges(Corpus::Gamedata).unwrap(), 1);
        assert_eq!(store.count_edges(Corpus::Code).unwrap(), 0);
    }

    #[test]
    fn test_entity_exists_suffix_and_case() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_nodes(&sample_nodes()).unwrap();

        assert!(store.entity_exists("ItemRegistry").unwrap());
        assert!(store.entity_exists("com.example.ItemRegistry").unwrap());
        assert!(!store.entity_exists("itemregistry").unwrap());
        assert!(!store.entity_exists("Registry").unwrap());

        assert_eq!(store.resolve_node_ids("goblin").unwrap(), vec!["gd:goblin"]);
        assert_eq!(store.resolve_node_ids("itemregistry").unwrap(), vec!["code:registry"]);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = GraphStore::open_in_memory().unwrap();
        let result: Result<(), KnowledgeError> = store.in_transaction(|tx| {
            tx.execute(
                "INSERT INTO nodes (id, node_type, display_name) VALUES ('x', 't', 'X')",
                [],
            )?;
            Err(KnowledgeError::InvalidRequest("abort".into()))
        });
        assert!(result.is_err());
        assert!(store.get_node("x").unwrap().is_none());
    }

    #[test]
    fn test_chunk_hydration_scoped_to_corpus() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_nodes(&sample_nodes()).unwrap();

        let hydrated = store.nodes_by_chunk_indices(Corpus::Gamedata, &[0, 1, 7]).unwrap();
        assert_eq!(hydrated.len(), 2);
        assert_eq!(hydrated[&0].id, "gd:torch");

        let inputs = store.embedding_inputs(Corpus::Gamedata).unwrap();
        assert_eq!(inputs, vec![(0, "Torch item".to_string()), (1, "Goblin npc".to_string())]);
    }

    #[test]
    fn test_type_breakdown_includes_data_types_for_gamedata() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_nodes(&sample_nodes()).unwrap();
        let breakdown = store.type_breakdown(Corpus::Gamedata).unwrap();
        assert_eq!(breakdown["GameData"], 2);
        assert_eq!(breakdown["data_type:npc"], 1);
        assert!(!store.type_breakdown(Corpus::Code).unwrap().contains_key("data_type:npc"));
    }

    #[test]
    fn test_open_creates_parent_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("knowledge.db");
        {
            let store = GraphStore::open(&path).unwrap();
            store.upsert_nodes(&sample_nodes()).unwrap();
            assert_eq!(store.schema_version().unwrap(), migrations::LATEST_VERSION);
        }
        let reopened = GraphStore::open(&path).unwrap();
        assert_eq!(reopened.count_nodes(Corpus::Code).unwrap(), 1);
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
        let err = GraphStore::open(&path).err().unwrap();
        assert!(matches!(err, KnowledgeError::Database(_)));
    }

    #[test]
    fn test_remove_file() {
        let store = GraphStore::open_in_memory().unwrap();
        let nodes = vec![
            Node::new("a", "JavaClass", "A", Corpus::Code).with_owning_file("A.java"),
            Node::new("b", "JavaClass", "B", Corpus::Code).with_owning_file("B.java"),
        ];
        store.upsert_nodes(&nodes).unwrap();
        store
            .upsert_edges(&[Edge::new("a", "b", EdgeType::Calls).with_owning_file("A.java")])
            .unwrap();

        assert_eq!(store.remove_file("A.java").unwrap(), 1);
        assert!(store.get_node("a").unwrap().is_none());
        assert_eq!(store.count_edges(Corpus::Code).unwrap(), 0);
    }
}
