use std::sync::Arc;
use std::thread;

use lore_core::config::StorageConfig;
use lore_core::knowledge::migrations::LATEST_VERSION;
use lore_core::knowledge::{Corpus, Edge, EdgeType, GraphStore, KnowledgeError, Node};
use tempfile::TempDir;

fn create_test_store() -> (GraphStore, TempDir, StorageConfig) {
    let temp_dir = TempDir::new().unwrap();
    let config = StorageConfig {
        data_dir: temp_dir.path().join("data").to_string_lossy().to_string(),
        ..StorageConfig::default()
    };
    let store = GraphStore::open_with_config(&config).unwrap();
    (store, temp_dir, config)
}

fn item(id: &str, name: &str, chunk: u32) -> Node {
    Node::new(id, "GameData", name, Corpus::Gamedata)
        .with_data_type("item")
        .with_content(format!("{} item", name))
        .with_embedding(chunk, name)
        .with_owning_file("items.json")
}

#[test]
fn test_open_with_config_runs_migrations() {
    let (store, _temp, config) = create_test_store();
    assert_eq!(store.schema_version().unwrap(), LATEST_VERSION);
    assert_eq!(store.path(), Some(config.db_path().as_path()));
    assert!(config.db_path().exists());
}

#[test]
fn test_data_survives_reopen() {
    let (store, _temp, config) = create_test_store();
    store
        .upsert_nodes(&[item("item:torch", "Torch", 0), item("item:stick", "Stick", 1)])
        .unwrap();
    store
        .upsert_edges(&[Edge::new("item:torch", "item:stick", EdgeType::RequiresItem)])
        .unwrap();
    drop(store);

    let reopened = GraphStore::open_with_config(&config).unwrap();
    assert_eq!(reopened.schema_version().unwrap(), LATEST_VERSION);
    assert_eq!(reopened.count_nodes(Corpus::Gamedata).unwrap(), 2);
    assert_eq!(reopened.count_edges(Corpus::Gamedata).unwrap(), 1);
    let torch = reopened.get_node("item:torch").unwrap().unwrap();
    assert_eq!(torch.display_name, "Torch");
    assert_eq!(torch.chunk_index, Some(0));
}

#[test]
fn test_failed_transaction_leaves_no_rows() {
    let (store, _temp, _config) = create_test_store();

    let result: Result<(), KnowledgeError> = store.in_transaction(|tx| {
        tx.execute(
            "INSERT INTO nodes (id, node_type, display_name, corpus) VALUES ('x', 'GameData', 'X', 'gamedata')",
            [],
        )?;
        Err(KnowledgeError::Database("abort".to_string()))
    });

    assert!(result.is_err());
    assert!(store.get_node("x").unwrap().is_none());
}

#[test]
fn test_readers_see_committed_writes_across_threads() {
    let (store, _temp, _config) = create_test_store();
    let store = Arc::new(store);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..20u32 {
                store
                    .upsert_nodes(&[item(&format!("item:{}", i), &format!("Item{}", i), i)])
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..20 {
                    let count = store.count_nodes(Corpus::Gamedata).unwrap();
                    assert!(count >= last);
                    last = count;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.count_nodes(Corpus::Gamedata).unwrap(), 20);
}

#[test]
fn test_remove_file_clears_owned_rows() {
    let (store, _temp, _config) = create_test_store();
    store
        .upsert_nodes(&[
            item("item:torch", "Torch", 0),
            Node::new("doc:intro", "DocPage", "Intro", Corpus::Docs).with_owning_file("intro.md"),
        ])
        .unwrap();
    store
        .upsert_edges(&[Edge::new("item:torch", "doc:intro", EdgeType::DocsReferences).with_owning_file("items.json")])
        .unwrap();

    assert_eq!(store.remove_file("items.json").unwrap(), 1);
    assert!(store.get_node("item:torch").unwrap().is_none());
    assert!(store.get_node("doc:intro").unwrap().is_some());
    assert_eq!(store.count_edges(Corpus::Gamedata).unwrap(), 0);
}

#[test]
fn test_garbage_file_fails_to_open() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("knowledge.db");
    std::fs::write(&path, vec![0x5a; 8192]).unwrap();

    assert!(matches!(GraphStore::open(&path), Err(KnowledgeError::Database(_))));
}
