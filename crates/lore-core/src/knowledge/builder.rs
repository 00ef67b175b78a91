//! Build-time vector index construction.

use std::time::Instant;

use super::embedder::{embed_in_waves, WaveOptions};
use super::error::KnowledgeError;
use super::ontology::Corpus;
use super::service::RetrievalService;
use super::vector::VectorIndex;

/// Summary of one corpus build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub corpus: Corpus,
    pub vectors: usize,
    pub dimension: usize,
    pub elapsed_ms: u64,
}

/// Embeds a corpus and (re)builds its index.
pub struct IndexBuilder<'a> {
    service: &'a RetrievalService,
    waves: WaveOptions,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(service: &'a RetrievalService, waves: WaveOptions) -> Self {
        Self { service, waves }
    }

    /// Embed every chunk of `corpus`, build a fresh index, save it to the
    /// corpus path and install it. `progress(done, total)` fires after
    /// each embedding wave.
    pub async fn build_corpus_index(
        &self,
        corpus: Corpus,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<BuildReport, KnowledgeError> {
        let started = Instant::now();
        let inputs = self.service.store().embedding_inputs(corpus)?;
        check_dense(corpus, &inputs)?;

        let texts: Vec<String> = inputs.into_iter().map(|(_, text)| text).collect();
        let total = texts.len();
        tracing::info!(corpus = %corpus, chunks = total, "embedding corpus");

        let embedder = self.service.embedder();
        let vectors = embed_in_waves(embedder.as_ref(), &texts, self.waves, |done| progress(done, total)).await?;

        let mut index = VectorIndex::new(self.service.index_params());
        index.set_model_id(embedder.model_id());
        let count = index.build(&vectors)?;

        let path = self.service.storage().index_path(corpus);
        index.save(&path)?;

        // Serve from the saved file so memory use matches a fresh start
        let mapped = VectorIndex::open(&path, self.service.index_params())?;
        self.service.install_index(corpus, mapped).await;

        let report = BuildReport {
            corpus,
            vectors: count,
            dimension: vectors.first().map(Vec::len).unwrap_or(0),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(corpus = %corpus, vectors = report.vectors, path = %path.display(), elapsed_ms = report.elapsed_ms, "vector index built");
        Ok(report)
    }
}

/// Chunk indices must run 0..N-1 so ordinals address nodes directly.
fn check_dense(corpus: Corpus, inputs: &[(u32, String)]) -> Result<(), KnowledgeError> {
    for (expected, (chunk, _)) in inputs.iter().enumerate() {
        if *chunk as usize != expected {
            return Err(KnowledgeError::Index(format!(
                "{} chunk indices are not dense: expected {}, found {}",
                corpus, expected, chunk
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::knowledge::db::GraphStore;
    use crate::knowledge::embedder::testing::HashEmbedder;
    use crate::knowledge::models::Node;
    use std::sync::Arc;
    use std::time::Duration;

    fn waves() -> WaveOptions {
        WaveOptions {
            batch_size: 2,
            wave_size: 2,
            delay: Duration::ZERO,
        }
    }

    fn doc(id: &str, chunk: u32, text: &str) -> Node {
        Node::new(id, "DocPage", id, Corpus::Docs)
            .with_content(text)
            .with_embedding(chunk, text)
    }

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_build_saves_and_installs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        store
            .upsert_nodes(&[
                doc("doc:a", 0, "crafting guide for torches"),
                doc("doc:b", 1, "combat basics and goblins"),
                doc("doc:c", 2, "shop prices and merchants"),
                doc("doc:d", 3, "server configuration"),
                doc("doc:e", 4, "lighting in caves"),
            ])
            .unwrap();
        let service = RetrievalService::new(store, Arc::new(HashEmbedder::new(32)), &config).unwrap();

        let mut seen = Vec::new();
        let report = IndexBuilder::new(&service, waves())
            .build_corpus_index(Corpus::Docs, |done, total| seen.push((done, total)))
            .await
            .unwrap();

        assert_eq!(report.vectors, 5);
        assert_eq!(report.dimension, 32);
        assert_eq!(seen, vec![(4, 5), (5, 5)]);
        assert!(config.storage.index_path(Corpus::Docs).exists());
        assert!(service.corpus_stats(Corpus::Docs).await.unwrap().vector_index_loaded);

        let results = service.search_corpus(Corpus::Docs, "server configuration", 1).await.unwrap();
        assert_eq!(results[0].node_id, "doc:d");
    }

    #[tokio::test]
    async fn test_gap_in_chunk_indices_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        store
            .upsert_nodes(&[doc("doc:a", 0, "one"), doc("doc:b", 2, "two")])
            .unwrap();
        let service = RetrievalService::new(store, Arc::new(HashEmbedder::new(8)), &config(dir.path())).unwrap();

        let err = IndexBuilder::new(&service, waves())
            .build_corpus_index(Corpus::Docs, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Index(_)));
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let service = RetrievalService::new(store, Arc::new(HashEmbedder::new(8)), &config(dir.path())).unwrap();

        let report = IndexBuilder::new(&service, waves())
            .build_corpus_index(Corpus::Client, |_, _| {})
            .await
            .unwrap();
        assert_eq!(report.vectors, 0);
        assert!(service.search_corpus(Corpus::Client, "anything", 5).await.unwrap().is_empty());
    }
}
