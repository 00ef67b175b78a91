//! Retrieval orchestration.
//!
//! Routes a query, runs graph and/or vector search per corpus, gates
//! gamedata noise, expands across corpora and merges everything into one
//! ranked list. Store and embedding failures degrade to fewer results,
//! never to an error for the caller.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::db::GraphStore;
use super::embedder::{EmbeddingBackend, EmbeddingProvider};
use super::error::KnowledgeError;
use super::expansion::{self, ExpansionParams};
use super::intent::detect_gamedata_intent;
use super::models::{CorpusStats, ResultSource, RouteResult, SearchResult, Strategy};
use super::ontology::Corpus;
use super::router::QueryRouter;
use super::scorer::{deduplicate, sort_by_score, HybridScorer};
use super::traversal::GraphTraversal;
use super::vector::{IndexParams, VectorIndex};
use crate::config::{Config, RetrievalConfig, StorageConfig};

/// A search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Corpora to search directly. Empty means all of them.
    pub corpora: Vec<Corpus>,
    /// Results per corpus; `None` uses the configured default.
    pub limit: Option<usize>,
    /// Restrict to a data type or node type, ignoring case.
    pub type_filter: Option<String>,
    /// Cross-corpus expansion; `None` uses the configured default.
    pub expand: Option<bool>,
    pub cancel: Option<CancellationToken>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            corpora: Vec::new(),
            limit: None,
            type_filter: None,
            expand: None,
            cancel: None,
        }
    }

    pub fn corpus(mut self, corpus: Corpus) -> Self {
        self.corpora.push(corpus);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn type_filter(mut self, type_filter: impl Into<String>) -> Self {
        self.type_filter = Some(type_filter.into());
        self
    }

    pub fn expand(mut self, expand: bool) -> Self {
        self.expand = Some(expand);
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Ranked results for one request.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub request_id: String,
    pub query: String,
    pub route: RouteResult,
    pub results: Vec<SearchResult>,
    /// True when the request was cancelled and `results` is partial.
    pub cancelled: bool,
}

/// Query-time entry point over one knowledge base.
pub struct RetrievalService {
    store: Arc<GraphStore>,
    traversal: GraphTraversal,
    router: QueryRouter,
    scorer: HybridScorer,
    embedder: Arc<dyn EmbeddingProvider>,
    indices: HashMap<Corpus, RwLock<Arc<VectorIndex>>>,
    index_params: IndexParams,
    storage: StorageConfig,
    config: RetrievalConfig,
}

impl RetrievalService {
    /// Assemble a service from parts. Indices start unloaded.
    pub fn new(
        store: Arc<GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &Config,
    ) -> Result<Self, KnowledgeError> {
        let index_params = IndexParams::from(config.index.clone());
        let indices = Corpus::ALL
            .iter()
            .map(|c| (*c, RwLock::new(Arc::new(VectorIndex::new(index_params)))))
            .collect();

        Ok(Self {
            traversal: GraphTraversal::new(Arc::clone(&store)).with_snippet_chars(config.retrieval.snippet_chars),
            store,
            router: QueryRouter::new()?,
            scorer: HybridScorer::new(config.retrieval.rrf_k),
            embedder,
            indices,
            index_params,
            storage: config.storage.clone(),
            config: config.retrieval.clone(),
        })
    }

    /// Open the store, build the configured embedder and load every saved
    /// index.
    pub async fn open(config: &Config) -> Result<Self, KnowledgeError> {
        let store = Arc::new(GraphStore::open_with_config(&config.storage)?);
        let backend = EmbeddingBackend::from_config(&config.embedding);
        let embedder = tokio::task::spawn_blocking(move || backend.build())
            .await
            .map_err(|e| KnowledgeError::Config(format!("embedder init panicked: {}", e)))??;

        let service = Self::new(store, embedder, config)?;
        service.load_indices().await;
        Ok(service)
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn index_params(&self) -> IndexParams {
        self.index_params
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Load saved indices for every corpus that has one. A missing file
    /// leaves the corpus without vector search; a bad file is logged and
    /// skipped. Returns how many were loaded.
    pub async fn load_indices(&self) -> usize {
        let mut loaded = 0;
        for corpus in Corpus::ALL {
            let path = self.storage.index_path(corpus);
            if !path.exists() {
                tracing::debug!(corpus = %corpus, path = %path.display(), "no vector index on disk");
                continue;
            }

            match VectorIndex::open(&path, self.index_params) {
                Ok(index) => {
                    if !index.matches_model(self.embedder.model_id()) {
                        tracing::warn!(
                            corpus = %corpus,
                            model = self.embedder.model_id(),
                            "vector index was built with a different embedding model"
                        );
                    }
                    self.install_index(corpus, index).await;
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(corpus = %corpus, path = %path.display(), error = %e, "failed to load vector index");
                }
            }
        }
        loaded
    }

    /// Swap in a new index for `corpus`. In-flight queries keep the old one.
    pub async fn install_index(&self, corpus: Corpus, index: VectorIndex) {
        if let Some(slot) = self.indices.get(&corpus) {
            *slot.write().await = Arc::new(index);
            tracing::info!(corpus = %corpus, "installed vector index");
        }
    }

    async fn index(&self, corpus: Corpus) -> Option<Arc<VectorIndex>> {
        match self.indices.get(&corpus) {
            Some(slot) => Some(Arc::clone(&*slot.read().await)),
            None => None,
        }
    }

    /// Route a query without running it.
    pub fn route(&self, query: &str) -> RouteResult {
        self.router.route(query, self.store.as_ref())
    }

    /// Search one corpus with default options.
    pub async fn search_corpus(
        &self,
        corpus: Corpus,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        let response = self.search(SearchRequest::new(query).corpus(corpus).limit(limit)).await?;
        Ok(response.results)
    }

    /// Run a search.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, KnowledgeError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("search", request_id = %request_id);
        self.run_search(request, request_id).instrument(span).await
    }

    async fn run_search(&self, request: SearchRequest, request_id: String) -> Result<SearchResponse, KnowledgeError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(KnowledgeError::InvalidRequest("query must not be empty".to_string()));
        }

        let started = Instant::now();
        let corpora = if request.corpora.is_empty() {
            Corpus::ALL.to_vec()
        } else {
            request.corpora.clone()
        };
        let limit = match request.limit {
            Some(0) | None => self.config.default_limit,
            Some(n) => n,
        };
        let type_filter = request.type_filter.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let cancel = request.cancel.as_ref();

        let route = self.route(&query);
        let intent = detect_gamedata_intent(&query);
        tracing::debug!(strategy = ?route.strategy, entity = ?route.entity_name, relation = ?route.relation, "routed");

        let mut ctx = QueryContext::new(self.embedder.as_ref(), &query);
        let mut direct: Vec<SearchResult> = Vec::new();
        let mut cancelled = false;

        for corpus in &corpora {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                cancelled = true;
                break;
            }
            let floor = self.unintended_floor(*corpus, type_filter, &intent);
            let mut results = self.search_one(*corpus, &route, limit, floor, &mut ctx).await;
            self.filter(*corpus, type_filter, &intent, &mut results);
            results.truncate(limit);
            direct.extend(results);
        }

        let mut expanded = Vec::new();
        if !cancelled && request.expand.unwrap_or(self.config.expand_by_default) {
            let params = ExpansionParams::from(&self.config);
            let expansion = expansion::expand(&self.traversal, &mut direct, &params, cancel);
            cancelled = expansion.cancelled;
            expanded = expansion.results;
        }

        let direct_count = direct.len();
        let expanded_count = expanded.len();
        direct.extend(expanded);
        let mut results = deduplicate(direct);
        sort_by_score(&mut results);

        tracing::info!(
            strategy = ?route.strategy,
            direct = direct_count,
            expanded = expanded_count,
            returned = results.len(),
            cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        Ok(SearchResponse {
            request_id,
            query,
            route,
            results,
            cancelled,
        })
    }

    /// Direct results for one corpus, before filtering. Vector hits under
    /// `floor` are dropped before they can be fused.
    async fn search_one(
        &self,
        corpus: Corpus,
        route: &RouteResult,
        limit: usize,
        floor: Option<f32>,
        ctx: &mut QueryContext<'_>,
    ) -> Vec<SearchResult> {
        // Filters run after retrieval, so over-fetch from the index
        let fetch = limit.saturating_mul(2);

        match (route.strategy, route.entity_name.as_deref()) {
            (Strategy::Vector, _) | (_, None) => self.gated_vector_search(corpus, fetch, floor, ctx).await,
            (Strategy::Graph, Some(entity)) => {
                let graph = self.graph_hits(route, entity, limit, ctx, corpus);
                if graph.is_empty() {
                    tracing::debug!(corpus = %corpus, entity, "graph route empty, falling back to vector");
                    self.gated_vector_search(corpus, fetch, floor, ctx).await
                } else {
                    graph
                }
            }
            (Strategy::Hybrid, Some(entity)) => {
                let graph = self.graph_hits(route, entity, limit, ctx, corpus);
                if ctx.embedding().await.is_none() {
                    return graph;
                }
                let vector = self.gated_vector_search(corpus, fetch, floor, ctx).await;
                if vector.is_empty() || graph.is_empty() {
                    // Nothing to fuse; keep the surviving list's own scores
                    return if graph.is_empty() { vector } else { graph };
                }
                self.scorer.merge_rrf(&[graph, vector], fetch)
            }
        }
    }

    /// Graph hits for the route, scoped to `corpus`. Name lookups run per
    /// corpus with their own `limit`; relation traversals are unbounded and
    /// run once per request.
    fn graph_hits(
        &self,
        route: &RouteResult,
        entity: &str,
        limit: usize,
        ctx: &mut QueryContext<'_>,
        corpus: Corpus,
    ) -> Vec<SearchResult> {
        if route.relation.is_none() {
            return match self.traversal.find_by_name_in(entity, Some(corpus), limit) {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(entity, corpus = %corpus, error = %e, "name lookup failed");
                    Vec::new()
                }
            };
        }

        let all = ctx.graph.get_or_insert_with(|| {
            match self.traversal.for_route(route.strategy, entity, route.relation, limit) {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(entity, error = %e, "graph traversal failed");
                    Vec::new()
                }
            }
        });
        all.iter().filter(|r| r.corpus == corpus).cloned().collect()
    }

    async fn gated_vector_search(
        &self,
        corpus: Corpus,
        k: usize,
        floor: Option<f32>,
        ctx: &mut QueryContext<'_>,
    ) -> Vec<SearchResult> {
        let mut hits = self.vector_search(corpus, k, ctx).await;
        if let Some(floor) = floor {
            let before = hits.len();
            hits.retain(|r| r.score >= floor);
            tracing::debug!(corpus = %corpus, floor, dropped = before - hits.len(), "gated unintended vector hits");
        }
        hits
    }

    async fn vector_search(&self, corpus: Corpus, k: usize, ctx: &mut QueryContext<'_>) -> Vec<SearchResult> {
        let Some(index) = self.index(corpus).await else {
            return Vec::new();
        };
        if !index.is_loaded() {
            tracing::debug!(corpus = %corpus, "no vector index loaded");
            return Vec::new();
        }
        let Some(embedding) = ctx.embedding().await else {
            return Vec::new();
        };

        let hits = match index.query(embedding, k) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(corpus = %corpus, error = %e, "vector query failed");
                return Vec::new();
            }
        };

        let ordinals: Vec<u32> = hits.iter().map(|(ordinal, _)| *ordinal).collect();
        let nodes = match self.store.nodes_by_chunk_indices(corpus, &ordinals) {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(corpus = %corpus, error = %e, "failed to hydrate vector hits");
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter_map(|(ordinal, score)| match nodes.get(&ordinal) {
                Some(node) => Some(SearchResult::from_node(
                    node,
                    score,
                    ResultSource::Vector,
                    self.config.snippet_chars,
                )),
                None => {
                    tracing::debug!(corpus = %corpus, ordinal, "vector hit has no node");
                    None
                }
            })
            .collect()
    }

    /// Score floor for vector hits: gamedata queried without a type filter
    /// or any gamedata intent.
    fn unintended_floor(
        &self,
        corpus: Corpus,
        type_filter: Option<&str>,
        intent: &BTreeSet<&'static str>,
    ) -> Option<f32> {
        (corpus == Corpus::Gamedata && type_filter.is_none() && intent.is_empty())
            .then_some(self.config.gamedata_unintended_floor)
    }

    /// Apply the type filter, or gamedata intent gating when there is none.
    fn filter(
        &self,
        corpus: Corpus,
        type_filter: Option<&str>,
        intent: &BTreeSet<&'static str>,
        results: &mut Vec<SearchResult>,
    ) {
        if let Some(filter) = type_filter {
            results.retain(|r| r.matches_type(filter));
            return;
        }
        if corpus == Corpus::Gamedata && !intent.is_empty() {
            results.retain(|r| {
                r.data_type
                    .as_deref()
                    .is_some_and(|t| intent.iter().any(|i| i.eq_ignore_ascii_case(t)))
            });
        }
    }

    /// Node, type and edge counts for a corpus.
    pub async fn corpus_stats(&self, corpus: Corpus) -> Result<CorpusStats, KnowledgeError> {
        let vector_index_loaded = match self.index(corpus).await {
            Some(index) => index.is_loaded(),
            None => false,
        };
        Ok(CorpusStats {
            corpus,
            node_count: self.store.count_nodes(corpus)?,
            type_breakdown: self.store.type_breakdown(corpus)?,
            edge_count: self.store.count_edges(corpus)?,
            vector_index_loaded,
        })
    }
}

/// Per-request lazily computed state shared across corpora.
struct QueryContext<'a> {
    embedder: &'a dyn EmbeddingProvider,
    query: &'a str,
    embedding: Option<Option<Vec<f32>>>,
    graph: Option<Vec<SearchResult>>,
}

impl<'a> QueryContext<'a> {
    fn new(embedder: &'a dyn EmbeddingProvider, query: &'a str) -> Self {
        Self {
            embedder,
            query,
            embedding: None,
            graph: None,
        }
    }

    /// Query embedding, computed on first use. `None` once embedding failed.
    async fn embedding(&mut self) -> Option<&[f32]> {
        if self.embedding.is_none() {
            let vector = match self.embedder.embed_query(self.query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "query embedding failed, vector search unavailable");
                    None
                }
            };
            self.embedding = Some(vector);
        }
        self.embedding.as_ref().and_then(|v| v.as_deref())
    }
}
