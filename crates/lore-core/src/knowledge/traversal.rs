//! Named graph queries over the typed node/edge store.
//!
//! Every method returns [`SearchResult`]s tagged [`ResultSource::Graph`].
//! Edges whose target is virtual (`target_resolved = 0`) never surface as
//! nodes, and a seed name that resolves to nothing yields an empty list.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::types::Value;

use super::db::{node_from_row, GraphStore, NODE_COLUMNS};
use super::error::KnowledgeError;
use super::models::{Node, ResultSource, SearchResult, Strategy};
use super::ontology::{Corpus, Direction, EdgeType};
use crate::config::DEFAULT_SNIPPET_CHARS;

/// Score of a traversal hit.
pub const GRAPH_SCORE: f32 = 1.0;

/// Score of a prefix or suffix name match.
pub const PARTIAL_NAME_SCORE: f32 = 0.7;

const RECIPE: &str = "recipe";

/// Graph traversal operations.
pub struct GraphTraversal {
    store: Arc<GraphStore>,
    snippet_chars: usize,
}

impl GraphTraversal {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }

    pub fn with_snippet_chars(mut self, snippet_chars: usize) -> Self {
        self.snippet_chars = snippet_chars;
        self
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Nodes one resolved edge away from `seed_id`.
    pub fn direct_edges(
        &self,
        seed_id: &str,
        edge_type: EdgeType,
        direction: Direction,
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        let nodes = self.neighbors(&[seed_id.to_string()], edge_type, direction, &[])?;
        Ok(self.project(nodes))
    }

    /// Like [`direct_edges`](Self::direct_edges), keeping only nodes in
    /// `target_corpus`.
    pub fn bridge(
        &self,
        seed_id: &str,
        edge_type: EdgeType,
        direction: Direction,
        target_corpus: Corpus,
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        let nodes = self.neighbors(&[seed_id.to_string()], edge_type, direction, &[target_corpus])?;
        Ok(self.project(nodes))
    }

    /// Walk one edge type from a set of seeds.
    fn neighbors(
        &self,
        seed_ids: &[String],
        edge_type: EdgeType,
        direction: Direction,
        corpora: &[Corpus],
    ) -> Result<Vec<Node>, KnowledgeError> {
        if seed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let (join_col, seed_col) = match direction {
            Direction::Forward => ("e.target_id", "e.source_id"),
            Direction::Reverse => ("e.source_id", "e.target_id"),
        };

        let seeds = vec!["?"; seed_ids.len()].join(", ");
        let mut sql = format!(
            "SELECT {cols} FROM edges e JOIN nodes n ON n.id = {join}
             WHERE {seed} IN ({seeds}) AND e.edge_type = ? AND e.target_resolved = 1",
            cols = NODE_COLUMNS,
            join = join_col,
            seed = seed_col,
            seeds = seeds,
        );

        let mut values: Vec<Value> = seed_ids.iter().map(|s| Value::from(s.clone())).collect();
        values.push(Value::from(edge_type.as_str().to_string()));

        if !corpora.is_empty() {
            sql.push_str(&format!(" AND n.corpus IN ({})", vec!["?"; corpora.len()].join(", ")));
            values.extend(corpora.iter().map(|c| Value::from(c.as_str().to_string())));
        }
        sql.push_str(" ORDER BY e.id");

        let nodes = self
            .store
            .query(&sql, rusqlite::params_from_iter(values), node_from_row)?;
        Ok(unique_nodes(nodes))
    }

    fn resolve(&self, name: &str) -> Result<Vec<String>, KnowledgeError> {
        let ids = self.store.resolve_node_ids(name)?;
        if ids.is_empty() {
            tracing::debug!(entity = name, "no nodes resolved for traversal seed");
        }
        Ok(ids)
    }

    fn from_name(
        &self,
        name: &str,
        edge_type: EdgeType,
        direction: Direction,
        corpora: &[Corpus],
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        let ids = self.resolve(name)?;
        Ok(self.project(self.neighbors(&ids, edge_type, direction, corpora)?))
    }

    fn project(&self, nodes: Vec<Node>) -> Vec<SearchResult> {
        nodes
            .iter()
            .map(|n| SearchResult::from_node(n, GRAPH_SCORE, ResultSource::Graph, self.snippet_chars))
            .collect()
    }

    // ------------------------------------------------------------------
    // Game data
    // ------------------------------------------------------------------

    /// Recipes producing `item` (or `item` itself when it is a recipe),
    /// followed by their ingredients.
    pub fn find_recipe_inputs(&self, item: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        let ids = self.resolve(item)?;

        let mut recipes: Vec<Node> = Vec::new();
        for id in &ids {
            if let Some(node) = self.store.get_node(id)? {
                if node.data_type.as_deref() == Some(RECIPE) {
                    recipes.push(node);
                }
            }
        }
        recipes.extend(self.neighbors(&ids, EdgeType::ProducesItem, Direction::Reverse, &[])?);
        let recipes = unique_nodes(recipes);

        let recipe_ids: Vec<String> = recipes.iter().map(|n| n.id.clone()).collect();
        let ingredients = self.neighbors(&recipe_ids, EdgeType::RequiresItem, Direction::Forward, &[])?;

        let mut all = recipes;
        all.extend(ingredients);
        Ok(self.project(unique_nodes(all)))
    }

    /// Recipes that take `item` as an input.
    pub fn find_items_requiring(&self, item: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(item, EdgeType::RequiresItem, Direction::Reverse, &[])
    }

    /// Items dropped by `npc` through DROPS_ON_DEATH then DROPS_ITEM.
    ///
    /// Group seeds are expanded to their members first. Only items reached
    /// through a fully resolved two-hop path are returned.
    pub fn find_drops_from(&self, npc: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        let mut seeds = self.resolve(npc)?;
        let members = self.neighbors(&seeds, EdgeType::HasMember, Direction::Forward, &[])?;
        seeds.extend(members.into_iter().map(|n| n.id));

        let drops = self.neighbors(&seeds, EdgeType::DropsOnDeath, Direction::Forward, &[])?;
        let drop_ids: Vec<String> = drops.into_iter().map(|n| n.id).collect();
        let items = self.neighbors(&drop_ids, EdgeType::DropsItem, Direction::Forward, &[])?;

        Ok(self.project(items))
    }

    /// Shops offering `item`.
    pub fn find_shops_selling(&self, item: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(item, EdgeType::OfferedInShop, Direction::Forward, &[])
    }

    /// Items offered in `shop`.
    pub fn find_shop_listings(&self, shop: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(shop, EdgeType::OfferedInShop, Direction::Reverse, &[])
    }

    pub fn find_group_members(&self, group: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(group, EdgeType::HasMember, Direction::Forward, &[])
    }

    pub fn find_groups_of(&self, member: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(member, EdgeType::HasMember, Direction::Reverse, &[])
    }

    // ------------------------------------------------------------------
    // Cross-corpus bridges
    // ------------------------------------------------------------------

    /// Client UI elements bound to a gamedata entity, or gamedata entities
    /// bound from a client element.
    pub fn find_ui_bindings(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        let ids = self.resolve(name)?;
        let mut nodes = self.neighbors(&ids, EdgeType::UiBindsTo, Direction::Reverse, &[Corpus::Client])?;
        nodes.extend(self.neighbors(&ids, EdgeType::UiBindsTo, Direction::Forward, &[Corpus::Gamedata])?);
        Ok(self.project(unique_nodes(nodes)))
    }

    /// Code symbols implementing a gamedata entity.
    pub fn find_implementations(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(name, EdgeType::ImplementedBy, Direction::Forward, &[Corpus::Code])
    }

    /// Code or gamedata entities referenced by a doc page.
    pub fn find_doc_references(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(
            name,
            EdgeType::DocsReferences,
            Direction::Forward,
            &[Corpus::Code, Corpus::Gamedata],
        )
    }

    // ------------------------------------------------------------------
    // Structural
    // ------------------------------------------------------------------

    pub fn find_subtypes(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(name, EdgeType::Extends, Direction::Reverse, &[])
    }

    pub fn find_implementors(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(name, EdgeType::Implements, Direction::Reverse, &[])
    }

    pub fn find_callers(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(name, EdgeType::Calls, Direction::Reverse, &[])
    }

    pub fn find_members(&self, name: &str) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.from_name(name, EdgeType::Contains, Direction::Forward, &[])
    }

    /// Forward first; if that is empty, the reverse direction.
    pub fn find_by_relation(&self, name: &str, relation: EdgeType) -> Result<Vec<SearchResult>, KnowledgeError> {
        let ids = self.resolve(name)?;
        let forward = self.neighbors(&ids, relation, Direction::Forward, &[])?;
        if !forward.is_empty() {
            return Ok(self.project(forward));
        }
        Ok(self.project(self.neighbors(&ids, relation, Direction::Reverse, &[])?))
    }

    /// Exact display-name matches (score 1.0) ahead of prefix or suffix
    /// matches (score 0.7). Case-insensitive.
    pub fn find_by_name(&self, name: &str, limit: usize) -> Result<Vec<SearchResult>, KnowledgeError> {
        self.find_by_name_in(name, None, limit)
    }

    /// [`find_by_name`](Self::find_by_name) restricted to one corpus, so
    /// `limit` applies to that corpus alone.
    pub fn find_by_name_in(
        &self,
        name: &str,
        corpus: Option<Corpus>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        let name = name.trim();
        if name.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {cols},
                CASE WHEN n.display_name = ?1 COLLATE NOCASE
                       OR lower(substr(n.display_name, -(length(?1) + 1))) = '.' || lower(?1)
                     THEN 1 ELSE 0 END AS exact
             FROM nodes n
             WHERE (n.display_name = ?1 COLLATE NOCASE
                OR substr(lower(n.display_name), 1, length(?1)) = lower(?1)
                OR substr(lower(n.display_name), -length(?1)) = lower(?1))
               AND (?3 IS NULL OR n.corpus = ?3)
             ORDER BY exact DESC, length(n.display_name), n.id
             LIMIT ?2",
            cols = NODE_COLUMNS
        );

        let rows = self.store.query(&sql, rusqlite::params![name, limit as i64, corpus.map(|c| c.as_str())], |row| {
            let exact: i64 = row.get(13)?;
            Ok((node_from_row(row)?, exact == 1))
        })?;

        Ok(rows
            .iter()
            .map(|(node, exact)| {
                let score = if *exact { GRAPH_SCORE } else { PARTIAL_NAME_SCORE };
                SearchResult::from_node(node, score, ResultSource::Graph, self.snippet_chars)
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run the traversal matching a routed query.
    pub fn for_route(
        &self,
        strategy: Strategy,
        entity: &str,
        relation: Option<EdgeType>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        let Some(relation) = relation else {
            return self.find_by_name(entity, limit);
        };

        let results = match relation {
            EdgeType::RequiresItem if strategy == Strategy::Hybrid => self.find_recipe_inputs(entity)?,
            EdgeType::RequiresItem => self.find_items_requiring(entity)?,
            EdgeType::DropsOnDeath => self.find_drops_from(entity)?,
            EdgeType::OfferedInShop => {
                let shops = self.find_shops_selling(entity)?;
                if shops.is_empty() {
                    self.find_shop_listings(entity)?
                } else {
                    shops
                }
            }
            EdgeType::HasMember => {
                let members = self.find_group_members(entity)?;
                if members.is_empty() {
                    self.find_groups_of(entity)?
                } else {
                    members
                }
            }
            EdgeType::UiBindsTo => self.find_ui_bindings(entity)?,
            EdgeType::ImplementedBy => self.find_implementations(entity)?,
            EdgeType::DocsReferences => self.find_doc_references(entity)?,
            EdgeType::Extends => self.or_relation(self.find_subtypes(entity)?, entity, relation)?,
            EdgeType::Implements => self.or_relation(self.find_implementors(entity)?, entity, relation)?,
            EdgeType::Calls => self.or_relation(self.find_callers(entity)?, entity, relation)?,
            EdgeType::Contains => self.or_relation(self.find_members(entity)?, entity, relation)?,
            EdgeType::Imports | EdgeType::ProducesItem | EdgeType::DropsItem => {
                self.find_by_relation(entity, relation)?
            }
        };

        Ok(results)
    }

    fn or_relation(
        &self,
        results: Vec<SearchResult>,
        entity: &str,
        relation: EdgeType,
    ) -> Result<Vec<SearchResult>, KnowledgeError> {
        if results.is_empty() {
            self.find_by_relation(entity, relation)
        } else {
            Ok(results)
        }
    }
}

/// Drop repeated node ids, keeping first occurrences.
fn unique_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut seen = HashSet::new();
    nodes.into_iter().filter(|n| seen.insert(n.id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::models::Edge;

    fn gd(id: &str, name: &str, data_type: &str) -> Node {
        Node::new(id, "GameData", name, Corpus::Gamedata).with_data_type(data_type)
    }

    fn fixture() -> GraphTraversal {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .upsert_nodes(&[
                gd("npc:goblin", "Goblin", "npc"),
                gd("drop:goblin", "Goblin Drops", "drop"),
                gd("item:gold", "GoldCoin", "item"),
                gd("item:torch", "Torch", "item"),
                gd("item:stick", "Stick", "item"),
                gd("item:coal", "Coal", "item"),
                gd("recipe:torch", "Torch Recipe", "recipe"),
                gd("shop:general", "General Store", "shop"),
                gd("group:cave", "Cave Dwellers", "npc_group"),
                gd("npc:bat", "Bat", "npc"),
                gd("drop:bat", "Bat Drops", "drop"),
                Node::new("code:torch", "JavaClass", "com.game.TorchItem", Corpus::Code),
                Node::new("ui:torch", "ui", "TorchSlot", Corpus::Client),
                Node::new("code:abs", "JavaClass", "AbstractController", Corpus::Code),
                Node::new("code:npc", "JavaClass", "NpcController", Corpus::Code),
            ])
            .unwrap();
        store
            .upsert_edges(&[
                Edge::new("npc:goblin", "drop:goblin", EdgeType::DropsOnDeath),
                Edge::new("drop:goblin", "item:gold", EdgeType::DropsItem),
                Edge::new("drop:goblin", "item:phantom", EdgeType::DropsItem).unresolved(),
                Edge::new("recipe:torch", "item:torch", EdgeType::ProducesItem),
                Edge::new("recipe:torch", "item:stick", EdgeType::RequiresItem),
                Edge::new("recipe:torch", "item:coal", EdgeType::RequiresItem),
                Edge::new("item:torch", "shop:general", EdgeType::OfferedInShop),
                Edge::new("group:cave", "npc:bat", EdgeType::HasMember),
                Edge::new("npc:bat", "drop:bat", EdgeType::DropsOnDeath),
                Edge::new("drop:bat", "item:coal", EdgeType::DropsItem),
                Edge::new("item:torch", "code:torch", EdgeType::ImplementedBy),
                Edge::new("item:torch", "ui:torch", EdgeType::ImplementedBy),
                Edge::new("ui:torch", "item:torch", EdgeType::UiBindsTo),
                Edge::new("code:npc", "code:abs", EdgeType::Extends),
            ])
            .unwrap();
        GraphTraversal::new(Arc::new(store))
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.node_id.as_str()).collect()
    }

    #[test]
    fn test_drops_follow_resolved_two_hop_paths() {
        let t = fixture();
        let drops = t.find_drops_from("goblin").unwrap();
        assert_eq!(ids(&drops), vec!["item:gold"]);
        assert!(drops.iter().all(|r| r.source == ResultSource::Graph && r.score == GRAPH_SCORE));
    }

    #[test]
    fn test_drops_expand_groups() {
        let t = fixture();
        assert_eq!(ids(&t.find_drops_from("Cave Dwellers").unwrap()), vec!["item:coal"]);
    }

    #[test]
    fn test_unresolved_targets_never_projected() {
        let t = fixture();
        let direct = t.direct_edges("drop:goblin", EdgeType::DropsItem, Direction::Forward).unwrap();
        assert_eq!(ids(&direct), vec!["item:gold"]);
    }

    #[test]
    fn test_recipe_inputs() {
        let t = fixture();
        let results = t.find_recipe_inputs("torch").unwrap();
        assert_eq!(ids(&results), vec!["recipe:torch", "item:stick", "item:coal"]);

        let uses = t.find_items_requiring("coal").unwrap();
        assert_eq!(ids(&uses), vec!["recipe:torch"]);
    }

    #[test]
    fn test_bridges_respect_target_corpus() {
        let t = fixture();
        // The ImplementedBy edge to a client node is not corpus-pure
        assert_eq!(ids(&t.find_implementations("Torch").unwrap()), vec!["code:torch"]);
        assert_eq!(ids(&t.find_ui_bindings("Torch").unwrap()), vec!["ui:torch"]);
        assert_eq!(ids(&t.find_ui_bindings("TorchSlot").unwrap()), vec!["item:torch"]);

        let bridged = t
            .bridge("item:torch", EdgeType::ImplementedBy, Direction::Forward, Corpus::Client)
            .unwrap();
        assert_eq!(ids(&bridged), vec!["ui:torch"]);
    }

    #[test]
    fn test_find_by_relation_falls_back_to_reverse() {
        let t = fixture();
        assert_eq!(
            ids(&t.find_by_relation("NpcController", EdgeType::Extends).unwrap()),
            vec!["code:abs"]
        );
        assert_eq!(
            ids(&t.find_by_relation("AbstractController", EdgeType::Extends).unwrap()),
            vec!["code:npc"]
        );
    }

    #[test]
    fn test_shop_lookup_both_directions() {
        let t = fixture();
        let by_item = t.for_route(Strategy::Graph, "torch", Some(EdgeType::OfferedInShop), 10).unwrap();
        assert_eq!(ids(&by_item), vec!["shop:general"]);
        let by_shop = t
            .for_route(Strategy::Graph, "General Store", Some(EdgeType::OfferedInShop), 10)
            .unwrap();
        assert_eq!(ids(&by_shop), vec!["item:torch"]);
    }

    #[test]
    fn test_find_by_name_ranks_exact_first() {
        let t = fixture();
        let results = t.find_by_name("torch", 10).unwrap();
        assert_eq!(results[0].node_id, "item:torch");
        assert_eq!(results[0].score, GRAPH_SCORE);
        assert!(results[1..].iter().all(|r| r.score == PARTIAL_NAME_SCORE));
        assert!(ids(&results).contains(&"recipe:torch"));
    }

    #[test]
    fn test_find_by_name_in_scopes_limit_to_corpus() {
        let t = fixture();
        // Unscoped, the gamedata exact match fills a limit of 1
        assert_eq!(ids(&t.find_by_name("torch", 1).unwrap()), vec!["item:torch"]);

        let client = t.find_by_name_in("torch", Some(Corpus::Client), 1).unwrap();
        assert_eq!(ids(&client), vec!["ui:torch"]);

        let gamedata = t.find_by_name_in("torch", Some(Corpus::Gamedata), 5).unwrap();
        assert_eq!(ids(&gamedata), vec!["item:torch", "recipe:torch"]);
        assert!(t.find_by_name_in("torch", Some(Corpus::Docs), 5).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_seed_is_empty_not_error() {
        let t = fixture();
        assert!(t.find_drops_from("dragon").unwrap().is_empty());
        assert!(t.for_route(Strategy::Graph, "dragon", Some(EdgeType::Calls), 10).unwrap().is_empty());
    }
}
