//! Query routing.
//!
//! Classifies a natural-language query into a retrieval [`Strategy`], an
//! optional entity name and an optional relation. Rules are evaluated in a
//! fixed order and the first match wins; nothing is scored.

mod patterns;

use regex::Regex;

use super::db::GraphStore;
use super::error::KnowledgeError;
use super::models::{RouteResult, Strategy};
use super::ontology::EdgeType;

/// Existence check used by fallback lookups.
pub trait EntityLookup {
    /// True when a node's display name equals `name` exactly or ends with
    /// `.name`.
    fn entity_exists(&self, name: &str) -> bool;
}

impl EntityLookup for GraphStore {
    fn entity_exists(&self, name: &str) -> bool {
        match GraphStore::entity_exists(self, name) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(entity = name, error = %e, "entity lookup failed");
                false
            }
        }
    }
}

impl<F> EntityLookup for F
where
    F: Fn(&str) -> bool,
{
    fn entity_exists(&self, name: &str) -> bool {
        self(name)
    }
}

/// One ordered routing rule.
struct RouteRule {
    pattern: Regex,
    strategy: Strategy,
    relation: Option<EdgeType>,
    /// Only fire when the captured entity exists in the store.
    requires_existing: bool,
}

/// Priority-ordered pattern classifier.
pub struct QueryRouter {
    rules: Vec<RouteRule>,
    capitalized: Regex,
}

impl QueryRouter {
    /// Compile the built-in rule set.
    pub fn new() -> Result<Self, KnowledgeError> {
        let mut rules = Vec::new();

        for (pattern, relation) in patterns::STRUCTURAL_PATTERNS {
            rules.push(RouteRule {
                pattern: compile(pattern)?,
                strategy: Strategy::Graph,
                relation: Some(relation.parse()?),
                requires_existing: false,
            });
        }

        for (pattern, strategy, relation) in patterns::GAMEDATA_PATTERNS {
            rules.push(RouteRule {
                pattern: compile(pattern)?,
                strategy: parse_strategy(strategy)?,
                relation: Some(relation.parse()?),
                requires_existing: false,
            });
        }

        rules.push(RouteRule {
            pattern: compile(patterns::LOOKUP_PATTERN)?,
            strategy: Strategy::Hybrid,
            relation: None,
            requires_existing: true,
        });

        Ok(Self {
            rules,
            capitalized: compile(patterns::CAPITALIZED_TOKEN)?,
        })
    }

    /// Classify `query`.
    pub fn route(&self, query: &str, lookup: &dyn EntityLookup) -> RouteResult {
        for rule in &self.rules {
            let Some(entity) = rule
                .pattern
                .captures(query)
                .and_then(|caps| caps.name("entity"))
                .map(|m| clean_entity(m.as_str()))
                .filter(|e| !e.is_empty())
            else {
                continue;
            };

            if rule.requires_existing && !lookup.entity_exists(&entity) {
                // Lookup phrasing with an unknown name: fall through to the
                // token scan below.
                break;
            }

            tracing::debug!(query, strategy = ?rule.strategy, entity = %entity, relation = ?rule.relation, "routed query");
            return RouteResult::new(rule.strategy, entity, rule.relation);
        }

        for token in self.capitalized.find_iter(query) {
            let candidate = token.as_str();
            if lookup.entity_exists(candidate) {
                tracing::debug!(query, entity = candidate, "routed query via capitalized token");
                return RouteResult::new(Strategy::Hybrid, candidate, None);
            }
        }

        RouteResult::vector()
    }
}

fn compile(pattern: &str) -> Result<Regex, KnowledgeError> {
    Regex::new(pattern).map_err(|e| KnowledgeError::Config(format!("route pattern {}: {}", pattern, e)))
}

fn parse_strategy(name: &str) -> Result<Strategy, KnowledgeError> {
    match name {
        "GRAPH" => Ok(Strategy::Graph),
        "VECTOR" => Ok(Strategy::Vector),
        "HYBRID" => Ok(Strategy::Hybrid),
        other => Err(KnowledgeError::Config(format!("unknown strategy {}", other))),
    }
}

/// Strip quotes, backticks and trailing punctuation.
fn clean_entity(raw: &str) -> String {
    raw.trim().trim_matches(patterns::ENTITY_TRIM).trim().to_string()
}
