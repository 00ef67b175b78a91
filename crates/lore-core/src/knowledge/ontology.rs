//! Knowledge Graph Ontology
//!
//! Defines the closed vocabulary shared by every corpus: the corpus set
//! itself, the edge (relation) types and the categories they fall into.
//!
//! ## Edge categories
//!
//! - **Structural**: EXTENDS, IMPLEMENTS, CALLS, CONTAINS, IMPORTS
//! - **Game data**: REQUIRES_ITEM, PRODUCES_ITEM, DROPS_ON_DEATH, DROPS_ITEM,
//!   OFFERED_IN_SHOP, HAS_MEMBER
//! - **Cross-corpus bridges**: UI_BINDS_TO, IMPLEMENTED_BY, DOCS_REFERENCES
//!
//! Relations are an enumerated tag rather than free strings: a row carrying
//! an edge type outside this list is rejected when parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::KnowledgeError;

/// One of the fixed top-level partitions of the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    /// Source-code symbols.
    Code,
    /// Client UI definitions.
    Client,
    /// Structured game-data entities (items, recipes, NPCs, shops).
    Gamedata,
    /// Documentation pages.
    Docs,
}

impl Corpus {
    /// Every corpus, in tool-listing order.
    pub const ALL: [Corpus; 4] = [Corpus::Code, Corpus::Client, Corpus::Gamedata, Corpus::Docs];

    /// Stable identifier used in the store, file names and tool names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Code => "code",
            Corpus::Client => "client",
            Corpus::Gamedata => "gamedata",
            Corpus::Docs => "docs",
        }
    }

    /// Human-readable label used in provenance strings.
    pub fn display_name(&self) -> &'static str {
        match self {
            Corpus::Code => "Code",
            Corpus::Client => "Client UI",
            Corpus::Gamedata => "Game Data",
            Corpus::Docs => "Docs",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corpus {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(Corpus::Code),
            "client" | "ui" => Ok(Corpus::Client),
            "gamedata" | "game_data" | "game-data" => Ok(Corpus::Gamedata),
            "docs" | "doc" | "documentation" => Ok(Corpus::Docs),
            other => Err(KnowledgeError::UnknownCorpus(other.to_string())),
        }
    }
}

/// Categories of edges for filtering and organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeCategory {
    /// Code structure (extends, calls, contains)
    Structural,
    /// Game-data relationships (recipes, drops, shops, groups)
    GameData,
    /// Edges whose endpoints live in different corpora
    CrossCorpus,
}

/// The closed relation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// A extends B (subclass to superclass)
    Extends,
    /// A implements B (class to interface)
    Implements,
    /// A calls B
    Calls,
    /// A contains B (class contains method, file contains class)
    Contains,
    /// A imports B
    Imports,
    /// Recipe A requires item B as an input
    RequiresItem,
    /// Recipe A produces item B
    ProducesItem,
    /// NPC A has drop table B
    DropsOnDeath,
    /// Drop table A yields item B
    DropsItem,
    /// Item A is offered in shop B
    OfferedInShop,
    /// Group A has member B
    HasMember,
    /// Client UI element A binds to game-data entity B
    UiBindsTo,
    /// Game-data entity A is implemented by code symbol B
    ImplementedBy,
    /// Doc page A references code or game-data entity B
    DocsReferences,
}

impl EdgeType {
    /// Every edge type in the vocabulary.
    pub const ALL: [EdgeType; 14] = [
        EdgeType::Extends,
        EdgeType::Implements,
        EdgeType::Calls,
        EdgeType::Contains,
        EdgeType::Imports,
        EdgeType::RequiresItem,
        EdgeType::ProducesItem,
        EdgeType::DropsOnDeath,
        EdgeType::DropsItem,
        EdgeType::OfferedInShop,
        EdgeType::HasMember,
        EdgeType::UiBindsTo,
        EdgeType::ImplementedBy,
        EdgeType::DocsReferences,
    ];

    /// The relationship name as stored in the `edges.edge_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::Calls => "CALLS",
            Self::Contains => "CONTAINS",
            Self::Imports => "IMPORTS",
            Self::RequiresItem => "REQUIRES_ITEM",
            Self::ProducesItem => "PRODUCES_ITEM",
            Self::DropsOnDeath => "DROPS_ON_DEATH",
            Self::DropsItem => "DROPS_ITEM",
            Self::OfferedInShop => "OFFERED_IN_SHOP",
            Self::HasMember => "HAS_MEMBER",
            Self::UiBindsTo => "UI_BINDS_TO",
            Self::ImplementedBy => "IMPLEMENTED_BY",
            Self::DocsReferences => "DOCS_REFERENCES",
        }
    }

    /// Get the category of this edge type.
    pub fn category(&self) -> EdgeCategory {
        match self {
            Self::Extends | Self::Implements | Self::Calls | Self::Contains | Self::Imports => {
                EdgeCategory::Structural
            }

            Self::RequiresItem
            | Self::ProducesItem
            | Self::DropsOnDeath
            | Self::DropsItem
            | Self::OfferedInShop
            | Self::HasMember => EdgeCategory::GameData,

            Self::UiBindsTo | Self::ImplementedBy | Self::DocsReferences => {
                EdgeCategory::CrossCorpus
            }
        }
    }

    /// Whether this edge type bridges two corpora.
    pub fn is_bridge(&self) -> bool {
        self.category() == EdgeCategory::CrossCorpus
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EdgeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| KnowledgeError::UnknownEdgeType(wanted.to_string()))
    }
}

/// Which end of an edge the seed node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Seed is the edge source; results are targets.
    Forward,
    /// Seed is the edge target; results are sources.
    Reverse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_round_trips_through_str() {
        for edge_type in EdgeType::ALL {
            let parsed: EdgeType = edge_type.as_str().parse().unwrap();
            assert_eq!(parsed, edge_type);
        }
    }

    #[test]
    fn test_unknown_edge_type_is_rejected() {
        let err = "SUMMONS".parse::<EdgeType>().unwrap_err();
        assert!(matches!(err, KnowledgeError::UnknownEdgeType(name) if name == "SUMMONS"));
    }

    #[test]
    fn test_bridge_edges() {
        assert!(EdgeType::ImplementedBy.is_bridge());
        assert!(EdgeType::UiBindsTo.is_bridge());
        assert!(EdgeType::DocsReferences.is_bridge());
        assert!(!EdgeType::Extends.is_bridge());
        assert_eq!(EdgeType::DropsItem.category(), EdgeCategory::GameData);
    }

    #[test]
    fn test_corpus_aliases() {
        assert_eq!("ui".parse::<Corpus>().unwrap(), Corpus::Client);
        assert_eq!("Game-Data".parse::<Corpus>().unwrap(), Corpus::Gamedata);
        assert!("wiki".parse::<Corpus>().is_err());
    }

    #[test]
    fn test_corpus_serializes_lowercase() {
        let json = serde_json::to_string(&Corpus::Gamedata).unwrap();
        assert_eq!(json, "\"gamedata\"");
    }
}
