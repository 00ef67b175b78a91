//! Gamedata intent detection.
//!
//! Maps query keywords to the data types a gamedata search should be
//! narrowed to. Rules are checked in order and every matching rule adds
//! its types.

use std::collections::BTreeSet;

/// `(keywords, data types)`. A keyword matches a whole query word or its
/// plural.
const INTENT_RULES: &[(&[&str], &[&str])] = &[
    (&["craft", "crafting", "recipe", "ingredient", "make", "smelt"], &["recipe", "item"]),
    (
        &["npc", "mob", "monster", "enemy", "boss", "spawn", "creature"],
        &["npc", "npc_group"],
    ),
    (&["drop", "loot"], &["drop", "item", "npc"]),
    (
        &["shop", "buy", "sell", "merchant", "vendor", "price", "store"],
        &["shop", "item"],
    ),
    (&["item", "weapon", "armor", "armour", "tool", "block", "potion"], &["item"]),
    (&["quest", "mission"], &["quest"]),
];

/// Data types a query is asking about. Empty when no rule matches.
pub fn detect_gamedata_intent(query: &str) -> BTreeSet<&'static str> {
    let words: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    let mut types = BTreeSet::new();
    for (keywords, data_types) in INTENT_RULES {
        let hit = words.iter().any(|word| {
            keywords.iter().any(|k| {
                word == k || word.strip_suffix('s') == Some(*k) || word.strip_suffix("es") == Some(*k)
            })
        });
        if hit {
            types.extend(data_types.iter().copied());
        }
    }
    types
}
