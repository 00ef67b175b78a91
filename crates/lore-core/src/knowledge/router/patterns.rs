//! Ordered query patterns for the router.
//!
//! Each pattern captures the target entity in the `entity` group. Order
//! inside and across the lists below is evaluation order.

/// A code identifier, optionally dotted.
macro_rules! identifier {
    () => {
        r"(?P<entity>[`'\x22]?[\w$][\w$.]*[`'\x22]?)"
    };
}

/// A possibly multi-word entity running to the end of the query.
macro_rules! phrase_to_end {
    () => {
        r"(?:an?\s+|the\s+|some\s+)?(?P<entity>[`'\x22]?[\w$][\w$.'-]*(?:\s+[\w$.'-]+)*?[`'\x22]?)\s*[?.!]*\s*$"
    };
}

/// Structural code relations. These take priority over everything else.
pub const STRUCTURAL_PATTERNS: &[(&str, &str)] = &[
    (
        concat!(
            r"(?i)^\s*(?:what|which)\b.*?\b(?:extends|extend|subclasses|subclass\s+of|inherits?\s+from)\s+",
            identifier!()
        ),
        "EXTENDS",
    ),
    (
        concat!(r"(?i)^\s*(?:what|which)\b.*?\bimplements?\s+", identifier!()),
        "IMPLEMENTS",
    ),
    (
        concat!(r"(?i)^\s*(?:what|who|which)\b.*?\b(?:calls|call|invokes|invoke)\s+", identifier!()),
        "CALLS",
    ),
    (
        concat!(r"(?i)\b(?:methods|functions|members|fields)\s+(?:of|in|on)\s+", identifier!()),
        "CONTAINS",
    ),
];

/// Game-data relations: (pattern, strategy, relation).
pub const GAMEDATA_PATTERNS: &[(&str, &str, &str)] = &[
    (
        concat!(
            r"(?i)\bhow\s+(?:do\s+(?:i|you)\s+|can\s+(?:i|you)\s+|to\s+)?(?:craft|make|build)\s+",
            phrase_to_end!()
        ),
        "HYBRID",
        "REQUIRES_ITEM",
    ),
    (
        concat!(r"(?i)\bwhat\s+(?:drops|is\s+dropped|does\s+drop)\s+(?:from|by)\s+", phrase_to_end!()),
        "GRAPH",
        "DROPS_ON_DEATH",
    ),
    (
        r"(?i)\bwhat\s+(?:does|do)\s+(?:an?\s+|the\s+)?(?P<entity>[\w$][\w$.'-]*(?:\s+[\w$.'-]+)*?)\s+drops?\b",
        "GRAPH",
        "DROPS_ON_DEATH",
    ),
    (
        concat!(r"(?i)\bwhat\s+(?:uses|requires|needs)\s+", phrase_to_end!()),
        "GRAPH",
        "REQUIRES_ITEM",
    ),
    (
        concat!(
            r"(?i)\b(?:where|who)\s+(?:to|can\s+i|do\s+i|should\s+i)\s+(?:buy|purchase)\s+",
            phrase_to_end!()
        ),
        "GRAPH",
        "OFFERED_IN_SHOP",
    ),
    (
        concat!(r"(?i)\bwho\s+sells\s+", phrase_to_end!()),
        "GRAPH",
        "OFFERED_IN_SHOP",
    ),
    (
        concat!(
            r"(?i)\bwhich\s+(?:ui|screen|panel|view|window)s?\s+(?:shows?|displays?)\s+",
            phrase_to_end!()
        ),
        "GRAPH",
        "UI_BINDS_TO",
    ),
];

/// Direct lookups. The entity must exist in the store.
pub const LOOKUP_PATTERN: &str = concat!(
    r"(?i)^\s*(?:find|show|get|lookup|look\s+up|where\s+is)\s+(?:me\s+)?",
    phrase_to_end!()
);

/// Capitalized word-like tokens tried as entity names, left to right.
pub const CAPITALIZED_TOKEN: &str = r"\b[A-Z][\w$]{2,}\b";

/// Characters stripped from both ends of a captured entity.
pub const ENTITY_TRIM: &[char] = &['`', '\'', '"', '?', '.', '!', ',', ';', ':', '(', ')'];
