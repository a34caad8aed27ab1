//! Follow-up detection.
//!
//! A query is matched against an ordered list of named rules. Each rule
//! either decides (`Some(true)` / `Some(false)`) or passes (`None`); the
//! first decision wins and an undecided query is a new query.
//!
//! Rule order matters: explicit references beat everything, "list all"
//! phrasing beats the weaker signals, and a broad data request only counts
//! as new when none of the weaker signals fired.

use crate::models::Exchange;
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::debug;

const EXPLICIT_INDICATORS: &[&str] = &[
    "from the above",
    "from above",
    "above response",
    "previous response",
    "from that response",
    "from the response",
    "from it",
    "from that",
    "tell me more",
    "more about that",
    "details about that",
    "explain that",
    "what about that",
    "about that",
    "that person",
    "his details",
    "her details",
    "more details about",
    "elaborate on that",
    "expand on that",
];

const ACTION_WORDS: &[&str] = &[
    "Show", "Get", "Find", "List", "Display", "Retrieve", "Give", "Provide",
];

const DETAIL_NOUNS: &[&str] = &["details", "info", "information"];

const REPORT_TERMS: &[&str] = &["tracking", "report"];

const REFERENCE_WORDS: &[&str] = &["that", "it", "this", "those", "these"];

const ENUMERATE_ALL: &[&str] = &["show me all", "get all", "find all", "list all", "display all"];

const BROAD_REQUESTS: &[&str] = &[
    "account details",
    "all accounts",
    "account data",
    "report data",
    "all reports",
    "monthly report",
    "certification data",
    "all certifications",
];

/// A query prepared for rule matching.
#[derive(Debug)]
pub struct QueryText<'a> {
    pub raw: &'a str,
    pub lower: String,
    pub words: Vec<&'a str>,
}

impl<'a> QueryText<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            lower: raw.to_lowercase(),
            words: raw.split_whitespace().collect(),
        }
    }

    fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.lower.contains(p))
    }
}

/// A named classification rule.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&QueryText<'_>, &[Exchange]) -> Option<bool>,
}

/// The rule cascade, in precedence order.
pub const RULES: &[Rule] = &[
    Rule {
        name: "no_history",
        apply: no_history,
    },
    Rule {
        name: "explicit_indicator",
        apply: explicit_indicator,
    },
    Rule {
        name: "enumerate_all",
        apply: enumerate_all,
    },
    Rule {
        name: "broad_request",
        apply: broad_request,
    },
    Rule {
        name: "details_with_name",
        apply: flag_details_with_name,
    },
    Rule {
        name: "short_reference",
        apply: flag_short_reference,
    },
    Rule {
        name: "context_match",
        apply: flag_context_match,
    },
];

/// Result of classifying one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_follow_up: bool,
    /// Rule that decided, or `None` when no rule fired.
    pub decided_by: Option<&'static str>,
}

/// Runs the rule cascade over a query and its session history.
pub fn classify_with_history(query: &str, history: &[Exchange]) -> Classification {
    let text = QueryText::new(query);

    RULES
        .iter()
        .find_map(|rule| {
            (rule.apply)(&text, history).map(|is_follow_up| Classification {
                is_follow_up,
                decided_by: Some(rule.name),
            })
        })
        .unwrap_or(Classification {
            is_follow_up: false,
            decided_by: None,
        })
}

fn no_history(_: &QueryText<'_>, history: &[Exchange]) -> Option<bool> {
    history.is_empty().then_some(false)
}

fn explicit_indicator(query: &QueryText<'_>, _: &[Exchange]) -> Option<bool> {
    query.contains_any(EXPLICIT_INDICATORS).then_some(true)
}

fn enumerate_all(query: &QueryText<'_>, _: &[Exchange]) -> Option<bool> {
    query.contains_any(ENUMERATE_ALL).then_some(false)
}

fn broad_request(query: &QueryText<'_>, history: &[Exchange]) -> Option<bool> {
    let broad = query.contains_any(BROAD_REQUESTS);
    let flagged =
        details_with_name(query) || short_reference(query) || context_match(query, history);

    (broad && !flagged).then_some(false)
}

fn flag_details_with_name(query: &QueryText<'_>, _: &[Exchange]) -> Option<bool> {
    details_with_name(query).then_some(true)
}

fn flag_short_reference(query: &QueryText<'_>, _: &[Exchange]) -> Option<bool> {
    short_reference(query).then_some(true)
}

fn flag_context_match(query: &QueryText<'_>, history: &[Exchange]) -> Option<bool> {
    context_match(query, history).then_some(true)
}

/// "get … details" / "show … info" naming someone specific.
fn details_with_name(query: &QueryText<'_>) -> bool {
    let lower = &query.lower;
    let asks_details = (lower.contains("get") && lower.contains("details"))
        || (lower.contains("show") && DETAIL_NOUNS.iter().any(|n| lower.contains(n)));
    if !asks_details {
        return false;
    }

    let names_someone = query.words.iter().any(|word| {
        starts_uppercase(word) && word.chars().count() > 3 && !ACTION_WORDS.contains(word)
    });

    names_someone && !query.contains_any(REPORT_TERMS)
}

/// One to three words containing a bare pronoun ("and that", "this one").
fn short_reference(query: &QueryText<'_>) -> bool {
    query.words.len() <= 3
        && query
            .words
            .iter()
            .any(|w| REFERENCE_WORDS.contains(&w.to_lowercase().as_str()))
}

/// A proper name from the query appears in the last response.
fn context_match(query: &QueryText<'_>, history: &[Exchange]) -> bool {
    let Some(last) = history.last() else {
        return false;
    };

    let names = proper_names(query.raw);
    if names.is_empty() {
        return false;
    }

    let last_text = last.response.to_text().to_lowercase();
    names.iter().any(|name| {
        let found = last_text.contains(&name.to_lowercase());
        if found {
            debug!("Found '{}' from query in previous response", name);
        }
        found
    })
}

/// Proper-name candidates: capitalized tokens longer than two characters,
/// with surrounding punctuation and a possessive `'s` removed.
pub fn proper_names(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(normalize_token)
        .filter(|token| starts_uppercase(token) && token.chars().count() > 2)
        .collect()
}

fn normalize_token(token: &str) -> String {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    let stem = trimmed
        .strip_suffix("'s")
        .or_else(|| trimmed.strip_suffix("\u{2019}s"))
        .unwrap_or(trimmed);
    stem.to_string()
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

/// Classifies queries against the live session store.
pub struct FollowUpClassifier {
    store: Arc<SessionStore>,
}

impl FollowUpClassifier {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Returns true when the query refers back to the session's conversation.
    pub fn classify(&self, query: &str, session_id: &str) -> bool {
        let history = self.store.get_history(session_id);
        let decision = classify_with_history(query, &history);

        debug!(
            "Classified '{}' (history: {}) as {} via {}",
            query,
            history.len(),
            if decision.is_follow_up { "follow-up" } else { "new" },
            decision.decided_by.unwrap_or("default")
        );

        decision.is_follow_up
    }
}
