//! Entity resolution.
//!
//! Matches a free-text fragment against freshly fetched backend entities by
//! case-insensitive containment, and maps a disambiguation reply back to one
//! of the options that were offered.

use lectern_core::context::EntityOption;

use crate::types::Entity;

/// Anything with a human-readable name the user might type.
pub trait Named {
    fn display_name(&self) -> &str;
}

impl Named for Entity {
    fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl Named for EntityOption {
    fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Result of resolving a fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityMatch<T> {
    None,
    Unique(T),
    /// Two or more matches, in candidate order.
    Many(Vec<T>),
}

/// Resolve `fragment` against `candidates`.
///
/// A candidate matches when its display name contains the fragment,
/// ignoring case. An empty or whitespace-only fragment matches nothing.
pub fn resolve<T: Named + Clone>(fragment: &str, candidates: &[T]) -> EntityMatch<T> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return EntityMatch::None;
    }

    let mut matches: Vec<T> = candidates
        .iter()
        .filter(|c| c.display_name().to_lowercase().contains(&needle))
        .cloned()
        .collect();

    match matches.len() {
        0 => EntityMatch::None,
        1 => EntityMatch::Unique(matches.remove(0)),
        _ => EntityMatch::Many(matches),
    }
}

const ORDINALS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

/// Map a reply to one of the offered options.
///
/// Tried in order: list number or ordinal word ("2", "#2", "option 2",
/// "the second one", "last"), exact id, exact display name, then a unique
/// containment match in either direction. Anything else is `None`.
pub fn match_reply<'a>(reply: &str, options: &'a [EntityOption]) -> Option<&'a EntityOption> {
    let text = reply
        .trim()
        .trim_end_matches(['.', '!', '?', ')'])
        .trim()
        .to_lowercase();
    if text.is_empty() || options.is_empty() {
        return None;
    }

    if let Some(index) = parse_position(&text, options.len()) {
        return options.get(index);
    }

    if let Some(option) = options.iter().find(|o| o.id.to_lowercase() == text) {
        return Some(option);
    }

    if let Some(option) = options
        .iter()
        .find(|o| o.display_name.to_lowercase() == text)
    {
        return Some(option);
    }

    let contained: Vec<&EntityOption> = options
        .iter()
        .filter(|o| {
            let name = o.display_name.to_lowercase();
            name.contains(&text) || text.contains(&name)
        })
        .collect();
    if contained.len() == 1 {
        return Some(contained[0]);
    }
    None
}

/// Zero-based position from "2", "#2", "option 2", "number 2", ordinals or "last".
fn parse_position(text: &str, len: usize) -> Option<usize> {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| !matches!(*w, "the" | "one" | "option" | "number" | "no." | "choice"))
        .collect();
    if words.len() != 1 {
        return None;
    }
    let word = words[0].trim_start_matches('#');

    if let Ok(n) = word.parse::<usize>() {
        return (1..=len).contains(&n).then(|| n - 1);
    }
    if word == "last" {
        return Some(len - 1);
    }
    let ordinal = word.trim_end_matches(|c: char| c == ',');
    ORDINALS
        .iter()
        .position(|o| *o == ordinal)
        .filter(|i| *i < len)
}
