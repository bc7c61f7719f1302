use crate::MineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A search term bound to the entity it names. Identity is the lower-cased
/// value together with the entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub value: String,
    pub entity_id: String,
}

impl Term {
    pub fn new(value: &str, entity_id: &str) -> Self {
        Self {
            value: value.to_lowercase(),
            entity_id: entity_id.to_string(),
        }
    }
}

/// A term plus the character offsets where it begins in one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub term: Term,
    pub positions: Vec<usize>,
}

impl Occurrence {
    pub fn new(term: Term) -> Self {
        Self { term, positions: Vec::new() }
    }

    /// Records a start offset; positions keep set semantics in discovery order.
    pub fn add_position(&mut self, position: usize) {
        if !self.positions.contains(&position) {
            self.positions.push(position);
        }
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

/// Per-term union of `incoming` into `existing`. Existing terms keep their
/// relative order; unseen terms are appended wholesale.
pub fn merge_occurrences(existing: &mut Vec<Occurrence>, incoming: Vec<Occurrence>) {
    for occurrence in incoming {
        match existing.iter_mut().find(|o| o.term == occurrence.term) {
            Some(current) => {
                for position in occurrence.positions {
                    current.add_position(position);
                }
            }
            None => existing.push(occurrence),
        }
    }
}

/// Loads a JSON array of `{"value": .., "entityId": ..}` objects. Values are
/// normalized to lower case; empty values and duplicate pairs are dropped.
pub fn load_terms(path: &Path) -> Result<Vec<Term>, MineError> {
    let data = std::fs::read(path)?;
    parse_terms(&data)
}

pub fn parse_terms(data: &[u8]) -> Result<Vec<Term>, MineError> {
    let raw: Vec<Term> = serde_json::from_slice(data)?;
    let mut seen = HashSet::new();
    let mut terms = Vec::with_capacity(raw.len());
    for term in raw {
        let term = Term::new(term.value.trim(), &term.entity_id);
        if term.value.is_empty() {
            continue;
        }
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }
    Ok(terms)
}
