use crate::matcher::{MatcherLike, OccurrenceMatcherLike};
use crate::term::{Occurrence, Term};
use rustc_hash::FxHashMap;

/// How a walk treats a leaf it passed on the way to a dead end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Once a node offers deeper edges the walk commits to extending the
    /// match; a shorter term ending at that node is only reported when the
    /// text ends there. With terms `ab` and `abc`, `abx` reports nothing.
    #[default]
    Greedy,
    /// Falls back to the deepest leaf seen on the walk when it dead-ends.
    Backtracking,
}

#[derive(Debug, Default)]
struct Node {
    children: FxHashMap<char, Node>,
    leaf: Option<Term>,
}

/// Character trie over a term set. Built once, read-only afterwards, so a
/// built tree can be shared across tasks behind an `Arc` without locking.
#[derive(Debug, Default)]
pub struct PrefixTree {
    root: Node,
    term_count: usize,
    longest_term: usize,
    mode: MatchMode,
}

impl PrefixTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: MatchMode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn from_terms<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = Term>,
    {
        Self::from_terms_with_mode(terms, MatchMode::Greedy)
    }

    pub fn from_terms_with_mode<I>(terms: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = Term>,
    {
        let mut tree = Self::with_mode(mode);
        for term in terms {
            tree.insert(term);
        }
        tree
    }

    /// Adds `term` one character edge at a time. A later term with the same
    /// value overwrites the earlier leaf; prefixes of other terms are untouched.
    /// Empty values are ignored so the root never becomes a leaf.
    pub fn insert(&mut self, term: Term) {
        if term.value.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        let mut length = 0;
        for c in term.value.chars() {
            node = node.children.entry(c).or_default();
            length += 1;
        }
        if node.leaf.is_none() {
            self.term_count += 1;
        }
        node.leaf = Some(term);
        self.longest_term = self.longest_term.max(length);
    }

    /// Number of distinct term values indexed.
    pub fn len(&self) -> usize {
        self.term_count
    }

    pub fn is_empty(&self) -> bool {
        self.term_count == 0
    }

    pub fn longest_term(&self) -> usize {
        self.longest_term
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Attempts a match starting at `pos`. Never backtracks in greedy mode.
    pub fn match_from(&self, text: &[char], pos: usize) -> Option<&Term> {
        let mut node = &self.root;
        let mut deepest_leaf: Option<&Term> = None;
        let mut i = pos;
        loop {
            if node.leaf.is_some() {
                deepest_leaf = node.leaf.as_ref();
            }
            let Some(c) = text.get(i) else {
                return node.leaf.as_ref().or(self.fallback(deepest_leaf));
            };
            match node.children.get(c) {
                Some(child) => {
                    node = child;
                    i += 1;
                }
                None if node.children.is_empty() => return node.leaf.as_ref(),
                None => return self.fallback(deepest_leaf),
            }
        }
    }

    fn fallback<'a>(&self, deepest_leaf: Option<&'a Term>) -> Option<&'a Term> {
        match self.mode {
            MatchMode::Greedy => None,
            MatchMode::Backtracking => deepest_leaf,
        }
    }
}

impl MatcherLike for PrefixTree {
    fn has_match(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();
        (0..chars.len()).any(|pos| self.match_from(&chars, pos).is_some())
    }
}

impl OccurrenceMatcherLike for PrefixTree {
    fn get_matches(&self, text: &str) -> Vec<Occurrence> {
        let chars: Vec<char> = text.chars().collect();
        let mut index_by_value: FxHashMap<&str, usize> = FxHashMap::default();
        let mut occurrences: Vec<Occurrence> = Vec::new();
        for pos in 0..chars.len() {
            if let Some(term) = self.match_from(&chars, pos) {
                let idx = *index_by_value.entry(term.value.as_str()).or_insert_with(|| {
                    occurrences.push(Occurrence::new(term.clone()));
                    occurrences.len() - 1
                });
                occurrences[idx].add_position(pos);
            }
        }
        occurrences
    }
}
