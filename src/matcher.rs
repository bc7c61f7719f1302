use crate::term::Occurrence;

/// Cheap yes/no matching capability shared by the exact matcher and the
/// probabilistic pre-filter.
pub trait MatcherLike: Send + Sync {
    fn has_match(&self, text: &str) -> bool;
}

/// Exact matching that can also report where each term occurs.
pub trait OccurrenceMatcherLike: MatcherLike {
    fn get_matches(&self, text: &str) -> Vec<Occurrence>;
}
