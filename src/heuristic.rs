use crate::page::Page;

/// Breadth/depth gate: a page needs at least `threshold` distinct terms and
/// at least `threshold²` occurrences in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heuristic {
    threshold: usize,
}

impl Heuristic {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: usize) -> Self {
        Self { threshold: threshold.max(1) }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Total occurrences divided by the threshold, or 0 when fewer than
    /// `threshold` distinct terms were matched.
    pub fn score(&self, page: &Page) -> f64 {
        if page.distinct_terms() < self.threshold {
            return 0.0;
        }
        page.total_occurrences() as f64 / self.threshold as f64
    }

    pub fn accepts(&self, page: &Page) -> bool {
        page.distinct_terms() >= self.threshold
            && page.total_occurrences() >= self.threshold.saturating_mul(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Occurrence, Term};
    use std::collections::HashMap;

    fn page_with(occurrences: &[(&str, &[usize])]) -> Page {
        let mut page = Page::new("WARC/1.0", HashMap::new(), "");
        page.occurrences = occurrences
            .iter()
            .map(|(v, p)| Occurrence { term: Term::new(v, v), positions: p.to_vec() })
            .collect();
        page
    }

    #[test]
    fn test_repetition_without_breadth_is_rejected() {
        let h = Heuristic::new(3);
        let page = page_with(&[("a", &[1, 2, 3]), ("b", &[4]), ("c", &[5])]);
        let score = h.score(&page);
        assert!((score - 5.0 / 3.0).abs() < 1e-9);
        assert!(!h.accepts(&page));
    }

    #[test]
    fn test_breadth_and_depth_is_accepted() {
        let h = Heuristic::new(3);
        let page = page_with(&[
            ("a", &[1]), ("b", &[2]), ("c", &[3]),
            ("d", &[4]), ("e", &[5]), ("f", &[6]),
            ("g", &[7]), ("h", &[8]), ("i", &[9]),
        ]);
        assert_eq!(h.score(&page), 3.0);
        assert!(h.accepts(&page));
    }

    #[test]
    fn test_too_few_distinct_terms_scores_zero() {
        let h = Heuristic::new(3);
        let page = page_with(&[("a", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]), ("b", &[11])]);
        assert_eq!(h.score(&page), 0.0);
        assert!(!h.accepts(&page));
    }

    #[test]
    fn test_empty_page_is_rejected() {
        let h = Heuristic::new(1);
        assert!(!h.accepts(&page_with(&[])));
        assert!(h.accepts(&page_with(&[("a", &[0])])));
    }

    #[test]
    fn test_huge_threshold_rejects_without_overflow() {
        let h = Heuristic::new(usize::MAX);
        let page = page_with(&[("a", &[1]), ("b", &[2])]);
        assert!(!h.accepts(&page));
        assert_eq!(h.score(&page), 0.0);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        assert_eq!(Heuristic::new(0).threshold(), 1);
    }
}
