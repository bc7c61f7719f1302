use crate::config::DEFAULT_FALSE_POSITIVE_RATE;
use crate::matcher::MatcherLike;
use crate::splitter::Splitter;
use crate::term::Term;
use bloomfilter::Bloom;
use tracing::warn;

/// Token-level pre-filter in front of the exact matcher. A `false` from
/// [`MatcherLike::has_match`] means no term token occurs in the text; a
/// `true` may be a false positive at roughly the configured rate. Terms with
/// no indexable token (all tokens shorter than `MIN_TOKEN_LENGTH`) cannot be
/// ruled out, so their presence makes every text pass.
pub struct TokenPreFilter {
    bloom: Bloom<str>,
    splitter: Splitter,
    token_count: usize,
    unindexed_terms: usize,
    false_positive_rate: f64,
}

impl TokenPreFilter {
    pub fn from_terms(terms: &[Term]) -> Self {
        Self::with_fp_rate(terms, DEFAULT_FALSE_POSITIVE_RATE)
    }

    pub fn with_fp_rate(terms: &[Term], false_positive_rate: f64) -> Self {
        let splitter = Splitter::new();
        let mut tokens: Vec<String> = Vec::new();
        let mut unindexed_terms = 0;
        for term in terms.iter().filter(|t| !t.value.is_empty()) {
            let vocabulary = splitter.vocabulary(&term.value);
            if vocabulary.is_empty() {
                unindexed_terms += 1;
            }
            tokens.extend(vocabulary);
        }
        if unindexed_terms > 0 {
            warn!(unindexed_terms, "terms without indexable tokens, pre-filter passes every page");
        }
        // Bloom sizing panics on zero items.
        let mut bloom = Bloom::new_for_fp_rate(tokens.len().max(1), false_positive_rate);
        for token in &tokens {
            bloom.set(token.as_str());
        }
        Self {
            bloom,
            splitter,
            token_count: tokens.len(),
            unindexed_terms,
            false_positive_rate,
        }
    }

    /// Number of term tokens inserted (duplicates across terms counted once per term).
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Terms the bloom filter holds nothing for.
    pub fn unindexed_terms(&self) -> usize {
        self.unindexed_terms
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.bloom.check(token)
    }
}

impl MatcherLike for TokenPreFilter {
    fn has_match(&self, text: &str) -> bool {
        if self.unindexed_terms > 0 {
            return true;
        }
        if self.token_count == 0 {
            return false;
        }
        self.splitter.tokens(text).any(|token| self.bloom.check(token))
    }
}
