use crate::config::MIN_TOKEN_LENGTH;
use std::collections::BTreeSet;

/// Word tokenizer shared by the pre-filter's build and query sides. A token
/// is a maximal run of alphanumeric characters.
pub struct Splitter {
    min_token_length: usize,
}

impl Splitter {
    pub fn new() -> Self {
        Splitter { min_token_length: MIN_TOKEN_LENGTH }
    }

    pub fn with_min_length(min_token_length: usize) -> Self {
        Splitter { min_token_length }
    }

    /// Tokens of at least the minimum length, in text order, case preserved.
    pub fn tokens<'a>(&self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let min = self.min_token_length;
        text.split(|c: char| !c.is_alphanumeric())
            .filter(move |token| !token.is_empty() && token.chars().count() >= min)
    }

    /// Distinct lower-cased tokens.
    pub fn vocabulary(&self, text: &str) -> Vec<String> {
        self.tokens(text)
            .map(|word| word.to_lowercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new()
    }
}
