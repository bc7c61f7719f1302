use crate::MineError;
use crate::splitter::Splitter;
use rustc_hash::FxHashMap;

/// Language identification: is `text` written in one of `codes`?
pub trait LanguageFilterLike: Send + Sync {
    fn is_in_language(&self, text: &str, codes: &[String]) -> Result<bool, MineError>;
}

const STOPWORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "that", "have", "for", "not", "with", "you", "this", "but", "his", "from", "they", "was", "are", "were", "which", "their", "there", "been"]),
    ("de", &["der", "die", "und", "das", "nicht", "ist", "ich", "sie", "mit", "den", "auf", "ein", "eine", "sich", "dem", "auch", "wird", "oder", "noch", "wie"]),
    ("fr", &["les", "des", "est", "une", "pas", "que", "pour", "dans", "qui", "sur", "avec", "sont", "mais", "ont", "aux", "cette", "nous", "vous", "elle", "leur"]),
    ("es", &["los", "las", "del", "que", "por", "una", "con", "para", "como", "más", "pero", "sus", "esta", "este", "son", "entre", "cuando", "muy", "sin", "sobre"]),
    ("it", &["che", "per", "non", "una", "della", "con", "sono", "del", "gli", "alla", "come", "anche", "più", "questo", "nel", "dei", "delle", "suo", "loro", "essere"]),
    ("nl", &["het", "een", "van", "niet", "dat", "zijn", "voor", "met", "ook", "maar", "wordt", "bij", "naar", "door", "worden", "deze", "werd", "uit", "wel", "geen"]),
    ("pt", &["que", "não", "uma", "para", "com", "por", "mais", "dos", "como", "mas", "foi", "ele", "das", "tem", "seu", "sua", "ser", "quando", "muito", "são"]),
];

/// Guesses the language by which stopword list covers the most tokens.
/// Texts with too few recognisable tokens are reported as undetectable.
pub struct StopwordLanguageFilter {
    lists: Vec<(&'static str, Vec<&'static str>)>,
    splitter: Splitter,
    min_hits: usize,
}

impl StopwordLanguageFilter {
    pub fn new() -> Self {
        Self {
            lists: STOPWORDS.iter().map(|(code, words)| (*code, words.to_vec())).collect(),
            splitter: Splitter::new(),
            min_hits: 3,
        }
    }

    pub fn supported_codes(&self) -> Vec<&'static str> {
        self.lists.iter().map(|(code, _)| *code).collect()
    }

    /// The best-scoring language code, or an error when nothing recognisable
    /// appears in the text.
    pub fn detect(&self, text: &str) -> Result<&'static str, MineError> {
        let lowered = text.to_lowercase();
        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for token in self.splitter.tokens(&lowered) {
            for (code, words) in &self.lists {
                if words.iter().any(|w| *w == token) {
                    *counts.entry(*code).or_insert(0) += 1;
                }
            }
        }
        let best = self
            .lists
            .iter()
            .map(|(code, _)| (*code, counts.get(code).copied().unwrap_or(0)))
            .max_by_key(|(_, hits)| *hits);
        match best {
            Some((code, hits)) if hits >= self.min_hits => Ok(code),
            _ => Err(MineError::Other("language not detectable".to_string())),
        }
    }
}

impl Default for StopwordLanguageFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageFilterLike for StopwordLanguageFilter {
    fn is_in_language(&self, text: &str, codes: &[String]) -> Result<bool, MineError> {
        let code = self.detect(text)?;
        Ok(codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_detects_english_and_german() {
        let filter = StopwordLanguageFilter::new();
        let en = "The kernel was written by Linus and that is not the end of the story, but they were right.";
        let de = "Der Kernel wurde von Linus geschrieben und das ist nicht das Ende, sie sind auch mit dem Team.";
        assert_eq!(filter.detect(en).unwrap(), "en");
        assert_eq!(filter.detect(de).unwrap(), "de");
    }

    #[test]
    fn test_is_in_language_checks_requested_codes() {
        let filter = StopwordLanguageFilter::new();
        let en = "This is the story of the kernel and the people that have worked with it for years.";
        assert!(filter.is_in_language(en, &codes(&["EN", "de"])).unwrap());
        assert!(!filter.is_in_language(en, &codes(&["fr"])).unwrap());
    }

    #[test]
    fn test_undetectable_text_is_an_error() {
        let filter = StopwordLanguageFilter::new();
        assert!(filter.detect("12345 67890 !!!").is_err());
        assert!(filter.is_in_language("", &codes(&["en"])).is_err());
    }
}
