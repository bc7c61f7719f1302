use crate::matcher::{MatcherLike, OccurrenceMatcherLike};
use crate::page::Page;
use crate::term::merge_occurrences;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMode {
    Overwrite,
    Merge,
}

/// What happened to a page during one digestion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    NoMatcher,
    Prefiltered,
    Matched,
}

/// Runs the optional pre-filter and then the exact matcher over a page's
/// lower-cased content, writing occurrences back into the page.
#[derive(Clone, Default)]
pub struct PageDigester {
    prefilter: Option<Arc<dyn MatcherLike>>,
    matcher: Option<Arc<dyn OccurrenceMatcherLike>>,
}

impl PageDigester {
    pub fn new(matcher: Arc<dyn OccurrenceMatcherLike>) -> Self {
        Self { prefilter: None, matcher: Some(matcher) }
    }

    pub fn with_prefilter(mut self, prefilter: Arc<dyn MatcherLike>) -> Self {
        self.prefilter = Some(prefilter);
        self
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn digest<'a>(&self, page: &'a mut Page, mode: DigestMode) -> &'a mut Page {
        self.digest_with_outcome(page, mode).0
    }

    pub fn digest_with_outcome<'a>(&self, page: &'a mut Page, mode: DigestMode) -> (&'a mut Page, DigestOutcome) {
        let Some(matcher) = &self.matcher else {
            warn!("digest called without an exact matcher; page left unchanged");
            return (page, DigestOutcome::NoMatcher);
        };

        let content = page.content.to_lowercase();
        if let Some(prefilter) = &self.prefilter {
            if !prefilter.has_match(&content) {
                debug!(uri = page.target_uri().unwrap_or("-"), "pre-filter rejected page");
                return (page, DigestOutcome::Prefiltered);
            }
        }

        let found = matcher.get_matches(&content);
        match mode {
            DigestMode::Merge => merge_occurrences(&mut page.occurrences, found),
            DigestMode::Overwrite => page.occurrences = found,
        }
        (page, DigestOutcome::Matched)
    }
}
