use crate::term::Occurrence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TYPE_HEADER: &str = "WARC-Type";
pub const CONVERSION_TYPE: &str = "conversion";
pub const TARGET_URI_HEADER: &str = "WARC-Target-URI";

/// One record as emitted by an archive-record parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub protocol: String,
    pub headers: HashMap<String, String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub protocol: String,
    pub headers: HashMap<String, String>,
    pub content: String,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
}

impl Page {
    pub fn new(protocol: &str, headers: HashMap<String, String>, content: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            headers,
            content: content.to_string(),
            occurrences: Vec::new(),
        }
    }

    /// Header keys are matched case-sensitively, as received.
    pub fn is_web_page(&self) -> bool {
        self.headers.get(TYPE_HEADER).map(|t| t == CONVERSION_TYPE).unwrap_or(false)
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.headers.get(TARGET_URI_HEADER).map(|s| s.as_str())
    }

    pub fn distinct_terms(&self) -> usize {
        self.occurrences.len()
    }

    pub fn total_occurrences(&self) -> usize {
        self.occurrences.iter().map(|o| o.count()).sum()
    }
}

impl From<Record> for Page {
    fn from(record: Record) -> Self {
        Self {
            protocol: record.protocol,
            headers: record.headers,
            content: record.content,
            occurrences: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_conversion_records_are_web_pages() {
        let page = Page::new("WARC/1.0", headers(&[("WARC-Type", "conversion")]), "text");
        assert!(page.is_web_page());
    }

    #[test]
    fn test_other_records_are_not_web_pages() {
        let warcinfo = Page::new("WARC/1.0", headers(&[("WARC-Type", "warcinfo")]), "");
        assert!(!warcinfo.is_web_page());
        let lowercase_key = Page::new("WARC/1.0", headers(&[("warc-type", "conversion")]), "");
        assert!(!lowercase_key.is_web_page());
        let missing = Page::new("WARC/1.0", HashMap::new(), "");
        assert!(!missing.is_web_page());
    }

    #[test]
    fn test_from_record_starts_without_occurrences() {
        let record = Record {
            protocol: "WARC/1.0".to_string(),
            headers: headers(&[("WARC-Target-URI", "http://example.com/")]),
            content: "body".to_string(),
        };
        let page = Page::from(record);
        assert!(page.occurrences.is_empty());
        assert_eq!(page.target_uri(), Some("http://example.com/"));
        assert_eq!(page.total_occurrences(), 0);
    }
}
