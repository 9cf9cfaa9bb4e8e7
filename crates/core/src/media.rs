//! Media markers — inline references to non-text artifacts.
//!
//! Tool output may embed markers of the form `[kind:payload]`, e.g. an
//! inlined image `[image:data:image/png;base64,iVBOR...]`. Each marker has a
//! fixed token-equivalent cost. A marker that survives compression is
//! reinserted byte-for-byte; it is never paraphrased.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([A-Za-z][A-Za-z0-9_-]*):([^\]\s][^\]]*)\]").expect("static marker regex")
});

/// One marker found in a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMarker {
    /// The marker kind, as written (`image`, `audio`, ...)
    pub kind: String,
    /// The exact bytes of the marker, brackets included
    pub raw: String,
    /// Byte offset of the marker in the scanned text
    pub start: usize,
}

/// Finds markers whose kind is in an allowed list.
///
/// An empty list accepts any kind.
#[derive(Debug, Clone, Default)]
pub struct MarkerScanner {
    kinds: Vec<String>,
}

impl MarkerScanner {
    pub fn new(kinds: &[String]) -> Self {
        Self {
            kinds: kinds.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// A scanner that recognises every `[kind:payload]` span.
    pub fn any() -> Self {
        Self::default()
    }

    fn accepts(&self, kind: &str) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k.eq_ignore_ascii_case(kind))
    }

    /// All markers in `text`, in order of appearance.
    pub fn scan(&self, text: &str) -> Vec<MediaMarker> {
        MARKER_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let kind = caps.get(1)?.as_str();
                self.accepts(kind).then(|| MediaMarker {
                    kind: kind.to_string(),
                    raw: whole.as_str().to_string(),
                    start: whole.start(),
                })
            })
            .collect()
    }

    /// Number of markers in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.scan(text).len()
    }

    /// Split `text` into the text with every marker removed, plus the markers.
    pub fn extract(&self, text: &str) -> (String, Vec<MediaMarker>) {
        let markers = self.scan(text);
        if markers.is_empty() {
            return (text.to_string(), markers);
        }

        let mut stripped = String::with_capacity(text.len());
        let mut cursor = 0;
        for m in &markers {
            stripped.push_str(&text[cursor..m.start]);
            cursor = m.start + m.raw.len();
        }
        stripped.push_str(&text[cursor..]);

        (stripped.trim().to_string(), markers)
    }
}
