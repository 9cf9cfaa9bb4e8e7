//! Media reduction — the first compression stage.
//!
//! Markers are split out of the text, the first `max_media_markers` are
//! kept, and a note records how many were dropped. Kept markers are appended
//! after the text exactly as they appeared.

use windowpack_core::media::MediaMarker;

/// Text, an optional omission note and the surviving markers.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSplit {
    pub text: String,
    pub note: Option<String>,
    pub kept: Vec<MediaMarker>,
    pub dropped: usize,
}

impl MediaSplit {
    pub fn new(text: String, mut markers: Vec<MediaMarker>, cap: usize) -> Self {
        let dropped = markers.len().saturating_sub(cap);
        markers.truncate(cap);
        Self {
            text,
            note: omission_note(dropped),
            kept: markers,
            dropped,
        }
    }

    /// Drop the last kept marker, updating the note.
    pub fn drop_last(&mut self) -> bool {
        if self.kept.pop().is_none() {
            return false;
        }
        self.dropped += 1;
        self.note = omission_note(self.dropped);
        true
    }

    /// Join a body with the note and the kept markers.
    pub fn render(&self, body: &str) -> String {
        render_parts(body, self.note.as_deref(), &self.kept)
    }

    /// Like [`render`](Self::render) but without the omission note.
    pub fn render_without_note(&self, body: &str) -> String {
        render_parts(body, None, &self.kept)
    }
}

fn omission_note(dropped: usize) -> Option<String> {
    (dropped > 0).then(|| format!("[{dropped} media attachment(s) omitted to fit context budget]"))
}

fn render_parts(body: &str, note: Option<&str>, kept: &[MediaMarker]) -> String {
    let markers = kept
        .iter()
        .map(|m| m.raw.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    let body = body.trim();
    if !body.is_empty() {
        parts.push(body);
    }
    if let Some(note) = note {
        parts.push(note);
    }
    if !markers.is_empty() {
        parts.push(&markers);
    }
    parts.join("\n")
}
