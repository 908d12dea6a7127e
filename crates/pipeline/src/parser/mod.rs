//! Incremental document parser
//!
//! Accumulates text chunks and, after each chunk, re-derives the document
//! from the repaired buffer. A segment that fails to deserialize ends the list
//! at that point. While its object is still open that is silent, since later
//! tokens may fix it; once the producer has closed it the failure is final and
//! reported as a [`RejectedSegment`]. A buffer that cannot be repaired at all
//! leaves the last good document in place.
//!
//! A segment counts as completed only when the producer flagged it and its
//! object was closed in the raw text. Each completed index is reported exactly
//! once, and its content is frozen from then on.

mod repair;

pub use repair::{repair, Repaired};

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use guided_audio_core::{Document, Segment};

/// Result of feeding one chunk
#[derive(Debug, Clone)]
pub struct ParseUpdate {
    pub document: Arc<Document>,
    /// Indices that became completed with this chunk, ascending
    pub newly_completed: Vec<usize>,
    /// Whether the document differs from the previous update
    pub changed: bool,
    /// A closed segment that can never become valid
    pub rejected: Option<RejectedSegment>,
}

/// Segment whose final text is not a valid segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSegment {
    pub index: usize,
    pub reason: String,
}

/// Lenient parse of the whole buffer
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub document: Document,
    pub rejected: Option<RejectedSegment>,
}

/// Stateful parser over a growing text buffer
#[derive(Debug, Default)]
pub struct IncrementalDocumentParser {
    buffer: String,
    document: Arc<Document>,
    processed: HashSet<usize>,
}

impl IncrementalDocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document snapshot
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// Raw text accumulated so far
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether `index` has already been reported as completed
    pub fn is_processed(&self, index: usize) -> bool {
        self.processed.contains(&index)
    }

    /// Append a chunk and re-parse
    pub fn push(&mut self, chunk: &str) -> ParseUpdate {
        self.buffer.push_str(chunk);

        let Some(ParsedDocument { document, rejected }) = parse_buffer(&self.buffer) else {
            tracing::trace!(buffered = self.buffer.len(), "Buffer not parseable yet");
            return self.unchanged();
        };

        let merged = self.merge(document);
        let changed = merged != *self.document;

        let mut newly_completed = Vec::new();
        for (index, segment) in merged.segments.iter().enumerate() {
            if segment.completed && self.processed.insert(index) {
                newly_completed.push(index);
            }
        }

        if changed {
            self.document = Arc::new(merged);
        }

        ParseUpdate {
            document: self.document.clone(),
            newly_completed,
            changed,
            rejected,
        }
    }

    /// Forget the buffer, the document and every reported index
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.document = Arc::default();
        self.processed.clear();
    }

    fn unchanged(&self) -> ParseUpdate {
        ParseUpdate {
            document: self.document.clone(),
            newly_completed: Vec::new(),
            changed: false,
            rejected: None,
        }
    }

    /// Overlay a fresh parse on the previous document
    ///
    /// Reported segments keep their reported content, segments are never
    /// removed and the completed flag never goes back to false.
    fn merge(&self, parsed: Document) -> Document {
        let previous = &self.document;
        let len = parsed.segments.len().max(previous.segments.len());

        let mut segments = Vec::with_capacity(len);
        for index in 0..len {
            let fresh = parsed.segments.get(index);
            let prior = previous.segments.get(index);
            let keep_prior = self.processed.contains(&index) || fresh.is_none();

            let segment = match (keep_prior, prior, fresh) {
                (true, Some(prior), _) => prior.clone(),
                (_, Some(prior), Some(fresh)) if prior == fresh => prior.clone(),
                (_, _, Some(fresh)) => fresh.clone(),
                (_, Some(prior), None) => prior.clone(),
                (_, None, None) => continue,
            };
            segments.push(segment);
        }

        let title = if parsed.title.is_empty() {
            previous.title.clone()
        } else {
            parsed.title
        };

        Document {
            title,
            segments,
            completed: parsed.completed || previous.completed,
        }
    }
}

/// Parse a possibly truncated document, `None` if nothing usable yet
pub fn parse_lenient(buffer: &str) -> Option<Document> {
    parse_buffer(buffer).map(|parsed| parsed.document)
}

/// Like [`parse_lenient`], also reporting a closed segment that failed
pub fn parse_buffer(buffer: &str) -> Option<ParsedDocument> {
    let repaired = repair(buffer)?;
    let value: Value = match serde_json::from_str(&repaired.json) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Repaired buffer still invalid");
            return None;
        }
    };
    let root = value.as_object()?;

    let title = root
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let completed = repaired.root_closed
        && root.get("completed").and_then(Value::as_bool).unwrap_or(false);

    let mut segments = Vec::new();
    let mut rejected = None;
    let raw_segments = root
        .get("segments")
        .or_else(|| root.get("steps"))
        .and_then(Value::as_array);

    for (index, raw) in raw_segments.into_iter().flatten().enumerate() {
        match serde_json::from_value::<Segment>(raw.clone()) {
            Ok(mut segment) => {
                if index >= repaired.sealed_segments {
                    segment.completed = false;
                }
                segments.push(Arc::new(segment));
            }
            Err(e) if index < repaired.sealed_segments || repaired.root_closed => {
                tracing::debug!(index, error = %e, "Closed segment is invalid");
                rejected = Some(RejectedSegment {
                    index,
                    reason: e.to_string(),
                });
                break;
            }
            Err(e) => {
                tracing::trace!(index, error = %e, "Segment not yet deserializable");
                break;
            }
        }
    }

    Some(ParsedDocument {
        document: Document {
            title,
            segments,
            completed,
        },
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use guided_audio_core::SegmentKind;

    const SCRIPT: &str = concat!(
        r#"{"title": "Evening", "segments": ["#,
        r#"{"type": "heading", "text": "Arrive", "completed": true}, "#,
        r#"{"type": "speech", "text": "Settle in.", "completed": true}, "#,
        r#"{"type": "pause", "duration": 5, "completed": true}"#,
        r#"], "completed": true}"#,
    );

    fn chunks(text: &str, size: usize) -> Vec<String> {
        text.chars()
            .collect::<Vec<_>>()
            .chunks(size)
            .map(|c| c.iter().collect())
            .collect()
    }

    #[test]
    fn test_completed_indices_reported_once_in_order() {
        let mut parser = IncrementalDocumentParser::new();
        let mut reported = Vec::new();
        for chunk in chunks(SCRIPT, 7) {
            reported.extend(parser.push(&chunk).newly_completed);
        }
        assert_eq!(reported, vec![0, 1, 2]);

        let doc = parser.document();
        assert!(doc.completed);
        assert_eq!(doc.title, "Evening");
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn test_partial_segment_visible_but_not_completed() {
        let mut parser = IncrementalDocumentParser::new();
        let update = parser.push(concat!(
            r#"{"title": "T", "segments": "#,
            r#"[{"type": "speech", "text": "Breathe"#,
        ));
        assert!(update.changed);
        assert!(update.newly_completed.is_empty());
        assert_eq!(update.document.segment(0).unwrap().text(), Some("Breathe"));
        assert!(!update.document.segment(0).unwrap().completed);
    }

    #[test]
    fn test_completed_flag_requires_closed_object() {
        let mut parser = IncrementalDocumentParser::new();
        let update = parser.push(concat!(
            r#"{"segments": "#,
            r#"[{"type": "speech", "completed": true, "text": "Bre"#,
        ));
        assert!(update.newly_completed.is_empty());

        let update = parser.push(r#"athe in."}"#);
        assert_eq!(update.newly_completed, vec![0]);
        assert_eq!(update.document.segment(0).unwrap().text(), Some("Breathe in."));
    }

    #[test]
    fn test_reported_segment_is_frozen() {
        let mut parser = IncrementalDocumentParser::new();
        parser.push(r#"{"segments": [{"type": "speech", "text": "One.", "completed": true}"#);
        assert!(parser.is_processed(0));

        // Later chunks never alter a reported index
        let update = parser.push(r#", {"type": "speech", "text": "Two."}"#);
        assert_eq!(update.document.segment(0).unwrap().text(), Some("One."));
        assert_eq!(update.document.segment(1).unwrap().text(), Some("Two."));
    }

    #[test]
    fn test_unparseable_keeps_last_good_document() {
        let mut parser = IncrementalDocumentParser::new();
        parser.push(r#"{"title": "Kept", "segments": [{"type": "speech", "text": "a"}"#);

        // A number where text belongs fails that segment only
        let update = parser.push(r#", {"type": "speech", "text": 12"#);
        assert!(!update.changed);
        assert_eq!(update.document.len(), 1);
        assert_eq!(update.document.title, "Kept");
    }

    #[test]
    fn test_invalid_closed_segment_is_rejected() {
        let parsed = parse_buffer(concat!(
            r#"{"segments": [{"type": "speech", "text": "ok"}, "#,
            r#"{"type": "chant"}, {"type": "pause"}]"#,
        ))
        .unwrap();
        assert_eq!(parsed.document.len(), 1);
        let rejected = parsed.rejected.unwrap();
        assert_eq!(rejected.index, 1);
        assert!(!rejected.reason.is_empty());
    }

    #[test]
    fn test_open_invalid_segment_is_not_rejected() {
        let parsed = parse_buffer(concat!(
            r#"{"segments": [{"type": "speech", "text": "ok"}, "#,
            r#"{"type": "speech", "text": 12"#,
        ))
        .unwrap();
        assert_eq!(parsed.document.len(), 1);
        assert!(parsed.rejected.is_none());
    }

    #[test]
    fn test_push_reports_rejected_segment() {
        let mut parser = IncrementalDocumentParser::new();
        let update =
            parser.push(r#"{"segments": [{"type": "pause", "duration": "5", "completed": true}"#);
        assert_eq!(update.rejected.map(|r| r.index), Some(0));
        assert!(update.newly_completed.is_empty());
    }

    #[test]
    fn test_document_completed_requires_closed_root() {
        let doc =
            parse_lenient(r#"{"completed": true, "segments": [{"type": "pause", "duration": 1"#)
                .unwrap();
        assert!(!doc.completed);

        let doc = parse_lenient(r#"{"completed": true, "segments": []}"#).unwrap();
        assert!(doc.completed);
    }

    #[test]
    fn test_unchanged_chunk_reports_no_change() {
        let mut parser = IncrementalDocumentParser::new();
        let first = parser.push(SCRIPT);
        assert!(first.changed);

        // Anything after the closed root is ignored
        let second = parser.push(SCRIPT);
        assert!(!second.changed);
        assert!(second.newly_completed.is_empty());
        assert!(Arc::ptr_eq(&first.document, &second.document));
    }

    #[test]
    fn test_steps_alias_and_sound_segments() {
        let doc = parse_lenient(
            r#"{"steps": [{"type": "sound", "duration": 3, "name": "bowl", "completed": true}]}"#,
        )
        .unwrap();
        match &doc.segment(0).unwrap().kind {
            SegmentKind::Sound { duration, name, .. } => {
                assert_eq!(*duration, 3.0);
                assert_eq!(name.as_deref(), Some("bowl"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(doc.segment(0).unwrap().completed);
    }

    #[test]
    fn test_reset_reports_segments_again() {
        let mut parser = IncrementalDocumentParser::new();
        let first = parser.push(SCRIPT);
        assert!(!first.newly_completed.is_empty());

        parser.reset();
        assert!(parser.buffer().is_empty());
        assert!(parser.document().segments.is_empty());

        let again = parser.push(SCRIPT);
        assert_eq!(again.newly_completed, first.newly_completed);
    }
}
