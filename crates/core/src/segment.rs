//! Script segments and the document that holds them
//!
//! A [`Document`] is built incrementally from the formatter's token stream.
//! Segments are addressed by their position; an index is never reused and
//! segments are never reordered. Each segment sits behind an `Arc` so that
//! snapshots handed to listeners are cheap and updating one index copies only
//! that segment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AudioRef;

/// Kind-specific payload of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SegmentKind {
    /// Section title, shown but not spoken
    Heading {
        #[serde(default)]
        text: String,
    },
    /// Narration synthesized by the TTS capability
    Speech {
        #[serde(default)]
        text: String,
    },
    /// Authored silence
    Pause {
        /// Seconds
        #[serde(default)]
        duration: f64,
        #[serde(default)]
        can_extend: bool,
        #[serde(default)]
        wait_for_user_input: bool,
    },
    /// Ambient sound (bell, bowl); rendered as timed audio
    Sound {
        /// Seconds
        #[serde(default)]
        duration: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        can_extend: bool,
        #[serde(default)]
        wait_for_user_input: bool,
    },
    /// Side note for the reader
    Aside {
        #[serde(default)]
        text: String,
    },
    /// Stage direction for the listener (posture, breathing cue)
    Direction {
        #[serde(default)]
        text: String,
    },
}

/// One atomic unit of the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[serde(flatten)]
    pub kind: SegmentKind,
    /// Set by the producer once no further tokens will amend this segment
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<AudioRef>,
    /// Measured audio duration, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Segment {
    pub fn new(kind: SegmentKind) -> Self {
        Self {
            kind,
            completed: false,
            audio_ref: None,
            duration_ms: None,
        }
    }

    pub fn speech(text: impl Into<String>) -> Self {
        Self::new(SegmentKind::Speech { text: text.into() })
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Self::new(SegmentKind::Heading { text: text.into() })
    }

    pub fn pause(seconds: f64) -> Self {
        Self::new(SegmentKind::Pause {
            duration: seconds,
            can_extend: false,
            wait_for_user_input: false,
        })
    }

    pub fn sound(seconds: f64, name: Option<String>) -> Self {
        Self::new(SegmentKind::Sound {
            duration: seconds,
            name,
            can_extend: false,
            wait_for_user_input: false,
        })
    }

    pub fn direction(text: impl Into<String>) -> Self {
        Self::new(SegmentKind::Direction { text: text.into() })
    }

    pub fn aside(text: impl Into<String>) -> Self {
        Self::new(SegmentKind::Aside { text: text.into() })
    }

    /// Mark completed (builder style)
    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Attach audio (builder style)
    pub fn with_audio(mut self, audio_ref: impl Into<AudioRef>, duration_ms: Option<u64>) -> Self {
        self.audio_ref = Some(audio_ref.into());
        self.duration_ms = duration_ms;
        self
    }

    /// Wire name of the segment type
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SegmentKind::Heading { .. } => "heading",
            SegmentKind::Speech { .. } => "speech",
            SegmentKind::Pause { .. } => "pause",
            SegmentKind::Sound { .. } => "sound",
            SegmentKind::Aside { .. } => "aside",
            SegmentKind::Direction { .. } => "direction",
        }
    }

    /// Text payload for text-carrying kinds
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Heading { text }
            | SegmentKind::Speech { text }
            | SegmentKind::Aside { text }
            | SegmentKind::Direction { text } => Some(text),
            SegmentKind::Pause { .. } | SegmentKind::Sound { .. } => None,
        }
    }

    /// Authored duration in seconds for pause and sound segments
    pub fn authored_seconds(&self) -> Option<f64> {
        match self.kind {
            SegmentKind::Pause { duration, .. } | SegmentKind::Sound { duration, .. } => {
                Some(duration.max(0.0))
            }
            _ => None,
        }
    }

    pub fn is_speech(&self) -> bool {
        matches!(self.kind, SegmentKind::Speech { .. })
    }

    pub fn is_pause(&self) -> bool {
        matches!(self.kind, SegmentKind::Pause { .. })
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.kind, SegmentKind::Heading { .. })
    }

    /// Speech, pause and sound occupy time on the timeline
    pub fn is_audio_bearing(&self) -> bool {
        matches!(
            self.kind,
            SegmentKind::Speech { .. } | SegmentKind::Pause { .. } | SegmentKind::Sound { .. }
        )
    }

    /// Speech and pause must carry audio before the asset can be rendered
    pub fn requires_audio(&self) -> bool {
        self.is_speech() || self.is_pause()
    }

    pub fn has_valid_audio(&self) -> bool {
        self.audio_ref.as_ref().is_some_and(AudioRef::is_valid)
    }

    pub fn has_failed_audio(&self) -> bool {
        self.audio_ref.as_ref().is_some_and(AudioRef::is_error)
    }
}

/// A (possibly still streaming) meditation script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub segments: Vec<Arc<Segment>>,
    /// Set by the producer once the script is final
    #[serde(default)]
    pub completed: bool,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Build a document from owned segments
    pub fn with_segments(
        title: impl Into<String>,
        segments: impl IntoIterator<Item = Segment>,
        completed: bool,
    ) -> Self {
        Self {
            title: title.into(),
            segments: segments.into_iter().map(Arc::new).collect(),
            completed,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index).map(|s| s.as_ref())
    }

    /// Owned copies of the segments, for pure functions over `&[Segment]`
    pub fn to_segments(&self) -> Vec<Segment> {
        self.segments.iter().map(|s| Segment::clone(s)).collect()
    }

    /// Record generated audio on one segment; other segments stay shared
    ///
    /// Returns false when the index does not exist.
    pub fn set_audio(
        &mut self,
        index: usize,
        audio_ref: AudioRef,
        duration_ms: Option<u64>,
    ) -> bool {
        let Some(slot) = self.segments.get_mut(index) else {
            return false;
        };
        let segment = Arc::make_mut(slot);
        segment.audio_ref = Some(audio_ref);
        if duration_ms.is_some() {
            segment.duration_ms = duration_ms;
        }
        true
    }

    pub fn all_segments_completed(&self) -> bool {
        self.segments.iter().all(|s| s.completed)
    }

    /// Every speech/pause segment carries a fetchable reference
    pub fn all_required_audio_ready(&self) -> bool {
        self.segments
            .iter()
            .filter(|s| s.requires_audio())
            .all(|s| s.has_valid_audio())
    }

    /// Ready for final rendering: complete script, complete segments, all audio present
    pub fn is_ready_for_concatenation(&self) -> bool {
        self.completed && self.all_segments_completed() && self.all_required_audio_ready()
    }

    /// Indices of segments whose generation failed
    pub fn failed_indices(&self) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.has_failed_audio())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_wire_segments() {
        let json = r#"{
            "title": "Evening",
            "completed": true,
            "segments": [
                {"type": "heading", "text": "Arrive", "completed": true},
                {"type": "speech", "text": "Settle in.", "completed": true},
                {"type": "pause", "duration": 5, "canExtend": true, "completed": true},
                {"type": "sound", "duration": 2.5, "name": "bell"}
            ]
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.len(), 4);
        assert!(doc.segment(0).unwrap().is_heading());
        assert_eq!(doc.segment(1).unwrap().text(), Some("Settle in."));
        match &doc.segment(2).unwrap().kind {
            SegmentKind::Pause { duration, can_extend, wait_for_user_input } => {
                assert_eq!(*duration, 5.0);
                assert!(*can_extend);
                assert!(!*wait_for_user_input);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(!doc.segment(3).unwrap().completed);
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let segment = Segment::speech("hello").completed().with_audio("a1", Some(1200));
        let value = serde_json::to_value(&segment).unwrap();
        assert_eq!(value["type"], "speech");
        assert_eq!(value["audioRef"], "a1");
        assert_eq!(value["durationMs"], 1200);
        assert_eq!(value["completed"], true);
    }

    #[test]
    fn test_partial_segment_uses_defaults() {
        let segment: Segment = serde_json::from_str(r#"{"type": "speech"}"#).unwrap();
        assert_eq!(segment.text(), Some(""));
        assert!(!segment.completed);
    }

    #[test]
    fn test_set_audio_is_copy_on_write() {
        let mut doc = Document::with_segments(
            "t",
            vec![Segment::speech("a"), Segment::speech("b")],
            false,
        );
        let snapshot = doc.clone();

        assert!(doc.set_audio(1, AudioRef::new("r1"), Some(900)));
        assert!(!doc.set_audio(5, AudioRef::new("r5"), None));

        assert!(Arc::ptr_eq(&doc.segments[0], &snapshot.segments[0]));
        assert!(snapshot.segment(1).unwrap().audio_ref.is_none());
        assert_eq!(doc.segment(1).unwrap().duration_ms, Some(900));
    }

    #[test]
    fn test_concatenation_readiness() {
        let mut doc = Document::with_segments(
            "t",
            vec![
                Segment::heading("h").completed(),
                Segment::speech("a").completed(),
                Segment::pause(3.0).completed(),
            ],
            true,
        );
        assert!(!doc.is_ready_for_concatenation());

        doc.set_audio(1, AudioRef::new("s"), None);
        doc.set_audio(2, AudioRef::error("boom"), None);
        assert!(!doc.is_ready_for_concatenation());
        assert_eq!(doc.failed_indices(), vec![2]);

        doc.set_audio(2, AudioRef::new("p"), None);
        assert!(doc.is_ready_for_concatenation());
    }
}
