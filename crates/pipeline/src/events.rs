//! Events emitted by a synthesis run
//!
//! Serialized one JSON object per line (NDJSON) on the streaming endpoint.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use guided_audio_core::{AudioRef, Document};

/// Progress and result notifications of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SynthesisEvent {
    /// Overall progress, 0..=100, non-decreasing within a run
    Progress { progress: u8 },
    /// Snapshot of the document after a change
    Update { document: Arc<Document> },
    /// Final asset stored
    Complete {
        #[serde(rename = "assetRef")]
        asset_ref: AudioRef,
    },
    /// Terminal failure
    Error { message: String },
}

impl SynthesisEvent {
    /// Complete and Error end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, SynthesisEvent::Complete { .. } | SynthesisEvent::Error { .. })
    }

    /// One NDJSON record, newline included
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_ndjson(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guided_audio_core::Segment;

    #[test]
    fn test_wire_shape() {
        let line = SynthesisEvent::Progress { progress: 42 }.to_ndjson().unwrap();
        assert_eq!(line, "{\"type\":\"progress\",\"progress\":42}\n");

        let line = SynthesisEvent::Complete {
            asset_ref: AudioRef::new("abc"),
        }
        .to_ndjson()
        .unwrap();
        assert_eq!(line, "{\"type\":\"complete\",\"assetRef\":\"abc\"}\n");
    }

    #[test]
    fn test_update_carries_document() {
        let doc = Document::with_segments("Rest", vec![Segment::speech("hi").completed()], false);
        let event = SynthesisEvent::Update {
            document: Arc::new(doc),
        };
        let line = event.to_ndjson().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["document"]["segments"][0]["type"], "speech");

        assert_eq!(SynthesisEvent::from_ndjson(&line).unwrap(), event);
        assert!(!event.is_terminal());
    }
}
