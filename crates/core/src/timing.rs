//! Timings and the timeline derived from a segment list

use serde::{Deserialize, Serialize};

use crate::AudioRef;

/// What occupies a timing interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingKind {
    Speech,
    Pause,
    Sound,
    /// Synthetic silence inserted between segments
    Gap,
    /// Synthetic closing chime
    Cue,
}

impl TimingKind {
    pub fn is_synthetic(self) -> bool {
        matches!(self, TimingKind::Gap | TimingKind::Cue)
    }
}

/// A time-stamped interval for a segment or a synthetic gap/cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// `None` for synthetic timings (`-1` on the wire)
    #[serde(with = "wire_index")]
    pub segment_index: Option<usize>,
    pub kind: TimingKind,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<AudioRef>,
    pub is_gap: bool,
}

impl Timing {
    pub fn contains(&self, t_ms: u64) -> bool {
        t_ms >= self.start_ms && t_ms < self.end_ms
    }
}

/// Ordered, contiguous timings covering the whole script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub timings: Vec<Timing>,
    pub total_duration_ms: u64,
}

impl Timeline {
    /// Timing whose half-open interval contains `t_ms`
    pub fn timing_at(&self, t_ms: u64) -> Option<&Timing> {
        self.timings.iter().find(|t| t.contains(t_ms))
    }

    /// Segment playing at `t_ms`; `None` inside gaps or past the end
    pub fn segment_at(&self, t_ms: u64) -> Option<usize> {
        self.timing_at(t_ms).and_then(|t| t.segment_index)
    }

    /// Timing of a segment, if it is audio-bearing
    pub fn timing_of(&self, segment_index: usize) -> Option<&Timing> {
        self.timings
            .iter()
            .find(|t| t.segment_index == Some(segment_index))
    }

    /// Start offset of a segment, 0 when it has no timing
    pub fn start_of(&self, segment_index: usize) -> u64 {
        self.timing_of(segment_index).map(|t| t.start_ms).unwrap_or(0)
    }

    /// Whether `t_ms` falls inside a synthetic gap or cue
    pub fn is_in_gap(&self, t_ms: u64) -> bool {
        self.timing_at(t_ms).is_some_and(|t| t.is_gap)
    }

    pub fn segment_timings(&self) -> impl Iterator<Item = &Timing> {
        self.timings.iter().filter(|t| !t.is_gap)
    }
}

mod wire_index {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(index) => serializer.serialize_u64(*index as u64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(usize::try_from(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(index: Option<usize>, kind: TimingKind, start: u64, end: u64) -> Timing {
        Timing {
            segment_index: index,
            kind,
            start_ms: start,
            end_ms: end,
            duration_ms: end - start,
            audio_ref: None,
            is_gap: kind.is_synthetic(),
        }
    }

    fn sample() -> Timeline {
        Timeline {
            timings: vec![
                timing(Some(1), TimingKind::Speech, 0, 2000),
                timing(None, TimingKind::Gap, 2000, 4000),
                timing(Some(3), TimingKind::Pause, 4000, 9000),
            ],
            total_duration_ms: 9000,
        }
    }

    #[test]
    fn test_lookups() {
        let timeline = sample();
        assert_eq!(timeline.segment_at(0), Some(1));
        assert_eq!(timeline.segment_at(1999), Some(1));
        assert_eq!(timeline.segment_at(2000), None);
        assert!(timeline.is_in_gap(2500));
        assert!(!timeline.is_in_gap(4000));
        assert_eq!(timeline.segment_at(9000), None);
        assert_eq!(timeline.start_of(3), 4000);
        assert_eq!(timeline.start_of(0), 0);
    }

    #[test]
    fn test_synthetic_index_on_wire() {
        let value = serde_json::to_value(&sample().timings[1]).unwrap();
        assert_eq!(value["segmentIndex"], -1);
        assert_eq!(value["isGap"], true);

        let back: Timing = serde_json::from_value(value).unwrap();
        assert_eq!(back.segment_index, None);
    }
}
