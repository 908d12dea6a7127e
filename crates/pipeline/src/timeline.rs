//! Timeline layout
//!
//! Audio-bearing segments are laid end to end. Between two of them a silent
//! gap is inserted unless either one is a pause; the gap is longer when a
//! heading sits between them. A completed script ends with a closing cue.

use std::borrow::Borrow;

use guided_audio_config::{constants, TimelineSettings};
use guided_audio_core::{Segment, Timeline, Timing, TimingKind};

/// Gap and cue policy
#[derive(Debug, Clone, PartialEq)]
pub struct GapPolicy {
    pub default_gap_ms: u64,
    pub after_heading_gap_ms: u64,
    /// `None` disables the closing cue
    pub closing_cue_ms: Option<u64>,
    /// Speaking rate used to estimate unmeasured speech
    pub chars_per_second: f64,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            default_gap_ms: constants::timeline::DEFAULT_GAP_MS,
            after_heading_gap_ms: constants::timeline::AFTER_HEADING_GAP_MS,
            closing_cue_ms: Some(constants::timeline::CLOSING_CUE_MS),
            chars_per_second: constants::timeline::CHARS_PER_SECOND,
        }
    }
}

impl From<&TimelineSettings> for GapPolicy {
    fn from(settings: &TimelineSettings) -> Self {
        Self {
            default_gap_ms: settings.default_gap_ms,
            after_heading_gap_ms: settings.after_heading_gap_ms,
            closing_cue_ms: (settings.closing_cue_ms > 0).then_some(settings.closing_cue_ms),
            chars_per_second: settings.chars_per_second,
        }
    }
}

impl GapPolicy {
    pub fn without_cue(mut self) -> Self {
        self.closing_cue_ms = None;
        self
    }
}

/// Pure layout of segments into timings
#[derive(Debug, Clone, Default)]
pub struct TimelineBuilder {
    policy: GapPolicy,
}

impl TimelineBuilder {
    pub fn new(policy: GapPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GapPolicy {
        &self.policy
    }

    /// Heuristic narration length for text not yet synthesized
    pub fn estimate_speech_ms(&self, text: &str) -> u64 {
        let chars = text.chars().count() as f64;
        (chars / self.policy.chars_per_second * 1000.0).round() as u64
    }

    /// Time a segment occupies, `None` for segments off the timeline
    pub fn segment_duration_ms(&self, segment: &Segment) -> Option<u64> {
        if segment.is_speech() {
            let measured = segment.duration_ms.filter(|_| segment.has_valid_audio());
            let text = segment.text().unwrap_or_default();
            return Some(measured.unwrap_or_else(|| self.estimate_speech_ms(text)));
        }
        segment
            .authored_seconds()
            .map(|seconds| (seconds * 1000.0).round() as u64)
    }

    /// Lay out `segments`; the closing cue is only added when `completed`
    pub fn build<S: Borrow<Segment>>(&self, segments: &[S], completed: bool) -> Timeline {
        let mut timings = Vec::new();
        let mut cursor = 0u64;
        // Whether the previous audio-bearing segment was a pause
        let mut previous_is_pause: Option<bool> = None;
        let mut heading_since_previous = false;

        for (index, segment) in segments.iter().enumerate() {
            let segment = segment.borrow();
            if segment.is_heading() {
                heading_since_previous = true;
                continue;
            }
            let Some(duration_ms) = self.segment_duration_ms(segment) else {
                continue;
            };

            if previous_is_pause == Some(false) && !segment.is_pause() {
                let gap_ms = if heading_since_previous {
                    self.policy.after_heading_gap_ms
                } else {
                    self.policy.default_gap_ms
                };
                if gap_ms > 0 {
                    timings.push(synthetic(TimingKind::Gap, cursor, gap_ms));
                    cursor += gap_ms;
                }
            }

            let kind = if segment.is_speech() {
                TimingKind::Speech
            } else if segment.is_pause() {
                TimingKind::Pause
            } else {
                TimingKind::Sound
            };
            timings.push(Timing {
                segment_index: Some(index),
                kind,
                start_ms: cursor,
                end_ms: cursor + duration_ms,
                duration_ms,
                audio_ref: segment.audio_ref.clone(),
                is_gap: false,
            });
            cursor += duration_ms;
            previous_is_pause = Some(segment.is_pause());
            heading_since_previous = false;
        }

        if completed && !timings.is_empty() {
            if let Some(cue_ms) = self.policy.closing_cue_ms.filter(|ms| *ms > 0) {
                timings.push(synthetic(TimingKind::Cue, cursor, cue_ms));
                cursor += cue_ms;
            }
        }

        Timeline {
            timings,
            total_duration_ms: cursor,
        }
    }
}

fn synthetic(kind: TimingKind, start_ms: u64, duration_ms: u64) -> Timing {
    Timing {
        segment_index: None,
        kind,
        start_ms,
        end_ms: start_ms + duration_ms,
        duration_ms,
        audio_ref: None,
        is_gap: true,
    }
}

/// Build a timeline with `policy`
pub fn build_timeline<S: Borrow<Segment>>(
    segments: &[S],
    completed: bool,
    policy: &GapPolicy,
) -> Timeline {
    TimelineBuilder::new(policy.clone()).build(segments, completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guided_audio_core::AudioRef;

    fn speech(text: &str, ms: u64) -> Segment {
        Segment::speech(text).completed().with_audio(AudioRef::new(text), Some(ms))
    }

    fn kinds(timeline: &Timeline) -> Vec<(Option<usize>, TimingKind, u64, u64)> {
        timeline
            .timings
            .iter()
            .map(|t| (t.segment_index, t.kind, t.start_ms, t.end_ms))
            .collect()
    }

    #[test]
    fn test_heading_speech_pause_speech() {
        let segments = vec![
            Segment::heading("Arrive").completed(),
            speech("a", 1000),
            Segment::pause(5.0).completed(),
            speech("b", 1000),
        ];
        let timeline = TimelineBuilder::default().build(&segments, true);

        assert_eq!(
            kinds(&timeline),
            vec![
                (Some(1), TimingKind::Speech, 0, 1000),
                (Some(2), TimingKind::Pause, 1000, 6000),
                (Some(3), TimingKind::Speech, 6000, 7000),
                (None, TimingKind::Cue, 7000, 8500),
            ]
        );
        assert_eq!(timeline.total_duration_ms, 8500);
    }

    #[test]
    fn test_three_speech_segments_with_default_gaps() {
        let segments = vec![speech("a", 2000), speech("b", 3000), speech("c", 1500)];
        let timeline = TimelineBuilder::default().build(&segments, false);
        assert_eq!(timeline.total_duration_ms, 10500);
        assert_eq!(timeline.start_of(2), 9000);
    }

    #[test]
    fn test_pause_then_speech_has_no_gap() {
        let segments = vec![Segment::pause(5.0).completed(), speech("a", 1000)];
        let timeline = TimelineBuilder::default().build(&segments, false);
        assert_eq!(
            kinds(&timeline),
            vec![
                (Some(0), TimingKind::Pause, 0, 5000),
                (Some(1), TimingKind::Speech, 5000, 6000),
            ]
        );
    }

    #[test]
    fn test_gap_between_speech_and_longer_after_heading() {
        let segments = vec![
            speech("a", 2000),
            speech("b", 2000),
            Segment::heading("Body").completed(),
            speech("c", 2000),
        ];
        let timeline =
            TimelineBuilder::new(GapPolicy::default().without_cue()).build(&segments, true);

        assert_eq!(
            kinds(&timeline),
            vec![
                (Some(0), TimingKind::Speech, 0, 2000),
                (None, TimingKind::Gap, 2000, 4000),
                (Some(1), TimingKind::Speech, 4000, 6000),
                (None, TimingKind::Gap, 6000, 9000),
                (Some(3), TimingKind::Speech, 9000, 11000),
            ]
        );
        assert_eq!(timeline.segment_at(4500), Some(1));
        assert!(timeline.is_in_gap(2500));
    }

    #[test]
    fn test_no_gap_next_to_pauses_and_no_cue_while_streaming() {
        let segments = vec![
            Segment::pause(1.0),
            speech("a", 500),
            Segment::pause(2.0),
            Segment::pause(1.5),
            speech("b", 500),
        ];
        let timeline = TimelineBuilder::default().build(&segments, false);

        assert!(timeline.timings.iter().all(|t| t.kind != TimingKind::Gap));
        assert!(timeline.timings.iter().all(|t| t.kind != TimingKind::Cue));
        assert_eq!(timeline.total_duration_ms, 1000 + 500 + 2000 + 1500 + 500);
    }

    #[test]
    fn test_timings_are_contiguous() {
        let segments = vec![
            speech("a", 1234),
            Segment::direction("sit tall"),
            Segment::sound(2.5, Some("bell".to_string())),
            Segment::heading("h"),
            speech("b", 777),
        ];
        let timeline = TimelineBuilder::default().build(&segments, true);

        let mut expected_start = 0;
        for timing in &timeline.timings {
            assert_eq!(timing.start_ms, expected_start);
            assert_eq!(timing.end_ms - timing.start_ms, timing.duration_ms);
            expected_start = timing.end_ms;
        }
        assert_eq!(timeline.total_duration_ms, expected_start);
        assert!(timeline.timing_of(1).is_none());
    }

    #[test]
    fn test_unmeasured_speech_uses_heuristic() {
        let builder = TimelineBuilder::default();
        // 30 chars at 15 chars/s
        let text = "a".repeat(30);
        assert_eq!(builder.segment_duration_ms(&Segment::speech(text.clone())), Some(2000));

        // A failed generation doesn't count as a measurement
        let failed = Segment::speech(text).with_audio(AudioRef::error("x"), Some(10));
        assert_eq!(builder.segment_duration_ms(&failed), Some(2000));
    }

    #[test]
    fn test_empty_document() {
        let segments: Vec<Segment> = Vec::new();
        let timeline = TimelineBuilder::default().build(&segments, true);
        assert!(timeline.timings.is_empty());
        assert_eq!(timeline.total_duration_ms, 0);
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = TimelineSettings {
            closing_cue_ms: 0,
            ..Default::default()
        };
        let policy = GapPolicy::from(&settings);
        assert_eq!(policy.closing_cue_ms, None);
        assert_eq!(policy.default_gap_ms, 2000);
    }
}
