//! Playback state machine
//!
//! States: idle, playing, paused, waiting. The engine never moves backwards
//! on its own; only a forced request (a jump) can target an earlier index.
//! Waiting has no timeout and ends when the awaited audio arrives, the
//! listener jumps elsewhere, or the engine is reset.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;

use guided_audio_core::{AudioRef, Document};

use crate::PlayerError;

const EVENT_CAPACITY: usize = 64;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    /// Target segment has no audio yet
    Waiting,
}

/// Playback notifications
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StateChanged { from: PlayerState, to: PlayerState },
    SegmentStarted { index: usize, audio_ref: AudioRef },
    Waiting { index: usize },
    SegmentFailed { index: usize, reason: String },
    /// Last segment of a completed document has played
    Finished,
}

/// Sink that plays one segment at a time
pub trait AudioOutput: Send {
    /// Replace whatever is loaded with `audio_ref` and start playing it
    fn start(&mut self, index: usize, audio_ref: &AudioRef) -> Result<(), PlayerError>;

    fn pause(&mut self);

    fn resume(&mut self);

    fn stop(&mut self);
}

/// Background loader for audio that will be played soon
pub trait AudioPrefetcher: Send {
    fn prefetch(&self, audio_ref: &AudioRef);

    /// Abort every in-flight fetch
    fn cancel_all(&self);
}

/// Plays a document segment by segment as its audio becomes available
pub struct PlaybackEngine<O: AudioOutput, P: AudioPrefetcher> {
    output: O,
    prefetcher: P,
    document: Arc<Document>,
    state: PlayerState,
    /// Playing or pending index
    current: Option<usize>,
    /// Output holds the audio of `current`
    loaded: bool,
    prefetched: HashSet<AudioRef>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl<O: AudioOutput, P: AudioPrefetcher> PlaybackEngine<O, P> {
    pub fn new(output: O, prefetcher: P) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            output,
            prefetcher,
            document: Arc::default(),
            state: PlayerState::Idle,
            current: None,
            loaded: false,
            prefetched: HashSet::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Segment loaded in the output (playing or paused on it)
    pub fn playing_index(&self) -> Option<usize> {
        self.current.filter(|_| self.loaded)
    }

    /// Segment being waited on
    pub fn pending_index(&self) -> Option<usize> {
        self.current.filter(|_| !self.loaded && self.state != PlayerState::Idle)
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn prefetcher(&self) -> &P {
        &self.prefetcher
    }

    /// Request playback of `index`
    ///
    /// Returns false when the request is refused for pointing behind the
    /// current position.
    pub fn play(&mut self, index: usize) -> bool {
        self.request(index, false)
    }

    /// Pause whatever is playing and force playback of `index`
    pub fn jump(&mut self, index: usize) {
        self.pause();
        self.request(index, true);
    }

    pub fn pause(&mut self) {
        match self.state {
            PlayerState::Playing => {
                self.output.pause();
                self.set_state(PlayerState::Paused);
            }
            PlayerState::Waiting => self.set_state(PlayerState::Paused),
            PlayerState::Idle | PlayerState::Paused => {}
        }
    }

    /// Continue after a pause; re-decides when nothing was loaded
    pub fn resume(&mut self) {
        if self.state != PlayerState::Paused {
            return;
        }
        if self.loaded {
            self.output.resume();
            self.set_state(PlayerState::Playing);
        } else {
            self.advance_from(self.current.unwrap_or(0));
        }
    }

    /// Stop output, cancel prefetches and return to idle
    pub fn reset(&mut self) {
        self.output.stop();
        self.prefetcher.cancel_all();
        self.prefetched.clear();
        self.loaded = false;
        self.current = None;
        self.set_state(PlayerState::Idle);
    }

    /// The output finished segment `index`
    pub fn on_segment_ended(&mut self, index: usize) {
        if self.state != PlayerState::Playing || self.current != Some(index) {
            tracing::debug!(index, current = ?self.current, "Ignoring stale segment end");
            return;
        }
        self.loaded = false;
        self.advance_from(index + 1);
    }

    /// Replace the document snapshot
    pub fn update_segments(&mut self, document: Arc<Document>) {
        self.document = document;
        self.prefetch_new();
        self.retry_waiting();
    }

    /// Audio for one segment became available
    pub fn on_audio_ready(&mut self, index: usize, audio_ref: AudioRef) {
        if !Arc::make_mut(&mut self.document).set_audio(index, audio_ref, None) {
            tracing::debug!(index, "Audio for unknown segment");
            return;
        }
        self.prefetch_new();
        self.retry_waiting();
    }

    fn request(&mut self, index: usize, force: bool) -> bool {
        if !force {
            if let Some(current) = self.current {
                if index < current {
                    tracing::debug!(index, current, "Refusing backwards playback");
                    return false;
                }
            }
        }
        if self.state == PlayerState::Playing && self.current == Some(index) {
            return true;
        }
        self.advance_from(index);
        true
    }

    /// Play the first playable segment at or after `index`
    fn advance_from(&mut self, mut index: usize) {
        loop {
            let Some(segment) = self.document.segments.get(index).cloned() else {
                if self.document.completed {
                    self.finish();
                } else {
                    self.wait_on(index);
                }
                return;
            };

            if !segment.is_audio_bearing() {
                index += 1;
                continue;
            }
            if segment.has_failed_audio() {
                self.report_failed(index, "Audio generation failed".to_string());
                index += 1;
                continue;
            }

            let Some(audio_ref) = segment.audio_ref.as_ref().filter(|r| r.is_valid()) else {
                self.wait_on(index);
                return;
            };
            match self.output.start(index, audio_ref) {
                Ok(()) => {
                    self.current = Some(index);
                    self.loaded = true;
                    self.set_state(PlayerState::Playing);
                    self.send(PlaybackEvent::SegmentStarted {
                        index,
                        audio_ref: audio_ref.clone(),
                    });
                    return;
                }
                Err(e) => {
                    self.report_failed(index, e.to_string());
                    index += 1;
                }
            }
        }
    }

    fn wait_on(&mut self, index: usize) {
        if self.loaded {
            self.output.stop();
            self.loaded = false;
        }
        self.current = Some(index);
        self.set_state(PlayerState::Waiting);
        self.send(PlaybackEvent::Waiting { index });
    }

    fn finish(&mut self) {
        self.output.stop();
        self.loaded = false;
        self.current = None;
        self.set_state(PlayerState::Idle);
        self.send(PlaybackEvent::Finished);
    }

    fn report_failed(&mut self, index: usize, reason: String) {
        tracing::warn!(index, reason = %reason, "Skipping segment");
        self.send(PlaybackEvent::SegmentFailed { index, reason });
    }

    /// Whether `index` still has nothing to play and nothing to skip
    fn is_pending(&self, index: usize) -> bool {
        match self.document.segments.get(index) {
            None => !self.document.completed,
            Some(s) => s.is_audio_bearing() && !s.has_failed_audio() && !s.has_valid_audio(),
        }
    }

    fn retry_waiting(&mut self) {
        if self.state != PlayerState::Waiting {
            return;
        }
        if let Some(index) = self.current {
            if !self.is_pending(index) {
                self.advance_from(index);
            }
        }
    }

    fn prefetch_new(&mut self) {
        for segment in &self.document.segments {
            if let Some(audio_ref) = segment.audio_ref.as_ref().filter(|r| r.is_valid()) {
                if self.prefetched.insert(audio_ref.clone()) {
                    self.prefetcher.prefetch(audio_ref);
                }
            }
        }
    }

    fn set_state(&mut self, to: PlayerState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(?from, ?to, "Player state changed");
        self.send(PlaybackEvent::StateChanged { from, to });
    }

    fn send(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use guided_audio_core::Segment;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Start(usize),
        Pause,
        Resume,
        Stop,
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingOutput {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub reject: Arc<Mutex<HashSet<usize>>>,
    }

    impl AudioOutput for RecordingOutput {
        fn start(&mut self, index: usize, _audio_ref: &AudioRef) -> Result<(), PlayerError> {
            if self.reject.lock().contains(&index) {
                return Err(PlayerError::Load {
                    index,
                    reason: "unsupported".to_string(),
                });
            }
            self.calls.lock().push(Call::Start(index));
            Ok(())
        }

        fn pause(&mut self) {
            self.calls.lock().push(Call::Pause);
        }

        fn resume(&mut self) {
            self.calls.lock().push(Call::Resume);
        }

        fn stop(&mut self) {
            self.calls.lock().push(Call::Stop);
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingPrefetcher {
        pub fetched: Arc<Mutex<Vec<AudioRef>>>,
        pub cancels: Arc<Mutex<usize>>,
    }

    impl AudioPrefetcher for RecordingPrefetcher {
        fn prefetch(&self, audio_ref: &AudioRef) {
            self.fetched.lock().push(audio_ref.clone());
        }

        fn cancel_all(&self) {
            *self.cancels.lock() += 1;
        }
    }

    type Engine = PlaybackEngine<RecordingOutput, RecordingPrefetcher>;

    fn engine() -> Engine {
        PlaybackEngine::new(RecordingOutput::default(), RecordingPrefetcher::default())
    }

    fn starts(engine: &Engine) -> Vec<usize> {
        engine
            .output()
            .calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Start(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// heading, speech(a), pause(p), speech (no audio yet)
    fn partial() -> Arc<Document> {
        Arc::new(Document::with_segments(
            "Calm",
            vec![
                Segment::heading("Begin").completed(),
                Segment::speech("one").completed().with_audio("a", Some(500)),
                Segment::pause(2.0).completed().with_audio("p", Some(2000)),
                Segment::speech("two").completed(),
            ],
            false,
        ))
    }

    #[test]
    fn test_plays_through_and_skips_headings() {
        let mut engine = engine();
        engine.update_segments(partial());

        assert!(engine.play(0));
        assert_eq!(engine.state(), PlayerState::Playing);
        assert_eq!(engine.current_index(), Some(1));

        engine.on_segment_ended(1);
        assert_eq!(engine.current_index(), Some(2));
        engine.on_segment_ended(2);
        assert_eq!(engine.state(), PlayerState::Waiting);
        assert_eq!(engine.current_index(), Some(3));
        assert_eq!(starts(&engine), vec![1, 2]);
    }

    #[test]
    fn test_jump_without_audio_waits() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        engine.update_segments(partial());
        engine.play(1);

        engine.jump(3);
        assert_eq!(engine.state(), PlayerState::Waiting);
        assert_eq!(engine.pending_index(), Some(3));
        assert_eq!(engine.playing_index(), None);
        assert!(drain(&mut rx).contains(&PlaybackEvent::Waiting { index: 3 }));
        assert!(!starts(&engine).contains(&3));
    }

    #[test]
    fn test_waiting_resumes_when_audio_arrives() {
        let mut engine = engine();
        engine.update_segments(partial());
        engine.jump(3);
        assert_eq!(engine.state(), PlayerState::Waiting);

        engine.on_audio_ready(3, AudioRef::new("b"));
        assert_eq!(engine.state(), PlayerState::Playing);
        assert_eq!(engine.current_index(), Some(3));
        assert_eq!(starts(&engine), vec![3]);
    }

    #[test]
    fn test_snapshot_update_unblocks_waiting() {
        let mut engine = engine();
        engine.update_segments(partial());
        engine.jump(3);

        let mut document = (*partial()).clone();
        document.set_audio(3, AudioRef::new("b"), Some(400));
        engine.update_segments(Arc::new(document));
        assert_eq!(engine.state(), PlayerState::Playing);
    }

    #[test]
    fn test_backwards_request_refused_unless_forced() {
        let mut engine = engine();
        engine.update_segments(partial());
        engine.play(2);
        assert_eq!(engine.current_index(), Some(2));

        assert!(!engine.play(1));
        assert_eq!(engine.current_index(), Some(2));

        // Replaying the current index is a no-op
        assert!(engine.play(2));
        assert_eq!(starts(&engine), vec![2]);

        engine.jump(1);
        assert_eq!(engine.current_index(), Some(1));
        assert_eq!(starts(&engine), vec![2, 1]);
    }

    #[test]
    fn test_failed_segments_are_skipped() {
        let mut engine = engine();
        let mut rx = engine.subscribe();
        let document = Document::with_segments(
            "Calm",
            vec![
                Segment::speech("one").completed().with_audio(AudioRef::error("tts down"), None),
                Segment::speech("two").completed().with_audio("b", Some(300)),
            ],
            true,
        );
        engine.update_segments(Arc::new(document));
        engine.output.reject.lock().insert(1);

        engine.play(0);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, PlaybackEvent::SegmentFailed { index: 0, .. })));
        assert!(events.iter().any(|e| matches!(e, PlaybackEvent::SegmentFailed { index: 1, .. })));
        assert_eq!(events.last(), Some(&PlaybackEvent::Finished));
        assert_eq!(engine.state(), PlayerState::Idle);
    }

    #[test]
    fn test_end_of_incomplete_document_waits() {
        let mut engine = engine();
        let mut document = (*partial()).clone();
        document.set_audio(3, AudioRef::new("b"), None);
        engine.update_segments(Arc::new(document.clone()));

        engine.play(3);
        engine.on_segment_ended(3);
        assert_eq!(engine.state(), PlayerState::Waiting);
        assert_eq!(engine.current_index(), Some(4));

        document.completed = true;
        engine.update_segments(Arc::new(document));
        assert_eq!(engine.state(), PlayerState::Idle);
    }

    #[test]
    fn test_pause_resume() {
        let mut engine = engine();
        engine.update_segments(partial());
        engine.play(1);

        engine.pause();
        assert_eq!(engine.state(), PlayerState::Paused);
        engine.resume();
        assert_eq!(engine.state(), PlayerState::Playing);
        assert_eq!(
            *engine.output().calls.lock(),
            vec![Call::Start(1), Call::Pause, Call::Resume]
        );

        // Paused while waiting: resume re-decides
        engine.jump(3);
        engine.pause();
        engine.on_audio_ready(3, AudioRef::new("b"));
        assert_eq!(engine.state(), PlayerState::Paused);
        engine.resume();
        assert_eq!(engine.state(), PlayerState::Playing);
        assert_eq!(engine.current_index(), Some(3));
    }

    #[test]
    fn test_prefetch_once_and_reset() {
        let mut engine = engine();
        engine.update_segments(partial());
        engine.update_segments(partial());
        assert_eq!(
            *engine.prefetcher().fetched.lock(),
            vec![AudioRef::new("a"), AudioRef::new("p")]
        );

        engine.play(1);
        engine.reset();
        assert_eq!(engine.state(), PlayerState::Idle);
        assert_eq!(engine.current_index(), None);
        assert_eq!(*engine.prefetcher().cancels.lock(), 1);
        assert_eq!(engine.output().calls.lock().last(), Some(&Call::Stop));

        // After reset the position guard is cleared
        assert!(engine.play(1));
    }
}
