//! Callback-style entry point for a finished script
//!
//! [`start_synthesis`] hands a complete document to a fresh run and turns
//! its event stream into listener calls. `on_segment_ready` fires once per
//! segment the first time it carries a fetchable reference.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use guided_audio_core::{
    AudioRef, AudioStorage, CancellationToken, Document, SpeechSynthesizer, VoiceSettings,
};

use crate::events::SynthesisEvent;
use crate::orchestrator::{SynthesisConfig, SynthesisHandle, SynthesisOrchestrator};
use crate::PipelineError;

/// Receives run notifications; every method defaults to a no-op
pub trait SynthesisListener: Send + 'static {
    fn on_progress(&mut self, _progress: u8) {}

    fn on_update(&mut self, _document: &Arc<Document>) {}

    fn on_segment_ready(&mut self, _index: usize, _audio_ref: &AudioRef) {}

    fn on_complete(&mut self, _asset_ref: &AudioRef) {}

    fn on_error(&mut self, _message: &str) {}
}

/// Synthesize a complete document with default run settings
pub fn start_synthesis<L: SynthesisListener>(
    document: Document,
    voice: VoiceSettings,
    storage: Arc<dyn AudioStorage>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    listener: L,
) -> Result<SynthesisHandle, PipelineError> {
    SynthesisOrchestrator::new(SynthesisConfig::default(), synthesizer, storage)
        .start_document(document, voice, listener)
}

impl SynthesisOrchestrator {
    /// Synthesize a complete document, reporting through `listener`
    ///
    /// The document is treated as final: it and all its segments are marked
    /// completed before the run starts.
    pub fn start_document<L: SynthesisListener>(
        &self,
        mut document: Document,
        voice: VoiceSettings,
        listener: L,
    ) -> Result<SynthesisHandle, PipelineError> {
        document.completed = true;
        for segment in &mut document.segments {
            if !segment.completed {
                Arc::make_mut(segment).completed = true;
            }
        }
        let json =
            serde_json::to_string(&document).map_err(|e| PipelineError::Parse(e.to_string()))?;

        let input = futures::stream::iter(vec![Ok(json)]);
        let (tx, rx) = mpsc::channel(self.config().event_channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let orchestrator = self.clone();
        let run_cancel = cancel.clone();
        let dispatch_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let run = orchestrator.run(input, voice, tx, run_cancel);
            let dispatch = dispatch_events(rx, listener, dispatch_cancel);
            let (outcome, _) = tokio::join!(run, dispatch);
            outcome
        });

        Ok(SynthesisHandle::new(cancel, join))
    }
}

async fn dispatch_events<L: SynthesisListener>(
    mut rx: mpsc::Receiver<SynthesisEvent>,
    mut listener: L,
    cancel: CancellationToken,
) {
    let mut reported: HashSet<usize> = HashSet::new();

    while let Some(event) = rx.recv().await {
        // Events buffered before an abort are discarded
        if cancel.is_cancelled() {
            break;
        }
        match event {
            SynthesisEvent::Progress { progress } => listener.on_progress(progress),
            SynthesisEvent::Update { document } => {
                for (index, segment) in document.segments.iter().enumerate() {
                    if let Some(audio_ref) = segment.audio_ref.as_ref().filter(|r| r.is_valid()) {
                        if reported.insert(index) {
                            listener.on_segment_ready(index, audio_ref);
                        }
                    }
                }
                listener.on_update(&document);
            }
            SynthesisEvent::Complete { asset_ref } => listener.on_complete(&asset_ref),
            SynthesisEvent::Error { message } => listener.on_error(&message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::RunState;
    use crate::tts::StubSpeechSynthesizer;
    use guided_audio_core::Segment;
    use guided_audio_persistence::InMemoryStorage;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorded {
        progress: Vec<u8>,
        ready: Vec<usize>,
        complete: Option<AudioRef>,
        errors: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Recorded>>);

    impl SynthesisListener for Recorder {
        fn on_progress(&mut self, progress: u8) {
            self.0.lock().unwrap().progress.push(progress);
        }

        fn on_segment_ready(&mut self, index: usize, _audio_ref: &AudioRef) {
            self.0.lock().unwrap().ready.push(index);
        }

        fn on_complete(&mut self, asset_ref: &AudioRef) {
            self.0.lock().unwrap().complete = Some(asset_ref.clone());
        }

        fn on_error(&mut self, message: &str) {
            self.0.lock().unwrap().errors.push(message.to_string());
        }
    }

    fn document() -> Document {
        Document::with_segments(
            "Morning",
            vec![
                Segment::heading("Wake"),
                Segment::speech("Good morning."),
                Segment::pause(3.0),
                Segment::speech("Stretch gently."),
            ],
            false,
        )
    }

    #[tokio::test]
    async fn test_listener_receives_lifecycle() {
        let recorder = Recorder::default();
        let handle = start_synthesis(
            document(),
            VoiceSettings::default(),
            Arc::new(InMemoryStorage::new()),
            Arc::new(StubSpeechSynthesizer::new(24000)),
            recorder.clone(),
        )
        .unwrap();

        let outcome = handle.wait().await;
        assert_eq!(outcome.state, RunState::Done);

        let recorded = recorder.0.lock().unwrap();
        assert_eq!(recorded.complete, outcome.asset_ref);
        assert!(recorded.errors.is_empty());
        assert_eq!(recorded.progress.last(), Some(&100));

        let mut ready = recorded.ready.clone();
        ready.sort_unstable();
        assert_eq!(ready, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_abort_silences_listener() {
        let recorder = Recorder::default();
        let slow = StubSpeechSynthesizer::new(24000).with_latency(Duration::from_secs(30));
        let handle = start_synthesis(
            document(),
            VoiceSettings::default(),
            Arc::new(InMemoryStorage::new()),
            Arc::new(slow),
            recorder.clone(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        let outcome = handle.wait().await;

        assert_eq!(outcome.state, RunState::Aborted);
        let recorded = recorder.0.lock().unwrap();
        assert!(recorded.complete.is_none());
        assert!(recorded.errors.is_empty());
    }
}
