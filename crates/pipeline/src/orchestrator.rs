//! Synthesis run orchestration
//!
//! One run owns its document. It feeds streamed text to the parser,
//! dispatches generation as segments complete (speech through the gate,
//! silence directly), merges results by index and, once the document is
//! complete and every speech/pause segment has audio, lays out the timeline
//! and renders the final asset. Progress, document snapshots and the terminal
//! outcome are sent as [`SynthesisEvent`]s.
//!
//! States: Streaming → Concatenating → Done, with Error and Aborted reachable
//! from either of the first two. Nothing is emitted after an abort.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use guided_audio_config::{constants, Settings};
use guided_audio_core::{
    AssetKind, AssetMeta, AudioRef, AudioStorage, CancellationToken, Document, Segment,
    SpeechSynthesizer, Timeline, VoiceSettings,
};

use crate::composer::{AudioComposer, ComposerConfig};
use crate::events::SynthesisEvent;
use crate::gate::ConcurrencyGate;
use crate::generator::{GeneratedAudio, SegmentGenerator, SilenceCache};
use crate::parser::IncrementalDocumentParser;
use crate::timeline::{GapPolicy, TimelineBuilder};
use crate::wav;
use crate::PipelineError;

static RUN_IDS: AtomicU64 = AtomicU64::new(1);

/// Per-run configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub max_concurrent_speech: usize,
    pub event_channel_capacity: usize,
    /// Share of overall progress covered by generation; rendering covers the rest
    pub generation_share: u8,
    pub voice: VoiceSettings,
    pub gap_policy: GapPolicy,
    pub composer: ComposerConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_concurrent_speech: constants::synthesis::MAX_CONCURRENT_SPEECH,
            event_channel_capacity: constants::synthesis::EVENT_CHANNEL_CAPACITY,
            generation_share: constants::synthesis::GENERATION_PROGRESS_SHARE,
            voice: VoiceSettings::default(),
            gap_policy: GapPolicy::default(),
            composer: ComposerConfig::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_concurrent_speech: settings.synthesis.max_concurrent_speech,
            event_channel_capacity: settings.synthesis.event_channel_capacity,
            generation_share: constants::synthesis::GENERATION_PROGRESS_SHARE,
            voice: settings.tts.voice_settings(),
            gap_policy: GapPolicy::from(&settings.timeline),
            composer: ComposerConfig::from(&settings.audio),
        }
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Streaming,
    Concatenating,
    Done,
    Error,
    Aborted,
}

/// Final state of a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub document: Arc<Document>,
    pub timeline: Option<Timeline>,
    pub asset_ref: Option<AudioRef>,
    pub error: Option<String>,
}

impl RunOutcome {
    fn failed(message: String) -> Self {
        Self {
            state: RunState::Error,
            document: Arc::default(),
            timeline: None,
            asset_ref: None,
            error: Some(message),
        }
    }
}

/// Control over a spawned run
pub struct SynthesisHandle {
    cancel: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl SynthesisHandle {
    pub(crate) fn new(cancel: CancellationToken, join: JoinHandle<RunOutcome>) -> Self {
        Self { cancel, join }
    }

    /// Cancel the run; no further events are emitted
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end
    pub async fn wait(self) -> RunOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::failed(format!("Run task failed: {}", e)),
        }
    }
}

/// Starts synthesis runs against one speech backend and one storage
#[derive(Clone)]
pub struct SynthesisOrchestrator {
    config: SynthesisConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    storage: Arc<dyn AudioStorage>,
    silence: Arc<SilenceCache>,
}

impl SynthesisOrchestrator {
    pub fn new(
        config: SynthesisConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        storage: Arc<dyn AudioStorage>,
    ) -> Self {
        let silence = Arc::new(SilenceCache::new(storage.clone(), config.composer.sample_rate));
        Self {
            config,
            synthesizer,
            storage,
            silence,
        }
    }

    /// Share a silence cache across orchestrators using the same storage
    pub fn with_silence_cache(mut self, silence: Arc<SilenceCache>) -> Self {
        self.silence = silence;
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn AudioStorage> {
        &self.storage
    }

    /// Spawn a run with the configured voice
    pub fn start<S>(&self, input: S) -> (SynthesisHandle, mpsc::Receiver<SynthesisEvent>)
    where
        S: Stream<Item = Result<String, PipelineError>> + Send + 'static,
    {
        self.start_with_voice(input, self.config.voice.clone())
    }

    /// Spawn a run; events arrive on the returned receiver
    pub fn start_with_voice<S>(
        &self,
        input: S,
        voice: VoiceSettings,
    ) -> (SynthesisHandle, mpsc::Receiver<SynthesisEvent>)
    where
        S: Stream<Item = Result<String, PipelineError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let orchestrator = self.clone();
        let run_cancel = cancel.clone();
        let join =
            tokio::spawn(async move { orchestrator.run(input, voice, tx, run_cancel).await });

        (SynthesisHandle::new(cancel, join), rx)
    }

    /// Drive one run to its end on the current task
    pub async fn run<S>(
        &self,
        input: S,
        voice: VoiceSettings,
        events: mpsc::Sender<SynthesisEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome
    where
        S: Stream<Item = Result<String, PipelineError>> + Send,
    {
        let run_id = RUN_IDS.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!("synthesis_run", run_id);

        let generator = Arc::new(SegmentGenerator::new(
            self.synthesizer.clone(),
            self.storage.clone(),
            self.silence.clone(),
            voice,
        ));
        let mut run = Run {
            parser: IncrementalDocumentParser::new(),
            document: Arc::default(),
            generated: HashMap::new(),
            gate: ConcurrencyGate::new(self.config.max_concurrent_speech),
            generator,
            inflight: FuturesUnordered::new(),
            events,
            cancel,
            builder: TimelineBuilder::new(self.config.gap_policy.clone()),
            composer: AudioComposer::new(self.config.composer.clone()),
            storage: self.storage.clone(),
            generation_share: self.config.generation_share.min(100),
            progress: 0,
            state: RunState::Streaming,
            timeline: None,
            asset_ref: None,
        };

        metrics::gauge!("guided_audio_active_runs").increment(1.0);
        let started = Instant::now();
        let outcome = run.drive(input).instrument(span).await;
        metrics::gauge!("guided_audio_active_runs").decrement(1.0);

        let label = match outcome.state {
            RunState::Done => "done",
            RunState::Aborted => "aborted",
            _ => "error",
        };
        metrics::counter!("guided_audio_runs_total", "outcome" => label).increment(1);
        metrics::histogram!("guided_audio_run_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }
}

type Inflight = BoxFuture<'static, (usize, Option<GeneratedAudio>)>;

/// State owned by one run
struct Run {
    parser: IncrementalDocumentParser,
    /// Parsed document with generated audio merged in
    document: Arc<Document>,
    /// Segments carrying generated audio, by index
    generated: HashMap<usize, Arc<Segment>>,
    gate: ConcurrencyGate,
    generator: Arc<SegmentGenerator>,
    inflight: FuturesUnordered<Inflight>,
    events: mpsc::Sender<SynthesisEvent>,
    cancel: CancellationToken,
    builder: TimelineBuilder,
    composer: AudioComposer,
    storage: Arc<dyn AudioStorage>,
    generation_share: u8,
    progress: u8,
    state: RunState,
    timeline: Option<Timeline>,
    asset_ref: Option<AudioRef>,
}

impl Run {
    async fn drive<S>(&mut self, input: S) -> RunOutcome
    where
        S: Stream<Item = Result<String, PipelineError>> + Send,
    {
        let mut input = Box::pin(input);
        let mut input_open = true;
        tracing::info!("Synthesis run started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return self.abort(),

                Some((index, audio)) = self.inflight.next(), if !self.inflight.is_empty() => {
                    self.on_generated(index, audio).await;
                }

                chunk = input.next(), if input_open => match chunk {
                    Some(Ok(text)) => {
                        if let Err(message) = self.on_chunk(&text).await {
                            return self.fail(message).await;
                        }
                    }
                    Some(Err(e)) => return self.fail(format!("Input stream failed: {}", e)).await,
                    None => {
                        input_open = false;
                        tracing::debug!(pending = self.inflight.len(), "Input closed");
                    }
                },
            }

            if self.document.is_ready_for_concatenation() {
                return self.concatenate().await;
            }
            if !input_open && self.inflight.is_empty() {
                let reason = self.stall_reason();
                return self.fail(reason).await;
            }
        }
    }

    /// Feed one chunk; a segment that can never parse ends the run
    async fn on_chunk(&mut self, text: &str) -> Result<(), String> {
        let update = self.parser.push(text);
        if let Some(rejected) = update.rejected {
            return Err(format!("Segment {} is invalid: {}", rejected.index, rejected.reason));
        }
        for &index in &update.newly_completed {
            self.dispatch(index);
        }

        if update.changed {
            self.refresh();
            self.emit(SynthesisEvent::Update {
                document: self.document.clone(),
            })
            .await;
            self.emit_generation_progress().await;
        }
        Ok(())
    }

    /// Queue generation for a newly completed segment
    fn dispatch(&mut self, index: usize) {
        let Some(segment) = self.parser.document().segments.get(index).cloned() else {
            return;
        };
        if !segment.is_audio_bearing() {
            return;
        }
        if segment.has_valid_audio() {
            tracing::debug!(index, "Segment already carries audio");
            return;
        }

        let generator = self.generator.clone();
        let cancel = self.cancel.clone();
        let is_speech = segment.is_speech();
        let job = async move { generator.generate(index, &segment, &cancel).await };

        if is_speech {
            let result = self.gate.submit(job);
            self.inflight.push(async move { (index, result.await.ok()) }.boxed());
        } else {
            let handle = tokio::spawn(job);
            self.inflight.push(async move { (index, handle.await.ok()) }.boxed());
        }
        tracing::trace!(
            index,
            queued = self.gate.queued(),
            active = self.gate.active(),
            "Dispatched segment"
        );
    }

    async fn on_generated(&mut self, index: usize, audio: Option<GeneratedAudio>) {
        let audio = audio
            .unwrap_or_else(|| GeneratedAudio::failed("Generation task ended unexpectedly"));
        let Some(base) = self.parser.document().segments.get(index) else {
            return;
        };

        let mut segment = Segment::clone(base);
        segment.audio_ref = Some(audio.audio_ref);
        if audio.duration_ms.is_some() {
            segment.duration_ms = audio.duration_ms;
        }
        self.generated.insert(index, Arc::new(segment));

        self.refresh();
        self.emit(SynthesisEvent::Update {
            document: self.document.clone(),
        })
        .await;
        self.emit_generation_progress().await;
    }

    /// Rebuild the merged snapshot; only changed indices are replaced
    fn refresh(&mut self) {
        let parsed = self.parser.document();
        let mut document = Document {
            title: parsed.title.clone(),
            segments: parsed.segments.clone(),
            completed: parsed.completed,
        };
        for (index, segment) in &self.generated {
            if let Some(slot) = document.segments.get_mut(*index) {
                *slot = segment.clone();
            }
        }
        self.document = Arc::new(document);
    }

    async fn emit_generation_progress(&mut self) {
        let (settled, total) = self
            .document
            .segments
            .iter()
            .filter(|s| s.is_audio_bearing())
            .fold((0usize, 0usize), |(settled, total), s| {
                (settled + usize::from(s.audio_ref.is_some()), total + 1)
            });
        if total == 0 {
            return;
        }
        let value = (self.generation_share as usize * settled / total) as u8;
        self.emit_progress(value).await;
    }

    /// Emit progress only when it moves forward
    async fn emit_progress(&mut self, value: u8) {
        let value = value.min(100);
        if value <= self.progress {
            return;
        }
        self.progress = value;
        self.emit(SynthesisEvent::Progress { progress: value }).await;
    }

    // Borrows only the Sync fields so the future stays Send (`inflight` is not Sync)
    fn emit(&self, event: SynthesisEvent) -> impl std::future::Future<Output = ()> + Send + '_ {
        let cancel = &self.cancel;
        let events = &self.events;
        async move {
            if cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                sent = events.send(event) => {
                    if sent.is_err() {
                        tracing::trace!("Event receiver dropped");
                    }
                }
            }
        }
    }

    async fn concatenate(&mut self) -> RunOutcome {
        self.state = RunState::Concatenating;
        let share = self.generation_share;
        self.emit_progress(share).await;

        let sources = match self.load_speech().await {
            Ok(sources) => sources,
            Err(None) => return self.abort(),
            Err(Some(message)) => return self.fail(message).await,
        };

        let document = self.document.clone();
        let timeline = self.builder.build(&document.segments, document.completed);
        tracing::info!(
            segments = document.len(),
            timings = timeline.timings.len(),
            total_ms = timeline.total_duration_ms,
            "Concatenating"
        );

        let composer = self.composer.clone();
        let render_timeline = timeline.clone();
        let compose_started = Instant::now();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();
        let mut task = tokio::task::spawn_blocking(move || {
            composer.compose(&render_timeline, &sources, |p| {
                let _ = progress_tx.send(p);
            })
        });

        let joined = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abort(),
                Some(p) = progress_rx.recv() => {
                    let scaled = share as u16 + p as u16 * (100 - share as u16) / 100;
                    // 100 is reserved for the stored asset
                    self.emit_progress(scaled.min(99) as u8).await;
                }
                joined = &mut task => break joined,
            }
        };

        metrics::histogram!("guided_audio_compose_seconds")
            .record(compose_started.elapsed().as_secs_f64());
        let asset = match joined {
            Ok(Ok(asset)) => asset,
            Ok(Err(e)) => return self.fail(e.to_string()).await,
            Err(e) => return self.fail(format!("Composition task failed: {}", e)).await,
        };

        let meta = AssetMeta::wav(AssetKind::Asset, Some(asset.duration_ms));
        let saved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.abort(),
            saved = self.storage.save(asset.bytes, meta) => saved,
        };
        let asset_ref = match saved {
            Ok(asset_ref) => asset_ref,
            Err(e) => return self.fail(format!("Failed to store asset: {}", e)).await,
        };

        tracing::info!(
            asset_ref = %asset_ref,
            duration_ms = asset.duration_ms,
            "Synthesis complete"
        );
        self.emit_progress(100).await;
        self.emit(SynthesisEvent::Complete {
            asset_ref: asset_ref.clone(),
        })
        .await;

        self.state = RunState::Done;
        self.timeline = Some(timeline);
        self.asset_ref = Some(asset_ref);
        self.outcome(None)
    }

    /// Fetch every speech source, measuring audio that arrived without a duration
    ///
    /// `Err(None)` means the run was cancelled.
    async fn load_speech(&mut self) -> Result<HashMap<usize, Vec<u8>>, Option<String>> {
        let mut sources = HashMap::new();
        let mut measured = false;

        let document = self.document.clone();
        for (index, segment) in document.segments.iter().enumerate() {
            let Some(audio_ref) = segment.audio_ref.as_ref().filter(|r| r.is_valid()) else {
                continue;
            };
            if !segment.is_speech() {
                continue;
            }
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(None),
                fetched = self.storage.get(audio_ref) => fetched,
            };
            let bytes = fetched
                .map_err(|e| Some(format!("Failed to load audio for segment {}: {}", index, e)))?;

            if segment.duration_ms.is_none() {
                let duration_ms = wav::duration_ms(&bytes).map_err(|e| {
                    Some(format!("Failed to read audio for segment {}: {}", index, e))
                })?;
                tracing::debug!(index, duration_ms, "Measured supplied audio");
                let mut updated = Segment::clone(segment);
                updated.duration_ms = Some(duration_ms);
                self.generated.insert(index, Arc::new(updated));
                measured = true;
            }
            sources.insert(index, bytes);
        }

        if measured {
            self.refresh();
            self.emit(SynthesisEvent::Update {
                document: self.document.clone(),
            })
            .await;
        }
        Ok(sources)
    }

    fn stall_reason(&self) -> String {
        let document = &self.document;
        let failed = document.failed_indices();
        if !failed.is_empty() {
            let list = failed.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
            format!("Audio generation failed for segment(s) {}", list)
        } else if !document.completed {
            "Input ended before the document was completed".to_string()
        } else if !document.all_segments_completed() {
            "Input ended with incomplete segments".to_string()
        } else {
            "Input ended before all audio was ready".to_string()
        }
    }

    async fn fail(&mut self, message: String) -> RunOutcome {
        tracing::error!(error = %message, "Synthesis run failed");
        self.state = RunState::Error;
        self.gate.close();
        self.emit(SynthesisEvent::Error {
            message: message.clone(),
        })
        .await;
        self.outcome(Some(message))
    }

    fn abort(&mut self) -> RunOutcome {
        tracing::info!(state = ?self.state, "Synthesis run aborted");
        self.state = RunState::Aborted;
        self.gate.close();
        self.outcome(None)
    }

    fn outcome(&mut self, error: Option<String>) -> RunOutcome {
        RunOutcome {
            state: self.state,
            document: self.document.clone(),
            timeline: self.timeline.take(),
            asset_ref: self.asset_ref.take(),
            error,
        }
    }
}
