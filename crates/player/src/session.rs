//! Event loop around a [`PlaybackEngine`]
//!
//! Feeds the engine from three sources: synthesis events (document
//! snapshots), listener commands, and end-of-segment notifications from the
//! output. The session ends on [`PlayerCommand::Shutdown`] or when the
//! command channel closes.

use tokio::sync::mpsc;

use guided_audio_pipeline::SynthesisEvent;

use crate::engine::{AudioOutput, AudioPrefetcher, PlaybackEngine};

/// Listener controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play(usize),
    Jump(usize),
    Pause,
    Resume,
    Reset,
    Shutdown,
}

/// Owns an engine and the channels that drive it
pub struct PlayerSession<O: AudioOutput, P: AudioPrefetcher> {
    engine: PlaybackEngine<O, P>,
    synthesis: mpsc::Receiver<SynthesisEvent>,
    commands: mpsc::Receiver<PlayerCommand>,
    ended: mpsc::Receiver<usize>,
}

impl<O: AudioOutput, P: AudioPrefetcher> PlayerSession<O, P> {
    pub fn new(
        engine: PlaybackEngine<O, P>,
        synthesis: mpsc::Receiver<SynthesisEvent>,
        commands: mpsc::Receiver<PlayerCommand>,
        ended: mpsc::Receiver<usize>,
    ) -> Self {
        Self {
            engine,
            synthesis,
            commands,
            ended,
        }
    }

    pub fn engine(&self) -> &PlaybackEngine<O, P> {
        &self.engine
    }

    /// Run until shutdown; the engine is reset and handed back
    pub async fn run(mut self) -> PlaybackEngine<O, P> {
        let mut synthesis_open = true;
        let mut ended_open = true;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(PlayerCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },

                index = self.ended.recv(), if ended_open => match index {
                    Some(index) => self.engine.on_segment_ended(index),
                    None => ended_open = false,
                },

                event = self.synthesis.recv(), if synthesis_open => match event {
                    Some(event) => self.on_synthesis(event),
                    None => {
                        tracing::debug!("Synthesis stream closed");
                        synthesis_open = false;
                    }
                },
            }
        }

        tracing::debug!(state = ?self.engine.state(), "Player session ended");
        self.engine.reset();
        self.engine
    }

    fn on_command(&mut self, command: PlayerCommand) {
        tracing::trace!(?command, "Player command");
        match command {
            PlayerCommand::Play(index) => {
                self.engine.play(index);
            }
            PlayerCommand::Jump(index) => self.engine.jump(index),
            PlayerCommand::Pause => self.engine.pause(),
            PlayerCommand::Resume => self.engine.resume(),
            PlayerCommand::Reset => self.engine.reset(),
            PlayerCommand::Shutdown => {}
        }
    }

    fn on_synthesis(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Update { document } => self.engine.update_segments(document),
            SynthesisEvent::Progress { progress } => {
                tracing::trace!(progress, "Synthesis progress")
            }
            SynthesisEvent::Complete { asset_ref } => {
                tracing::info!(asset_ref = %asset_ref, "Synthesis finished")
            }
            // Playback continues with whatever audio exists
            SynthesisEvent::Error { message } => {
                tracing::warn!(error = %message, "Synthesis failed")
            }
        }
    }
}
