//! Sound cue dispatcher.
//!
//! The daemon does not synthesize audio. It decides *when* a cue plays and with
//! which synth parameters, honours the mute preference, and hands cues to a
//! [`SoundSink`] (the SSE hub in production) for the renderer to play.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{dto::sse::ServerEvent, state::SseHub};

const COMMAND_CAPACITY: usize = 32;
const EVENT_SOUND: &str = "sound";

/// Every cue the game can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    /// Balloon popped.
    Pop,
    /// Shot fired.
    Shoot,
    /// Hit streak.
    Combo,
    /// Best score beaten; played at most once per round.
    NewBest,
    /// Round ended.
    GameOver,
}

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Soft tone.
    Sine,
    /// Hollow tone.
    Triangle,
    /// Bright chiptune tone.
    Square,
}

/// One oscillator voice of a cue.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Voice {
    /// Starting pitch.
    pub frequency_hz: f32,
    /// Pitch reached by the end of the cue, for sweeps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_to_hz: Option<f32>,
    /// Delay from the start of the cue.
    pub start_offset_ms: u32,
}

/// Synth parameters the renderer needs to play a cue.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SoundCue {
    /// Cue being played.
    pub kind: SoundKind,
    /// Oscillator shape of every voice.
    pub waveform: Waveform,
    /// Peak gain, between 0 and 1.
    pub gain: f32,
    /// Length of the whole cue.
    pub duration_ms: u32,
    /// Voices mixed into the cue.
    pub voices: Vec<Voice>,
}

fn voice(frequency_hz: f32, start_offset_ms: u32) -> Voice {
    Voice {
        frequency_hz,
        sweep_to_hz: None,
        start_offset_ms,
    }
}

fn staggered(frequencies: &[f32], step_ms: u32) -> Vec<Voice> {
    frequencies
        .iter()
        .zip((0..).map(|i| i * step_ms))
        .map(|(&frequency, offset)| voice(frequency, offset))
        .collect()
}

impl SoundKind {
    /// Synth parameters for this cue.
    pub fn cue(self) -> SoundCue {
        let (waveform, gain, duration_ms, voices) = match self {
            SoundKind::Pop => (
                Waveform::Sine,
                0.35,
                300,
                vec![Voice {
                    sweep_to_hz: Some(150.0),
                    ..voice(800.0, 0)
                }],
            ),
            SoundKind::Shoot => (
                Waveform::Triangle,
                0.2,
                300,
                vec![Voice {
                    sweep_to_hz: Some(600.0),
                    ..voice(150.0, 0)
                }],
            ),
            // A major arpeggio
            SoundKind::Combo => (
                Waveform::Sine,
                0.1,
                600,
                staggered(&[440.0, 554.37, 659.25], 50),
            ),
            // C major fanfare up to C6
            SoundKind::NewBest => (
                Waveform::Square,
                0.1,
                1_200,
                staggered(&[523.25, 659.25, 783.99, 1_046.5], 100),
            ),
            // descending G4 E4 C4
            SoundKind::GameOver => (
                Waveform::Triangle,
                0.12,
                600,
                staggered(&[392.0, 329.63, 261.63], 150),
            ),
        };

        SoundCue {
            kind: self,
            waveform,
            gain,
            duration_ms,
            voices,
        }
    }
}

/// Destination of cues that survived the mute check.
pub trait SoundSink: Send + Sync {
    /// Deliver one cue to the renderer.
    fn emit(&self, cue: SoundCue);
}

/// Publishes cues as `sound` events on the SSE stream.
pub struct SseSoundSink {
    hub: SseHub,
}

impl SseSoundSink {
    /// Sink publishing on `hub`.
    pub fn new(hub: SseHub) -> Self {
        Self { hub }
    }
}

impl SoundSink for SseSoundSink {
    fn emit(&self, cue: SoundCue) {
        match ServerEvent::json(Some(EVENT_SOUND.to_string()), &cue) {
            Ok(event) => self.hub.broadcast(event),
            Err(err) => warn!(kind = ?cue.kind, error = %err, "failed to serialize sound cue"),
        }
    }
}

/// Explicit configuration handed to the subsystem at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioConfig {
    /// Start muted, usually the persisted preference.
    pub muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioCommand {
    Play(SoundKind),
    SetMuted(bool),
    Shutdown,
}

/// Cheap, cloneable sender side of the audio worker.
#[derive(Clone)]
pub struct AudioHandle {
    commands: mpsc::Sender<AudioCommand>,
    muted: Arc<AtomicBool>,
}

impl AudioHandle {
    /// Request a cue without waiting; dropped when the worker is saturated or gone.
    pub fn play(&self, kind: SoundKind) {
        match self.commands.try_send(AudioCommand::Play(kind)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!(?kind, "audio queue full; dropping cue"),
            Err(TrySendError::Closed(_)) => debug!(?kind, "audio worker stopped; dropping cue"),
        }
    }

    /// Current mute flag, also read by the session snapshot.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Flip the mute flag and return the new value.
    pub async fn toggle_mute(&self) -> bool {
        let muted = !self.muted.fetch_xor(true, Ordering::SeqCst);
        self.send(AudioCommand::SetMuted(muted)).await;
        muted
    }

    async fn send(&self, command: AudioCommand) {
        if self.commands.send(command).await.is_err() {
            debug!(?command, "audio worker stopped; command ignored");
        }
    }
}

/// Owner of the audio worker task.
pub struct AudioSubsystem {
    handle: AudioHandle,
    worker: JoinHandle<()>,
}

impl AudioSubsystem {
    /// Spawn the worker. Must be called from within a Tokio runtime.
    pub fn start(config: AudioConfig, sink: Arc<dyn SoundSink>) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let worker = tokio::spawn(run_worker(config, receiver, sink));
        info!(muted = config.muted, "audio subsystem started");

        Self {
            handle: AudioHandle {
                commands,
                muted: Arc::new(AtomicBool::new(config.muted)),
            },
            worker,
        }
    }

    /// Sender side for the controller and the routes.
    pub fn handle(&self) -> AudioHandle {
        self.handle.clone()
    }

    /// Drain queued cues, stop the worker and wait for it.
    pub async fn shutdown(self) {
        self.handle.send(AudioCommand::Shutdown).await;
        if let Err(err) = self.worker.await {
            warn!(error = %err, "audio worker ended abnormally");
        }
        info!("audio subsystem stopped");
    }
}

async fn run_worker(
    config: AudioConfig,
    mut receiver: mpsc::Receiver<AudioCommand>,
    sink: Arc<dyn SoundSink>,
) {
    let mut muted = config.muted;
    while let Some(command) = receiver.recv().await {
        match command {
            AudioCommand::Play(kind) if muted => debug!(?kind, "muted; skipping cue"),
            AudioCommand::Play(kind) => sink.emit(kind.cue()),
            AudioCommand::SetMuted(value) => muted = value,
            AudioCommand::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<SoundKind>>,
    }

    impl SoundSink for RecordingSink {
        fn emit(&self, cue: SoundCue) {
            self.played.lock().unwrap().push(cue.kind);
        }
    }

    #[tokio::test]
    async fn cues_reach_the_sink_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let audio = AudioSubsystem::start(AudioConfig::default(), sink.clone());
        let handle = audio.handle();

        handle.play(SoundKind::Shoot);
        handle.play(SoundKind::Pop);
        handle.play(SoundKind::Combo);
        audio.shutdown().await;

        assert_eq!(
            *sink.played.lock().unwrap(),
            [SoundKind::Shoot, SoundKind::Pop, SoundKind::Combo]
        );
    }

    #[tokio::test]
    async fn muted_subsystem_swallows_cues() {
        let sink = Arc::new(RecordingSink::default());
        let audio = AudioSubsystem::start(AudioConfig { muted: true }, sink.clone());
        let handle = audio.handle();

        handle.play(SoundKind::Pop);
        assert!(!handle.toggle_mute().await);
        handle.play(SoundKind::NewBest);
        assert!(handle.toggle_mute().await);
        handle.play(SoundKind::GameOver);
        audio.shutdown().await;

        assert_eq!(*sink.played.lock().unwrap(), [SoundKind::NewBest]);
    }

    #[tokio::test]
    async fn play_after_shutdown_is_ignored() {
        let audio = AudioSubsystem::start(
            AudioConfig::default(),
            Arc::new(RecordingSink::default()),
        );
        let handle = audio.handle();
        audio.shutdown().await;

        handle.play(SoundKind::Pop);
        assert!(handle.toggle_mute().await);
        assert!(handle.is_muted());
    }

    #[test]
    fn new_best_fanfare_climbs_to_c6() {
        let cue = SoundKind::NewBest.cue();
        assert_eq!(cue.waveform, Waveform::Square);
        assert_eq!(cue.voices.len(), 4);
        assert_eq!(cue.voices[3].frequency_hz, 1_046.5);
        assert_eq!(cue.voices[3].start_offset_ms, 300);
    }

    #[test]
    fn sse_sink_publishes_sound_events() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        SseSoundSink::new(hub).emit(SoundKind::Pop.cue());

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("sound"));
        assert!(event.data.contains("\"kind\":\"pop\""));
    }
}
