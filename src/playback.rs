//! Single-channel playback as an explicit state machine.
//!
//! `Playback::transition` is a pure reducer from `(state, event)` to the next
//! state plus the side effects to run. `PlaybackMachine` applies effects to an
//! [`AudioSink`] in order, which keeps at most one channel active: a stop
//! effect is always emitted and executed before the next start.

use crate::error::{Error, Result};
use crate::speech::{AudioAsset, SpeechSynthesisCoordinator};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

pub type ChannelId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Idle,
    Generating { request: u64 },
    Playing { channel: ChannelId, asset: AudioAsset },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Play {
        cached: Option<AudioAsset>,
        now: DateTime<Utc>,
    },
    SynthesisSucceeded { request: u64, asset: AudioAsset },
    SynthesisFailed { request: u64, message: String },
    ChannelFailed { channel: ChannelId, message: String },
    NaturalEnd { channel: ChannelId },
    Stop,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StopChannel(ChannelId),
    StartSynthesis { request: u64 },
    StartChannel { channel: ChannelId, asset: AudioAsset },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    state: PlaybackState,
    next_id: u64,
}

impl Default for Playback {
    fn default() -> Self {
        Self::new()
    }
}

impl Playback {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            next_id: 1,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    fn moved(&self, state: PlaybackState, ids_used: u64) -> Playback {
        Playback {
            state,
            next_id: self.next_id + ids_used,
        }
    }

    fn begin(
        &self,
        cached: Option<AudioAsset>,
        now: DateTime<Utc>,
        mut effects: Vec<Effect>,
    ) -> (Playback, Vec<Effect>) {
        let id = self.next_id;
        match cached {
            Some(asset) if asset.is_playable(now) => {
                effects.push(Effect::StartChannel {
                    channel: id,
                    asset: asset.clone(),
                });
                (self.moved(PlaybackState::Playing { channel: id, asset }, 1), effects)
            }
            _ => {
                effects.push(Effect::StartSynthesis { request: id });
                (self.moved(PlaybackState::Generating { request: id }, 1), effects)
            }
        }
    }

    /// Events that make no sense in the current state leave it unchanged.
    pub fn transition(&self, event: PlaybackEvent) -> (Playback, Vec<Effect>) {
        use PlaybackEvent as E;
        use PlaybackState as S;

        match (&self.state, event) {
            (S::Playing { channel, .. }, E::Play { cached, now }) => {
                self.begin(cached, now, vec![Effect::StopChannel(*channel)])
            }
            // A newer request supersedes the one in flight.
            (S::Idle | S::Error { .. } | S::Generating { .. }, E::Play { cached, now }) => {
                self.begin(cached, now, Vec::new())
            }

            (S::Generating { request }, E::SynthesisSucceeded { request: r, asset })
                if *request == r =>
            {
                let channel = self.next_id;
                (
                    self.moved(
                        S::Playing {
                            channel,
                            asset: asset.clone(),
                        },
                        1,
                    ),
                    vec![Effect::StartChannel { channel, asset }],
                )
            }
            (S::Generating { request }, E::SynthesisFailed { request: r, message })
                if *request == r =>
            {
                (self.moved(S::Error { message }, 0), Vec::new())
            }

            (S::Playing { channel, .. }, E::ChannelFailed { channel: c, message })
                if *channel == c =>
            {
                (self.moved(S::Error { message }, 0), Vec::new())
            }
            (S::Playing { channel, .. }, E::NaturalEnd { channel: c }) if *channel == c => {
                (self.moved(S::Idle, 0), Vec::new())
            }
            (S::Playing { channel, .. }, E::Stop) => {
                (self.moved(S::Idle, 0), vec![Effect::StopChannel(*channel)])
            }
            (S::Generating { .. }, E::Stop) => (self.moved(S::Idle, 0), Vec::new()),

            (S::Error { .. }, E::Retry) => (self.moved(S::Idle, 0), Vec::new()),

            (_, ignored) => {
                tracing::debug!(state = ?self.state, event = ?ignored, "Ignoring playback event");
                (self.clone(), Vec::new())
            }
        }
    }
}

/// The one audio output the client owns.
pub trait AudioSink: Send + Sync {
    fn start(&self, channel: ChannelId, asset: &AudioAsset) -> std::result::Result<(), String>;
    fn stop(&self, channel: ChannelId);
}

/// Sink that only logs; for headless runs.
pub struct LogSink;

impl AudioSink for LogSink {
    fn start(&self, channel: ChannelId, asset: &AudioAsset) -> std::result::Result<(), String> {
        let url = asset
            .signed_url
            .as_deref()
            .ok_or_else(|| "asset has no signed URL".to_string())?;
        tracing::info!(channel, url, "Playback started");
        Ok(())
    }

    fn stop(&self, channel: ChannelId) {
        tracing::info!(channel, "Playback stopped");
    }
}

/// Event dispatcher: applies transitions and runs sink effects in order.
pub struct PlaybackMachine {
    playback: Mutex<Playback>,
    sink: Arc<dyn AudioSink>,
}

impl PlaybackMachine {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            playback: Mutex::new(Playback::new()),
            sink,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.playback
            .lock()
            .map(|p| p.state().clone())
            .unwrap_or(PlaybackState::Idle)
    }

    /// Apply `event`. Sink effects run before this returns; synthesis
    /// requests are handed back to the caller.
    pub fn dispatch(&self, event: PlaybackEvent) -> Dispatched {
        let mut outcome = Dispatched::default();
        let Ok(mut playback) = self.playback.lock() else {
            tracing::error!("Playback state lock poisoned");
            return outcome;
        };

        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            let (next, effects) = playback.transition(event);
            *playback = next;

            for effect in effects {
                match effect {
                    Effect::StopChannel(channel) => self.sink.stop(channel),
                    Effect::StartChannel { channel, asset } => {
                        match self.sink.start(channel, &asset) {
                            Ok(()) => outcome.started = Some(channel),
                            Err(message) => {
                                tracing::warn!(
                                    channel,
                                    error = %message,
                                    "Could not start playback"
                                );
                                outcome.start_error = Some(message.clone());
                                pending.push(PlaybackEvent::ChannelFailed { channel, message });
                            }
                        }
                    }
                    Effect::StartSynthesis { request } => outcome.synthesis.push(request),
                }
            }
        }
        outcome
    }
}

/// What one dispatch did to the sink and what it left for the caller.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Dispatched {
    /// Synthesis requests the caller has to run.
    pub synthesis: Vec<u64>,
    /// Channel this dispatch started.
    pub started: Option<ChannelId>,
    pub start_error: Option<String>,
}

/// Drives the machine with real synthesis on demand.
pub struct PlaybackController {
    machine: PlaybackMachine,
    speech: Arc<SpeechSynthesisCoordinator>,
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn AudioSink>, speech: Arc<SpeechSynthesisCoordinator>) -> Self {
        Self {
            machine: PlaybackMachine::new(sink),
            speech,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    /// Play `text` for `owner_id`, reusing `cached` when its URL is still
    /// valid. An expired asset with a storage path only needs a new URL.
    /// Returns the asset this call started, for the caller to keep, or
    /// `Error::Superseded` when a stop or a later `play()` got there first.
    pub async fn play(
        &self,
        text: &str,
        owner_id: &str,
        cached: Option<AudioAsset>,
    ) -> Result<AudioAsset> {
        let now = self.speech.clock().now();
        let reusable_path = cached.as_ref().and_then(|a| a.storage_path.clone());

        let first = self.machine.dispatch(PlaybackEvent::Play { cached, now });
        let mut started = first.started;
        let mut failure = first.start_error;

        for request in first.synthesis {
            let produced = match &reusable_path {
                Some(path) => self.speech.issue_signed_url(path).await,
                None => match self.speech.synthesize_and_persist(text, owner_id).await {
                    Ok(stored) => match stored.storage_path {
                        Some(path) => self.speech.issue_signed_url(&path).await,
                        None => Err(Error::Persistence("upload returned no path".into())),
                    },
                    Err(e) => Err(e),
                },
            };

            let event = match produced {
                Ok(asset) => PlaybackEvent::SynthesisSucceeded { request, asset },
                Err(e) => {
                    let message = e.to_string();
                    failure = Some(message.clone());
                    PlaybackEvent::SynthesisFailed { request, message }
                }
            };
            let applied = self.machine.dispatch(event);
            started = started.or(applied.started);
            failure = failure.or(applied.start_error);
        }

        if let Some(message) = failure {
            return Err(Error::Persistence(message));
        }
        match (self.machine.state(), started) {
            (PlaybackState::Playing { channel, asset }, Some(own)) if channel == own => Ok(asset),
            // Stopped, or another play() took the channel.
            _ => Err(Error::Superseded),
        }
    }

    pub fn stop(&self) {
        self.machine.dispatch(PlaybackEvent::Stop);
    }

    pub fn finished(&self, channel: ChannelId) {
        self.machine.dispatch(PlaybackEvent::NaturalEnd { channel });
    }

    pub fn retry(&self) {
        self.machine.dispatch(PlaybackEvent::Retry);
    }
}
