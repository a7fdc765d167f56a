//! Speech synthesis, audio persistence and signed-URL issuance.
//!
//! Two entry points with deliberately different failure behavior:
//! [`SpeechSynthesisCoordinator::synthesize`] always yields playable audio
//! (a short silent clip when the service fails), while
//! [`SpeechSynthesisCoordinator::synthesize_and_persist`] surfaces every
//! failure so a placeholder never ends up in durable storage.

use crate::backends::{
    ObjectStorage, SpeechOutput, SpeechRequest, SpeechSynthesizer, VoiceSettings,
};
use crate::clock::Clock;
use crate::error::{Error, Result, ServiceError};
use crate::retry::{with_timeout, NetworkRetry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FALLBACK_SAMPLE_RATE: u32 = 16_000;
const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Durable reference plus an optional time-boxed view of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub storage_path: Option<String>,
    pub signed_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AudioAsset {
    pub fn stored(path: impl Into<String>) -> Self {
        Self {
            storage_path: Some(path.into()),
            signed_url: None,
            expires_at: None,
        }
    }

    /// A signed URL is only usable strictly before its expiry.
    pub fn is_playable(&self, now: DateTime<Utc>) -> bool {
        match (&self.signed_url, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }
}

/// Audio returned by the synthesize-and-return path.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// True when the service failed and `bytes` is the silent clip.
    pub is_fallback: bool,
}

/// A silent 16-bit mono WAV of `duration_ms`.
pub fn silent_clip(duration_ms: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: FALLBACK_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let samples = (FALLBACK_SAMPLE_RATE as u64 * duration_ms as u64 / 1000) as usize;

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples * 2));
    let written = hound::WavWriter::new(&mut cursor, spec).and_then(|mut writer| {
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()
    });
    if let Err(e) = written {
        tracing::error!(error = %e, "Failed to encode silent clip");
    }
    cursor.into_inner()
}

pub struct SpeechSynthesisCoordinator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    retry: NetworkRetry,
    timeout: Duration,
    signed_url_ttl: Duration,
    fallback_clip_ms: u32,
    voice_id: Option<String>,
    /// Last millisecond stamp handed out for an upload path.
    last_stamp: AtomicI64,
}

impl SpeechSynthesisCoordinator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        storage: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
        retry: NetworkRetry,
    ) -> Self {
        Self {
            synthesizer,
            storage,
            clock,
            retry,
            timeout: Duration::from_secs(30),
            signed_url_ttl: Duration::from_secs(3600),
            fallback_clip_ms: 500,
            voice_id: None,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    pub fn with_fallback_clip_ms(mut self, ms: u32) -> Self {
        self.fallback_clip_ms = ms;
        self
    }

    pub fn with_voice(mut self, voice_id: Option<String>) -> Self {
        self.voice_id = voice_id.filter(|v| !v.is_empty());
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Clock millis, bumped past the previous stamp so two uploads never
    /// share a path.
    fn next_stamp(&self) -> i64 {
        let now = self.clock.now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(previous.saturating_add(1))
    }

    fn request(&self, text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            voice_settings: self.voice_id.as_ref().map(|id| VoiceSettings {
                voice_id: Some(id.clone()),
            }),
            save_to_storage: Some(false),
            owner_id: None,
        }
    }

    async fn synthesize_bytes(&self, text: &str) -> std::result::Result<Vec<u8>, ServiceError> {
        let request = self.request(text);
        let output = self
            .retry
            .run("speech_synthesis", || {
                with_timeout(self.timeout, self.synthesizer.synthesize(&request))
            })
            .await?;

        match output {
            SpeechOutput::Audio(bytes) if !bytes.is_empty() => Ok(bytes),
            SpeechOutput::Audio(_) => Err(ServiceError::InvalidResponse("empty audio".into())),
            SpeechOutput::Stored { audio_url } => Err(ServiceError::InvalidResponse(format!(
                "expected audio bytes, service stored them at {}",
                audio_url
            ))),
        }
    }

    /// Synthesize `text` and hand the audio straight back. Never fails on
    /// service errors.
    pub async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("nothing to speak".to_string()));
        }

        match self.synthesize_bytes(text).await {
            Ok(bytes) => Ok(SynthesizedAudio {
                bytes,
                content_type: AUDIO_CONTENT_TYPE,
                is_fallback: false,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Speech synthesis failed, returning silent clip");
                Ok(SynthesizedAudio {
                    bytes: silent_clip(self.fallback_clip_ms),
                    content_type: "audio/wav",
                    is_fallback: true,
                })
            }
        }
    }

    /// Synthesize, upload under `{owner_id}/{timestamp}_affirmation` and
    /// return the stored asset. Any failure is returned as an error.
    pub async fn synthesize_and_persist(&self, text: &str, owner_id: &str) -> Result<AudioAsset> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("nothing to speak".to_string()));
        }
        if owner_id.trim().is_empty() || owner_id.contains('/') {
            return Err(Error::Validation(format!("invalid owner id '{}'", owner_id)));
        }

        let bytes = self.synthesize_bytes(text).await.map_err(|e| {
            tracing::error!(error = %e, owner = owner_id, "Synthesis failed, nothing persisted");
            Error::Persistence(format!("speech synthesis failed: {}", e))
        })?;

        let path = format!("{}/{}_affirmation", owner_id, self.next_stamp());

        // Uploads are not retried.
        let upload = self.storage.put(&path, bytes, AUDIO_CONTENT_TYPE);
        let stored = with_timeout(self.timeout, upload).await.map_err(|e| {
            tracing::error!(error = %e, path = %path, "Audio upload failed");
            Error::Persistence(format!("audio upload failed: {}", e))
        })?;

        tracing::info!(path = %stored, "Affirmation audio stored");
        Ok(AudioAsset::stored(stored))
    }

    /// Issue a fresh signed URL for `storage_path`. Nothing is cached here;
    /// callers ask again once `expires_at` has passed.
    pub async fn issue_signed_url(&self, storage_path: &str) -> Result<AudioAsset> {
        if storage_path.trim().is_empty() {
            return Err(Error::Validation("storage path is empty".to_string()));
        }

        let issued_at = self.clock.now();
        let ttl = self.signed_url_ttl;
        let url = self
            .retry
            .run("signed_url", || {
                with_timeout(self.timeout, self.storage.create_signed_url(storage_path, ttl))
            })
            .await?;

        let expires_at = issued_at
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));

        Ok(AudioAsset {
            storage_path: Some(storage_path.to_string()),
            signed_url: Some(url),
            expires_at: Some(expires_at),
        })
    }
}
