pub mod http;
pub mod journal;
pub mod kv;
pub mod storage;

use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of a mood inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodRequest {
    pub entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffirmationRequest {
    pub entry: String,
    pub mood: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffirmationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub affirmation: Option<String>,
    /// "ai" or "fallback"
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_settings: Option<VoiceSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_to_storage: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

/// What the synthesis service handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechOutput {
    Audio(Vec<u8>),
    Stored { audio_url: String },
}

/// Finalized entry handed to the journal store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub owner_id: String,
    pub text: String,
    pub title: Option<String>,
    pub mood: u8,
    pub affirmation: Option<String>,
    pub audio_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait MoodService: Send + Sync {
    async fn analyze(
        &self,
        request: &MoodRequest,
    ) -> std::result::Result<MoodResponse, ServiceError>;
}

#[async_trait]
pub trait AffirmationService: Send + Sync {
    async fn generate(
        &self,
        request: &AffirmationRequest,
    ) -> std::result::Result<AffirmationResponse, ServiceError>;
}

/// Trait that every text-to-speech service client implements.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
    ) -> std::result::Result<SpeechOutput, ServiceError>;
}

/// Durable object storage holding synthesized audio.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write `bytes` at `path`, returning the stored path.
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> std::result::Result<String, ServiceError>;

    async fn create_signed_url(
        &self,
        path: &str,
        ttl: Duration,
    ) -> std::result::Result<String, ServiceError>;
}

/// Small synchronous string store used for usage counters.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<bool>;
}

#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Persist the record and return its id.
    async fn save(&self, record: &JournalRecord) -> Result<String>;
}
