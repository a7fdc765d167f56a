use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // AI services
    pub mood_service_url: String,
    pub affirmation_service_url: String,
    pub speech_service_url: String,
    pub service_api_key: String,
    pub voice_id: Option<String>,
    // Object storage
    pub storage_url: String,
    pub storage_bucket: String,
    pub signed_url_ttl_secs: u64,
    // Local data (journal + usage counters)
    pub data_dir: String,
    // Retry policy
    pub retry_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_ms: u64,
    // Per-call timeouts
    pub mood_timeout_ms: u64,
    pub affirmation_timeout_ms: u64,
    pub speech_timeout_ms: u64,
    // Affirmations
    pub affirmation_max_chars: usize,
    pub name_prefix_probability: f64,
    // Usage gate
    pub mood_suggestion_daily_limit: u32,
    // Audio
    pub fallback_clip_ms: u32,
    // Logging
    pub log_filter: String,
}

const FUNCTIONS_BASE: &str = "http://localhost:54321/functions/v1";

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("journal-reflect")
        .to_string_lossy()
        .into_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mood_service_url: format!("{}/analyze-mood", FUNCTIONS_BASE),
            affirmation_service_url: format!("{}/generate-affirmation", FUNCTIONS_BASE),
            speech_service_url: format!("{}/text-to-speech", FUNCTIONS_BASE),
            service_api_key: String::new(),
            voice_id: None,
            storage_url: "http://localhost:54321/storage/v1".to_string(),
            storage_bucket: "affirmation-audio".to_string(),
            signed_url_ttl_secs: 3600,
            data_dir: default_data_dir(),
            retry_max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 10_000,
            retry_jitter_ms: 1000,
            mood_timeout_ms: 8000,
            affirmation_timeout_ms: 15_000,
            speech_timeout_ms: 30_000,
            affirmation_max_chars: 1000,
            name_prefix_probability: 0.5,
            mood_suggestion_daily_limit: 3,
            fallback_clip_ms: 500,
            log_filter: "journal_reflect=info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let d = Settings::default();
        let builder = Config::builder()
            .set_default("mood_service_url", d.mood_service_url)?
            .set_default("affirmation_service_url", d.affirmation_service_url)?
            .set_default("speech_service_url", d.speech_service_url)?
            .set_default("service_api_key", d.service_api_key)?
            .set_default("storage_url", d.storage_url)?
            .set_default("storage_bucket", d.storage_bucket)?
            .set_default("signed_url_ttl_secs", d.signed_url_ttl_secs)?
            .set_default("data_dir", d.data_dir)?
            .set_default("retry_max_retries", d.retry_max_retries)?
            .set_default("retry_base_delay_ms", d.retry_base_delay_ms)?
            .set_default("retry_max_delay_ms", d.retry_max_delay_ms)?
            .set_default("retry_jitter_ms", d.retry_jitter_ms)?
            .set_default("mood_timeout_ms", d.mood_timeout_ms)?
            .set_default("affirmation_timeout_ms", d.affirmation_timeout_ms)?
            .set_default("speech_timeout_ms", d.speech_timeout_ms)?
            .set_default("affirmation_max_chars", d.affirmation_max_chars as u64)?
            .set_default("name_prefix_probability", d.name_prefix_probability)?
            .set_default("mood_suggestion_daily_limit", d.mood_suggestion_daily_limit)?
            .set_default("fallback_clip_ms", d.fallback_clip_ms)?
            .set_default("log_filter", d.log_filter)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Reflect").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/journal-reflect/Reflect",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            )
            // Environment overrides (e.g. REFLECT_MOOD_SERVICE_URL)
            .add_source(config::Environment::with_prefix("REFLECT"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(0.0..=1.0).contains(&self.name_prefix_probability) {
            return Err(config::ConfigError::Message(format!(
                "Invalid name_prefix_probability: {}. Must be between 0.0 and 1.0",
                self.name_prefix_probability
            )));
        }
        if self.retry_max_retries == 0 {
            return Err(config::ConfigError::Message(
                "retry_max_retries must be at least 1".to_string(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(config::ConfigError::Message(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        if self.signed_url_ttl_secs == 0 {
            return Err(config::ConfigError::Message(
                "signed_url_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.affirmation_max_chars == 0 {
            return Err(config::ConfigError::Message(
                "affirmation_max_chars must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}
