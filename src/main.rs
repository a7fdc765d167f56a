//! journal-reflect - command-line front end for the reflection pipeline
//!
//! Submits journal entries, asks for mood suggestions and affirmations, and
//! synthesizes affirmation audio against the configured services.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use journal_reflect::affirmation::AffirmationGenerator;
use journal_reflect::backends::http::HttpEndpoint;
use journal_reflect::backends::journal::SledJournal;
use journal_reflect::backends::kv::SledStore;
use journal_reflect::backends::storage::HttpObjectStorage;
use journal_reflect::clock::{Clock, SystemClock};
use journal_reflect::config_loader::Settings;
use journal_reflect::logging;
use journal_reflect::mood::{Mood, MoodInferenceEngine};
use journal_reflect::orchestrator::{JournalDraft, JournalFlowOrchestrator};
use journal_reflect::playback::{LogSink, PlaybackController};
use journal_reflect::retry::{NetworkRetry, RetryPolicy};
use journal_reflect::speech::SpeechSynthesisCoordinator;
use journal_reflect::usage_gate::{FeatureUsageGate, Tier, MOOD_SUGGESTION};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Reflective journaling pipeline
#[derive(Parser)]
#[command(name = "journal-reflect")]
#[command(version)]
#[command(about = "Mood, affirmation and audio pipeline for journal entries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and save the entry
    Submit {
        /// Entry text
        text: String,
        #[arg(long)]
        title: Option<String>,
        /// Fix the mood instead of inferring it (label or 1-5)
        #[arg(short, long)]
        mood: Option<String>,
        /// Name to address in the affirmation
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, default_value = "local")]
        owner: String,
        /// free, trial or premium
        #[arg(short, long, default_value = "free")]
        tier: String,
    },

    /// Infer the mood of some text
    Mood {
        text: String,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Generate an affirmation for a given mood
    Affirm {
        text: String,
        /// Mood label or level
        #[arg(short, long)]
        mood: String,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Synthesize speech
    Speak {
        text: String,
        /// Owner id for stored audio
        #[arg(short, long)]
        owner: Option<String>,
        /// Upload the audio and play it through a signed URL
        #[arg(long, requires = "owner")]
        persist: bool,
        /// Write the audio bytes here
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Issue a signed URL for stored audio
    Sign {
        storage_path: String,
    },

    /// Show today's usage of a gated feature
    Usage {
        #[arg(default_value = MOOD_SUGGESTION)]
        feature: String,
        #[arg(short, long, default_value = "free")]
        tier: String,
    },
}

/// Shared wiring for every subcommand.
struct App {
    settings: Settings,
    clock: Arc<dyn Clock>,
    retry: NetworkRetry,
}

impl App {
    fn api_key(&self) -> Option<String> {
        Some(self.settings.service_api_key.clone()).filter(|k| !k.is_empty())
    }

    fn open_db(&self) -> anyhow::Result<sled::Db> {
        let path = self.settings.data_path();
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating data directory {}", path.display()))?;
        sled::open(path.join("reflect.db")).context("opening local database")
    }

    fn mood_engine(&self) -> MoodInferenceEngine {
        let service = HttpEndpoint::new(&self.settings.mood_service_url, self.api_key());
        MoodInferenceEngine::new(
            Arc::new(service),
            self.retry.clone(),
            Duration::from_millis(self.settings.mood_timeout_ms),
        )
    }

    fn affirmation_generator(&self) -> AffirmationGenerator {
        let service = HttpEndpoint::new(&self.settings.affirmation_service_url, self.api_key());
        AffirmationGenerator::new(
            Arc::new(service),
            self.retry.clone(),
            Duration::from_millis(self.settings.affirmation_timeout_ms),
            self.settings.affirmation_max_chars,
            self.settings.name_prefix_probability,
        )
    }

    fn speech(&self) -> SpeechSynthesisCoordinator {
        let synthesizer = HttpEndpoint::new(&self.settings.speech_service_url, self.api_key());
        let storage = HttpObjectStorage::new(
            &self.settings.storage_url,
            &self.settings.storage_bucket,
            self.api_key(),
        );
        SpeechSynthesisCoordinator::new(
            Arc::new(synthesizer),
            Arc::new(storage),
            self.clock.clone(),
            self.retry.clone(),
        )
        .with_timeout(Duration::from_millis(self.settings.speech_timeout_ms))
        .with_signed_url_ttl(self.settings.signed_url_ttl())
        .with_fallback_clip_ms(self.settings.fallback_clip_ms)
        .with_voice(self.settings.voice_id.clone())
    }

    fn usage_gate(&self, db: &sled::Db) -> anyhow::Result<FeatureUsageGate> {
        let store = SledStore::open(db, "usage")?;
        Ok(FeatureUsageGate::new(Arc::new(store), self.clock.clone())
            .with_limit(MOOD_SUGGESTION, self.settings.mood_suggestion_daily_limit))
    }
}

fn parse_tier(raw: &str) -> anyhow::Result<Tier> {
    raw.parse::<Tier>().map_err(anyhow::Error::msg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new().context("loading configuration")?;
    logging::init(&settings.log_filter);

    let app = App {
        retry: NetworkRetry::new(RetryPolicy::from_settings(&settings)),
        clock: Arc::new(SystemClock),
        settings,
    };

    match cli.command {
        Commands::Submit {
            text,
            title,
            mood,
            name,
            owner,
            tier,
        } => {
            let tier = parse_tier(&tier)?;
            let chosen_mood = mood.map(|m| m.parse::<Mood>()).transpose()?;
            let db = app.open_db()?;

            let orchestrator = JournalFlowOrchestrator::new(
                Arc::new(app.mood_engine()),
                Arc::new(app.affirmation_generator()),
                Arc::new(app.usage_gate(&db)?),
                Arc::new(SledJournal::open(&db)?),
                app.clock.clone(),
            );

            let draft = JournalDraft {
                text,
                title,
                chosen_mood,
                owner_id: owner,
                name,
            };
            let outcome = orchestrator.submit(draft, tier).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Mood { text, name } => {
            let assessment = app.mood_engine().assess(&text, name.as_deref()).await?;
            println!(
                "{} (level {}, confidence {}%, {})",
                assessment.mood,
                assessment.level(),
                assessment.confidence,
                assessment.source
            );
            if let Some(analysis) = assessment.analysis {
                println!("{}", analysis);
            }
        }

        Commands::Affirm { text, mood, name } => {
            let mood = mood.parse::<Mood>()?;
            let affirmation = app
                .affirmation_generator()
                .generate(&text, mood, name.as_deref())
                .await;
            println!("{}", affirmation.text);
            println!("({})", affirmation.source);
        }

        Commands::Speak {
            text,
            owner,
            persist,
            out,
        } => {
            let speech = Arc::new(app.speech());

            if persist {
                let Some(owner) = owner else {
                    bail!("--persist needs --owner");
                };
                let controller = PlaybackController::new(Arc::new(LogSink), speech);
                let asset = controller.play(&text, &owner, None).await?;
                println!("{}", serde_json::to_string_pretty(&asset)?);
            } else {
                let audio = speech.synthesize(&text).await?;
                if audio.is_fallback {
                    eprintln!("Speech service unavailable, produced a silent clip");
                }
                match out {
                    Some(path) => {
                        std::fs::write(&path, &audio.bytes)
                            .with_context(|| format!("writing {}", path.display()))?;
                        println!(
                            "Wrote {} bytes ({}) to {}",
                            audio.bytes.len(),
                            audio.content_type,
                            path.display()
                        );
                    }
                    None => println!("{} bytes of {}", audio.bytes.len(), audio.content_type),
                }
            }
        }

        Commands::Sign { storage_path } => {
            let asset = app.speech().issue_signed_url(&storage_path).await?;
            println!("{}", serde_json::to_string_pretty(&asset)?);
        }

        Commands::Usage { feature, tier } => {
            let tier = parse_tier(&tier)?;
            let db = app.open_db()?;
            let gate = app.usage_gate(&db)?;
            let used = gate.usage_today(&feature);
            match gate.limit(&feature) {
                Some(limit) if tier.is_metered() => {
                    println!("{}: {}/{} used today", feature, used, limit)
                }
                _ => println!("{}: {} used today, unlimited", feature, used),
            }
        }
    }

    Ok(())
}
