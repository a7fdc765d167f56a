//! End-to-end journal submission.
//!
//! Submissions and mood suggestions each take a fresh token from their own
//! monotonic counter. Results only land in [`FlowState`] when their token is
//! still the latest of its kind; superseded results are dropped on arrival.
//! A suggestion never supersedes a submission, and vice versa.

use crate::affirmation::{Affirmation, AffirmationGenerator};
use crate::backends::{JournalRecord, JournalStore};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::mood::{fallback_assess, Mood, MoodAssessment, MoodInferenceEngine};
use crate::usage_gate::{FeatureUsageGate, Tier, UsageDecision, MOOD_SUGGESTION};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type RequestToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Submission,
    Suggestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub text: String,
    pub title: Option<String>,
    /// Mood picked by the user; skips inference entirely.
    pub chosen_mood: Option<Mood>,
    pub owner_id: String,
    pub name: Option<String>,
}

impl JournalDraft {
    pub fn new(owner_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: None,
            chosen_mood: None,
            owner_id: owner_id.into(),
            name: None,
        }
    }
}

/// A gated feature was skipped; the UI may offer an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsellSignal {
    pub feature: String,
    pub limit: u32,
}

impl UpsellSignal {
    fn from_decision(feature: &str, decision: &UsageDecision) -> Option<Self> {
        if decision.allowed {
            return None;
        }
        Some(Self {
            feature: feature.to_string(),
            limit: decision.limit.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub token: RequestToken,
    pub entry_id: String,
    pub mood: Mood,
    /// `None` when the user chose the mood.
    pub assessment: Option<MoodAssessment>,
    pub affirmation: Affirmation,
    pub upsell: Option<UpsellSignal>,
    /// A newer request was issued before this one finished.
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoodSuggestion {
    Suggested(MoodAssessment),
    Upsell(UpsellSignal),
    Superseded,
}

/// What the caller renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    /// Latest submission token.
    pub latest_token: RequestToken,
    pub latest_suggestion: RequestToken,
    pub mood: Option<Mood>,
    pub suggestion: Option<MoodAssessment>,
    pub affirmation: Option<Affirmation>,
    pub saved_entry_id: Option<String>,
    pub upsell: Option<UpsellSignal>,
}

pub struct JournalFlowOrchestrator {
    moods: Arc<MoodInferenceEngine>,
    affirmations: Arc<AffirmationGenerator>,
    gate: Arc<FeatureUsageGate>,
    journal: Arc<dyn JournalStore>,
    clock: Arc<dyn Clock>,
    submissions: AtomicU64,
    suggestions: AtomicU64,
    state: Mutex<FlowState>,
}

impl JournalFlowOrchestrator {
    pub fn new(
        moods: Arc<MoodInferenceEngine>,
        affirmations: Arc<AffirmationGenerator>,
        gate: Arc<FeatureUsageGate>,
        journal: Arc<dyn JournalStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            moods,
            affirmations,
            gate,
            journal,
            clock,
            submissions: AtomicU64::new(0),
            suggestions: AtomicU64::new(0),
            state: Mutex::new(FlowState::default()),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn issue(&self, kind: TokenKind) -> RequestToken {
        let token = self.counter(kind).fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut state) = self.state.lock() {
            match kind {
                TokenKind::Submission => state.latest_token = token,
                TokenKind::Suggestion => state.latest_suggestion = token,
            }
        }
        token
    }

    fn counter(&self, kind: TokenKind) -> &AtomicU64 {
        match kind {
            TokenKind::Submission => &self.submissions,
            TokenKind::Suggestion => &self.suggestions,
        }
    }

    /// Apply `update` only if `token` is still the latest of its kind.
    fn commit(
        &self,
        kind: TokenKind,
        token: RequestToken,
        update: impl FnOnce(&mut FlowState),
    ) -> bool {
        let Ok(mut state) = self.state.lock() else {
            tracing::error!("Flow state lock poisoned");
            return false;
        };
        let latest = self.counter(kind).load(Ordering::SeqCst);
        if latest != token {
            tracing::debug!(token, latest, ?kind, "Dropping stale result");
            return false;
        }
        update(&mut state);
        true
    }

    /// Mood for a submission: the user's pick, the AI when the quota allows,
    /// otherwise the local keyword scorer.
    async fn resolve_mood(
        &self,
        draft: &JournalDraft,
        tier: Tier,
    ) -> Result<(Mood, Option<MoodAssessment>, Option<UpsellSignal>)> {
        if let Some(mood) = draft.chosen_mood {
            return Ok((mood, None, None));
        }

        let decision = self.gate.check(MOOD_SUGGESTION, tier);
        if let Some(upsell) = UpsellSignal::from_decision(MOOD_SUGGESTION, &decision) {
            let assessment = fallback_assess(&draft.text);
            return Ok((assessment.mood, Some(assessment), Some(upsell)));
        }

        let assessment = self.moods.assess(&draft.text, draft.name.as_deref()).await?;
        Ok((assessment.mood, Some(assessment), None))
    }

    /// Run the full pipeline for `draft` and save the entry.
    ///
    /// Mood and affirmation failures are absorbed by their fallbacks. Only
    /// empty input and journal write failures are returned as errors. A
    /// superseded submission is still saved but leaves [`FlowState`] alone.
    pub async fn submit(&self, draft: JournalDraft, tier: Tier) -> Result<SubmissionOutcome> {
        let text = draft.text.trim();
        if text.is_empty() {
            return Err(Error::Validation("journal text is empty".to_string()));
        }
        if draft.owner_id.trim().is_empty() {
            return Err(Error::Validation("owner id is empty".to_string()));
        }

        let token = self.issue(TokenKind::Submission);
        tracing::info!(token, owner = %draft.owner_id, ?tier, "Journal submission started");

        let (mood, assessment, upsell) = self.resolve_mood(&draft, tier).await?;
        let affirmation = self
            .affirmations
            .generate(text, mood, draft.name.as_deref())
            .await;

        let record = JournalRecord {
            owner_id: draft.owner_id.clone(),
            text: text.to_string(),
            title: draft.title.clone().filter(|t| !t.trim().is_empty()),
            mood: mood.level(),
            affirmation: Some(affirmation.text.clone()),
            audio_ref: None,
            created_at: self.clock.now(),
        };

        let entry_id = self.journal.save(&record).await.map_err(|e| {
            tracing::error!(token, error = %e, "Journal entry could not be saved");
            match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            }
        })?;

        let committed = self.commit(TokenKind::Submission, token, |state| {
            state.mood = Some(mood);
            state.affirmation = Some(affirmation.clone());
            state.saved_entry_id = Some(entry_id.clone());
            state.upsell = upsell.clone();
        });

        tracing::info!(
            token,
            entry_id = %entry_id,
            mood = %mood,
            affirmation_source = %affirmation.source,
            stale = !committed,
            "Journal submission finished"
        );

        Ok(SubmissionOutcome {
            token,
            entry_id,
            mood,
            assessment,
            affirmation,
            upsell,
            stale: !committed,
        })
    }

    /// Suggest a mood for text still being written. Counts against the
    /// free-tier quota.
    pub async fn suggest_mood(
        &self,
        text: &str,
        name: Option<&str>,
        tier: Tier,
    ) -> Result<MoodSuggestion> {
        if text.trim().is_empty() {
            return Err(Error::Validation("journal text is empty".to_string()));
        }

        let token = self.issue(TokenKind::Suggestion);
        let decision = self.gate.check(MOOD_SUGGESTION, tier);
        if let Some(upsell) = UpsellSignal::from_decision(MOOD_SUGGESTION, &decision) {
            let committed = self.commit(TokenKind::Suggestion, token, |state| {
                state.upsell = Some(upsell.clone())
            });
            return Ok(if committed {
                MoodSuggestion::Upsell(upsell)
            } else {
                MoodSuggestion::Superseded
            });
        }

        let assessment = self.moods.assess(text, name).await?;
        let committed = self.commit(TokenKind::Suggestion, token, |state| {
            state.suggestion = Some(assessment.clone());
            state.upsell = None;
        });

        Ok(if committed {
            MoodSuggestion::Suggested(assessment)
        } else {
            MoodSuggestion::Superseded
        })
    }
}
