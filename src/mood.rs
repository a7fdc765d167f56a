//! Mood inference: AI-backed, with a deterministic keyword fallback.
//!
//! [`MoodInferenceEngine::assess`] never fails for non-empty text. Any
//! service problem (timeout, HTTP error, unknown label) routes the text
//! through [`fallback_assess`], which scores it against curated word lists.

use crate::backends::{MoodRequest, MoodService};
use crate::error::{Error, Result, ServiceError};
use crate::retry::{with_timeout, NetworkRetry};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The five canonical moods, ordered from level 1 to level 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Struggling,
    Low,
    Neutral,
    Good,
    Amazing,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Struggling,
        Mood::Low,
        Mood::Neutral,
        Mood::Good,
        Mood::Amazing,
    ];

    pub fn level(self) -> u8 {
        match self {
            Mood::Struggling => 1,
            Mood::Low => 2,
            Mood::Neutral => 3,
            Mood::Good => 4,
            Mood::Amazing => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Mood> {
        match level {
            1 => Some(Mood::Struggling),
            2 => Some(Mood::Low),
            3 => Some(Mood::Neutral),
            4 => Some(Mood::Good),
            5 => Some(Mood::Amazing),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mood::Struggling => "struggling",
            Mood::Low => "low",
            Mood::Neutral => "neutral",
            Mood::Good => "good",
            Mood::Amazing => "amazing",
        }
    }

    pub fn from_label(label: &str) -> Option<Mood> {
        let label = label.trim();
        Mood::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Mood {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(level) = s.trim().parse::<u8>() {
            return Mood::from_level(level)
                .ok_or_else(|| Error::Validation(format!("mood level {} is not in 1..=5", level)));
        }
        Mood::from_label(s).ok_or_else(|| Error::Validation(format!("unknown mood '{}'", s)))
    }
}

/// Where a pipeline result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ai,
    Fallback,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Ai => "ai",
            Source::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodAssessment {
    pub mood: Mood,
    /// 0..=100
    pub confidence: u8,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

impl MoodAssessment {
    pub fn level(&self) -> u8 {
        self.mood.level()
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "happy", "joy", "joyful", "grateful", "thankful", "excited", "amazing", "wonderful",
    "great", "love", "loved", "proud", "peaceful", "calm", "hopeful", "blessed", "fantastic",
    "awesome", "good", "content", "relaxed", "inspired", "energized", "optimistic",
    "cheerful", "delighted", "accomplished", "confident",
];

const NEGATIVE_WORDS: &[&str] = &[
    "sad", "angry", "anxious", "depressed", "lonely", "tired", "exhausted", "stressed",
    "worried", "frustrated", "hopeless", "terrible", "awful", "hurt", "upset", "overwhelmed",
    "scared", "afraid", "miserable", "struggling", "crying", "worthless", "empty", "bad",
    "disappointed", "numb",
];

const NEUTRAL_WORDS: &[&str] = &[
    "okay", "ok", "fine", "normal", "average", "usual", "routine", "regular", "alright",
    "meh", "typical",
];

fn word_list_pattern(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("word list pattern is valid")
}

lazy_static! {
    static ref POSITIVE: Regex = word_list_pattern(POSITIVE_WORDS);
    static ref NEGATIVE: Regex = word_list_pattern(NEGATIVE_WORDS);
    static ref NEUTRAL: Regex = word_list_pattern(NEUTRAL_WORDS);
}

/// Whole-word indicator counts for one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeywordScore {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

pub fn score_keywords(text: &str) -> KeywordScore {
    let folded = deunicode::deunicode(text);
    KeywordScore {
        positive: POSITIVE.find_iter(&folded).count(),
        negative: NEGATIVE.find_iter(&folded).count(),
        neutral: NEUTRAL.find_iter(&folded).count(),
    }
}

/// Deterministic mood estimate from keyword counts.
///
/// The side with strictly more hits sets the direction; two or more hits on
/// that side give the extreme level, one hit the moderate level. Ties and
/// no hits are neutral.
pub fn fallback_assess(text: &str) -> MoodAssessment {
    let score = score_keywords(text);

    let (mood, confidence) = if score.positive > score.negative {
        if score.positive >= 2 {
            (Mood::Amazing, 70)
        } else {
            (Mood::Good, 55)
        }
    } else if score.negative > score.positive {
        if score.negative >= 2 {
            (Mood::Struggling, 70)
        } else {
            (Mood::Low, 55)
        }
    } else {
        (Mood::Neutral, 40)
    };

    MoodAssessment {
        mood,
        confidence,
        source: Source::Fallback,
        analysis: None,
    }
}

fn normalize_confidence(raw: Option<f64>) -> u8 {
    match raw {
        Some(c) if c.is_finite() => {
            let percent = if (0.0..=1.0).contains(&c) && c.fract() != 0.0 {
                c * 100.0
            } else {
                c
            };
            percent.round().clamp(0.0, 100.0) as u8
        }
        _ => 50,
    }
}

pub struct MoodInferenceEngine {
    service: Arc<dyn MoodService>,
    retry: NetworkRetry,
    timeout: Duration,
}

impl MoodInferenceEngine {
    pub fn new(service: Arc<dyn MoodService>, retry: NetworkRetry, timeout: Duration) -> Self {
        Self {
            service,
            retry,
            timeout,
        }
    }

    /// Infer the mood of `text`. Only empty input is an error.
    pub async fn assess(&self, text: &str, name: Option<&str>) -> Result<MoodAssessment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("journal text is empty".to_string()));
        }

        match self.ask_service(text, name).await {
            Ok(assessment) => {
                tracing::debug!(
                    mood = %assessment.mood,
                    confidence = assessment.confidence,
                    "Mood inferred by service"
                );
                Ok(assessment)
            }
            Err(e) => {
                let assessment = fallback_assess(text);
                tracing::warn!(
                    error = %e,
                    mood = %assessment.mood,
                    "Mood service failed, using keyword fallback"
                );
                Ok(assessment)
            }
        }
    }

    async fn ask_service(
        &self,
        text: &str,
        name: Option<&str>,
    ) -> std::result::Result<MoodAssessment, ServiceError> {
        let request = MoodRequest {
            entry: text.to_string(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        };

        // One deadline for the whole call, retries included.
        let response = with_timeout(
            self.timeout,
            self.retry.run("mood_inference", || self.service.analyze(&request)),
        )
        .await?;

        let label = response.mood.unwrap_or_default();
        let mood = Mood::from_label(&label).ok_or_else(|| {
            ServiceError::InvalidResponse(format!("unrecognized mood label '{}'", label))
        })?;

        Ok(MoodAssessment {
            mood,
            confidence: normalize_confidence(response.confidence),
            source: Source::Ai,
            analysis: response.analysis.filter(|a| !a.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;

    #[test]
    fn test_single_positive_word_is_moderate() {
        let a = fallback_assess("I feel amazing today!");
        assert_eq!(a.level(), 4);
        assert_eq!(a.source, Source::Fallback);
    }

    #[test]
    fn test_two_negative_words_are_extreme() {
        assert_eq!(fallback_assess("So tired and stressed.").mood, Mood::Struggling);
        assert_eq!(fallback_assess("A bit sad").mood, Mood::Low);
    }

    #[test]
    fn test_ties_and_silence_are_neutral() {
        assert_eq!(fallback_assess("happy but sad").mood, Mood::Neutral);
        assert_eq!(fallback_assess("went to the store").mood, Mood::Neutral);
        assert_eq!(fallback_assess("just okay, fine").mood, Mood::Neutral);
    }

    #[test]
    fn test_matching_is_whole_word_and_case_insensitive() {
        let score = score_keywords("GREAT day, greatness aside. Sadness? sad!");
        assert_eq!(score.positive, 1);
        assert_eq!(score.negative, 1);
    }

    #[test]
    fn test_accented_text_is_folded() {
        assert_eq!(score_keywords("Felíz? No, just hàppy").positive, 1);
    }

    #[test]
    fn test_labels_round_trip_through_levels() {
        for mood in Mood::ALL {
            assert_eq!(Mood::from_level(mood.level()), Some(mood));
            assert_eq!(Mood::from_label(&mood.label().to_uppercase()), Some(mood));
        }
        assert_eq!(Mood::from_label("ecstatic"), None);
        assert_eq!("4".parse::<Mood>().unwrap(), Mood::Good);
        assert!("9".parse::<Mood>().is_err());
    }

    struct HungService;

    #[async_trait::async_trait]
    impl MoodService for HungService {
        async fn analyze(
            &self,
            _request: &MoodRequest,
        ) -> std::result::Result<crate::backends::MoodResponse, ServiceError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_service_falls_back_within_one_deadline() {
        let engine = MoodInferenceEngine::new(
            Arc::new(HungService),
            NetworkRetry::new(RetryPolicy::default()),
            Duration::from_secs(8),
        );

        let started = tokio::time::Instant::now();
        let assessment = engine.assess("I feel amazing today!", None).await.unwrap();

        assert_eq!(assessment.source, Source::Fallback);
        assert_eq!(assessment.level(), 4);
        assert!(started.elapsed() <= Duration::from_secs(8) + Duration::from_millis(100));
    }

    #[test]
    fn test_confidence_normalization() {
        assert_eq!(normalize_confidence(Some(0.85)), 85);
        assert_eq!(normalize_confidence(Some(92.0)), 92);
        assert_eq!(normalize_confidence(Some(250.0)), 100);
        assert_eq!(normalize_confidence(Some(-3.0)), 0);
        assert_eq!(normalize_confidence(None), 50);
    }
}
