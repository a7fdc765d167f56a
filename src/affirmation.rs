//! Personalized affirmations with a curated fallback table.

use crate::backends::{AffirmationRequest, AffirmationService};
use crate::mood::{Mood, Source};
use crate::retry::{with_timeout, NetworkRetry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affirmation {
    pub text: String,
    pub source: Source,
}

/// Three curated affirmations per mood.
pub fn fallback_affirmations(mood: Mood) -> &'static [&'static str; 3] {
    match mood {
        Mood::Struggling => &[
            "It's okay to not be okay. Your feelings are valid, and this difficult moment will pass.",
            "You are stronger than you know. Every small step forward is a victory worth celebrating.",
            "Be gentle with yourself today. You are doing the best you can, and that is enough.",
        ],
        Mood::Low => &[
            "Even on cloudy days, the sun is still there. Brighter moments are ahead of you.",
            "Your feelings matter, and so do you. Take things one moment at a time.",
            "It's alright to rest. Taking care of yourself is a quiet act of courage.",
        ],
        Mood::Neutral => &[
            "Every day is a new opportunity to grow. You are exactly where you need to be.",
            "Steady days build strong foundations. Notice the small things that bring you calm.",
            "You showed up for yourself today by writing, and that matters.",
        ],
        Mood::Good => &[
            "Your positive energy is wonderful. Let this feeling remind you of what you are capable of.",
            "You are creating good things in your life. Keep nurturing what makes you feel this way.",
            "Celebrate this moment. You have earned the good that is coming your way.",
        ],
        Mood::Amazing => &[
            "Your joy is radiant. Hold on to this feeling and let it carry you forward.",
            "What a wonderful day to be you! Your happiness lights up the world around you.",
            "You are thriving, and it shows. Remember this moment whenever you need a lift.",
        ],
    }
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Instruction sent alongside the entry so the model stays on task.
pub fn build_instruction(mood: Mood, name: Option<&str>) -> String {
    let mut instruction = format!(
        "Write one personal affirmation for someone whose journal entry reads as '{}'. \
         Speak directly to them in the second person, in 1 to 3 sentences. \
         Tie it to the themes of their entry and avoid generic cliches.",
        mood.label()
    );
    if let Some(name) = name {
        instruction.push_str(&format!(" You may open by addressing them as {}.", name));
    }
    instruction
}

/// `"Alex"` + `"It's okay."` -> `"Alex, it's okay."`. The pronoun "I" keeps
/// its capital.
pub fn with_vocative(name: &str, sentence: &str) -> String {
    let first_word = sentence.split_whitespace().next().unwrap_or("");
    let keep_case = first_word == "I" || first_word.starts_with("I'");

    let mut chars = sentence.chars();
    let rest = match chars.next() {
        Some(first) if !keep_case => first.to_lowercase().chain(chars).collect::<String>(),
        Some(first) => std::iter::once(first).chain(chars).collect(),
        None => String::new(),
    };
    format!("{}, {}", name, rest)
}

pub struct AffirmationGenerator {
    service: Arc<dyn AffirmationService>,
    retry: NetworkRetry,
    timeout: Duration,
    max_chars: usize,
    name_probability: f64,
    rng: Mutex<StdRng>,
}

impl AffirmationGenerator {
    pub fn new(
        service: Arc<dyn AffirmationService>,
        retry: NetworkRetry,
        timeout: Duration,
        max_chars: usize,
        name_probability: f64,
    ) -> Self {
        Self {
            service,
            retry,
            timeout,
            max_chars,
            name_probability: name_probability.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Always yields a non-empty affirmation.
    pub async fn generate(&self, text: &str, mood: Mood, name: Option<&str>) -> Affirmation {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let request = AffirmationRequest {
            entry: truncate_chars(text.trim(), self.max_chars).to_string(),
            mood: mood.label().to_string(),
            name: name.map(str::to_string),
            instruction: Some(build_instruction(mood, name)),
        };

        let result = self
            .retry
            .run("affirmation_generation", || {
                with_timeout(self.timeout, self.service.generate(&request))
            })
            .await;

        match result {
            Ok(response) => {
                let text = response.affirmation.unwrap_or_default().trim().to_string();
                if !text.is_empty() {
                    let source = match response.generated_by.as_deref() {
                        Some("fallback") => Source::Fallback,
                        _ => Source::Ai,
                    };
                    return Affirmation { text, source };
                }
                tracing::warn!(
                    mood = %mood,
                    "Affirmation service returned empty text, using fallback"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    mood = %mood,
                    "Affirmation service failed, using fallback"
                );
            }
        }

        self.fallback(mood, name)
    }

    /// Pick a curated affirmation, sometimes addressed by name.
    pub fn fallback(&self, mood: Mood, name: Option<&str>) -> Affirmation {
        let candidates = fallback_affirmations(mood);
        let (choice, address) = match self.rng.lock() {
            Ok(mut rng) => (
                rng.gen_range(0..candidates.len()),
                rng.gen_bool(self.name_probability),
            ),
            Err(_) => (0, false),
        };

        let base = candidates[choice];
        let text = match name {
            Some(name) if address => with_vocative(name, base),
            _ => base.to_string(),
        };

        Affirmation {
            text,
            source: Source::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mood_has_three_non_empty_fallbacks() {
        for mood in Mood::ALL {
            let table = fallback_affirmations(mood);
            assert_eq!(table.len(), 3);
            assert!(table.iter().all(|s| !s.trim().is_empty()));
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
        let long = "ü".repeat(1500);
        assert_eq!(truncate_chars(&long, 1000).chars().count(), 1000);
    }

    #[test]
    fn test_vocative_lowercases_first_letter() {
        assert_eq!(
            with_vocative("Alex", "It's okay to rest."),
            "Alex, it's okay to rest."
        );
        assert_eq!(with_vocative("Sam", "I see you."), "Sam, I see you.");
    }

    #[test]
    fn test_instruction_mentions_mood_and_name() {
        let text = build_instruction(Mood::Low, Some("Robin"));
        assert!(text.contains("'low'"));
        assert!(text.contains("Robin"));
        assert!(!build_instruction(Mood::Low, None).contains("addressing"));
    }
}
