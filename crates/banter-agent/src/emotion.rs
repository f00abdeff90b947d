use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use banter_core::types::Emotion;

/// Pattern-and-feature emotion classifier.
///
/// Text patterns are checked first, in a fixed priority order; when no
/// pattern fires and audio features are available, energy and pitch
/// variance decide. Falls back to neutral.
pub struct EmotionDetector {
    classes: Vec<(Emotion, Vec<Regex>)>,
}

impl EmotionDetector {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .expect("emotion pattern must compile")
                })
                .collect()
        };

        Self {
            classes: vec![
                (
                    Emotion::Frustrated,
                    compile(&[
                        r"\b(frustrated|annoying|annoyed|angry|mad|hate)\b",
                        r"\b(doesn'?t\s+work|broken|stupid)\b",
                        r"!{2,}",
                    ]),
                ),
                (
                    Emotion::Urgent,
                    compile(&[
                        r"\b(urgent|asap|emergency|quickly|hurry)\b",
                        r"\b(deadline|now|immediately)\b",
                    ]),
                ),
                (
                    Emotion::Confused,
                    compile(&[
                        r"\b(confused|don'?t\s+understand|what\s+do\s+you\s+mean)\b",
                        r"\b(huh|what\?|i\s+don'?t\s+get\s+it)\b",
                        r"\?{2,}",
                    ]),
                ),
                (
                    Emotion::Happy,
                    compile(&[
                        r"\b(thanks|thank\s+you|awesome|great|love\s+it)\b",
                        r"\b(happy|excited|wonderful|amazing)\b",
                        r"!+\s*$",
                    ]),
                ),
            ],
        }
    }

    /// Classify the input. `audio_features` (energy, pitch_variance in
    /// 0..1) is the fallback channel when text gives no signal.
    pub fn detect(&self, text: &str, audio_features: Option<&HashMap<String, f64>>) -> Emotion {
        for (emotion, patterns) in &self.classes {
            if patterns.iter().any(|p| p.is_match(text)) {
                return *emotion;
            }
        }

        if let Some(features) = audio_features {
            return detect_from_audio(features);
        }

        Emotion::Neutral
    }
}

impl Default for EmotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_from_audio(features: &HashMap<String, f64>) -> Emotion {
    let energy = features.get("energy").copied().unwrap_or(0.5);
    let pitch_variance = features.get("pitch_variance").copied().unwrap_or(0.5);

    if energy > 0.8 && pitch_variance > 0.7 {
        return Emotion::Frustrated;
    }
    if energy > 0.7 {
        return Emotion::Urgent;
    }
    if energy < 0.3 {
        return Emotion::Confused;
    }

    Emotion::Neutral
}
