//! Yes/no/unclear intent classification.
//!
//! A local LLM gets the first try; its output maps to a label by first
//! recognized token. Whenever the model is unreachable, slow or
//! unparseable, the deterministic keyword sets decide instead. Destructive
//! flows additionally collapse `Unclear` to `Negative` at the call site.

use crate::errors::Result;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Classified user intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Affirmative,
    Negative,
    Unclear,
}

impl Intent {
    /// The destructive-flow safety rule: anything short of a clear yes is
    /// treated as a no.
    pub fn confirmed_strictly(self) -> bool {
        self == Intent::Affirmative
    }
}

/// Default keyword sets for the deterministic fallback.
pub const YES_KEYWORDS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "correct", "right", "sure", "confirm", "okay", "ok", "fine",
    "absolutely", "definitely", "indeed", "affirmative",
];
pub const NO_KEYWORDS: &[&str] = &[
    "no", "nope", "nah", "wrong", "incorrect", "cancel", "stop", "negative", "not",
];

/// Oracle configuration.
#[derive(Debug, Clone)]
pub struct IntentConfig {
    /// Base URL of the local LLM endpoint, e.g. `http://localhost:11434`.
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub enable_llm: bool,
    pub yes_keywords: Vec<String>,
    pub no_keywords: Vec<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "gemma3:4b".to_string(),
            timeout: Duration::from_secs(5),
            enable_llm: true,
            yes_keywords: YES_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            no_keywords: NO_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// LLM-first, keyword-fallback confirmation parser.
pub struct IntentOracle {
    config: IntentConfig,
    http: reqwest::blocking::Client,
}

impl IntentOracle {
    pub fn new(config: IntentConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| crate::errors::VoiceError::Client(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Classify a transcribed response, optionally with the question that
    /// prompted it.
    pub fn classify(&self, utterance: &str, question: Option<&str>) -> Intent {
        if utterance.trim().is_empty() {
            return Intent::Unclear;
        }

        if self.config.enable_llm {
            if let Some(intent) = self.classify_with_llm(utterance, question) {
                return intent;
            }
        }

        self.classify_with_keywords(utterance)
    }

    fn build_prompt(&self, utterance: &str, question: Option<&str>) -> String {
        match question {
            Some(q) => format!(
                "You are analyzing a user's response to a yes/no question.\n\n\
                 Question: {q}\n\
                 User's response: {utterance}\n\n\
                 Classify the user's intent as one of:\n\
                 - YES: confirming or agreeing\n\
                 - NO: declining or disagreeing\n\
                 - UNCLEAR: ambiguous\n\n\
                 Respond with ONLY one word: YES, NO, or UNCLEAR."
            ),
            None => format!(
                "Classify this user response as YES (confirming), NO (declining), \
                 or UNCLEAR (ambiguous):\n\nUser said: {utterance}\n\n\
                 Respond with ONLY one word: YES, NO, or UNCLEAR."
            ),
        }
    }

    fn classify_with_llm(&self, utterance: &str, question: Option<&str>) -> Option<Intent> {
        let body = json!({
            "model": self.config.model,
            "prompt": self.build_prompt(utterance, question),
            "stream": false,
            "options": {
                "temperature": 0.1,
                "num_predict": 10,
            },
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.config.endpoint))
            .json(&body)
            .send();

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "LLM endpoint returned an error");
                return None;
            }
            Err(e) => {
                warn!("LLM endpoint unreachable: {}", e);
                return None;
            }
        };

        let value: Value = response.json().ok()?;
        let output = value.get("response")?.as_str()?;
        let intent = Self::parse_label(output);
        if intent.is_none() {
            warn!(output = %output, "Unparseable LLM reply");
        }
        intent
    }

    /// First recognized token wins.
    fn parse_label(output: &str) -> Option<Intent> {
        for token in output.to_uppercase().split(|c: char| !c.is_ascii_alphabetic()) {
            match token {
                "YES" => return Some(Intent::Affirmative),
                "NO" => return Some(Intent::Negative),
                "UNCLEAR" => return Some(Intent::Unclear),
                _ => {}
            }
        }
        None
    }

    fn classify_with_keywords(&self, utterance: &str) -> Intent {
        let lowered = utterance.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .collect();

        if words
            .iter()
            .any(|w| self.config.yes_keywords.iter().any(|k| k == w))
        {
            debug!(utterance, "Keyword fallback: affirmative");
            return Intent::Affirmative;
        }
        if words
            .iter()
            .any(|w| self.config.no_keywords.iter().any(|k| k == w))
        {
            debug!(utterance, "Keyword fallback: negative");
            return Intent::Negative;
        }
        debug!(utterance, "Keyword fallback: unclear");
        Intent::Unclear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_oracle() -> IntentOracle {
        IntentOracle::new(IntentConfig {
            enable_llm: false,
            ..IntentConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_keyword_affirmative() {
        let oracle = offline_oracle();
        assert_eq!(oracle.classify("yes please", None), Intent::Affirmative);
        assert_eq!(oracle.classify("Sure", None), Intent::Affirmative);
        assert_eq!(oracle.classify("okay fine", None), Intent::Affirmative);
    }

    #[test]
    fn test_keyword_negative() {
        let oracle = offline_oracle();
        assert_eq!(oracle.classify("no thanks", None), Intent::Negative);
        assert_eq!(oracle.classify("cancel that", None), Intent::Negative);
    }

    #[test]
    fn test_unclear_cases() {
        let oracle = offline_oracle();
        assert_eq!(oracle.classify("maybe", None), Intent::Unclear);
        assert_eq!(oracle.classify("", None), Intent::Unclear);
        assert_eq!(oracle.classify("   ", None), Intent::Unclear);
        assert_eq!(oracle.classify("hmm what", None), Intent::Unclear);
    }

    #[test]
    fn test_label_parser_first_token_wins() {
        assert_eq!(
            IntentOracle::parse_label("YES, the user agreed"),
            Some(Intent::Affirmative)
        );
        assert_eq!(IntentOracle::parse_label("no."), Some(Intent::Negative));
        assert_eq!(
            IntentOracle::parse_label("UNCLEAR - hard to say"),
            Some(Intent::Unclear)
        );
        assert_eq!(IntentOracle::parse_label("banana"), None);
    }

    #[test]
    fn test_strict_confirmation_rule() {
        assert!(Intent::Affirmative.confirmed_strictly());
        assert!(!Intent::Negative.confirmed_strictly());
        assert!(!Intent::Unclear.confirmed_strictly());
    }

    #[test]
    fn test_unreachable_llm_falls_back() {
        // Point at a port nothing listens on; keyword path must decide
        let oracle = IntentOracle::new(IntentConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(200),
            enable_llm: true,
            ..IntentConfig::default()
        })
        .unwrap();
        assert_eq!(oracle.classify("yes", None), Intent::Affirmative);
    }
}
