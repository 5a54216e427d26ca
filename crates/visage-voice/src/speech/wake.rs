//! Wake-word matching.

/// Exact, case-insensitive phrase matcher over the configured wake words.
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    wake_words: Vec<String>,
}

impl WakeWordDetector {
    pub fn new(wake_words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            wake_words: wake_words
                .into_iter()
                .map(|w| w.into().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }

    /// Returns the matched wake word, if the transcription is exactly one.
    pub fn matches(&self, transcription: &str) -> Option<&str> {
        let heard = transcription.trim().to_lowercase();
        self.wake_words
            .iter()
            .find(|w| **w == heard)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_case_insensitive_match() {
        let detector = WakeWordDetector::new(["hello visage", "hey visage"]);
        assert_eq!(detector.matches("Hello Visage"), Some("hello visage"));
        assert_eq!(detector.matches("  hey visage  "), Some("hey visage"));
    }

    #[test]
    fn test_partial_phrases_do_not_match() {
        let detector = WakeWordDetector::new(["hello visage"]);
        assert_eq!(detector.matches("hello"), None);
        assert_eq!(detector.matches("well hello visage there"), None);
        assert_eq!(detector.matches(""), None);
    }
}
