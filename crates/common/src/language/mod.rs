//! Language identification for chat input
//!
//! Detection is best-effort: any failure collapses to [`UNKNOWN_LANGUAGE`]
//! so it never blocks a chat turn.

use crate::errors::{AppError, Result};

/// Sentinel code returned when the language cannot be determined
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Languages with a human-readable label
const LANGUAGE_LABELS: &[(&str, &str)] = &[
    ("en", "English"),
    ("hi", "Hindi"),
    ("te", "Telugu"),
    ("ta", "Tamil"),
    ("kn", "Kannada"),
    ("ml", "Malayalam"),
    ("mr", "Marathi"),
    ("gu", "Gujarati"),
    ("bn", "Bengali"),
    ("ur", "Urdu"),
];

/// Trait for language classification backends
pub trait LanguageDetector: Send + Sync {
    /// Classify text into an ISO 639-1 code where one exists
    fn detect(&self, text: &str) -> Result<String>;
}

/// Trigram-based detector backed by `whatlang`
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(AppError::DetectionFailure {
                message: "no text to classify".to_string(),
            });
        }

        let info = whatlang::detect(text).ok_or_else(|| AppError::DetectionFailure {
            message: "no language features found in input".to_string(),
        })?;

        Ok(iso_639_1(info.lang().code()).to_string())
    }
}

/// Map whatlang's ISO 639-3 codes onto two-letter codes.
/// Codes without a two-letter form pass through unchanged.
fn iso_639_1(code: &str) -> &str {
    match code {
        "eng" => "en",
        "hin" => "hi",
        "tel" => "te",
        "tam" => "ta",
        "kan" => "kn",
        "mal" => "ml",
        "mar" => "mr",
        "guj" => "gu",
        "ben" => "bn",
        "urd" => "ur",
        "pan" => "pa",
        "ori" => "or",
        "nep" => "ne",
        "sin" => "si",
        "spa" => "es",
        "por" => "pt",
        "fra" => "fr",
        "deu" => "de",
        "ita" => "it",
        "nld" => "nl",
        "rus" => "ru",
        "ukr" => "uk",
        "pol" => "pl",
        "tur" => "tr",
        "ara" => "ar",
        "pes" => "fa",
        "heb" => "he",
        "cmn" => "zh",
        "jpn" => "ja",
        "kor" => "ko",
        "vie" => "vi",
        "tha" => "th",
        "ind" => "id",
        other => other,
    }
}

/// Detect the language of `text`, degrading to [`UNKNOWN_LANGUAGE`] on failure
pub fn detect_or_unknown(detector: &dyn LanguageDetector, text: &str) -> String {
    match detector.detect(text) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = %e, "Language detection failed, using sentinel");
            UNKNOWN_LANGUAGE.to_string()
        }
    }
}

/// Human-readable label for a language code
pub fn label(code: &str) -> String {
    if let Some((_, name)) = LANGUAGE_LABELS.iter().find(|(c, _)| *c == code) {
        return format!("{} ({})", name, code);
    }
    if code == UNKNOWN_LANGUAGE {
        return "Unknown".to_string();
    }
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDetector;

    impl LanguageDetector for FailingDetector {
        fn detect(&self, _text: &str) -> Result<String> {
            Err(AppError::DetectionFailure {
                message: "boom".to_string(),
            })
        }
    }

    #[test]
    fn test_label_known_code() {
        assert!(label("te").contains("Telugu"));
        assert_eq!(label("en"), "English (en)");
    }

    #[test]
    fn test_label_fallbacks() {
        assert_eq!(label("xx"), "xx");
        assert_eq!(label("unknown"), "Unknown");
    }

    #[test]
    fn test_empty_input_is_unknown() {
        let detector = WhatlangDetector;
        assert_eq!(detect_or_unknown(&detector, ""), UNKNOWN_LANGUAGE);
        assert_eq!(detect_or_unknown(&detector, "   \n"), UNKNOWN_LANGUAGE);
    }

    #[test]
    fn test_detector_failure_is_swallowed() {
        assert_eq!(detect_or_unknown(&FailingDetector, "hello"), UNKNOWN_LANGUAGE);
    }

    #[test]
    fn test_detects_english() {
        let detector = WhatlangDetector;
        let code = detect_or_unknown(
            &detector,
            "The quick brown fox jumps over the lazy dog while the children watch from the garden.",
        );
        assert_eq!(code, "en");
    }

    #[test]
    fn test_detects_telugu_script() {
        let detector = WhatlangDetector;
        let code = detect_or_unknown(&detector, "నమస్కారం, మీరు ఎలా ఉన్నారు? నేను బాగున్నాను.");
        assert_eq!(code, "te");
    }

    #[test]
    fn test_unmapped_code_passes_through() {
        assert_eq!(iso_639_1("epo"), "epo");
        assert_eq!(iso_639_1("cmn"), "zh");
    }
}
