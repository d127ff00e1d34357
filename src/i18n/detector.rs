//! Three-stage language detection cascade.
//!
//! 1. Script: a character from a distinctive writing system decides outright.
//! 2. Statistics: weighted word/character/pattern scores per profile.
//! 3. Character frequency: diacritic counts for the remaining Latin languages.
//!
//! Anything that falls through all three stages is English. The detector is
//! pure: no I/O, no logging, and the same input always yields the same name.

use super::frequency;
use super::registry::{default_profiles, LanguageProfile};
use super::script;
use crate::html;
use std::borrow::Cow;

/// Language returned when no stage decides.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Minimum winning score for the statistical stage.
const MIN_STATISTICAL_SCORE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Cleaned inputs shorter than this many characters are not analyzed.
    pub min_chars: usize,
    /// Only this many leading characters are analyzed.
    pub sample_chars: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_chars: 5,
            sample_chars: 1000,
        }
    }
}

/// Which step of the cascade produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStage {
    TooShort,
    Script,
    Statistical,
    CharacterFrequency,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub language: String,
    pub stage: DetectionStage,
}

#[derive(Debug, Clone)]
pub struct LanguageDetector {
    config: DetectorConfig,
    profiles: Cow<'static, [LanguageProfile]>,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector {
    /// Detector with the built-in profile table and default limits.
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
            profiles: Cow::Borrowed(default_profiles()),
        }
    }

    /// Detector with a custom profile table, scored in the given order.
    pub fn with_profiles(config: DetectorConfig, profiles: Vec<LanguageProfile>) -> Self {
        Self {
            config,
            profiles: Cow::Owned(profiles),
        }
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    /// Detect the language of `text`, which may contain markup.
    pub fn detect(&self, text: &str) -> String {
        self.detect_with_stage(text).language
    }

    /// Like [`detect`](Self::detect), also reporting the deciding stage.
    pub fn detect_with_stage(&self, text: &str) -> Detection {
        let cleaned = html::clean_text(text);
        if cleaned.chars().count() < self.config.min_chars {
            return Detection::new(DEFAULT_LANGUAGE, DetectionStage::TooShort);
        }

        let sample = html::truncate_chars(&cleaned, self.config.sample_chars);

        if let Some(language) = script::detect_by_script(sample) {
            return Detection::new(language, DetectionStage::Script);
        }

        let lowered = sample.to_lowercase();

        if let Some(language) = self.score_profiles(&lowered) {
            return Detection::new(language, DetectionStage::Statistical);
        }

        if let Some(language) = frequency::detect_by_character_frequency(&lowered) {
            return Detection::new(language, DetectionStage::CharacterFrequency);
        }

        Detection::new(DEFAULT_LANGUAGE, DetectionStage::Default)
    }

    /// Stage 1 on its own. `sample` is used as given.
    pub fn detect_by_script(&self, sample: &str) -> Option<String> {
        script::detect_by_script(sample).map(str::to_string)
    }

    /// Stage 2 on its own. `sample` is lowercased before scoring.
    pub fn detect_by_statistics(&self, sample: &str) -> Option<String> {
        self.score_profiles(&sample.to_lowercase())
            .map(str::to_string)
    }

    /// Stage 3 on its own. `sample` is lowercased before counting.
    pub fn detect_by_character_frequency(&self, sample: &str) -> Option<String> {
        frequency::detect_by_character_frequency(&sample.to_lowercase()).map(str::to_string)
    }

    fn score_profiles(&self, lowered: &str) -> Option<&str> {
        let mut best: Option<(&str, u32)> = None;
        for profile in self.profiles.iter() {
            let score = profile.score(lowered);
            // strict comparison keeps the earliest profile on ties
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((profile.name(), score));
            }
        }
        best.filter(|(_, score)| *score > MIN_STATISTICAL_SCORE)
            .map(|(name, _)| name)
    }
}

impl Detection {
    fn new(language: &str, stage: DetectionStage) -> Self {
        Self {
            language: language.to_string(),
            stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detect(text: &str) -> String {
        LanguageDetector::new().detect(text)
    }

    // ==================== Cascade Tests ====================

    #[test]
    fn test_short_text_defaults_to_english() {
        let detection = LanguageDetector::new().detect_with_stage("Hi");
        assert_eq!(detection.language, "English");
        assert_eq!(detection.stage, DetectionStage::TooShort);
    }

    #[test]
    fn test_empty_text_defaults_to_english() {
        assert_eq!(detect(""), "English");
        assert_eq!(detect("   \n\t "), "English");
        assert_eq!(detect("<p></p>"), "English");
    }

    #[test]
    fn test_short_cjk_is_still_classified() {
        assert_eq!(detect("這是中文文字"), "Chinese");
    }

    #[test]
    fn test_script_stage() {
        let detection = LanguageDetector::new().detect_with_stage("안녕하세요 여러분, 반갑습니다");
        assert_eq!(detection.language, "Korean");
        assert_eq!(detection.stage, DetectionStage::Script);
    }

    #[test]
    fn test_german_sentence() {
        let detection = LanguageDetector::new()
            .detect_with_stage("Der Hund und die Katze sind nicht auf dem Tisch");
        assert_eq!(detection.language, "German");
        assert_eq!(detection.stage, DetectionStage::Statistical);
    }

    #[test]
    fn test_english_sentence() {
        assert_eq!(
            detect("The quick brown fox jumps over the lazy dog and runs into the forest"),
            "English"
        );
    }

    #[test]
    fn test_spanish_sentence() {
        assert_eq!(
            detect("El niño come una manzana con su madre en la cocina"),
            "Spanish"
        );
    }

    #[test]
    fn test_russian_sentence() {
        assert_eq!(detect("Это не то, что он хотел сказать мне"), "Russian");
    }

    #[test]
    fn test_markup_is_ignored() {
        assert_eq!(detect("<p>Das ist ein Test</p>"), "German");
        assert_eq!(
            detect(r#"<div class="the and of"><p>Das ist ein Test</p></div>"#),
            "German"
        );
    }

    #[test]
    fn test_devanagari_marathi() {
        assert_eq!(detect("हे माझे घर आहे आणि ते मोठे आहे"), "Marathi");
    }

    #[test]
    fn test_devanagari_hindi_default() {
        assert_eq!(detect("नमस्ते दुनिया"), "Hindi");
    }

    #[test]
    fn test_sample_is_truncated() {
        let mut text = "a".repeat(1000);
        text.push_str(" 한국어");
        assert_ne!(detect(&text), "Korean");

        let detector = LanguageDetector::new().with_config(DetectorConfig {
            min_chars: 5,
            sample_chars: 2000,
        });
        assert_eq!(detector.detect(&text), "Korean");
    }

    #[test]
    fn test_min_chars_is_configurable() {
        let detector = LanguageDetector::new().with_config(DetectorConfig {
            min_chars: 20,
            sample_chars: 1000,
        });
        assert_eq!(detector.detect("這是中文文字"), "English");
    }

    // ==================== Stage Tests ====================

    #[test]
    fn test_statistics_below_threshold_is_none() {
        // "zz" scores nothing anywhere
        assert_eq!(LanguageDetector::new().detect_by_statistics("zz zz zz"), None);
    }

    #[test]
    fn test_statistics_tie_goes_to_first_profile() {
        let a = LanguageProfile::new("Alpha", &["foo"], &[], &[]).unwrap();
        let b = LanguageProfile::new("Beta", &["foo"], &[], &[]).unwrap();
        let detector = LanguageDetector::with_profiles(DetectorConfig::default(), vec![a, b]);
        assert_eq!(detector.detect("foo foo foo"), "Alpha");
    }

    #[test]
    fn test_custom_profiles_replace_defaults() {
        let klingon = LanguageProfile::new("Klingon", &["qapla"], &[], &[]).unwrap();
        let detector = LanguageDetector::with_profiles(DetectorConfig::default(), vec![klingon]);
        let detection = detector.detect_with_stage("Qapla is what they said");
        assert_eq!(detection.language, "Klingon");
        assert_eq!(detection.stage, DetectionStage::Statistical);
    }

    #[test]
    fn test_frequency_stage_reached_when_statistics_silent() {
        let detector = LanguageDetector::with_profiles(DetectorConfig::default(), Vec::new());
        let detection = detector.detect_with_stage("Zażółć gęślą jaźń");
        assert_eq!(detection.language, "Polish");
        assert_eq!(detection.stage, DetectionStage::CharacterFrequency);
    }

    #[test]
    fn test_default_stage_when_nothing_matches() {
        let detector = LanguageDetector::with_profiles(DetectorConfig::default(), Vec::new());
        let detection = detector.detect_with_stage("qqqq xxxx");
        assert_eq!(detection.language, "English");
        assert_eq!(detection.stage, DetectionStage::Default);
    }

    #[test]
    fn test_stage_methods_are_case_insensitive() {
        let detector = LanguageDetector::new();
        assert_eq!(
            detector.detect_by_statistics("DER HUND UND DIE KATZE").as_deref(),
            Some("German")
        );
        assert_eq!(
            detector.detect_by_character_frequency("ÞETTA ÞAÐ").as_deref(),
            Some("Icelandic")
        );
        assert_eq!(detector.detect_by_script("plain"), None);
    }

    // ==================== Property Tests ====================

    proptest! {
        #[test]
        fn prop_short_input_is_english(text in "[a-zA-Z ]{0,4}") {
            prop_assert_eq!(detect(&text), "English");
        }

        #[test]
        fn prop_hangul_is_korean(text in "[\u{AC00}-\u{D7AF}]{5,40}") {
            prop_assert_eq!(detect(&text), "Korean");
        }

        #[test]
        fn prop_arabic_is_arabic(text in "[\u{0621}-\u{064A}]{5,40}") {
            prop_assert_eq!(detect(&text), "Arabic");
        }

        #[test]
        fn prop_cjk_is_chinese(text in "[\u{4E00}-\u{9FFF}]{5,40}") {
            prop_assert_eq!(detect(&text), "Chinese");
        }

        #[test]
        fn prop_detect_is_deterministic(text in "\\PC{0,200}") {
            let detector = LanguageDetector::new();
            prop_assert_eq!(detector.detect(&text), detector.detect(&text));
        }

        #[test]
        fn prop_detect_never_returns_empty(text in "\\PC{0,200}") {
            prop_assert!(!detect(&text).is_empty());
        }
    }
}
