//! Language detection.
//!
//! Maps free text (plain or HTML) to a language name such as `"German"`,
//! falling back to `"English"` when the text gives no usable signal.
//!
//! # Architecture
//!
//! - `registry`: statistical language profiles and name-to-code lookups
//! - `script`: Unicode-range detection, including the Devanagari sub-detector
//! - `frequency`: diacritic counting for Latin languages without a profile
//! - `detector`: the cascade tying the three stages together
//!
//! # Example
//!
//! ```rust,ignore
//! use langsweep::i18n::{language_code, LanguageDetector};
//!
//! let detector = LanguageDetector::new();
//! let language = detector.detect("<p>Das ist ein Test</p>");
//! assert_eq!(language, "German");
//! assert_eq!(language_code(&language), "de");
//! ```

mod detector;
mod frequency;
mod registry;
mod script;

pub use detector::{
    Detection, DetectionStage, DetectorConfig, LanguageDetector, DEFAULT_LANGUAGE,
};
pub use registry::{default_profiles, language_code, supported_languages, LanguageProfile};

/// Detect with the default detector.
pub fn detect(text: &str) -> String {
    LanguageDetector::new().detect(text)
}
