//! Stage 1: writing-system detection by Unicode range.

use std::ops::RangeInclusive;

/// One entry of the script table. `resolver` picks a language when a
/// script is shared by several languages.
struct ScriptEntry {
    name: &'static str,
    ranges: &'static [RangeInclusive<char>],
    resolver: Option<fn(&str) -> &'static str>,
}

impl ScriptEntry {
    fn matches(&self, c: char) -> bool {
        self.ranges.iter().any(|range| range.contains(&c))
    }
}

const fn entry(name: &'static str, ranges: &'static [RangeInclusive<char>]) -> ScriptEntry {
    ScriptEntry {
        name,
        ranges,
        resolver: None,
    }
}

/// Tested top to bottom; the first entry with a character in the sample wins.
static SCRIPT_TABLE: &[ScriptEntry] = &[
    entry(
        "Arabic",
        &['\u{0600}'..='\u{06FF}', '\u{0750}'..='\u{077F}', '\u{08A0}'..='\u{08FF}'],
    ),
    entry("Chinese", &['\u{4E00}'..='\u{9FFF}', '\u{3400}'..='\u{4DBF}']),
    entry(
        "Japanese",
        &['\u{3040}'..='\u{309F}', '\u{30A0}'..='\u{30FF}', '\u{31F0}'..='\u{31FF}'],
    ),
    entry(
        "Korean",
        &['\u{AC00}'..='\u{D7AF}', '\u{1100}'..='\u{11FF}', '\u{3130}'..='\u{318F}'],
    ),
    entry("Thai", &['\u{0E00}'..='\u{0E7F}']),
    entry("Hebrew", &['\u{0590}'..='\u{05FF}']),
    ScriptEntry {
        name: "Devanagari",
        ranges: &['\u{0900}'..='\u{097F}'],
        resolver: Some(detect_devanagari_language),
    },
    entry("Bengali", &['\u{0980}'..='\u{09FF}']),
    entry("Tamil", &['\u{0B80}'..='\u{0BFF}']),
    entry("Telugu", &['\u{0C00}'..='\u{0C7F}']),
    entry("Kannada", &['\u{0C80}'..='\u{0CFF}']),
    entry("Malayalam", &['\u{0D00}'..='\u{0D7F}']),
    entry("Gujarati", &['\u{0A80}'..='\u{0AFF}']),
    entry("Punjabi", &['\u{0A00}'..='\u{0A7F}']),
    entry("Oriya", &['\u{0B00}'..='\u{0B7F}']),
    entry("Myanmar", &['\u{1000}'..='\u{109F}']),
    entry("Khmer", &['\u{1780}'..='\u{17FF}']),
    entry("Lao", &['\u{0E80}'..='\u{0EFF}']),
    entry("Georgian", &['\u{10A0}'..='\u{10FF}']),
    entry("Armenian", &['\u{0530}'..='\u{058F}']),
    entry("Ethiopian", &['\u{1200}'..='\u{137F}']),
    entry("Cherokee", &['\u{13A0}'..='\u{13FF}']),
    entry("Canadian_Aboriginal", &['\u{1400}'..='\u{167F}']),
];

/// First script-table language with at least one character in `sample`.
pub fn detect_by_script(sample: &str) -> Option<&'static str> {
    SCRIPT_TABLE
        .iter()
        .find(|entry| sample.chars().any(|c| entry.matches(c)))
        .map(|entry| match entry.resolver {
            Some(resolve) => resolve(sample),
            None => entry.name,
        })
}

const DEVANAGARI_LANGUAGES: &[(&str, &[&str])] = &[
    (
        "Hindi",
        &["है", "का", "की", "के", "में", "से", "को", "और", "यह", "वह"],
    ),
    (
        "Marathi",
        &[
            "आहे", "आहेत", "आणि", "नाही", "मध्ये", "होते", "ची", "चा", "चे", "ला", "हे", "केले",
        ],
    ),
    (
        "Sanskrit",
        &[
            "अस्ति", "च", "एव", "इति", "अपि", "तत्", "सः", "अहम्", "त्वम्", "भवति", "नमः", "वा",
        ],
    ),
];

fn is_devanagari_word_char(c: char) -> bool {
    // danda and double danda are sentence punctuation
    (('\u{0900}'..='\u{097F}').contains(&c) && c != '\u{0964}' && c != '\u{0965}')
        || c.is_alphanumeric()
}

/// Pick Hindi, Marathi or Sanskrit by counting marker tokens.
///
/// Whole tokens are compared so short markers such as `च` do not fire inside
/// longer words. Ties go to the language listed first and a sample without
/// any marker is Hindi.
pub fn detect_devanagari_language(sample: &str) -> &'static str {
    let tokens: Vec<&str> = sample
        .split(|c: char| !is_devanagari_word_char(c))
        .filter(|token| !token.is_empty())
        .collect();

    let mut best = ("Hindi", 0usize);
    for (language, markers) in DEVANAGARI_LANGUAGES {
        let count = tokens.iter().filter(|token| markers.contains(*token)).count();
        if count > best.1 {
            best = (*language, count);
        }
    }
    best.0
}

/// Languages stage 1 can return, with the shared Devanagari script expanded.
pub fn script_languages() -> Vec<&'static str> {
    let mut languages = Vec::new();
    for entry in SCRIPT_TABLE {
        if entry.resolver.is_some() {
            languages.extend(DEVANAGARI_LANGUAGES.iter().map(|(name, _)| *name));
        } else {
            languages.push(entry.name);
        }
    }
    languages
}
