//! Language profile registry: the word, character and pattern signatures used
//! by the statistical stage, plus name-to-code lookups.
//!
//! The built-in profiles are compiled once on first access and shared through
//! a `OnceLock`, the same way the registry has always been initialized.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Weight of a whole-word match.
pub const WORD_WEIGHT: u32 = 5;
/// Weight of a diagnostic character occurrence.
pub const CHAR_WEIGHT: u32 = 2;
/// Weight of a sub-word pattern match.
pub const PATTERN_WEIGHT: u32 = 1;

/// Word/character/pattern signature of one language.
///
/// Profiles are immutable once built. Words are matched on Unicode word
/// boundaries against lowercased text, characters are counted as
/// non-overlapping substrings (entries may span several characters, e.g. the
/// Dutch `ij`), and patterns are regular expressions.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    name: String,
    words: Vec<Regex>,
    chars: Vec<String>,
    patterns: Vec<Regex>,
}

impl LanguageProfile {
    /// Build a profile, compiling its word and pattern regexes.
    ///
    /// # Errors
    /// Returns an error if one of `patterns` is not a valid regular expression.
    pub fn new(
        name: impl Into<String>,
        words: &[&str],
        chars: &[&str],
        patterns: &[&str],
    ) -> Result<Self> {
        let name = name.into();

        let words = words
            .iter()
            .map(|word| {
                let word = word.to_lowercase();
                Regex::new(&format!(r"\b{}\b", regex::escape(&word)))
                    .with_context(|| format!("invalid word '{}' in {} profile", word, name))
            })
            .collect::<Result<Vec<_>>>()?;

        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("invalid pattern '{}' in {} profile", pattern, name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            words,
            chars: chars.iter().map(|c| c.to_lowercase()).collect(),
            patterns,
        })
    }

    /// Language name, e.g. "German".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Weighted score of an already lowercased sample.
    pub fn score(&self, lowered: &str) -> u32 {
        let word_hits: usize = self
            .words
            .iter()
            .map(|re| re.find_iter(lowered).count())
            .sum();
        let char_hits: usize = self
            .chars
            .iter()
            .filter(|c| !c.is_empty())
            .map(|c| lowered.matches(c.as_str()).count())
            .sum();
        let pattern_hits: usize = self
            .patterns
            .iter()
            .map(|re| re.find_iter(lowered).count())
            .sum();

        word_hits as u32 * WORD_WEIGHT
            + char_hits as u32 * CHAR_WEIGHT
            + pattern_hits as u32 * PATTERN_WEIGHT
    }
}

static PROFILES: OnceLock<Vec<LanguageProfile>> = OnceLock::new();

/// The built-in profile table, in scoring order.
///
/// Order matters: on equal scores the language listed first wins.
pub fn default_profiles() -> &'static [LanguageProfile] {
    PROFILES.get_or_init(|| {
        PROFILE_DATA
            .iter()
            .map(|(name, words, chars, patterns)| {
                LanguageProfile::new(*name, words, chars, patterns)
                    .expect("built-in language profiles are valid")
            })
            .collect()
    })
}

type ProfileData = (
    &'static str,
    &'static [&'static str],
    &'static [&'static str],
    &'static [&'static str],
);

const PROFILE_DATA: &[ProfileData] = &[
    (
        "English",
        &[
            "the", "be", "to", "of", "and", "a", "in", "that", "have", "i", "it", "for", "not",
            "on", "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from",
            "they", "we", "say", "her", "she",
        ],
        &[],
        &["th", "he", "in", "er", "an", "re", "ed", "nd", "on", "en"],
    ),
    (
        "Spanish",
        &[
            "el", "la", "de", "que", "y", "en", "un", "es", "se", "no", "te", "lo", "le", "da",
            "su", "por", "son", "con", "para", "del", "los", "las", "una", "pero", "todo",
            "bien", "fue", "muy", "hasta", "desde",
        ],
        &["ñ", "á", "é", "í", "ó", "ú", "¿", "¡"],
        &["ción", "idad", "mente", "endo", "ando"],
    ),
    (
        "French",
        &[
            "le", "de", "et", "à", "un", "il", "être", "avoir", "que", "pour", "dans", "ce",
            "son", "une", "sur", "avec", "ne", "se", "pas", "tout", "plus", "par", "grand",
            "mais", "qui", "lui", "où", "très", "sans", "chez",
        ],
        &["à", "é", "è", "ê", "ë", "î", "ï", "ô", "ù", "û", "ü", "ÿ", "ç"],
        &["tion", "ment", "eux", "ique", "oir"],
    ),
    (
        "German",
        &[
            "der", "die", "und", "in", "den", "von", "zu", "das", "mit", "sich", "des", "auf",
            "für", "ist", "im", "dem", "nicht", "ein", "eine", "als", "auch", "es", "an",
            "werden", "aus", "er", "hat", "dass", "sie", "nach",
        ],
        &["ä", "ö", "ü", "ß"],
        &["ung", "keit", "lich", "sch", "tch"],
    ),
    (
        "Italian",
        &[
            "il", "di", "che", "e", "la", "per", "un", "in", "con", "del", "da", "a", "al", "le",
            "se", "gli", "come", "più", "o", "ma", "una", "su", "lo", "anche", "tutto", "della",
            "tra", "quando", "molto", "fare",
        ],
        &["à", "è", "é", "ì", "í", "ò", "ó", "ù", "ú"],
        &["zione", "mente", "aggio", "ezza", "ità"],
    ),
    (
        "Portuguese",
        &[
            "o", "de", "a", "e", "que", "do", "da", "em", "um", "para", "é", "com", "não", "uma",
            "os", "no", "se", "na", "por", "mais", "as", "dos", "como", "mas", "foi", "ao",
            "ele", "das", "tem", "à",
        ],
        &["ã", "á", "à", "â", "é", "ê", "í", "ó", "ô", "õ", "ú", "ü", "ç"],
        &["ção", "mente", "ões", "idade", "izar"],
    ),
    (
        "Dutch",
        &[
            "de", "van", "het", "een", "en", "in", "te", "dat", "op", "voor", "met", "als",
            "zijn", "er", "aan", "om", "door", "ze", "dan", "of", "naar", "bij", "hij", "heeft",
            "ook", "over", "zich", "uit", "maar", "kan",
        ],
        &["ij", "oe", "aa", "ee", "oo", "uu"],
        &["lijk", "heid", "isch", "atie", "eren"],
    ),
    (
        "Russian",
        &[
            "в", "и", "не", "на", "с", "что", "а", "по", "это", "как", "его", "к", "он", "до",
            "за", "для", "от", "же", "то", "но", "или", "ты", "мы", "вы", "их", "кто", "уже",
            "бы", "где", "есть",
        ],
        &[
            "а", "б", "в", "г", "д", "е", "ё", "ж", "з", "и", "й", "к", "л", "м", "н", "о", "п",
            "р", "с", "т", "у", "ф", "х", "ц", "ч", "ш", "щ", "ъ", "ы", "ь", "э", "ю", "я",
        ],
        &["ость", "ение", "ание", "ство", "ный"],
    ),
    (
        "Swahili",
        &[
            "na", "ya", "wa", "ni", "za", "la", "kwa", "hii", "kila", "yote", "mtu", "watu",
            "kutoka", "kwenda", "nyingi", "moja", "mbili", "tatu", "nne", "tano", "sita", "saba",
            "nane", "tisa", "kumi",
        ],
        &[],
        &["wa", "ki", "ku", "ya", "za", "la", "pa", "mu"],
    ),
    (
        "Vietnamese",
        &[
            "và", "của", "có", "trong", "là", "một", "được", "cho", "với", "không", "các",
            "này", "đó", "những", "tại", "từ", "sau", "về", "đã", "sẽ", "ra", "nó", "họ", "năm",
            "ngày",
        ],
        &["ă", "â", "đ", "ê", "ô", "ơ", "ư"],
        &["ng", "nh", "th", "tr", "ch", "ph", "qu"],
    ),
    (
        "Indonesian",
        &[
            "yang", "dan", "di", "ke", "dari", "untuk", "dengan", "ini", "itu", "pada", "dalam",
            "tidak", "akan", "adalah", "atau", "juga", "oleh", "saya", "kita", "mereka", "ada",
            "sudah", "bisa", "harus", "dapat",
        ],
        &[],
        &["ng", "an", "kan", "nya", "ter", "ber", "men", "per"],
    ),
    (
        "Malay",
        &[
            "yang", "dan", "di", "ke", "dari", "untuk", "dengan", "ini", "itu", "pada", "dalam",
            "tidak", "akan", "adalah", "atau", "juga", "oleh", "saya", "kita", "mereka", "ada",
            "sudah", "boleh", "mesti", "dapat",
        ],
        &[],
        &["ng", "an", "kan", "nya", "ter", "ber", "men", "per"],
    ),
    (
        "Filipino",
        &[
            "ang", "ng", "sa", "na", "at", "mga", "ay", "para", "hindi", "ako", "siya", "kami",
            "kayo", "sila", "ito", "iyan", "iyon", "dito", "diyan", "doon", "may", "wala",
            "kung", "pero", "kasi",
        ],
        &[],
        &["ng", "an", "in", "um", "mag", "pag", "ka", "ma"],
    ),
];

/// ISO 639 code for a language name; unknown names map to "en".
pub fn language_code(name: &str) -> &'static str {
    LANGUAGE_CODES
        .iter()
        .find(|(language, _)| *language == name)
        .map(|(_, code)| *code)
        .unwrap_or("en")
}

const LANGUAGE_CODES: &[(&str, &str)] = &[
    ("English", "en"),
    ("Spanish", "es"),
    ("French", "fr"),
    ("German", "de"),
    ("Italian", "it"),
    ("Portuguese", "pt"),
    ("Dutch", "nl"),
    ("Russian", "ru"),
    ("Chinese", "zh"),
    ("Japanese", "ja"),
    ("Korean", "ko"),
    ("Arabic", "ar"),
    ("Hindi", "hi"),
    ("Marathi", "mr"),
    ("Sanskrit", "sa"),
    ("Bengali", "bn"),
    ("Tamil", "ta"),
    ("Telugu", "te"),
    ("Kannada", "kn"),
    ("Malayalam", "ml"),
    ("Gujarati", "gu"),
    ("Punjabi", "pa"),
    ("Oriya", "or"),
    ("Thai", "th"),
    ("Vietnamese", "vi"),
    ("Indonesian", "id"),
    ("Malay", "ms"),
    ("Filipino", "fil"),
    ("Swahili", "sw"),
    ("Turkish", "tr"),
    ("Polish", "pl"),
    ("Czech", "cs"),
    ("Slovak", "sk"),
    ("Hungarian", "hu"),
    ("Romanian", "ro"),
    ("Croatian", "hr"),
    ("Serbian", "sr"),
    ("Slovenian", "sl"),
    ("Lithuanian", "lt"),
    ("Latvian", "lv"),
    ("Estonian", "et"),
    ("Finnish", "fi"),
    ("Swedish", "sv"),
    ("Norwegian", "no"),
    ("Danish", "da"),
    ("Icelandic", "is"),
    ("Hebrew", "he"),
    ("Georgian", "ka"),
    ("Armenian", "hy"),
    ("Myanmar", "my"),
    ("Khmer", "km"),
    ("Lao", "lo"),
    ("Ethiopian", "am"),
    ("Cherokee", "chr"),
];

/// Every language the detector can return, without duplicates, in table
/// order (script languages, then statistical, then frequency).
pub fn supported_languages() -> Vec<&'static str> {
    let script = super::script::script_languages();
    let statistical = PROFILE_DATA.iter().map(|(name, ..)| *name);
    let frequency = super::frequency::frequency_languages();

    let mut languages: Vec<&'static str> = Vec::new();
    for name in script.into_iter().chain(statistical).chain(frequency) {
        if !languages.contains(&name) {
            languages.push(name);
        }
    }
    languages
}
