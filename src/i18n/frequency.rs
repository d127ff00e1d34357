//! Stage 3: diacritic frequency for Latin-script languages the statistical
//! profiles do not cover.

const FREQUENCY_TABLE: &[(&str, &[char])] = &[
    ("Finnish", &['ä', 'ö', 'y']),
    ("Swedish", &['å', 'ä', 'ö']),
    ("Norwegian", &['æ', 'ø', 'å']),
    ("Danish", &['æ', 'ø', 'å']),
    ("Icelandic", &['þ', 'ð', 'æ']),
    ("Polish", &['ą', 'ć', 'ę', 'ł', 'ń', 'ó', 'ś', 'ź', 'ż']),
    (
        "Czech",
        &['á', 'č', 'ď', 'é', 'ě', 'í', 'ň', 'ó', 'ř', 'š', 'ť', 'ú', 'ů', 'ý', 'ž'],
    ),
    (
        "Slovak",
        &['á', 'ä', 'č', 'ď', 'é', 'í', 'ĺ', 'ľ', 'ň', 'ó', 'ô', 'ŕ', 'š', 'ť', 'ú', 'ý', 'ž'],
    ),
    ("Hungarian", &['á', 'é', 'í', 'ó', 'ö', 'ő', 'ú', 'ü', 'ű']),
    ("Romanian", &['ă', 'â', 'î', 'ș', 'ț']),
    ("Croatian", &['č', 'ć', 'đ', 'š', 'ž']),
    ("Serbian", &['č', 'ć', 'đ', 'š', 'ž']),
    ("Slovenian", &['č', 'š', 'ž']),
    ("Lithuanian", &['ą', 'č', 'ę', 'ė', 'į', 'š', 'ų', 'ū', 'ž']),
    ("Latvian", &['ā', 'č', 'ē', 'ģ', 'ī', 'ķ', 'ļ', 'ņ', 'š', 'ū', 'ž']),
    ("Estonian", &['ä', 'ö', 'ü', 'õ']),
    ("Turkish", &['ç', 'ğ', 'ı', 'ö', 'ş', 'ü']),
];

/// Minimum count a language needs before stage 3 commits to it.
const MIN_FREQUENCY_SCORE: usize = 2;

/// Highest-counting language of the table, if its count exceeds 2.
///
/// `lowered` must already be lowercased. Only a strictly greater count
/// replaces the current best, so equal counts keep the earlier language.
pub fn detect_by_character_frequency(lowered: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;

    for (language, chars) in FREQUENCY_TABLE {
        let score = lowered.chars().filter(|c| chars.contains(c)).count();
        if score > best.map_or(0, |(_, best_score)| best_score) {
            best = Some((*language, score));
        }
    }

    best.filter(|(_, score)| *score > MIN_FREQUENCY_SCORE)
        .map(|(language, _)| language)
}

pub fn frequency_languages() -> impl Iterator<Item = &'static str> {
    FREQUENCY_TABLE.iter().map(|(language, _)| *language)
}
