//! Markup helpers shared by the language detector and the generators.

use regex::Regex;
use std::sync::OnceLock;

fn script_style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>")
            .expect("script/style regex is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"))
}

fn img_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
            .expect("img regex is valid")
    })
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>|<h1\b[^>]*>(.*?)</h1>")
            .expect("title regex is valid")
    })
}

/// Strip tags, decode the common entities and collapse whitespace.
///
/// Tags are replaced by a space so adjacent block elements do not glue
/// their words together.
pub fn clean_text(markup: &str) -> String {
    let without_code = script_style_regex().replace_all(markup, " ");
    let without_tags = tag_regex().replace_all(&without_code, " ");
    let decoded = decode_entities(&without_tags);
    collapse_whitespace(&decoded)
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Return at most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// All `src` attribute values of `<img>` tags, in document order.
pub fn extract_image_sources(markup: &str) -> Vec<String> {
    img_src_regex()
        .captures_iter(markup)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
        })
        .collect()
}

/// Document title: `<title>`, else the first `<h1>`, cleaned.
pub fn extract_title(markup: &str) -> Option<String> {
    let caps = title_regex().captures(markup)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let title = clean_text(raw);
    (!title.is_empty()).then_some(title)
}

/// Image sources worth sending to the vision model: absolute http(s) URLs,
/// inline data URLs, and root- or dot-relative paths.
pub fn is_valid_image_source(src: &str) -> bool {
    let src = src.trim();
    if src.is_empty() {
        return false;
    }
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("data:image/")
        || src.starts_with('/')
        || src.starts_with("./")
        || src.starts_with("../")
}

/// Stable key for an image: its file stem with every character outside
/// `[A-Za-z0-9_]` replaced by `_`.
///
/// Returns `None` for sources that do not yield a usable stem.
pub fn image_key(src: &str) -> Option<String> {
    if src.trim_start().to_ascii_lowercase().starts_with("data:") {
        return None;
    }
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    let key: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if key.is_empty() || key == "_" {
        None
    } else {
        Some(key)
    }
}

/// MIME type guessed from the file extension, defaulting to JPEG.
pub fn image_mime_type(src: &str) -> &'static str {
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
