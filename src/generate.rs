//! Per-document generators plugged into the bulk sweeps.
//!
//! [`KeywordGenerator`] writes SEO keywords, [`AltTextGenerator`] writes one
//! alt text per distinct image. Both prompt the model in the language
//! detected from the document text.

use crate::bulk::{GenerationCallback, GenerationResult};
use crate::config::Config;
use crate::db::Database;
use crate::documents::{Document, DocumentId, DocumentStore};
use crate::html;
use crate::i18n::LanguageDetector;
use crate::openai::{ChatClient, ChatRequest, Message};
use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use base64::Engine;
use futures::future::BoxFuture;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const KEYWORD_TIMEOUT: Duration = Duration::from_secs(45);
const VISION_TIMEOUT: Duration = Duration::from_secs(60);
const ENHANCE_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_KEYWORD_TIMEOUT: Duration = Duration::from_secs(30);

const KEYWORD_CONTENT_CHARS: usize = 2000;
const PAGE_KEYWORD_CONTENT_CHARS: usize = 1000;
/// Images above this size are not sent to the vision model.
pub const MAX_IMAGE_BYTES: u64 = 8 * 1024 * 1024;
const MIN_ENHANCED_ALT_CHARS: usize = 10;
const MIN_PAGE_KEYWORDS_CHARS: usize = 3;

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub vision_model: String,
    pub keyword_count: u32,
    pub seo_keywords_count: u32,
    pub global_keywords: Vec<String>,
    /// Retry policy for the keyword and vision calls.
    pub retry: RetryConfig,
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.openai_model.clone(),
            vision_model: config.openai_vision_model.clone(),
            keyword_count: config.keyword_count,
            seo_keywords_count: config.seo_keywords_count,
            global_keywords: config.global_keywords.clone(),
            retry: RetryConfig::api_call(),
        }
    }
}

/// Everything a generator needs, shared by both kinds.
#[derive(Clone)]
pub struct GeneratorContext {
    documents: Arc<dyn DocumentStore>,
    db: Database,
    client: ChatClient,
    detector: LanguageDetector,
    settings: GenerationSettings,
}

impl GeneratorContext {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        db: Database,
        client: ChatClient,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            documents,
            db,
            client,
            detector: LanguageDetector::new(),
            settings,
        }
    }

    pub fn with_detector(mut self, detector: LanguageDetector) -> Self {
        self.detector = detector;
        self
    }

    fn load(&self, id: &DocumentId) -> Result<Document> {
        self.documents
            .load(id)
            .with_context(|| format!("Failed to load document {}", id))
    }
}

/// Keep the first `count` comma-separated keywords of a model reply.
pub fn normalize_keywords(raw: &str, count: usize) -> String {
    raw.replace('"', "")
        .split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `count` entries of `keywords`, starting at an offset derived from the
/// document id and wrapping around.
///
/// The same document always gets the same selection, while different
/// documents spread over the whole list.
pub fn select_seo_keywords(keywords: &[String], count: usize, document: &DocumentId) -> Vec<String> {
    if keywords.is_empty() || count == 0 {
        return Vec::new();
    }

    let mut hasher = DefaultHasher::new();
    document.as_str().hash(&mut hasher);
    let start = (hasher.finish() % keywords.len() as u64) as usize;

    keywords
        .iter()
        .cycle()
        .skip(start)
        .take(count.min(keywords.len()))
        .cloned()
        .collect()
}

fn keyword_system_prompt(content: &str) -> String {
    format!(
        "You are an SEO expert. Generate keywords based on the following content: {}",
        content
    )
}

fn keyword_user_prompt(count: u32, language: &str) -> String {
    format!(
        "Generate exactly {count} best short, focused keywords for SEO for the context provided. \
         Provide them as a comma-separated list. \
         CRITICAL REQUIREMENT: You MUST return the keywords in {language} language only. \
         The content language has been detected as {language}, so all keywords must be in {language}. \
         Do not translate or use any other language. \
         Use the exact same language as the original content."
    )
}

fn vision_prompt(keywords: &str, language: &str) -> String {
    format!(
        "Generate a short alt text (max 125 characters but not less than 15 characters) that describes this image. \
         CRITICAL REQUIREMENT: You MUST write the alt text in {language} language only. \
         Include some of these keywords naturally: {keywords}. \
         The content language has been detected as {language}, so the alt text must be in {language}."
    )
}

fn enhance_prompt(alt: &str, seo_keywords: &str, page_keywords: &str, language: &str) -> String {
    format!(
        "Combine the following three elements into a single, natural-sounding image alt text:\n\n\
         1) Current image alt description: {alt}\n\
         2) General SEO keywords that must be included: {seo_keywords}\n\
         3) Page-specific keywords that must be included: {page_keywords}\n\n\
         Requirements:\n\
         - Create ONE fluent sentence that naturally integrates ALL given keywords\n\
         - Must include every single keyword provided\n\
         - Sound human-written and grammatically correct\n\
         - Avoid keyword lists or stuffing\n\
         - CRITICAL REQUIREMENT: You MUST write the alt text in {language} language only\n\
         - The content language has been detected as {language}, so the alt text must be in {language}\n\
         - Maximum 125 characters\n\n\
         Example: If image description is 'Tree on a field', general SEO keywords are 'Germany', \
         and page keywords are 'agriculture, farming', then result should be: \
         'A tree standing in an agricultural farming field in Germany.'\n\n\
         Return only the enhanced alt text in {language}, nothing else."
    )
}

fn page_keywords_prompt(title: &str, content: &str, language: &str) -> String {
    format!(
        "Analyze the following webpage content and generate 3-5 relevant SEO keywords \
         that best describe the main topics and themes:\n\n\
         Title: {title}\n\n\
         Content: {content}\n\n\
         Requirements:\n\
         - Return only keywords separated by commas\n\
         - Focus on main topics and themes\n\
         - Keep keywords relevant and specific\n\
         - Maximum 5 keywords\n\
         - CRITICAL REQUIREMENT: You MUST return keywords in {language} language only\n\
         - The content language has been detected as {language}, so all keywords must be in {language}\n\
         - No explanations or additional text\n\n\
         Example output: photography, landscape, nature, mountains, outdoor"
    )
}

// ==================== Keywords ====================

/// Generates and stores SEO keywords for a document.
#[derive(Clone)]
pub struct KeywordGenerator {
    ctx: GeneratorContext,
}

impl KeywordGenerator {
    pub fn new(ctx: GeneratorContext) -> Self {
        Self { ctx }
    }

    pub async fn generate_for(&self, id: &DocumentId) -> Result<GenerationResult> {
        let document = self.ctx.load(id)?;
        let text = html::clean_text(&document.body);
        if text.is_empty() {
            return Ok(GenerationResult::Skipped {
                reason: "no text content".to_string(),
            });
        }

        let language = self.ctx.detector.detect(&text);
        let content = html::truncate_chars(&text, KEYWORD_CONTENT_CHARS);
        let settings = &self.ctx.settings;
        debug!("Generating keywords for {} in {}", id, language);

        let mut request = ChatRequest::new(
            settings.model.as_str(),
            vec![
                Message::system(keyword_system_prompt(content)),
                Message::user(keyword_user_prompt(settings.keyword_count, &language)),
            ],
        );
        request.temperature = Some(0.7);

        let reply = self
            .ctx
            .client
            .complete_with_retry(&request, KEYWORD_TIMEOUT, &settings.retry, "keyword generation")
            .await;

        let keywords = reply
            .map(|raw| normalize_keywords(&raw, settings.keyword_count as usize))
            .unwrap_or_default();
        if keywords.is_empty() {
            return Ok(GenerationResult::Failed {
                reason: "no keywords returned".to_string(),
            });
        }

        self.ctx.db.save_keywords(id, &keywords, &language)?;
        info!("Saved keywords for {} ({}): {}", id, language, keywords);

        Ok(GenerationResult::Generated {
            text: Some(keywords),
        })
    }
}

impl GenerationCallback for KeywordGenerator {
    fn generate<'a>(&'a self, document: &'a DocumentId) -> BoxFuture<'a, Result<GenerationResult>> {
        Box::pin(self.generate_for(document))
    }
}

// ==================== Alt Text ====================

/// Generates and stores alt texts for every distinct image of a document.
#[derive(Clone)]
pub struct AltTextGenerator {
    ctx: GeneratorContext,
}

impl AltTextGenerator {
    pub fn new(ctx: GeneratorContext) -> Self {
        Self { ctx }
    }

    pub async fn generate_for(&self, id: &DocumentId) -> Result<GenerationResult> {
        let document = self.ctx.load(id)?;
        if document.body.trim().is_empty() {
            return Ok(GenerationResult::Skipped {
                reason: "empty document".to_string(),
            });
        }

        let text = html::clean_text(&document.body);
        let language = self.ctx.detector.detect(&text);

        let page_keywords = match self.ctx.db.keywords_for(id)? {
            Some(stored) if !stored.keywords.is_empty() => stored.keywords,
            _ => self.page_keywords(&document, &text, &language).await,
        };

        let settings = &self.ctx.settings;
        let seo_keywords = select_seo_keywords(
            &settings.global_keywords,
            settings.seo_keywords_count as usize,
            id,
        )
        .join(", ");

        let mut alt_texts: BTreeMap<String, String> = BTreeMap::new();
        for src in html::extract_image_sources(&document.body) {
            if !html::is_valid_image_source(&src) {
                debug!("Skipping invalid image source {:?} in {}", src, id);
                continue;
            }
            let Some(key) = html::image_key(&src) else {
                continue;
            };
            if alt_texts.contains_key(&key) {
                continue;
            }

            let Some(image_url) = resolve_image_url(&src, document.base_dir.as_deref()).await else {
                warn!("Could not load image {} in {}", src, id);
                continue;
            };

            let Some(alt) = self.describe_image(&image_url, &page_keywords, &language).await else {
                warn!("No alt text generated for {} in {}", src, id);
                continue;
            };

            let enhanced = self
                .enhance(&alt, &seo_keywords, &page_keywords, &language)
                .await;
            debug!("Alt text for {} ({}): {}", key, id, enhanced);
            alt_texts.insert(key, enhanced);
        }

        self.ctx.db.replace_alt_texts(id, &alt_texts)?;
        info!("Saved {} alt texts for {} ({})", alt_texts.len(), id, language);

        Ok(GenerationResult::Generated {
            text: Some(format!("{} alt texts", alt_texts.len())),
        })
    }

    /// Keywords for a document that has none stored yet. Not persisted.
    async fn page_keywords(&self, document: &Document, text: &str, language: &str) -> String {
        let content = html::truncate_chars(text, PAGE_KEYWORD_CONTENT_CHARS);
        let request = ChatRequest::new(
            self.ctx.settings.model.as_str(),
            vec![Message::user(page_keywords_prompt(
                &document.title,
                content,
                language,
            ))],
        )
        .with_default_sampling();

        let reply = self
            .ctx
            .client
            .complete_with_retry(
                &request,
                PAGE_KEYWORD_TIMEOUT,
                &RetryConfig::single_attempt(),
                "page keywords",
            )
            .await;

        match reply {
            Some(keywords) if keywords.chars().count() >= MIN_PAGE_KEYWORDS_CHARS => keywords,
            _ => {
                debug!("No page keywords generated for {}", document.id);
                String::new()
            }
        }
    }

    async fn describe_image(&self, image_url: &str, keywords: &str, language: &str) -> Option<String> {
        let settings = &self.ctx.settings;
        let request = ChatRequest::new(
            settings.vision_model.as_str(),
            vec![Message::user_with_image(
                vision_prompt(keywords, language),
                image_url,
            )],
        );

        self.ctx
            .client
            .complete_with_retry(&request, VISION_TIMEOUT, &settings.retry, "image alt text")
            .await
    }

    /// Blend the image description with both keyword sets; the description
    /// itself is kept when the model gives nothing usable.
    async fn enhance(&self, alt: &str, seo_keywords: &str, page_keywords: &str, language: &str) -> String {
        let request = ChatRequest::new(
            self.ctx.settings.model.as_str(),
            vec![Message::user(enhance_prompt(
                alt,
                seo_keywords,
                page_keywords,
                language,
            ))],
        )
        .with_default_sampling();

        let reply = self
            .ctx
            .client
            .complete_with_retry(
                &request,
                ENHANCE_TIMEOUT,
                &RetryConfig::single_attempt(),
                "alt text enhancement",
            )
            .await;

        match reply {
            Some(enhanced) if enhanced.chars().count() >= MIN_ENHANCED_ALT_CHARS => enhanced,
            _ => alt.to_string(),
        }
    }
}

impl GenerationCallback for AltTextGenerator {
    fn generate<'a>(&'a self, document: &'a DocumentId) -> BoxFuture<'a, Result<GenerationResult>> {
        Box::pin(self.generate_for(document))
    }
}

/// URL to hand to the vision model for an image source.
///
/// Remote and inline images pass through. Local paths are read relative to
/// `base_dir` and inlined as base64 `data:` URLs, up to [`MAX_IMAGE_BYTES`].
/// A local path must stay inside `base_dir` and its content must be an image.
async fn resolve_image_url(src: &str, base_dir: Option<&Path>) -> Option<String> {
    let src = src.trim();
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
        return Some(src.to_string());
    }

    let base_dir = tokio::fs::canonicalize(base_dir?).await.ok()?;
    let relative = src
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('/');
    let path = match tokio::fs::canonicalize(base_dir.join(relative)).await {
        Ok(path) => path,
        Err(e) => {
            debug!("Image {} not readable: {}", src, e);
            return None;
        }
    };
    if !path.starts_with(&base_dir) {
        warn!("Image {} resolves outside {}", src, base_dir.display());
        return None;
    }

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return None,
        Err(e) => {
            debug!("Image {} not readable: {}", path.display(), e);
            return None;
        }
    };
    if metadata.len() > MAX_IMAGE_BYTES {
        warn!(
            "Image {} is {} bytes, above the {} byte limit",
            path.display(),
            metadata.len(),
            MAX_IMAGE_BYTES
        );
        return None;
    }

    let bytes = tokio::fs::read(&path).await.ok()?;
    if !infer::is_image(&bytes) {
        warn!("{} is not an image, not sending it", path.display());
        return None;
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Some(format!("data:{};base64,{}", html::image_mime_type(src), encoded))
}
