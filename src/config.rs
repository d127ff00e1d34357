use crate::bulk::ControllerConfig;
use anyhow::{Context, Result};
use std::time::Duration;

/// Longest accepted `GLOBAL_KEYWORDS` value, in characters.
pub const MAX_GLOBAL_KEYWORDS_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct Config {
    // OpenAI. Only sweeps that generate need the key.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_vision_model: String,
    pub openai_api_url: String,

    // Storage
    pub database_path: String,
    pub documents_dir: String,

    // Generation
    pub keyword_count: u32,
    pub seo_keywords_count: u32,
    pub global_keywords: Vec<String>,

    // Bulk sweeps
    pub lock_timeout: Duration,
    pub step_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // OpenAI
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_vision_model: std::env::var("OPENAI_VISION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),

            // Storage
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/langsweep.db".to_string()),
            documents_dir: std::env::var("DOCUMENTS_DIR")
                .unwrap_or_else(|_| "data/documents".to_string()),

            // Generation
            keyword_count: parse_count(std::env::var("KEYWORD_COUNT").ok(), 1),
            seo_keywords_count: parse_count(std::env::var("SEO_KEYWORDS_COUNT").ok(), 3),
            global_keywords: parse_global_keywords(
                &std::env::var("GLOBAL_KEYWORDS").unwrap_or_default(),
            ),

            // Bulk sweeps
            lock_timeout: Duration::from_secs(
                std::env::var("LOCK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
            step_timeout: Duration::from_secs(
                std::env::var("STEP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            poll_interval: Duration::from_millis(
                std::env::var("POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),
        })
    }

    pub fn require_openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .context("OPENAI_API_KEY not set")
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            lock_timeout: self.lock_timeout,
            step_timeout: self.step_timeout,
        }
    }
}

/// Counts must be 1..=10; anything else present falls back to 1.
fn parse_count(raw: Option<String>, default: u32) -> u32 {
    match raw {
        None => default,
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(count) if (1..=10).contains(&count) => count,
            _ => 1,
        },
    }
}

/// Comma-separated list, cut to [`MAX_GLOBAL_KEYWORDS_CHARS`] first.
fn parse_global_keywords(raw: &str) -> Vec<String> {
    crate::html::truncate_chars(raw, MAX_GLOBAL_KEYWORDS_CHARS)
        .split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}
