//! Detect the language of a document.
//!
//! Usage:
//!   detect page.html          # Read the file
//!   echo "Hallo Welt" | detect   # Read stdin
//!
//! Markup is ignored. Prints `<Language> (<code>)`.

use anyhow::{Context, Result};
use langsweep::i18n::{language_code, LanguageDetector};
use std::io::Read;
use tracing::debug;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("langsweep=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let input = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let detection = LanguageDetector::new().detect_with_stage(&input);
    debug!("Detected via {:?}", detection.stage);

    println!(
        "{} ({})",
        detection.language,
        language_code(&detection.language)
    );
    Ok(())
}
