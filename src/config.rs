//! Configuration file parser for radar.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which carries the trusted source list the tool ships with. Unknown keys
//! are silently ignored by serde, though we log a warning when the file
//! contains potential typos.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// One trusted feed source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_key` to prevent secret leakage in logs,
/// error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Title stored in the radar document.
    pub title: String,

    /// Path of the persisted radar collection.
    pub radar_path: PathBuf,

    /// Model identifier passed to the transformer API.
    pub model: String,

    /// Minimum transformer confidence accepted by the quality gate.
    /// Values outside [0.2, 0.45] are clamped into that range at load time.
    pub min_confidence: f64,

    /// Transformer API base URL override (testing / compatible servers).
    pub api_base: Option<String>,

    /// Transformer API key (alternative to OPENAI_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Trusted feed sources. Invalid URLs are dropped with a warning.
    pub sources: Vec<Source>,
}

/// Bounds of the acceptable quality-gate confidence threshold.
const MIN_CONFIDENCE_FLOOR: f64 = 0.2;
const MIN_CONFIDENCE_CEIL: f64 = 0.45;

fn default_sources() -> Vec<Source> {
    [
        ("Reuters", "https://feeds.reuters.com/reuters/worldNews"),
        ("BBC", "https://feeds.bbci.co.uk/news/world/rss.xml"),
        ("Nikkei Asia", "https://asia.nikkei.com/rss/feed/nar"),
        ("SCMP", "https://www.scmp.com/rss/2/feed"),
    ]
    .into_iter()
    .map(|(name, url)| Source {
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Opportunity Radar".to_string(),
            radar_path: PathBuf::from("radar.json"),
            model: "gpt-5-mini".to_string(),
            min_confidence: 0.3,
            api_base: None,
            api_key: None,
            sources: default_sources(),
        }
    }
}

/// Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("title", &self.title)
            .field("radar_path", &self.radar_path)
            .field("model", &self.model)
            .field("min_confidence", &self.min_confidence)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("sources", &self.sources)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as warning
    ///
    /// After parsing, `min_confidence` is clamped into its acceptable range
    /// and sources with unusable URLs are dropped (warned, not fatal — the
    /// same skip-and-continue policy the pipeline applies at fetch time).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid slurping a corrupted or
        // maliciously large config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "title",
                "radar_path",
                "model",
                "min_confidence",
                "api_base",
                "api_key",
                "sources",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        config.normalize();
        tracing::info!(
            path = %path.display(),
            model = %config.model,
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn normalize(&mut self) {
        if !(MIN_CONFIDENCE_FLOOR..=MIN_CONFIDENCE_CEIL).contains(&self.min_confidence) {
            let clamped = self
                .min_confidence
                .clamp(MIN_CONFIDENCE_FLOOR, MIN_CONFIDENCE_CEIL);
            tracing::warn!(
                configured = self.min_confidence,
                clamped = clamped,
                "min_confidence outside acceptable range, clamping"
            );
            self.min_confidence = clamped;
        }

        self.sources.retain(|source| match Url::parse(&source.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => true,
            Ok(url) => {
                tracing::warn!(
                    source = %source.name,
                    url = %source.url,
                    scheme = %url.scheme(),
                    "Dropping source with non-HTTP(S) URL"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    source = %source.name,
                    url = %source.url,
                    error = %e,
                    "Dropping source with unparseable URL"
                );
                false
            }
        });
    }

    /// Resolves the transformer credential. The OPENAI_API_KEY environment
    /// variable takes precedence over the config file; a missing credential
    /// is a fatal startup condition handled by the caller.
    pub fn api_key(&self) -> Option<SecretString> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
