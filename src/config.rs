// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "ENRICH_CONFIG_PATH";
pub const ENV_REQUEST_DELAY_MS: &str = "ENRICH_REQUEST_DELAY_MS";

pub const DEFAULT_BASE_URL: &str = "https://www.goodreads.com";
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
pub const DEFAULT_TITLE_MAX_CHARS: usize = 50;

const MIN_TITLE_MAX_CHARS: usize = 10;

fn default_rating_thresholds() -> Vec<f32> {
    vec![4.00, 4.30, 4.50]
}

/// Highlight bands used by the table renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    /// Ascending rating cut-offs for the light / medium / strong bands.
    pub rating_thresholds: Vec<f32>,
    pub low_review_count: u64,
    pub high_review_count: u64,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            rating_thresholds: default_rating_thresholds(),
            low_review_count: 200,
            high_review_count: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Site root; book pages live at `{base_url}/book/isbn/{id}`.
    pub base_url: String,
    /// Fixed pause before every outgoing request.
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Titles longer than this are shown cut, with the full form kept aside.
    pub title_max_chars: usize,
    pub highlights: HighlightConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            request_timeout_secs: 10,
            user_agent: concat!("ratings-enricher/", env!("CARGO_PKG_VERSION")).to_string(),
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            highlights: HighlightConfig::default(),
        }
    }
}

impl EnrichConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading enrich config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing enrich config {}", path.display()))?;
        Ok(cfg.with_env_overrides().sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $ENRICH_CONFIG_PATH
    /// 2) config/enrich.toml
    /// 3) config/enrich.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from("config/enrich.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/enrich.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default().with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = std::env::var(ENV_REQUEST_DELAY_MS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.request_delay_ms = ms;
        }
        self
    }

    fn sanitized(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        self.title_max_chars = self.title_max_chars.max(MIN_TITLE_MAX_CHARS);
        self.request_timeout_secs = self.request_timeout_secs.max(1);

        let hl = &mut self.highlights;
        hl.rating_thresholds.retain(|t| t.is_finite());
        if hl.rating_thresholds.is_empty() {
            hl.rating_thresholds = default_rating_thresholds();
        }
        hl.rating_thresholds.sort_by(f32::total_cmp);
        if hl.low_review_count > hl.high_review_count {
            // swap to keep a valid interval
            std::mem::swap(&mut hl.low_review_count, &mut hl.high_review_count);
        }
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<EnrichConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        // No usable extension: JSON first, then TOML.
        _ => serde_json::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported enrich config format")),
    }
}
