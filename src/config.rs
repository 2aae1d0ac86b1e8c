use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

// Ten years; keeps `now - ttl` inside chrono's range.
const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Counter backend requested by the site configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[serde(alias = "localStorage", alias = "localstorage")]
    Local,
    #[serde(alias = "supabase")]
    Remote,
    #[serde(alias = "giscus")]
    Delegated,
}

impl Backend {
    pub fn key(&self) -> &'static str {
        match self {
            Backend::Local => "local",
            Backend::Remote => "remote",
            Backend::Delegated => "delegated",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "local" | "localStorage" | "localstorage" => Some(Backend::Local),
            "remote" | "supabase" => Some(Backend::Remote),
            "delegated" | "giscus" => Some(Backend::Delegated),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Site-wide configuration, read once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionsConfig {
    pub backend: Backend,

    /// SQLite file standing in for the browser profile's local storage.
    pub database_path: String,
    /// Seconds after which a session seen-marker stops suppressing views.
    pub session_ttl_secs: u64,

    pub remote_url: Option<String>,
    pub remote_key: Option<String>,
    pub remote_table: String,
    pub remote_increment_rpc: String,
    pub request_timeout_secs: u64,
    /// Keep the read-then-upsert increment when the atomic RPC is missing.
    pub allow_racy_increment: bool,

    pub delegated_repo: Option<String>,
    pub delegated_repo_id: Option<String>,
    pub delegated_category: Option<String>,
    pub delegated_category_id: Option<String>,
    pub delegated_mapping: String,
    pub delegated_strict: bool,
    pub delegated_reactions_enabled: bool,
    pub delegated_input_position: String,
    pub delegated_theme: String,
    pub delegated_lang: String,
    pub delegated_script_src: String,
}

impl Default for ReactionsConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            database_path: "reactions.db".to_string(),
            session_ttl_secs: 30 * 60,
            remote_url: None,
            remote_key: None,
            remote_table: "article_reactions".to_string(),
            remote_increment_rpc: "increment_article_views".to_string(),
            request_timeout_secs: 10,
            allow_racy_increment: true,
            delegated_repo: None,
            delegated_repo_id: None,
            delegated_category: None,
            delegated_category_id: None,
            delegated_mapping: "pathname".to_string(),
            delegated_strict: false,
            delegated_reactions_enabled: true,
            delegated_input_position: "bottom".to_string(),
            delegated_theme: "preferred_color_scheme".to_string(),
            delegated_lang: "en".to_string(),
            delegated_script_src: "https://giscus.app/client.js".to_string(),
        }
    }
}

impl ReactionsConfig {
    /// Load defaults, then an optional config file, then `REACTIONS_*` env vars.
    ///
    /// Without an explicit path, `reactions.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("reactions").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("REACTIONS"))
            .build()
            .context("Failed to read reactions configuration")?;

        settings
            .try_deserialize()
            .context("Invalid reactions configuration")
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .context("Failed to parse reactions configuration")?;

        settings
            .try_deserialize()
            .context("Invalid reactions configuration")
    }

    /// Remote endpoint and key, when both are set and non-blank.
    pub fn remote_credentials(&self) -> Option<(&str, &str)> {
        let url = non_blank(self.remote_url.as_deref())?;
        let key = non_blank(self.remote_key.as_deref())?;
        Some((url, key))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
