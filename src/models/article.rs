use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use super::ROOT_ARTICLE_ID;

// NewType pattern so raw paths never reach a backend unnormalized
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(String);

impl ArticleId {
    /// Normalize a location path into an article identifier.
    ///
    /// A single trailing `/` is stripped, so `/blog/post-1/` and `/blog/post-1`
    /// name the same article. The empty path and the site root map to `/`.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim();
        let normalized = trimmed.strip_suffix('/').unwrap_or(trimmed);

        if normalized.is_empty() {
            ArticleId(ROOT_ARTICLE_ID.to_string())
        } else {
            ArticleId(normalized.to_string())
        }
    }

    /// Derive the identifier from a full page URL, ignoring query and fragment.
    pub fn from_url(url: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Self::from_path(parsed.path()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ARTICLE_ID
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ArticleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
