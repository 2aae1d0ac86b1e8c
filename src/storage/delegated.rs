use async_trait::async_trait;
use html_escape::encode_double_quoted_attribute;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{non_blank, Backend, ReactionsConfig};
use crate::models::ArticleId;
use crate::storage::{CounterAdapter, CounterStore};

/// Parameters of the third-party discussion embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedScript {
    pub src: String,
    pub attributes: Vec<(String, String)>,
}

impl EmbedScript {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn to_html(&self) -> String {
        let mut html = format!(
            "<script src=\"{}\"",
            encode_double_quoted_attribute(&self.src)
        );
        for (name, value) in &self.attributes {
            html.push_str(&format!(
                " {}=\"{}\"",
                name,
                encode_double_quoted_attribute(value)
            ));
        }
        html.push_str(" crossorigin=\"anonymous\" async></script>");
        html
    }
}

/// Designated element the embed is injected into.
pub trait WidgetMount {
    fn inject(&mut self, embed: &EmbedScript);
}

impl WidgetMount for String {
    fn inject(&mut self, embed: &EmbedScript) {
        self.push_str(&embed.to_html());
    }
}

impl WidgetMount for Vec<EmbedScript> {
    fn inject(&mut self, embed: &EmbedScript) {
        self.push(embed.clone());
    }
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

/// Reactions owned by an embedded discussion widget.
///
/// Likes belong to the widget, so this adapter reports zero and ignores like
/// writes. The widget cannot count views, so those stay in the local store.
pub struct DelegatedWidget {
    embed: EmbedScript,
    local: CounterStore,
}

impl DelegatedWidget {
    /// Names of the mandatory identifiers missing from `config`.
    pub fn missing_fields(config: &ReactionsConfig) -> Vec<&'static str> {
        [
            ("delegated_repo", config.delegated_repo.as_deref()),
            ("delegated_category", config.delegated_category.as_deref()),
            ("delegated_category_id", config.delegated_category_id.as_deref()),
        ]
        .into_iter()
        .filter(|(_, value)| non_blank(*value).is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// Build the widget, or `None` when a mandatory identifier is missing.
    pub fn init(config: &ReactionsConfig, local: CounterStore) -> Option<Self> {
        let missing = Self::missing_fields(config);
        if !missing.is_empty() {
            warn!(
                "Delegated widget not configured (missing {}), falling back",
                missing.join(", ")
            );
            return None;
        }

        let value =
            |field: &Option<String>| field.as_deref().unwrap_or_default().trim().to_string();
        let attributes = vec![
            ("data-repo", value(&config.delegated_repo)),
            ("data-repo-id", value(&config.delegated_repo_id)),
            ("data-category", value(&config.delegated_category)),
            ("data-category-id", value(&config.delegated_category_id)),
            ("data-mapping", config.delegated_mapping.clone()),
            ("data-strict", flag(config.delegated_strict)),
            ("data-reactions-enabled", flag(config.delegated_reactions_enabled)),
            ("data-emit-metadata", flag(false)),
            ("data-input-position", config.delegated_input_position.clone()),
            ("data-theme", config.delegated_theme.clone()),
            ("data-lang", config.delegated_lang.clone()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        Some(Self {
            embed: EmbedScript {
                src: config.delegated_script_src.clone(),
                attributes,
            },
            local,
        })
    }

    pub fn embed(&self) -> &EmbedScript {
        &self.embed
    }

    /// Inject the embed into `mount`. Not idempotent: each call adds another
    /// embed, so callers render once per page load.
    pub fn render_widget(&self, mount: &mut dyn WidgetMount) {
        mount.inject(&self.embed);
        info!(
            "Rendered delegated widget for {}",
            self.embed.attribute("data-repo").unwrap_or_default()
        );
    }
}

#[async_trait]
impl CounterAdapter for DelegatedWidget {
    fn backend(&self) -> Backend {
        Backend::Delegated
    }

    async fn get_likes(&self, _article: &ArticleId) -> u64 {
        0
    }

    async fn set_likes(&self, _article: &ArticleId, _count: u64) {}

    async fn get_views(&self, article: &ArticleId) -> u64 {
        self.local.get_views(article).await
    }

    async fn increment_views(&self, article: &ArticleId) -> u64 {
        self.local.increment_views(article).await
    }

    fn has_user_liked(&self, _article: &ArticleId) -> bool {
        false
    }

    fn set_user_liked(&self, _article: &ArticleId, _liked: bool) {}

    fn as_widget(&self) -> Option<&DelegatedWidget> {
        Some(self)
    }
}
