use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Backend, ReactionsConfig};
use crate::storage::{CounterAdapter, CounterStore, DelegatedWidget, RemoteCounterClient};

/// Pick the single adapter used for this page load.
///
/// Delegated wins when requested and fully configured, remote when requested
/// and credentials are present; everything else lands on the local store.
pub fn select_adapter(config: &ReactionsConfig, local: CounterStore) -> Arc<dyn CounterAdapter> {
    match config.backend {
        Backend::Delegated => {
            if let Some(widget) = DelegatedWidget::init(config, local.clone()) {
                info!("Using delegated reactions widget");
                return Arc::new(widget);
            }
        }
        Backend::Remote => match config.remote_credentials() {
            Some((url, key)) => match RemoteCounterClient::new(url, key, config, local.clone()) {
                Ok(client) => {
                    info!("Using remote counter table at {}", url);
                    return Arc::new(client);
                }
                Err(e) => warn!(
                    "Remote counter client unusable ({}), falling back to local store",
                    e
                ),
            },
            None => warn!("Remote backend not configured, falling back to local store"),
        },
        Backend::Local => {}
    }

    info!("Using local counter store");
    Arc::new(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleId;
    use crate::storage::Database;
    use pretty_assertions::assert_eq;

    fn local() -> CounterStore {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        CounterStore::new(db)
    }

    fn delegated_config() -> ReactionsConfig {
        ReactionsConfig {
            backend: Backend::Delegated,
            delegated_repo: Some("site/comments".to_string()),
            delegated_repo_id: Some("R_abc".to_string()),
            delegated_category: Some("Articles".to_string()),
            delegated_category_id: Some("DIC_xyz".to_string()),
            ..ReactionsConfig::default()
        }
    }

    #[test]
    fn default_config_selects_local() {
        let adapter = select_adapter(&ReactionsConfig::default(), local());
        assert_eq!(adapter.backend(), Backend::Local);
    }

    #[test]
    fn complete_delegated_config_selects_widget() {
        let adapter = select_adapter(&delegated_config(), local());
        assert_eq!(adapter.backend(), Backend::Delegated);
        assert!(adapter.as_widget().is_some());
    }

    #[tokio::test]
    async fn delegated_without_category_id_reaches_local_store() {
        let store = local();
        let article = ArticleId::from_path("/blog/post-1");
        store.record_views(&article, 41);

        let config = ReactionsConfig {
            delegated_category_id: None,
            ..delegated_config()
        };
        let adapter = select_adapter(&config, store.clone());

        assert_eq!(adapter.backend(), Backend::Local);
        assert!(adapter.as_widget().is_none());
        assert_eq!(adapter.get_views(&article).await, 41);

        adapter.set_likes(&article, 3).await;
        assert_eq!(store.get_likes(&article).await, 3);
    }

    #[test]
    fn remote_without_key_selects_local() {
        let config = ReactionsConfig {
            backend: Backend::Remote,
            remote_url: Some("https://db.example.org".to_string()),
            ..ReactionsConfig::default()
        };
        assert_eq!(select_adapter(&config, local()).backend(), Backend::Local);
    }

    #[tokio::test]
    async fn remote_with_credentials_selects_client() {
        let config = ReactionsConfig {
            backend: Backend::Remote,
            remote_url: Some("https://db.example.org".to_string()),
            remote_key: Some("anon".to_string()),
            ..ReactionsConfig::default()
        };
        assert_eq!(select_adapter(&config, local()).backend(), Backend::Remote);
    }
}
