use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::config::{Backend, ReactionsConfig};
use crate::controller::{LikeDisplay, ReactionsController};
use crate::models::{format_count, ArticleId, ViewOutcome};
use crate::selector::select_adapter;
use crate::session::{SessionId, SessionViewTracker};
use crate::storage::{CounterStore, Database};

/// Which page elements exist. Missing roles switch the matching feature off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageMounts {
    pub like_button: bool,
    pub like_counter: bool,
    pub view_counter: bool,
    pub reactions_group: bool,
    pub widget_mount: bool,
}

impl PageMounts {
    pub fn all() -> Self {
        Self {
            like_button: true,
            like_counter: true,
            view_counter: true,
            reactions_group: true,
            widget_mount: true,
        }
    }
}

/// Values the page renders after initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageState {
    pub article_id: ArticleId,
    pub backend: Backend,
    pub views: Option<ViewOutcome>,
    pub views_text: Option<String>,
    pub likes: Option<LikeDisplay>,
    pub native_likes_visible: bool,
    /// The native reactions group exists and must be hidden.
    pub hide_reactions_group: bool,
    pub embed: Option<String>,
}

/// Reactions for one page load.
pub struct Reactions {
    config: Arc<ReactionsConfig>,
    mounts: PageMounts,
    article: ArticleId,
    store: CounterStore,
    tracker: SessionViewTracker,
    state: OnceCell<PageState>,
    controller: Mutex<Option<ReactionsController>>,
}

impl Reactions {
    pub fn new(
        config: Arc<ReactionsConfig>,
        db: Database,
        session: SessionId,
        path: &str,
        mounts: PageMounts,
    ) -> Self {
        let tracker = SessionViewTracker::new(db.clone(), session, config.session_ttl());

        Self {
            mounts,
            article: ArticleId::from_path(path),
            store: CounterStore::new(db),
            tracker,
            state: OnceCell::new(),
            controller: Mutex::new(None),
            config,
        }
    }

    pub fn article_id(&self) -> &ArticleId {
        &self.article
    }

    pub fn format_count(count: u64) -> String {
        format_count(count)
    }

    /// Initialize the page once; later calls return the first result.
    pub async fn init(&self) -> &PageState {
        self.state.get_or_init(|| self.load()).await
    }

    /// Handle a like-button activation. `None` when likes are not shown.
    pub async fn toggle_like(&self) -> Option<LikeDisplay> {
        self.init().await;

        let mut controller = self.controller.lock().await;
        match controller.as_mut() {
            Some(controller) => Some(controller.toggle().await),
            None => None,
        }
    }

    async fn load(&self) -> PageState {
        let adapter = select_adapter(&self.config, self.store.clone());
        let backend = adapter.backend();
        info!("Initializing reactions for {} ({})", self.article, backend);

        let views = if self.mounts.view_counter {
            Some(self.tracker.track_view(&self.article, adapter.as_ref()).await)
        } else {
            None
        };

        let mut embed = None;
        let native_likes_visible = match adapter.as_widget() {
            Some(widget) => {
                if self.mounts.widget_mount {
                    let mut html = String::new();
                    widget.render_widget(&mut html);
                    embed = Some(html);
                } else {
                    warn!("Delegated widget selected but the page has no widget mount");
                }
                false
            }
            None => true,
        };

        let likes = if native_likes_visible && self.mounts.like_button && self.mounts.like_counter {
            let controller = ReactionsController::load(self.article.clone(), adapter.clone()).await;
            let display = controller.display();
            *self.controller.lock().await = Some(controller);
            Some(display)
        } else {
            None
        };

        PageState {
            article_id: self.article.clone(),
            backend,
            views_text: views.map(|outcome| format_count(outcome.views)),
            views,
            likes,
            native_likes_visible,
            hide_reactions_group: !native_likes_visible && self.mounts.reactions_group,
            embed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CounterAdapter;
    use pretty_assertions::assert_eq;

    fn database() -> Database {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn page(config: ReactionsConfig, db: &Database, mounts: PageMounts) -> Reactions {
        Reactions::new(
            Arc::new(config),
            db.clone(),
            SessionId::new("tab-1"),
            "/blog/post-1/",
            mounts,
        )
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let db = database();
        let reactions = page(ReactionsConfig::default(), &db, PageMounts::all());

        let first = reactions.init().await.clone();
        let second = reactions.init().await.clone();

        assert_eq!(first, second);
        assert_eq!(first.views, Some(ViewOutcome { incremented: true, views: 1 }));
        assert_eq!(first.views_text.as_deref(), Some("1"));
        assert_eq!(reactions.article_id().as_str(), "/blog/post-1");
    }

    #[tokio::test]
    async fn reload_in_same_session_does_not_count() {
        let db = database();
        page(ReactionsConfig::default(), &db, PageMounts::all()).init().await;
        let reload = page(ReactionsConfig::default(), &db, PageMounts::all());

        let state = reload.init().await;
        assert_eq!(state.views, Some(ViewOutcome { incremented: false, views: 1 }));
    }

    #[tokio::test]
    async fn missing_like_button_skips_likes() {
        let db = database();
        let mounts = PageMounts {
            like_button: false,
            ..PageMounts::all()
        };
        let reactions = page(ReactionsConfig::default(), &db, mounts);

        assert_eq!(reactions.init().await.likes, None);
        assert_eq!(reactions.toggle_like().await, None);
    }

    #[tokio::test]
    async fn missing_view_counter_does_not_track() {
        let db = database();
        let mounts = PageMounts {
            view_counter: false,
            ..PageMounts::all()
        };
        let reactions = page(ReactionsConfig::default(), &db, mounts);

        assert_eq!(reactions.init().await.views, None);
        let store = CounterStore::new(db);
        assert_eq!(store.get_views(reactions.article_id()).await, 0);
    }

    #[tokio::test]
    async fn toggle_like_round_trip() {
        let db = database();
        let reactions = page(ReactionsConfig::default(), &db, PageMounts::all());

        let before = reactions.init().await.likes.clone().unwrap();
        let liked = reactions.toggle_like().await.unwrap();
        let unliked = reactions.toggle_like().await.unwrap();

        assert_eq!(before.text, "0");
        assert_eq!(liked.text, "1");
        assert!(liked.pulse);
        assert_eq!(unliked, before);
    }

    #[tokio::test]
    async fn delegated_backend_hides_native_likes_and_renders_once() {
        let db = database();
        let config = ReactionsConfig {
            backend: Backend::Delegated,
            delegated_repo: Some("site/comments".to_string()),
            delegated_repo_id: Some("R_abc".to_string()),
            delegated_category: Some("Articles".to_string()),
            delegated_category_id: Some("DIC_xyz".to_string()),
            ..ReactionsConfig::default()
        };
        let reactions = page(config, &db, PageMounts::all());

        reactions.init().await;
        let state = reactions.init().await;

        assert_eq!(state.backend, Backend::Delegated);
        assert!(!state.native_likes_visible);
        assert!(state.hide_reactions_group);
        assert_eq!(state.likes, None);
        let embed = state.embed.as_deref().unwrap();
        assert_eq!(embed.matches("<script").count(), 1);
        assert!(embed.contains("data-repo=\"site/comments\""));
        assert_eq!(state.views.map(|v| v.views), Some(1));
    }
}
