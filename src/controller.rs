use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::models::{format_count, ArticleId, LikeState};
use crate::storage::CounterAdapter;

/// What the like button and counter should show after a load or toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeDisplay {
    pub count: u64,
    pub text: String,
    pub liked: bool,
    pub aria_pressed: &'static str,
    /// Play the transient pulse; only set on a transition into `Liked`.
    pub pulse: bool,
}

/// Like toggle state machine for one article.
///
/// The like count is read once on load and then mutated locally on each
/// toggle, so it can drift from a concurrently updated remote count until
/// the next page load.
pub struct ReactionsController {
    article: ArticleId,
    adapter: Arc<dyn CounterAdapter>,
    state: LikeState,
    cached_likes: u64,
}

impl ReactionsController {
    pub async fn load(article: ArticleId, adapter: Arc<dyn CounterAdapter>) -> Self {
        let cached_likes = adapter.get_likes(&article).await;
        let state = LikeState::from_liked(adapter.has_user_liked(&article));

        Self {
            article,
            adapter,
            state,
            cached_likes,
        }
    }

    pub fn article(&self) -> &ArticleId {
        &self.article
    }

    pub fn state(&self) -> LikeState {
        self.state
    }

    pub fn likes(&self) -> u64 {
        self.cached_likes
    }

    pub fn display(&self) -> LikeDisplay {
        self.render(false)
    }

    /// Flip between `NotLiked` and `Liked`, persisting the new count and
    /// the user's liked flag.
    pub async fn toggle(&mut self) -> LikeDisplay {
        let previous = self.state;
        let count = previous.next_count(self.cached_likes);
        let next = previous.toggled();

        self.adapter.set_likes(&self.article, count).await;
        self.adapter.set_user_liked(&self.article, next.is_liked());

        self.cached_likes = count;
        self.state = next;
        info!("{} is now {} ({} likes)", self.article, next, count);

        self.render(next.is_liked())
    }

    fn render(&self, pulse: bool) -> LikeDisplay {
        let liked = self.state.is_liked();
        LikeDisplay {
            count: self.cached_likes,
            text: format_count(self.cached_likes),
            liked,
            aria_pressed: if liked { "true" } else { "false" },
            pulse,
        }
    }
}
