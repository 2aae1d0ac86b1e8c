use async_trait::async_trait;

use crate::config::Backend;
use crate::models::ArticleId;

pub mod delegated;
pub mod fallback;
mod local;
mod remote;
mod sqlite;

pub use delegated::{DelegatedWidget, EmbedScript, WidgetMount};
pub use local::CounterStore;
pub use remote::RemoteCounterClient;
pub use sqlite::Database;

/// Uniform counter contract shared by every backend.
///
/// Operations never fail from the caller's point of view: each backend
/// recovers from its own persistence failures and returns defaults.
#[async_trait]
pub trait CounterAdapter: Send + Sync {
    fn backend(&self) -> Backend;

    async fn get_likes(&self, article: &ArticleId) -> u64;
    async fn set_likes(&self, article: &ArticleId, count: u64);
    async fn get_views(&self, article: &ArticleId) -> u64;
    /// Add one view and return the new total.
    async fn increment_views(&self, article: &ArticleId) -> u64;

    /// Whether the current user liked the article. Always answered locally.
    fn has_user_liked(&self, article: &ArticleId) -> bool;
    fn set_user_liked(&self, article: &ArticleId, liked: bool);

    fn as_widget(&self) -> Option<&DelegatedWidget> {
        None
    }
}
