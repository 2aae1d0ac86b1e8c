use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::models::{ArticleId, ViewOutcome};
use crate::storage::{CounterAdapter, Database};

/// Explicit session boundary for view deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ensures at most one view increment per article per session.
///
/// Seen-markers live in the `session_views` table and expire after the
/// session TTL. An in-process copy keeps the guarantee when the table is
/// unusable, and its lock serializes check-then-increment per tracker.
pub struct SessionViewTracker {
    db: Database,
    session: SessionId,
    ttl: Duration,
    seen: Mutex<HashMap<ArticleId, DateTime<Utc>>>,
}

impl SessionViewTracker {
    pub fn new(db: Database, session: SessionId, ttl: Duration) -> Self {
        let tracker = Self {
            db,
            session,
            ttl,
            seen: Mutex::new(HashMap::new()),
        };
        tracker.prune_expired();
        tracker
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Drop markers older than the TTL, across all sessions.
    pub fn prune_expired(&self) -> usize {
        let cutoff = (Utc::now() - self.ttl).timestamp();
        match self.db.with_conn(|conn| {
            conn.execute("DELETE FROM session_views WHERE seen_at <= ?1", params![cutoff])
        }) {
            Ok(removed) => {
                if removed > 0 {
                    info!("Pruned {} expired session view markers", removed);
                }
                removed
            }
            Err(e) => {
                warn!("Could not prune session view markers: {}", e);
                0
            }
        }
    }

    pub async fn has_seen(&self, article: &ArticleId) -> bool {
        let seen = self.seen.lock().await;
        self.is_seen(&seen, article, Utc::now())
    }

    /// Count a view unless this session already did.
    pub async fn track_view(
        &self,
        article: &ArticleId,
        adapter: &dyn CounterAdapter,
    ) -> ViewOutcome {
        let mut seen = self.seen.lock().await;
        let now = Utc::now();

        if self.is_seen(&seen, article, now) {
            drop(seen);
            debug!("View of {} already counted in session {}", article, self.session);
            return ViewOutcome {
                incremented: false,
                views: adapter.get_views(article).await,
            };
        }

        let views = adapter.increment_views(article).await;
        seen.insert(article.clone(), now);
        if let Err(e) = self.persist_seen(article, now) {
            warn!("Could not persist session view marker for {}: {}", article, e);
        }

        ViewOutcome {
            incremented: true,
            views,
        }
    }

    fn is_seen(
        &self,
        seen: &HashMap<ArticleId, DateTime<Utc>>,
        article: &ArticleId,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(at) = seen.get(article) {
            if now - *at < self.ttl {
                return true;
            }
        }

        self.persisted_seen(article, now).unwrap_or_else(|e| {
            warn!("Could not read session view marker for {}: {}", article, e);
            false
        })
    }

    fn persisted_seen(&self, article: &ArticleId, now: DateTime<Utc>) -> StorageResult<bool> {
        let cutoff = (now - self.ttl).timestamp();
        let found: Option<i64> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM session_views
                 WHERE session_id = ?1 AND article_id = ?2 AND seen_at > ?3",
                params![self.session.as_str(), article.as_str(), cutoff],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(found.is_some())
    }

    fn persist_seen(&self, article: &ArticleId, now: DateTime<Utc>) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session_views (session_id, article_id, seen_at)
                 VALUES (?1, ?2, ?3)",
                params![self.session.as_str(), article.as_str(), now.timestamp()],
            )
            .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CounterStore;
    use pretty_assertions::assert_eq;

    fn database() -> Database {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[tokio::test]
    async fn second_view_in_session_is_not_counted() {
        let db = database();
        let store = CounterStore::new(db.clone());
        let tracker = SessionViewTracker::new(db, SessionId::new("tab-1"), Duration::minutes(30));
        let article = ArticleId::from_path("/blog/post-1/");

        let first = tracker.track_view(&article, &store).await;
        let second = tracker.track_view(&article, &store).await;

        assert_eq!(first, ViewOutcome { incremented: true, views: 1 });
        assert_eq!(second, ViewOutcome { incremented: false, views: 1 });
        assert_eq!(store.get_views(&article).await, 1);
    }

    #[tokio::test]
    async fn path_forms_share_one_marker() {
        let db = database();
        let store = CounterStore::new(db.clone());
        let tracker = SessionViewTracker::new(db, SessionId::new("tab-1"), Duration::minutes(30));

        tracker.track_view(&ArticleId::from_path("/blog/post-1/"), &store).await;
        let again = tracker.track_view(&ArticleId::from_path("/blog/post-1"), &store).await;
        assert!(!again.incremented);
    }

    #[tokio::test]
    async fn markers_survive_a_new_tracker_for_same_session() {
        let db = database();
        let store = CounterStore::new(db.clone());
        let article = ArticleId::from_path("/reload");

        let ttl = Duration::minutes(30);
        let before = SessionViewTracker::new(db.clone(), SessionId::new("tab-1"), ttl);
        before.track_view(&article, &store).await;

        let after = SessionViewTracker::new(db.clone(), SessionId::new("tab-1"), ttl);
        assert!(after.has_seen(&article).await);
        assert!(!after.track_view(&article, &store).await.incremented);

        let other = SessionViewTracker::new(db, SessionId::new("tab-2"), Duration::minutes(30));
        assert!(other.track_view(&article, &store).await.incremented);
        assert_eq!(store.get_views(&article).await, 2);
    }

    #[tokio::test]
    async fn expired_markers_count_again() {
        let db = database();
        let store = CounterStore::new(db.clone());
        let tracker = SessionViewTracker::new(db, SessionId::new("tab-1"), Duration::zero());
        let article = ArticleId::from_path("/ttl");

        assert!(tracker.track_view(&article, &store).await.incremented);
        assert!(tracker.track_view(&article, &store).await.incremented);
        assert_eq!(store.get_views(&article).await, 2);
    }

    #[tokio::test]
    async fn broken_medium_still_dedupes_in_process() {
        // Unmigrated database: session table missing.
        let db = Database::in_memory().unwrap();
        let counters = database();
        let store = CounterStore::new(counters);
        let tracker = SessionViewTracker::new(db, SessionId::generate(), Duration::minutes(30));
        let article = ArticleId::from_path("/flaky");

        assert!(tracker.track_view(&article, &store).await.incremented);
        assert!(!tracker.track_view(&article, &store).await.incremented);
        assert_eq!(store.get_views(&article).await, 1);
    }

    #[tokio::test]
    async fn prune_removes_only_expired_markers() {
        let db = database();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_views (session_id, article_id, seen_at)
                 VALUES ('old', '/a', 0)",
                [],
            )
        })
        .unwrap();

        let store = CounterStore::new(db.clone());
        let tracker = SessionViewTracker::new(db, SessionId::new("new"), Duration::minutes(30));
        tracker.track_view(&ArticleId::from_path("/b"), &store).await;

        assert_eq!(tracker.prune_expired(), 0);
        assert!(tracker.has_seen(&ArticleId::from_path("/b")).await);
    }
}
