use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::error;

use crate::config::Backend;
use crate::error::StorageResult;
use crate::models::ArticleId;
use crate::storage::sqlite::{from_sql_count, to_sql_count};
use crate::storage::{CounterAdapter, Database};

#[derive(Debug, Clone, Copy)]
enum CounterTable {
    Likes,
    Views,
}

impl CounterTable {
    fn select_sql(self) -> &'static str {
        match self {
            CounterTable::Likes => "SELECT likes FROM article_likes WHERE article_id = ?1",
            CounterTable::Views => "SELECT views FROM article_views WHERE article_id = ?1",
        }
    }

    fn upsert_sql(self) -> &'static str {
        match self {
            CounterTable::Likes => {
                "INSERT INTO article_likes (article_id, likes) VALUES (?1, ?2)
                 ON CONFLICT(article_id) DO UPDATE SET likes = excluded.likes"
            }
            CounterTable::Views => {
                "INSERT INTO article_views (article_id, views) VALUES (?1, ?2)
                 ON CONFLICT(article_id) DO UPDATE SET views = excluded.views"
            }
        }
    }
}

/// Counters kept in the local profile database.
///
/// Every failure of the medium is logged and absorbed: reads fall back to
/// zero/false and writes are dropped, so callers never see an error.
#[derive(Clone)]
pub struct CounterStore {
    db: Database,
}

impl CounterStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Overwrite the cached like count with a value learned elsewhere.
    pub fn record_likes(&self, article: &ArticleId, likes: u64) {
        if let Err(e) = self.write_count(CounterTable::Likes, article, likes) {
            error!("Error caching likes for {}: {}", article, e);
        }
    }

    /// Overwrite the cached view count with a value learned elsewhere.
    pub fn record_views(&self, article: &ArticleId, views: u64) {
        if let Err(e) = self.write_count(CounterTable::Views, article, views) {
            error!("Error caching views for {}: {}", article, e);
        }
    }

    fn read_count(&self, table: CounterTable, article: &ArticleId) -> StorageResult<u64> {
        let stored: Option<i64> = self.db.with_conn(|conn| {
            conn.query_row(table.select_sql(), params![article.as_str()], |row| row.get(0))
                .optional()
        })?;

        match stored {
            Some(value) => from_sql_count(value),
            None => Ok(0),
        }
    }

    fn write_count(
        &self,
        table: CounterTable,
        article: &ArticleId,
        count: u64,
    ) -> StorageResult<()> {
        let count = to_sql_count(count)?;
        self.db.with_conn(|conn| {
            conn.execute(table.upsert_sql(), params![article.as_str(), count])
                .map(|_| ())
        })
    }

    fn bump_views(&self, article: &ArticleId) -> StorageResult<u64> {
        let views: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "INSERT INTO article_views (article_id, views) VALUES (?1, 1)
                 ON CONFLICT(article_id) DO UPDATE SET views = views + 1
                 RETURNING views",
                params![article.as_str()],
                |row| row.get(0),
            )
        })?;
        from_sql_count(views)
    }

    fn read_liked(&self, article: &ArticleId) -> StorageResult<bool> {
        let found: Option<i64> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM user_liked WHERE article_id = ?1",
                params![article.as_str()],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(found.is_some())
    }

    fn write_liked(&self, article: &ArticleId, liked: bool) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            if liked {
                conn.execute(
                    "INSERT OR IGNORE INTO user_liked (article_id, liked_at) VALUES (?1, ?2)",
                    params![article.as_str(), Utc::now().timestamp()],
                )?;
            } else {
                conn.execute(
                    "DELETE FROM user_liked WHERE article_id = ?1",
                    params![article.as_str()],
                )?;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl CounterAdapter for CounterStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn get_likes(&self, article: &ArticleId) -> u64 {
        self.read_count(CounterTable::Likes, article).unwrap_or_else(|e| {
            error!("Error reading likes for {}: {}", article, e);
            0
        })
    }

    async fn set_likes(&self, article: &ArticleId, count: u64) {
        if let Err(e) = self.write_count(CounterTable::Likes, article, count) {
            error!("Error saving likes for {}: {}", article, e);
        }
    }

    async fn get_views(&self, article: &ArticleId) -> u64 {
        self.read_count(CounterTable::Views, article).unwrap_or_else(|e| {
            error!("Error reading views for {}: {}", article, e);
            0
        })
    }

    async fn increment_views(&self, article: &ArticleId) -> u64 {
        self.bump_views(article).unwrap_or_else(|e| {
            error!("Error incrementing views for {}: {}", article, e);
            0
        })
    }

    fn has_user_liked(&self, article: &ArticleId) -> bool {
        self.read_liked(article).unwrap_or_else(|e| {
            error!("Error reading liked status for {}: {}", article, e);
            false
        })
    }

    fn set_user_liked(&self, article: &ArticleId, liked: bool) {
        if let Err(e) = self.write_liked(article, liked) {
            error!("Error saving liked status for {}: {}", article, e);
        }
    }
}
