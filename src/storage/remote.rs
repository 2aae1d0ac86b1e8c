use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::config::{Backend, ReactionsConfig};
use crate::error::RemoteError;
use crate::models::ArticleId;
use crate::storage::fallback::{
    FailReason, FallbackPlan, IncrementPolicy, Operation, Resolution, Step, StepOutcome,
};
use crate::storage::{CounterAdapter, CounterStore};
use crate::utils::http::create_client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Likes,
    Views,
}

impl Column {
    fn name(self) -> &'static str {
        match self {
            Column::Likes => "likes",
            Column::Views => "views",
        }
    }

    fn pick(self, row: &CounterRow) -> Option<i64> {
        match self {
            Column::Likes => row.likes,
            Column::Views => row.views,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Deserialize)]
struct CounterRow {
    likes: Option<i64>,
    views: Option<i64>,
}

/// Counters stored in a remote table reached over a PostgREST-style HTTP API.
///
/// The table is keyed by `article_id` with integer `likes`/`views` columns.
/// Every operation runs a [`FallbackPlan`] ending in the local store, so a
/// failing remote never reaches the caller. Liked-by-me state stays local.
pub struct RemoteCounterClient {
    client: Client,
    base_url: String,
    table: String,
    increment_rpc: String,
    allow_racy_increment: bool,
    atomic_available: AtomicBool,
    local: CounterStore,
}

impl RemoteCounterClient {
    pub fn new(
        url: &str,
        key: &str,
        config: &ReactionsConfig,
        local: CounterStore,
    ) -> Result<Self, RemoteError> {
        let client = create_client(key, config.request_timeout())?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            table: config.remote_table.clone(),
            increment_rpc: config.remote_increment_rpc.clone(),
            allow_racy_increment: config.allow_racy_increment,
            atomic_available: AtomicBool::new(true),
            local,
        })
    }

    /// False once the server answered the increment RPC with 404.
    pub fn atomic_increment_available(&self) -> bool {
        self.atomic_available.load(Ordering::Relaxed)
    }

    pub fn local(&self) -> &CounterStore {
        &self.local
    }

    fn policy(&self) -> IncrementPolicy {
        IncrementPolicy {
            atomic_available: self.atomic_increment_available(),
            allow_racy: self.allow_racy_increment,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, self.increment_rpc)
    }

    async fn fetch_column(&self, article: &ArticleId, column: Column) -> Result<u64, RemoteError> {
        let filter = format!("eq.{}", article);
        let response = self
            .client
            .get(self.table_url())
            .query(&[("select", column.name()), ("article_id", filter.as_str())])
            .send()
            .await?;
        let response = check_status(response).await?;

        let rows: Vec<CounterRow> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        // No row yet is the normal state of a fresh article.
        let value = rows.first().and_then(|row| column.pick(row)).unwrap_or(0);
        u64::try_from(value)
            .map_err(|_| RemoteError::Decode(format!("negative {} count: {}", column, value)))
    }

    async fn upsert_column(
        &self,
        article: &ArticleId,
        column: Column,
        value: u64,
    ) -> Result<(), RemoteError> {
        let mut row = Map::new();
        row.insert("article_id".to_string(), json!(article.as_str()));
        row.insert(column.name().to_string(), json!(value));

        let response = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "article_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[Value::Object(row)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn rpc_increment(&self, article: &ArticleId) -> Result<u64, RemoteError> {
        let response = self
            .client
            .post(self.rpc_url())
            .json(&json!({ "p_article_id": article.as_str() }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            self.atomic_available.store(false, Ordering::Relaxed);
            warn!(
                "Increment RPC '{}' not found, disabling atomic increments",
                self.increment_rpc
            );
            return Err(RemoteError::RpcUnavailable);
        }

        // Past a 2xx the view is counted; no other increment step may run.
        let response = check_status(response).await?;
        let body = response.text().await.unwrap_or_default();
        let counted = serde_json::from_str::<Value>(&body)
            .ok()
            .as_ref()
            .and_then(parse_count);

        match counted {
            Some(views) => Ok(views),
            None => Ok(self.views_after_increment(article).await),
        }
    }

    /// Current count after an increment whose response carried no count.
    async fn views_after_increment(&self, article: &ArticleId) -> u64 {
        match self.fetch_column(article, Column::Views).await {
            Ok(views) => views,
            Err(e) => {
                warn!("Could not read views of {} after increment: {}", article, e);
                self.local.get_views(article).await + 1
            }
        }
    }

    // Two concurrent callers can read the same base value; one increment is lost.
    async fn read_then_upsert(&self, article: &ArticleId) -> Result<u64, RemoteError> {
        let current = self.fetch_column(article, Column::Views).await?;
        let next = current + 1;
        self.upsert_column(article, Column::Views, next).await?;
        Ok(next)
    }

    fn report<T>(&self, operation: &str, article: &ArticleId, resolution: &Resolution<T>) {
        if !resolution.fell_back() {
            return;
        }
        match resolution.served_by {
            Some(step) if step.is_remote() => {
                info!("{} for {} served by {}", operation, article, step)
            }
            Some(step) => error!(
                "Remote {} failed for {} ({} attempt(s)), served by {}",
                operation,
                article,
                resolution.failures.len(),
                step
            ),
            None => error!("{} failed for {} on every step", operation, article),
        }
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

/// The RPC may answer with a bare integer, a row, or a one-row array.
fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::Array(rows) => rows.first().and_then(parse_count),
        Value::Object(row) => row.get("views").and_then(parse_count),
        _ => None,
    }
}

#[async_trait]
impl CounterAdapter for RemoteCounterClient {
    fn backend(&self) -> Backend {
        Backend::Remote
    }

    async fn get_likes(&self, article: &ArticleId) -> u64 {
        let plan = FallbackPlan::for_operation(Operation::Read, self.policy());
        let resolution = plan
            .run(move |step| async move {
                match step {
                    Step::RemoteRead => {
                        StepOutcome::from(self.fetch_column(article, Column::Likes).await)
                    }
                    Step::LocalStore => StepOutcome::Success(self.local.get_likes(article).await),
                    _ => StepOutcome::Fail(FailReason::Unsupported),
                }
            })
            .await;

        self.report("get likes", article, &resolution);
        if resolution.served_by == Some(Step::RemoteRead) {
            if let Some(likes) = resolution.value {
                self.local.record_likes(article, likes);
            }
        }
        resolution.into_value()
    }

    async fn set_likes(&self, article: &ArticleId, count: u64) {
        let plan = FallbackPlan::for_operation(Operation::Write, self.policy());
        let resolution = plan
            .run(move |step| async move {
                match step {
                    Step::RemoteUpsert => StepOutcome::from(
                        self.upsert_column(article, Column::Likes, count).await,
                    ),
                    Step::LocalStore => {
                        self.local.set_likes(article, count).await;
                        StepOutcome::Success(())
                    }
                    _ => StepOutcome::Fail(FailReason::Unsupported),
                }
            })
            .await;

        if resolution.served_by == Some(Step::RemoteUpsert) {
            self.local.set_likes(article, count).await;
        }
        self.report("set likes", article, &resolution);
    }

    async fn get_views(&self, article: &ArticleId) -> u64 {
        let plan = FallbackPlan::for_operation(Operation::Read, self.policy());
        let resolution = plan
            .run(move |step| async move {
                match step {
                    Step::RemoteRead => {
                        StepOutcome::from(self.fetch_column(article, Column::Views).await)
                    }
                    Step::LocalStore => StepOutcome::Success(self.local.get_views(article).await),
                    _ => StepOutcome::Fail(FailReason::Unsupported),
                }
            })
            .await;

        self.report("get views", article, &resolution);
        if resolution.served_by == Some(Step::RemoteRead) {
            if let Some(views) = resolution.value {
                self.local.record_views(article, views);
            }
        }
        resolution.into_value()
    }

    async fn increment_views(&self, article: &ArticleId) -> u64 {
        let policy = self.policy();
        if !policy.atomic_available && !policy.allow_racy {
            error!(
                "Increment RPC '{}' unavailable and racy increments disabled; counting {} locally",
                self.increment_rpc, article
            );
        }

        let plan = FallbackPlan::for_operation(Operation::Increment, policy);
        let resolution = plan
            .run(move |step| async move {
                match step {
                    Step::RemoteAtomicIncrement => {
                        StepOutcome::from(self.rpc_increment(article).await)
                    }
                    Step::RemoteReadThenUpsert => {
                        StepOutcome::from(self.read_then_upsert(article).await)
                    }
                    Step::LocalStore => {
                        StepOutcome::Success(self.local.increment_views(article).await)
                    }
                    _ => StepOutcome::Fail(FailReason::Unsupported),
                }
            })
            .await;

        self.report("increment views", article, &resolution);
        if let (Some(step), Some(views)) = (resolution.served_by, resolution.value) {
            if step.is_remote() {
                self.local.record_views(article, views);
            }
        }
        resolution.into_value()
    }

    fn has_user_liked(&self, article: &ArticleId) -> bool {
        self.local.has_user_liked(article)
    }

    fn set_user_liked(&self, article: &ArticleId, liked: bool) {
        self.local.set_user_liked(article, liked)
    }
}
