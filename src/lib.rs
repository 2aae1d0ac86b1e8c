//! Article view and like counters with pluggable storage backends.
//!
//! A page load selects one [`storage::CounterAdapter`] (local store, remote
//! table, or delegated discussion widget), counts at most one view per
//! session, and drives the like toggle through [`ReactionsController`].

pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod page;
pub mod selector;
pub mod session;
pub mod storage;
pub mod utils;

pub use config::{Backend, ReactionsConfig};
pub use controller::{LikeDisplay, ReactionsController};
pub use error::{RemoteError, StorageError};
pub use models::{format_count, ArticleId, LikeState, ViewOutcome};
pub use page::{PageMounts, PageState, Reactions};
pub use selector::select_adapter;
pub use session::{SessionId, SessionViewTracker};
