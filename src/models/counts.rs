use serde::{Deserialize, Serialize};
use std::fmt;

/// Format a counter for display (e.g., 1000 -> 1k, 1500 -> 1.5k, 2000000 -> 2M)
///
/// One decimal, ties rounded up, trailing `.0` dropped.
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        return format!("{}M", tenths(count, 1_000_000));
    }
    if count >= 1_000 {
        return format!("{}k", tenths(count, 1_000));
    }
    count.to_string()
}

fn tenths(count: u64, unit: u64) -> String {
    let step = unit / 10;
    let rounded = count.saturating_add(step / 2) / step;
    match rounded % 10 {
        0 => (rounded / 10).to_string(),
        digit => format!("{}.{}", rounded / 10, digit),
    }
}

/// Like state of one article for the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LikeState {
    NotLiked,
    Liked,
}

impl LikeState {
    pub fn from_liked(liked: bool) -> Self {
        if liked {
            LikeState::Liked
        } else {
            LikeState::NotLiked
        }
    }

    pub fn is_liked(self) -> bool {
        self == LikeState::Liked
    }

    pub fn toggled(self) -> Self {
        match self {
            LikeState::NotLiked => LikeState::Liked,
            LikeState::Liked => LikeState::NotLiked,
        }
    }

    /// Count after leaving this state; unliking never goes below zero.
    pub fn next_count(self, cached: u64) -> u64 {
        match self {
            LikeState::NotLiked => cached + 1,
            LikeState::Liked => cached.saturating_sub(1),
        }
    }
}

impl fmt::Display for LikeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LikeState::NotLiked => write!(f, "not liked"),
            LikeState::Liked => write!(f, "liked"),
        }
    }
}

/// Result of a view-tracking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOutcome {
    pub incremented: bool,
    pub views: u64,
}
