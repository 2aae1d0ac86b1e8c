pub mod article;
pub mod counts;

pub use article::*;
pub use counts::*;

/// Identifier used when the page path is empty or the site root.
pub const ROOT_ARTICLE_ID: &str = "/";
