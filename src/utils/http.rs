use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Build the client used for the remote counter table.
///
/// The key travels on every request both as `apikey` and as a bearer token.
pub fn create_client(api_key: &str, timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    // Header values reject control characters; such a key simply is not sent.
    if let Ok(value) = HeaderValue::from_str(api_key) {
        headers.insert("apikey", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
        headers.insert(AUTHORIZATION, value);
    }

    ClientBuilder::new()
        .user_agent(concat!("article-reactions/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .timeout(timeout)
        .pool_max_idle_per_host(2)
        .build()
}
