use crate::feed::parser::{parse_entries, FeedEntry};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Fixed timeout for a single feed fetch. The external scheduler expects a
/// run to finish promptly; a slow source is skipped, not waited on.
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Response body cap for a feed document.
const MAX_FEED_SIZE: usize = 4 * 1024 * 1024; // 4MB

/// How many most-recent entries to take from each source per run.
pub const PER_SOURCE_CAP: usize = 10;

/// Errors that can occur while fetching one source's feed.
///
/// All of these are source-level: the pipeline logs them and moves on to
/// the next source. There is deliberately no retry here.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the fetch timeout
    #[error("Request timed out after {}s", FETCH_TIMEOUT.as_secs())]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Fetches one source's feed and returns up to [`PER_SOURCE_CAP`] of its
/// most recent entries.
pub async fn fetch_entries(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<FeedEntry>, FetchError> {
    let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

    let mut entries = parse_entries(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    entries.truncate(PER_SOURCE_CAP);
    Ok(entries)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss_with_items(count: usize) -> String {
        let items: String = (0..count)
            .map(|i| {
                format!(
                    "<item><link>https://example.com/{i}</link><title>Story {i}</title></item>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>News</title>{items}</channel></rss>"#
        )
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rss_with_items(3))
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_entries(&client, &format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/0"));
    }

    #[tokio::test]
    async fn test_fetch_caps_entries_per_source() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with_items(25)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_entries(&client, &format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(entries.len(), PER_SOURCE_CAP);
        // The cap keeps the first (most recent) entries
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/0"));
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_entries(&client, &format!("{}/feed", mock_server.uri())).await;
        match result.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_server_error_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1) // exactly one request: no retries
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_entries(&client, &format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_malformed_feed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_entries(&client, &format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_fetch_oversized_response_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("x".repeat(MAX_FEED_SIZE + 1)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_entries(&client, &format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_fetch_empty_feed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with_items(0)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let entries = fetch_entries(&client, &format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
