use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("URL did not return HTML")]
    NotHtml,
    #[error("Upstream returned HTTP {0}")]
    Upstream(u16),
    #[error("{0}")]
    Request(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        let what = if e.is_timeout() {
            "timed out"
        } else if e.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        FetchError::Request(format!("Article {}: {}", what, e))
    }
}

/// Connect and request timeouts every outbound client uses, article pages
/// and the Notion API alike.
pub fn client_builder(insecure: bool) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(insecure)
}

/// Serialized page as the server delivered it.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed =
        Url::parse(url).map_err(|_| FetchError::InvalidUrl("Invalid URL".to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(
            "Only http(s) URLs are allowed".to_string(),
        )),
    }
}

/// Plain HTTP fetcher for article pages that render without a browser
/// session. One instance is shared by every request.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(insecure: bool) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = client_builder(insecure)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let url = validate_url(url)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream(status.as_u16()));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
        if !is_html {
            return Err(FetchError::NotHtml);
        }

        let final_url = response.url().to_string();
        let html = response.text().await?;

        tracing::debug!(url = %final_url, bytes = html.len(), "article page fetched");
        Ok(FetchedPage { final_url, html })
    }
}
