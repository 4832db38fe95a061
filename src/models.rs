use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
    /// Already-rendered page markup; when absent the URL is fetched.
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub markdown: String,
    pub title: String,
    pub author: Option<String>,
    pub source_url: String,
    pub used_fallback: bool,
    pub is_preview: bool,
    pub selector: Option<String>,
    pub block_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub markdown: String,
    pub source_url: String,
    /// Raw reply of the metadata step, JSON or free text.
    #[serde(default)]
    pub metadata: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub blocks: Vec<Value>,
    pub block_count: usize,
    pub batches: usize,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub title: String,
    pub source_url: String,
    pub markdown: String,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub score: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub page_id: String,
    pub url: String,
    pub title: String,
    pub categories: Vec<String>,
    pub block_count: usize,
    pub append_calls: usize,
    pub indexed: bool,
}
