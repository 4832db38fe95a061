use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::blocks::{blocks_to_json, RenderedBlock};
use crate::config::{NotionCredentials, MAX_BLOCKS_PER_REQUEST};
use crate::fetch::client_builder;

const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Notion request failed: {0}")]
    Request(String),
    #[error("Notion API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Notion response had no page id")]
    MissingPageId,
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Request(e.to_string())
    }
}

// ── Batching ─────────────────────────────────────────────────────────────────

/// Consecutive request-sized slices of `blocks`, in order.
pub fn batches(blocks: &[RenderedBlock], size: usize) -> std::slice::Chunks<'_, RenderedBlock> {
    blocks.chunks(size.max(1))
}

// ── Page properties ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProperties {
    pub title: String,
    pub source_url: String,
    pub read_date: NaiveDate,
    pub categories: Vec<String>,
    pub score: Option<u8>,
}

impl PageProperties {
    pub fn to_json(&self, title_property: &str) -> Value {
        let mut props = json!({
            "URL": { "url": self.source_url },
            "read date": { "date": { "start": self.read_date.format("%Y-%m-%d").to_string() } },
        });
        props[title_property] = json!({
            "title": [{ "type": "text", "text": { "content": self.title } }]
        });

        if !self.categories.is_empty() {
            props["Categories"] = json!({
                "multi_select": self
                    .categories
                    .iter()
                    .map(|name| json!({ "name": name }))
                    .collect::<Vec<_>>()
            });
        }
        if let Some(score) = self.score {
            props["Score"] = json!({ "number": score });
        }
        props
    }
}

// ── Notion client ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublishedPage {
    pub page_id: String,
    pub url: String,
    pub block_count: usize,
    pub append_calls: usize,
}

#[derive(Debug, Clone)]
pub struct NotionPublisher {
    client: reqwest::Client,
    api_base: String,
    credentials: NotionCredentials,
    title_property: String,
}

/// HTTP client for the Notion API, with the shared outbound timeouts.
pub fn notion_client(insecure: bool) -> Result<reqwest::Client, PublishError> {
    Ok(client_builder(insecure).build()?)
}

impl NotionPublisher {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        credentials: NotionCredentials,
        title_property: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
            title_property: title_property.into(),
        }
    }

    /// Title of the target database; fails when the integration lacks access.
    pub async fn check_access(&self) -> Result<String, PublishError> {
        let url = format!(
            "{}/v1/databases/{}",
            self.api_base,
            self.credentials.database_id()
        );
        let body = self.send(self.client.get(url)).await?;
        let title = body["title"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|t| t["plain_text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        info!(database = %title, "connected to Notion database");
        Ok(title)
    }

    /// Create the page with the first batch of blocks and append the rest
    /// in order.
    pub async fn create_page(
        &self,
        properties: &PageProperties,
        blocks: &[RenderedBlock],
    ) -> Result<PublishedPage, PublishError> {
        let mut chunks = batches(blocks, MAX_BLOCKS_PER_REQUEST);
        let first = chunks.next().unwrap_or(&[]);

        let payload = json!({
            "parent": { "database_id": self.credentials.database_id() },
            "properties": properties.to_json(&self.title_property),
            "children": blocks_to_json(first),
        });
        let created = self
            .send(
                self.client
                    .post(format!("{}/v1/pages", self.api_base))
                    .json(&payload),
            )
            .await?;

        let page_id = created["id"]
            .as_str()
            .ok_or(PublishError::MissingPageId)?
            .to_string();
        let url = created["url"].as_str().unwrap_or_default().to_string();

        let remaining = blocks.len() - first.len();
        if remaining > 0 {
            info!(total = blocks.len(), remaining, "appending remaining blocks");
        }

        let mut append_calls = 0;
        for chunk in chunks {
            self.append_children(&page_id, chunk).await?;
            append_calls += 1;
        }

        info!(page_id = %page_id, url = %url, "Notion page created");
        Ok(PublishedPage {
            page_id,
            url,
            block_count: blocks.len(),
            append_calls,
        })
    }

    async fn append_children(
        &self,
        block_id: &str,
        children: &[RenderedBlock],
    ) -> Result<(), PublishError> {
        let payload = json!({ "children": blocks_to_json(children) });
        self.send(
            self.client
                .patch(format!("{}/v1/blocks/{}/children", self.api_base, block_id))
                .json(&payload),
        )
        .await?;
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, PublishError> {
        let response = request
            .bearer_auth(self.credentials.api_key())
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["message"]
                .as_str()
                .unwrap_or("no error message")
                .to_string();
            warn!(status = status.as_u16(), message = %message, "Notion API error");
            return Err(PublishError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}
