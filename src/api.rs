use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scraper::Html;
use serde_json::json;
use tokio::sync::Mutex;

use crate::blocks::blocks_to_json;
use crate::config::{ServiceConfig, MAX_BLOCKS_PER_REQUEST};
use crate::extract::{ExtractedArticle, Extractor, NotFoundHeuristic, PageCheck};
use crate::fetch::{FetchError, PageFetcher};
use crate::index::{ArticleIndex, IndexEntry};
use crate::models::{
    ExtractRequest, ExtractResponse, PublishRequest, PublishResponse, RenderRequest,
    RenderResponse,
};
use crate::publish::{batches, notion_client, NotionPublisher, PageProperties, PublishError};
use crate::render::BlockRenderer;
use crate::summary::{ArticleMetadata, Summary};

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor>,
    pub renderer: Arc<BlockRenderer>,
    pub page_check: Arc<dyn PageCheck>,
    pub fetcher: PageFetcher,
    pub publisher: Option<NotionPublisher>,
    pub index: ArticleIndex,
    pub index_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> Result<Self, ApiError> {
        let publisher = match config.notion.clone() {
            Some(creds) => Some(NotionPublisher::new(
                notion_client(config.insecure_ssl)?,
                &config.notion_api_base,
                creds,
                &config.title_property,
            )),
            None => None,
        };
        Ok(Self {
            extractor: Arc::new(Extractor::default()),
            renderer: Arc::new(BlockRenderer::default()),
            page_check: Arc::new(NotFoundHeuristic),
            fetcher: PageFetcher::new(config.insecure_ssl)?,
            publisher,
            index: ArticleIndex::new(config.index_path.clone()),
            index_lock: Arc::new(Mutex::new(())),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/extract", post(extract_endpoint))
        .route("/render", post(render_endpoint))
        .route("/publish", post(publish_endpoint))
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("Article not found at {0}")]
    NotFound(String),
    #[error("No article text could be extracted")]
    EmptyArticle,
    #[error("{0}")]
    BadRequest(String),
    #[error("Publishing is not configured")]
    PublishDisabled,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Fetch(FetchError::InvalidUrl(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Fetch(FetchError::NotHtml) | ApiError::EmptyArticle => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Fetch(_) | ApiError::Publish(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PublishDisabled => StatusCode::SERVICE_UNAVAILABLE,
        };
        tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn extract_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let (html, final_url) = match req.html {
        Some(html) => (html, req.url.clone()),
        None => {
            let page = state.fetcher.fetch(&req.url).await?;
            (page.html, page.final_url)
        }
    };

    let article = analyze_page(&state, &html, &req.url, &final_url)?;
    Ok(Json(ExtractResponse {
        markdown: article.markdown,
        title: article.title,
        author: article.author,
        source_url: article.url,
        used_fallback: article.used_fallback,
        is_preview: article.is_preview,
        selector: article.selector,
        block_count: article.block_count,
    }))
}

/// Parse, validate and extract in one synchronous step.
fn analyze_page(
    state: &AppState,
    html: &str,
    url: &str,
    final_url: &str,
) -> Result<ExtractedArticle, ApiError> {
    let document = Html::parse_document(html);
    if state.page_check.is_missing(&document, final_url) {
        return Err(ApiError::NotFound(final_url.to_string()));
    }

    let article = state.extractor.extract_document(&document, url);
    if article.markdown.trim().is_empty() {
        return Err(ApiError::EmptyArticle);
    }
    Ok(article)
}

async fn render_endpoint(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Json<RenderResponse> {
    let summary = req.metadata.as_deref().and_then(Summary::from_llm_output);
    let blocks = state
        .renderer
        .compose_page(&req.markdown, summary.as_ref(), &req.source_url);

    Json(RenderResponse {
        block_count: blocks.len(),
        batches: batches(&blocks, MAX_BLOCKS_PER_REQUEST).len(),
        blocks: blocks_to_json(&blocks),
    })
}

async fn publish_endpoint(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let publisher = state.publisher.as_ref().ok_or(ApiError::PublishDisabled)?;

    if let Some(score) = req.score {
        if !(1..=10).contains(&score) {
            return Err(ApiError::BadRequest(
                "score must be between 1 and 10".to_string(),
            ));
        }
    }

    let raw_metadata = req.metadata.as_deref().unwrap_or("");
    let metadata = ArticleMetadata::parse(raw_metadata).unwrap_or_default();
    let summary = Summary::from_llm_output(raw_metadata);
    let title = metadata.display_title(&req.title);

    let blocks = state
        .renderer
        .compose_page(&req.markdown, summary.as_ref(), &req.source_url);
    let properties = PageProperties {
        title: title.clone(),
        source_url: req.source_url.clone(),
        read_date: chrono::Local::now().date_naive(),
        categories: metadata.categories.clone(),
        score: req.score,
    };

    let page = publisher.create_page(&properties, &blocks).await?;

    let indexed = {
        let _guard = state.index_lock.lock().await;
        state
            .index
            .append(IndexEntry {
                title: title.clone(),
                categories: metadata.categories.clone(),
                url: Some(req.source_url.clone()),
            })
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to update article index");
                false
            })
    };

    Ok(Json(PublishResponse {
        page_id: page.page_id,
        url: page.url,
        title,
        categories: metadata.categories,
        block_count: page.block_count,
        append_calls: page.append_calls,
        indexed,
    }))
}
