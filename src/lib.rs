//! Article extraction and Notion block rendering.
//!
//! `extract` turns a rendered article page into a portable markdown
//! document, `render` turns that markdown (plus an optional summary) into
//! Notion blocks and `publish` sends them to a database.

pub mod api;
pub mod blocks;
pub mod config;
pub mod document;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod inline;
pub mod models;
pub mod publish;
pub mod render;
pub mod summary;

pub use blocks::RenderedBlock;
pub use document::{BlockKind, ContentBlock, Document};
pub use extract::{ExtractedArticle, Extraction, Extractor};
pub use render::BlockRenderer;
pub use summary::{ArticleMetadata, Summary};
