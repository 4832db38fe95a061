//! Destination block schema (Notion) and its JSON encoding.

use serde_json::{json, Map, Value};

use crate::inline::{InlineSpan, SpanStyle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedBlock {
    Heading {
        level: u8,
        rich_text: Vec<InlineSpan>,
    },
    Paragraph {
        rich_text: Vec<InlineSpan>,
    },
    Code {
        language: String,
        text: String,
    },
    Quote {
        rich_text: Vec<InlineSpan>,
    },
    BulletedListItem {
        rich_text: Vec<InlineSpan>,
    },
    /// `number` is the one written in the source; the destination renumbers.
    NumberedListItem {
        number: u32,
        rich_text: Vec<InlineSpan>,
    },
    Callout {
        emoji: String,
        rich_text: Vec<InlineSpan>,
    },
    TableOfContents,
    Divider,
    Bookmark {
        url: String,
    },
}

impl RenderedBlock {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        RenderedBlock::Heading {
            level: level.clamp(1, 3),
            rich_text: vec![InlineSpan::plain(text)],
        }
    }

    pub fn callout(emoji: &str, text: impl Into<String>) -> Self {
        RenderedBlock::Callout {
            emoji: emoji.to_string(),
            rich_text: vec![InlineSpan::plain(text)],
        }
    }

    /// Notion type name, e.g. `heading_2` or `bulleted_list_item`.
    pub fn type_name(&self) -> String {
        match self {
            RenderedBlock::Heading { level, .. } => format!("heading_{}", level),
            RenderedBlock::Paragraph { .. } => "paragraph".to_string(),
            RenderedBlock::Code { .. } => "code".to_string(),
            RenderedBlock::Quote { .. } => "quote".to_string(),
            RenderedBlock::BulletedListItem { .. } => "bulleted_list_item".to_string(),
            RenderedBlock::NumberedListItem { .. } => "numbered_list_item".to_string(),
            RenderedBlock::Callout { .. } => "callout".to_string(),
            RenderedBlock::TableOfContents => "table_of_contents".to_string(),
            RenderedBlock::Divider => "divider".to_string(),
            RenderedBlock::Bookmark { .. } => "bookmark".to_string(),
        }
    }

    /// Every text payload the block carries, for length checks.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            RenderedBlock::Heading { rich_text, .. }
            | RenderedBlock::Paragraph { rich_text }
            | RenderedBlock::Quote { rich_text }
            | RenderedBlock::BulletedListItem { rich_text }
            | RenderedBlock::NumberedListItem { rich_text, .. }
            | RenderedBlock::Callout { rich_text, .. } => {
                rich_text.iter().map(|s| s.text.as_str()).collect()
            }
            RenderedBlock::Code { text, .. } => vec![text.as_str()],
            RenderedBlock::TableOfContents | RenderedBlock::Divider => Vec::new(),
            RenderedBlock::Bookmark { url } => vec![url.as_str()],
        }
    }

    pub fn to_json(&self) -> Value {
        let type_name = self.type_name();
        let body = match self {
            RenderedBlock::Heading { rich_text, .. }
            | RenderedBlock::Paragraph { rich_text }
            | RenderedBlock::Quote { rich_text }
            | RenderedBlock::BulletedListItem { rich_text }
            | RenderedBlock::NumberedListItem { rich_text, .. } => {
                json!({ "rich_text": rich_text_json(rich_text) })
            }
            RenderedBlock::Code { language, text } => json!({
                "rich_text": [text_object(text, &SpanStyle::Plain)],
                "language": language,
            }),
            RenderedBlock::Callout { emoji, rich_text } => json!({
                "icon": { "type": "emoji", "emoji": emoji },
                "rich_text": rich_text_json(rich_text),
            }),
            RenderedBlock::TableOfContents => json!({ "color": "gray" }),
            RenderedBlock::Divider => json!({}),
            RenderedBlock::Bookmark { url } => json!({ "url": url }),
        };

        let mut block = Map::new();
        block.insert("object".to_string(), json!("block"));
        block.insert("type".to_string(), json!(type_name));
        block.insert(type_name, body);
        Value::Object(block)
    }
}

pub fn blocks_to_json(blocks: &[RenderedBlock]) -> Vec<Value> {
    blocks.iter().map(RenderedBlock::to_json).collect()
}

fn rich_text_json(spans: &[InlineSpan]) -> Vec<Value> {
    spans.iter().map(|s| text_object(&s.text, &s.style)).collect()
}

fn text_object(content: &str, style: &SpanStyle) -> Value {
    let mut text = json!({ "content": content });
    let annotation = match style {
        SpanStyle::Plain => None,
        SpanStyle::Bold => Some("bold"),
        SpanStyle::Italic => Some("italic"),
        SpanStyle::Code => Some("code"),
        SpanStyle::Link(href) => {
            text["link"] = json!({ "url": href });
            None
        }
    };

    let mut obj = json!({ "type": "text", "text": text });
    if let Some(name) = annotation {
        let mut annotations = Map::new();
        annotations.insert(name.to_string(), Value::Bool(true));
        obj["annotations"] = Value::Object(annotations);
    }
    obj
}
