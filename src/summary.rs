use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::blocks::RenderedBlock;
use crate::inline::InlineSpan;
use crate::render::{split_text, truncate_utf16};

static JSON_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*\n(.*?)```").unwrap());

const FALLBACK_EMOJI: &str = "📝";

/// Four-part summary returned by the metadata collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSummary {
    #[serde(default, deserialize_with = "lenient_text")]
    pub overview: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub learnings: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub use_cases: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub connections: String,
}

impl StructuredSummary {
    /// Sections in display order with their marker and heading label.
    pub fn sections(&self) -> [(&'static str, &'static str, &str); 4] {
        [
            ("📖", "Overview", self.overview.as_str()),
            ("💡", "Learnings", self.learnings.as_str()),
            ("🛠", "Use cases", self.use_cases.as_str()),
            ("🔗", "Connections", self.connections.as_str()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.sections().iter().all(|(_, _, body)| body.trim().is_empty())
    }

    /// Plain-text rendering: `"{emoji} {label}\n{body}"` per non-empty section.
    pub fn to_text(&self) -> String {
        self.sections()
            .iter()
            .filter(|(_, _, body)| !body.trim().is_empty())
            .map(|(emoji, label, body)| format!("{} {}\n{}", emoji, label, body.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    Structured(StructuredSummary),
    Text(String),
}

impl Summary {
    /// Summary from raw collaborator output. Output that does not parse as
    /// metadata JSON is kept verbatim as text.
    pub fn from_llm_output(raw: &str) -> Option<Summary> {
        if let Some(meta) = ArticleMetadata::parse(raw) {
            return meta.summary.filter(|s| !s.is_empty());
        }
        let raw = raw.trim();
        (!raw.is_empty()).then(|| Summary::Text(raw.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Summary::Structured(s) => s.is_empty(),
            Summary::Text(t) => t.trim().is_empty(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Summary::Structured(s) => s.to_text(),
            Summary::Text(t) => t.trim().to_string(),
        }
    }
}

/// Title, categories and summary extracted from the collaborator's reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    #[serde(default, alias = "japanese_title", deserialize_with = "lenient_title")]
    pub translated_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "lenient_summary")]
    pub summary: Option<Summary>,
}

impl ArticleMetadata {
    /// Parse the first JSON object in `raw`: a ```json fence if present,
    /// otherwise the first balanced `{…}`.
    pub fn parse(raw: &str) -> Option<ArticleMetadata> {
        let json = extract_json(raw)?;
        match serde_json::from_str(json) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(error = %e, "metadata JSON did not match the expected shape");
                None
            }
        }
    }

    /// `"{translated} | {original}"`, or the original when there is no
    /// distinct translation.
    pub fn display_title(&self, original: &str) -> String {
        match self.translated_title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() && t != original => format!("{} | {}", t, original),
            _ => original.to_string(),
        }
    }
}

// ── Lenient field readers ────────────────────────────────────────────────────
//
// The collaborator's JSON drifts in shape; a field of the wrong type degrades
// that field only.

fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(value_text(&Value::deserialize(de)?))
}

fn lenient_title<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let title = value_text(&Value::deserialize(de)?);
    Ok((!title.trim().is_empty()).then_some(title))
}

fn lenient_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let items = match Value::deserialize(de)? {
        Value::Array(items) => items.iter().map(value_text).collect(),
        other => vec![value_text(&other)],
    };
    Ok(items.into_iter().filter(|s| !s.trim().is_empty()).collect())
}

fn lenient_summary<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Summary>, D::Error> {
    let summary = match Value::deserialize(de)? {
        Value::Null => None,
        Value::Object(map) => {
            let value = Value::Object(map);
            match serde_json::from_value::<StructuredSummary>(value.clone()) {
                Ok(structured) => Some(Summary::Structured(structured)),
                Err(_) => Some(Summary::Text(value.to_string())),
            }
        }
        other => Some(Summary::Text(value_text(&other))),
    };
    Ok(summary)
}

/// Strings pass through, lists become one item per line, null is empty.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Locate a JSON object inside free-form text.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(caps) = JSON_FENCE_RE.captures(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if serde_json::from_str::<serde_json::Value>(body).is_ok() {
            return Some(body);
        }
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str::<serde_json::Value>(candidate)
                        .is_ok()
                        .then_some(candidate);
                }
            }
            _ => {}
        }
    }
    None
}

/// Heading + callout per non-empty section, in fixed order. A summary with
/// no usable section becomes one generic callout, truncated to `max_len`.
pub fn render_summary(summary: &Summary, max_len: usize) -> Vec<RenderedBlock> {
    let mut blocks = Vec::new();

    if let Summary::Structured(structured) = summary {
        for (emoji, label, body) in structured.sections() {
            let body = body.trim();
            if body.is_empty() {
                continue;
            }
            blocks.push(RenderedBlock::heading(3, format!("{} {}", emoji, label)));
            blocks.push(RenderedBlock::Callout {
                emoji: emoji.to_string(),
                rich_text: split_text(body, max_len)
                    .into_iter()
                    .map(InlineSpan::plain)
                    .collect(),
            });
        }
    }

    if blocks.is_empty() {
        let raw = summary.to_text();
        blocks.push(RenderedBlock::callout(FALLBACK_EMOJI, truncate_utf16(&raw, max_len)));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_metadata() {
        let raw = "Here you go:\n```json\n{\"japanese_title\": \"タイトル\", \"categories\": [\"AI\"], \
                   \"summary\": {\"overview\": \"o\", \"learnings\": \"l\"}}\n```\nthanks";
        let meta = ArticleMetadata::parse(raw).unwrap();
        assert_eq!(meta.translated_title.as_deref(), Some("タイトル"));
        assert_eq!(meta.categories, vec!["AI".to_string()]);
        let Some(Summary::Structured(s)) = meta.summary else {
            panic!("expected structured summary");
        };
        assert_eq!(s.overview, "o");
        assert_eq!(s.use_cases, "");
    }

    #[test]
    fn parses_bare_object_with_braces_in_strings() {
        let raw = r#"prefix {"translated_title": "a {b} c", "summary": "plain"} suffix"#;
        let meta = ArticleMetadata::parse(raw).unwrap();
        assert_eq!(meta.translated_title.as_deref(), Some("a {b} c"));
        assert_eq!(meta.summary, Some(Summary::Text("plain".to_string())));
    }

    #[test]
    fn no_json_yields_none() {
        assert_eq!(extract_json("just prose"), None);
        assert_eq!(extract_json("{ not json"), None);
        assert!(ArticleMetadata::parse("plain text").is_none());
    }

    #[test]
    fn malformed_output_becomes_text_summary() {
        let summary = Summary::from_llm_output("{broken json").unwrap();
        assert_eq!(summary, Summary::Text("{broken json".to_string()));
        assert!(Summary::from_llm_output("   ").is_none());
        assert!(Summary::from_llm_output(r#"{"categories": ["AI"]}"#).is_none());
    }

    #[test]
    fn list_valued_section_keeps_the_rest_of_the_metadata() {
        let raw = r#"{"japanese_title": "タイトル", "categories": ["AI"],
                      "summary": {"overview": "o", "learnings": ["a", "b"]}}"#;
        let meta = ArticleMetadata::parse(raw).unwrap();
        assert_eq!(meta.translated_title.as_deref(), Some("タイトル"));
        assert_eq!(meta.categories, vec!["AI".to_string()]);

        let Some(Summary::Structured(s)) = Summary::from_llm_output(raw) else {
            panic!("expected structured summary");
        };
        assert_eq!(s.overview, "o");
        assert_eq!(s.learnings, "a\nb");
    }

    #[test]
    fn null_and_odd_fields_degrade_alone() {
        let raw = r#"{"japanese_title": "題", "categories": null,
                      "summary": {"overview": null, "use_cases": "u", "connections": 3}}"#;
        let meta = ArticleMetadata::parse(raw).unwrap();
        assert_eq!(meta.translated_title.as_deref(), Some("題"));
        assert!(meta.categories.is_empty());
        let Some(Summary::Structured(s)) = meta.summary else {
            panic!("expected structured summary");
        };
        assert_eq!(s.overview, "");
        assert_eq!(s.use_cases, "u");
        assert_eq!(s.connections, "3");

        let meta = ArticleMetadata::parse(r#"{"categories": "Web3", "summary": null}"#).unwrap();
        assert_eq!(meta.categories, vec!["Web3".to_string()]);
        assert_eq!(meta.summary, None);
    }

    #[test]
    fn display_title_combines_languages() {
        let meta = ArticleMetadata {
            translated_title: Some("日本語".to_string()),
            ..Default::default()
        };
        assert_eq!(meta.display_title("English"), "日本語 | English");
        assert_eq!(ArticleMetadata::default().display_title("English"), "English");
    }

    #[test]
    fn renders_only_present_sections() {
        let summary = Summary::Structured(StructuredSummary {
            overview: "What it is".to_string(),
            use_cases: "Where to use it".to_string(),
            ..Default::default()
        });
        let blocks = render_summary(&summary, 2000);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0], RenderedBlock::heading(3, "📖 Overview"));
        assert_eq!(blocks[1], RenderedBlock::callout("📖", "What it is"));
        assert_eq!(blocks[2], RenderedBlock::heading(3, "🛠 Use cases"));
        assert_eq!(blocks[3], RenderedBlock::callout("🛠", "Where to use it"));
    }

    #[test]
    fn empty_sections_fall_back_to_one_callout() {
        let blocks = render_summary(&Summary::Structured(StructuredSummary::default()), 2000);
        assert_eq!(blocks, vec![RenderedBlock::callout("📝", "")]);

        let text = Summary::Text("x".repeat(50));
        let blocks = render_summary(&text, 10);
        assert_eq!(blocks, vec![RenderedBlock::callout("📝", "x".repeat(10))]);
    }

    #[test]
    fn long_section_stays_one_callout() {
        let summary = Summary::Structured(StructuredSummary {
            learnings: "a".repeat(25),
            ..Default::default()
        });
        let blocks = render_summary(&summary, 10);
        assert_eq!(blocks.len(), 2);
        for text in blocks[1].texts() {
            assert!(text.chars().count() <= 10);
        }
        assert_eq!(blocks[1].texts().concat(), "a".repeat(25));
    }
}
