use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::blocks::RenderedBlock;
use crate::config::RendererConfig;
use crate::inline::{parse_inline, InlineSpan, SpanStyle};
use crate::summary::{render_summary, Summary};

static ORDERED_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s+(.*)$").unwrap());

static ORDERED_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s").unwrap());

// ── Paragraph rules ──────────────────────────────────────────────────────────

/// One classification rule: a prefix predicate and the transform applied when
/// it is the first rule to match.
struct BlockRule {
    name: &'static str,
    matches: fn(&BlockRenderer, &str) -> bool,
    render: fn(&BlockRenderer, &str) -> Vec<RenderedBlock>,
}

const RULES: &[BlockRule] = &[
    BlockRule {
        name: "heading",
        matches: |_, p| heading_level(p).is_some(),
        render: BlockRenderer::render_heading,
    },
    BlockRule {
        name: "code",
        matches: |_, p| p.starts_with("```"),
        render: BlockRenderer::render_code,
    },
    BlockRule {
        name: "quote",
        matches: |_, p| p.starts_with("> "),
        render: BlockRenderer::render_quote,
    },
    BlockRule {
        name: "numbered",
        matches: |_, p| ORDERED_START_RE.is_match(p),
        render: BlockRenderer::render_numbered,
    },
    BlockRule {
        name: "bulleted",
        matches: |_, p| p.starts_with("- ") || p.starts_with("* "),
        render: BlockRenderer::render_bulleted,
    },
    BlockRule {
        name: "image",
        matches: |r, p| r.config.image_markers.iter().any(|m| p.starts_with(m.as_str())),
        render: BlockRenderer::render_image,
    },
];

fn heading_level(paragraph: &str) -> Option<(u8, &str)> {
    // `#### ` maps to the deepest heading the destination supports.
    [("#### ", 3), ("### ", 3), ("## ", 2), ("# ", 1)]
        .iter()
        .find_map(|(prefix, level)| paragraph.strip_prefix(prefix).map(|rest| (*level, rest)))
}

// ── Renderer ─────────────────────────────────────────────────────────────────

pub struct BlockRenderer {
    config: RendererConfig,
}

impl Default for BlockRenderer {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}

impl BlockRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    fn max_len(&self) -> usize {
        self.config.max_block_text_length
    }

    /// Render blank-line separated markdown into destination blocks.
    pub fn render_markdown(&self, markdown: &str) -> Vec<RenderedBlock> {
        let mut blocks = Vec::new();
        for paragraph in split_paragraphs(markdown) {
            blocks.extend(self.render_paragraph(&paragraph));
        }
        debug!(blocks = blocks.len(), "markdown rendered");
        blocks
    }

    /// Classify one paragraph by the first matching rule; anything else is a
    /// rich paragraph.
    pub fn render_paragraph(&self, paragraph: &str) -> Vec<RenderedBlock> {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            return Vec::new();
        }
        match RULES.iter().find(|rule| (rule.matches)(self, paragraph)) {
            Some(rule) => {
                debug!(rule = rule.name, "paragraph classified");
                (rule.render)(self, paragraph)
            }
            None => self.render_rich(paragraph),
        }
    }

    /// Table of contents, optional summary, translated body, source bookmark.
    pub fn compose_page(
        &self,
        body_markdown: &str,
        summary: Option<&Summary>,
        source_url: &str,
    ) -> Vec<RenderedBlock> {
        let mut blocks = vec![RenderedBlock::TableOfContents, RenderedBlock::Divider];

        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            blocks.push(RenderedBlock::heading(2, self.config.summary_heading.as_str()));
            blocks.extend(render_summary(summary, self.max_len()));
            blocks.push(RenderedBlock::Divider);
        }

        blocks.push(RenderedBlock::heading(2, self.config.body_heading.as_str()));
        blocks.extend(self.render_markdown(body_markdown));

        blocks.push(RenderedBlock::Divider);
        blocks.push(RenderedBlock::Bookmark {
            url: source_url.to_string(),
        });
        blocks
    }

    /// Map a free-form fence tag to a supported language name.
    pub fn normalize_language(&self, tag: &str) -> String {
        let lang = tag.trim().to_lowercase();
        let supported = &self.config.code_languages;

        if supported.contains(&lang) {
            return lang;
        }
        if let Some(alias) = self.config.language_aliases.get(&lang) {
            return alias.clone();
        }
        if !lang.is_empty() {
            // Longest candidate first so "javascript" beats "java" and the
            // result does not depend on set iteration order.
            let mut candidates: Vec<&String> = supported
                .iter()
                .filter(|s| lang.starts_with(s.as_str()) || s.starts_with(lang.as_str()))
                .collect();
            candidates.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
            if let Some(found) = candidates.first() {
                return (*found).clone();
            }
        }
        self.config.default_language.clone()
    }

    // ── Rule transforms ──────────────────────────────────────────────────────

    fn render_heading(&self, paragraph: &str) -> Vec<RenderedBlock> {
        let Some((level, text)) = heading_level(paragraph) else {
            return self.render_rich(paragraph);
        };
        self.plain_blocks(text.trim(), |rich_text| RenderedBlock::Heading { level, rich_text })
    }

    fn render_code(&self, paragraph: &str) -> Vec<RenderedBlock> {
        let after_fence = paragraph.trim_start_matches('`');
        let (info, rest) = match after_fence.split_once('\n') {
            Some((info, rest)) => (info, rest),
            None => ("", after_fence),
        };
        let body = rest.trim_end();
        let body = body.strip_suffix("```").unwrap_or(body);
        let code = body.trim_matches('\n').trim_end();

        let language = self.normalize_language(info);
        split_text(code, self.max_len())
            .into_iter()
            .map(|chunk| RenderedBlock::Code {
                language: language.clone(),
                text: chunk,
            })
            .collect()
    }

    fn render_quote(&self, paragraph: &str) -> Vec<RenderedBlock> {
        let text = paragraph
            .lines()
            .map(|line| {
                let line = line.trim_start();
                line.strip_prefix('>').unwrap_or(line).trim()
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.plain_blocks(&text, |rich_text| RenderedBlock::Quote { rich_text })
    }

    fn render_numbered(&self, paragraph: &str) -> Vec<RenderedBlock> {
        let mut blocks = Vec::new();
        for line in paragraph.lines() {
            let Some(caps) = ORDERED_ITEM_RE.captures(line.trim()) else {
                continue;
            };
            let number = caps[1].parse::<u32>().unwrap_or(1);
            let text = caps[2].trim();
            blocks.extend(self.plain_blocks(text, |rich_text| {
                RenderedBlock::NumberedListItem { number, rich_text }
            }));
        }
        blocks
    }

    fn render_bulleted(&self, paragraph: &str) -> Vec<RenderedBlock> {
        let mut blocks = Vec::new();
        for line in paragraph.lines() {
            let line = line.trim();
            let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) else {
                continue;
            };
            blocks.extend(
                self.plain_blocks(text.trim(), |rich_text| RenderedBlock::BulletedListItem {
                    rich_text,
                }),
            );
        }
        blocks
    }

    fn render_image(&self, paragraph: &str) -> Vec<RenderedBlock> {
        split_text(paragraph, self.max_len())
            .into_iter()
            .map(|chunk| RenderedBlock::Paragraph {
                rich_text: vec![InlineSpan::styled(chunk, SpanStyle::Italic)],
            })
            .collect()
    }

    fn render_rich(&self, paragraph: &str) -> Vec<RenderedBlock> {
        split_text(paragraph, self.max_len())
            .into_iter()
            .map(|chunk| RenderedBlock::Paragraph {
                rich_text: parse_inline(&chunk),
            })
            .collect()
    }

    /// One block per length-limited chunk, each with a single plain span.
    fn plain_blocks<F>(&self, text: &str, build: F) -> Vec<RenderedBlock>
    where
        F: Fn(Vec<InlineSpan>) -> RenderedBlock,
    {
        split_text(text, self.max_len())
            .into_iter()
            .map(|chunk| build(vec![InlineSpan::plain(chunk)]))
            .collect()
    }
}

/// Paragraphs separated by blank lines. A fenced code block stays whole even
/// when it contains blank lines.
pub fn split_paragraphs(markdown: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            // A fence that opens and closes on one line does not toggle.
            let ticks = line.matches("```").count();
            if ticks % 2 == 1 {
                in_fence = !in_fence;
            }
        }
        if line.trim().is_empty() && !in_fence {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

/// Split `text` into chunks of at most `max_len` UTF-16 code units (the unit
/// Notion measures rich text in), cutting after the last `。` or `". "` that
/// fits, else at the limit. Concatenating the chunks gives back `text`.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if utf16_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut rest = &chars[..];
    while !rest.is_empty() {
        let fit = fitting_chars(rest, max_len);
        if fit == rest.len() {
            chunks.push(rest.iter().collect());
            break;
        }
        let cut = sentence_cut(&rest[..fit]).unwrap_or(fit);
        chunks.push(rest[..cut].iter().collect());
        rest = &rest[cut..];
    }
    chunks
}

pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Longest prefix of `text` within `max_len` UTF-16 code units.
pub fn truncate_utf16(text: &str, max_len: usize) -> &str {
    let mut units = 0;
    for (idx, c) in text.char_indices() {
        units += c.len_utf16();
        if units > max_len {
            return &text[..idx];
        }
    }
    text
}

/// Leading chars that fit in `max_len` UTF-16 units; never zero, so a
/// split always advances.
fn fitting_chars(chars: &[char], max_len: usize) -> usize {
    let mut units = 0;
    for (i, c) in chars.iter().enumerate() {
        units += c.len_utf16();
        if units > max_len {
            return i.max(1);
        }
    }
    chars.len()
}

/// Length of the longest prefix of `window` ending in a sentence break.
fn sentence_cut(window: &[char]) -> Option<usize> {
    if let Some(pos) = window.iter().rposition(|&c| c == '。') {
        return Some(pos + 1);
    }
    window
        .windows(2)
        .rposition(|pair| pair == ['.', ' '])
        .map(|pos| pos + 2)
}
