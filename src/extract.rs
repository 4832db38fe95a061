use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::document::{BlockKind, ContentBlock, Document};

// ── Static selectors ─────────────────────────────────────────────────────────

static BODY_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

static ARTICLE_STRUCTURE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article, [data-testid='storyTitle'], h1").unwrap());

const UNTITLED: &str = "Untitled";

// ── Public result types ──────────────────────────────────────────────────────

/// Markdown produced from one page, and whether it came from the flat-text
/// fallback rather than the structural walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub markdown: String,
    pub used_fallback: bool,
    pub selector: Option<String>,
    pub block_count: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.markdown.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedArticle {
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub markdown: String,
    pub used_fallback: bool,
    /// Only part of the article was available (paywall or fallback text).
    pub is_preview: bool,
    pub selector: Option<String>,
    pub block_count: usize,
}

// ── Page validity ────────────────────────────────────────────────────────────

/// Decides whether a fetched page is a real article or a generic error page.
pub trait PageCheck: Send + Sync {
    fn is_missing(&self, document: &Html, final_url: &str) -> bool;
}

impl<F> PageCheck for F
where
    F: Fn(&Html, &str) -> bool + Send + Sync,
{
    fn is_missing(&self, document: &Html, final_url: &str) -> bool {
        self(document, final_url)
    }
}

/// Not-found phrases in the body text, unless the page still has an
/// article structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHeuristic;

impl PageCheck for NotFoundHeuristic {
    fn is_missing(&self, document: &Html, final_url: &str) -> bool {
        let body = document
            .select(&BODY_SEL)
            .next()
            .map(|b| collect_text(b).to_lowercase())
            .unwrap_or_default();

        let looks_missing = body.contains("page not found")
            || (body.contains("404") && body.contains("not found"))
            || body.contains("this page doesn")
            || body.contains("out of nothing, something")
            || final_url.contains("/404");

        looks_missing && document.select(&ARTICLE_STRUCTURE_SEL).next().is_none()
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

pub struct Extractor {
    config: ExtractorConfig,
    containers: Vec<(String, Selector)>,
    titles: Vec<Selector>,
    authors: Vec<Selector>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let containers = config
            .container_selectors
            .iter()
            .filter_map(|s| parse_selector(s).map(|sel| (s.clone(), sel)))
            .collect();
        let titles = config
            .title_selectors
            .iter()
            .filter_map(|s| parse_selector(s))
            .collect();
        let authors = config
            .author_selectors
            .iter()
            .filter_map(|s| parse_selector(s))
            .collect();

        Self {
            config,
            containers,
            titles,
            authors,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Full extraction of a serialized page: metadata, body markdown and the
    /// preview flag.
    pub fn extract_article(&self, html: &str, url: &str) -> ExtractedArticle {
        self.extract_document(&Html::parse_document(html), url)
    }

    pub fn extract_document(&self, document: &Html, url: &str) -> ExtractedArticle {
        let extraction = self.extract(document);

        let is_preview = extraction.used_fallback || self.paywall_indicator(document).is_some();
        let article = ExtractedArticle {
            url: url.to_string(),
            title: self.title(document),
            author: self.author(document),
            markdown: extraction.markdown,
            used_fallback: extraction.used_fallback,
            is_preview,
            selector: extraction.selector,
            block_count: extraction.block_count,
        };

        info!(
            title = %article.title,
            chars = article.markdown.chars().count(),
            preview = article.is_preview,
            "article extracted"
        );
        article
    }

    /// Structural walk first, flat-text fallback when it yields nothing.
    pub fn extract(&self, document: &Html) -> Extraction {
        let (selector, blocks) = self.extract_blocks(document);
        let markdown = blocks.to_markdown();

        if !markdown.trim().is_empty() {
            debug!(selector = ?selector, blocks = blocks.len(), "structural extraction");
            return Extraction {
                markdown,
                used_fallback: false,
                selector,
                block_count: blocks.len(),
            };
        }

        warn!(selector = ?selector, "structural extraction empty, using body text");
        let fallback = self.fallback_text(document);
        if fallback.chars().count() <= self.config.fallback_min_total_chars {
            return Extraction {
                used_fallback: true,
                selector,
                ..Extraction::default()
            };
        }

        Extraction {
            markdown: fallback,
            used_fallback: true,
            selector,
            block_count: 0,
        }
    }

    /// Walk the first matching container into a block sequence.
    pub fn extract_blocks(&self, document: &Html) -> (Option<String>, Document) {
        let mut blocks = Document::new();

        let found = self.containers.iter().find_map(|(raw, sel)| {
            document.select(sel).next().map(|el| (raw.clone(), el))
        });

        let Some((selector, container)) = found else {
            debug!("no article container matched");
            return (None, blocks);
        };

        self.walk_element(container, &mut blocks);
        (Some(selector), blocks)
    }

    /// Text of every fragment under `<body>` that is not inside chrome,
    /// blank-line joined and capped at the configured budget.
    pub fn fallback_text(&self, document: &Html) -> String {
        let Some(body) = document.select(&BODY_SEL).next() else {
            return String::new();
        };

        let mut fragments: Vec<&str> = Vec::new();
        for node in body.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let in_chrome = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| self.config.fallback_skip_tags.contains(a.value().name()));
            if in_chrome {
                continue;
            }
            let fragment = text.trim();
            if fragment.chars().count() > self.config.fallback_min_fragment_chars {
                fragments.push(fragment);
            }
        }

        truncate_chars(&fragments.join("\n\n"), self.config.fallback_max_chars)
    }

    pub fn title(&self, document: &Html) -> String {
        first_text(document, &self.titles).unwrap_or_else(|| UNTITLED.to_string())
    }

    pub fn author(&self, document: &Html) -> Option<String> {
        first_text(document, &self.authors)
    }

    /// First paywall phrase present in the page text, if any.
    pub fn paywall_indicator(&self, document: &Html) -> Option<&str> {
        let body = document
            .select(&BODY_SEL)
            .next()
            .map(|b| collect_text(b).to_lowercase())?;
        let found = self
            .config
            .paywall_indicators
            .iter()
            .find(|needle| body.contains(needle.as_str()))
            .map(String::as_str);
        if let Some(indicator) = found {
            warn!(indicator, "paywall detected");
        }
        found
    }

    // ── DOM tree walker → blocks ─────────────────────────────────────────────

    fn walk_element(&self, el: ElementRef<'_>, out: &mut Document) {
        let name = el.value().name();

        if self.config.skip_tags.contains(name) {
            return;
        }
        if let Some(test_id) = el.value().attr("data-testid") {
            if self.config.skip_test_ids.contains(test_id) {
                return;
            }
        }

        match name {
            "h1" | "h2" | "h3" | "h4" => {
                let level = name[1..].parse::<u8>().unwrap_or(1);
                let text = normalize_text(collect_text(el));
                out.push(ContentBlock::new(BlockKind::Heading { level }, text));
            }

            "pre" => {
                let code = find_first_tag(el, "code")
                    .map(collect_text)
                    .unwrap_or_else(|| collect_text(el));
                out.push(ContentBlock::new(BlockKind::Code, code.trim()));
            }

            // Inline code is part of its paragraph; a bare one carries no block.
            "code" => {}

            "blockquote" => {
                let text = block_text(el)
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                out.push(ContentBlock::new(BlockKind::Blockquote, text));
            }

            "ul" => self.handle_list(el, false, out),
            "ol" => self.handle_list(el, true, out),

            "figure" => {
                let caption = find_first_tag(el, "figcaption")
                    .map(|fc| normalize_text(collect_text(fc)))
                    .filter(|s| !s.is_empty());
                let alt = find_first_tag(el, "img")
                    .and_then(|img| img.value().attr("alt"))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                if let Some(text) = caption.or(alt) {
                    out.push(ContentBlock::new(BlockKind::ImagePlaceholder, text));
                }
            }

            "p" => {
                let plain = normalize_text(collect_text(el));
                if plain.chars().count() <= self.config.min_paragraph_chars {
                    return;
                }
                out.push(ContentBlock::new(BlockKind::Paragraph, paragraph_markdown(el)));
            }

            "div" | "section" | "main" | "article" | "span" => {
                for child in el.children() {
                    match child.value() {
                        Node::Text(text) => {
                            out.push(ContentBlock::new(BlockKind::RawText, text.trim()));
                        }
                        Node::Element(_) => {
                            if let Some(child_el) = ElementRef::wrap(child) {
                                self.walk_element(child_el, out);
                            }
                        }
                        _ => {}
                    }
                }
            }

            _ => {}
        }
    }

    fn handle_list(&self, el: ElementRef<'_>, ordered: bool, out: &mut Document) {
        let items = el
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li")
            .map(|li| normalize_text(collect_text(li)));
        out.push_list(ordered, items);
    }
}

// ── Paragraph inline markup ──────────────────────────────────────────────────

fn paragraph_markdown(el: ElementRef<'_>) -> String {
    let mut md = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => md.push_str(&text.text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let text = collect_text(child_el);
                match child_el.value().name() {
                    "code" => md.push_str(&wrap_inline(&text, "`")),
                    "strong" | "b" => md.push_str(&wrap_inline(&text, "**")),
                    "em" | "i" => md.push_str(&wrap_inline(&text, "*")),
                    "a" => {
                        let href = child_el.value().attr("href").unwrap_or("");
                        let label = text.trim();
                        if label.is_empty() {
                            md.push_str(&text);
                        } else {
                            md.push_str(&format!("[{}]({})", label, href));
                        }
                    }
                    _ => md.push_str(&text),
                }
            }
            _ => {}
        }
    }
    normalize_text(md)
}

/// Wrap the trimmed text in `marker`, keeping surrounding whitespace outside.
fn wrap_inline(text: &str, marker: &str) -> String {
    let inner = text.trim();
    if inner.is_empty() {
        return text.to_string();
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];
    format!("{}{}{}{}{}", lead, marker, inner, marker, trail)
}

// ── DOM utility helpers ──────────────────────────────────────────────────────

fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!(selector = raw, error = %e, "ignoring invalid selector");
            None
        }
    }
}

fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        document
            .select(sel)
            .map(|el| normalize_text(collect_text(el)))
            .find(|t| !t.is_empty())
    })
}

/// Recursively collect all text from an element and its descendants.
fn collect_text(el: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => parts.push((&*text.text).to_string()),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    parts.push(collect_text(child_el));
                }
            }
            _ => {}
        }
    }
    parts.join("")
}

/// Like `collect_text`, but block-level children and `<br>` end a line.
fn block_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                match child_el.value().name() {
                    "br" => out.push('\n'),
                    "p" | "div" | "li" | "section" => {
                        out.push('\n');
                        out.push_str(&block_text(child_el));
                        out.push('\n');
                    }
                    _ => out.push_str(&block_text(child_el)),
                }
            }
            _ => {}
        }
    }
    out
}

/// Collapse whitespace and trim.
fn normalize_text(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Depth-first search for the first element with the given tag name.
fn find_first_tag<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    for child_el in el.children().filter_map(ElementRef::wrap) {
        if child_el.value().name() == tag {
            return Some(child_el);
        }
        if let Some(found) = find_first_tag(child_el, tag) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Extraction {
        Extractor::default().extract(&Html::parse_document(html))
    }

    fn blocks(html: &str) -> Vec<ContentBlock> {
        let (_, doc) = Extractor::default().extract_blocks(&Html::parse_document(html));
        doc.blocks().to_vec()
    }

    #[test]
    fn container_priority_follows_selector_order() {
        let html = r#"<main><p>Main paragraph text</p></main>
            <article><p>Article paragraph text</p></article>"#;
        let result = extract(html);
        assert_eq!(result.selector.as_deref(), Some("article"));
        assert_eq!(result.markdown, "Article paragraph text");
        assert!(!result.used_fallback);
    }

    #[test]
    fn headings_code_quotes_and_lists() {
        let html = r#"<article>
            <h2>Getting started</h2>
            <pre><code>  cargo new demo  </code></pre>
            <blockquote><p>First line</p><p>Second line</p></blockquote>
            <ol><li>one</li><li>two</li></ol>
            <ul><li>alpha</li><li></li><li>beta</li></ul>
        </article>"#;
        let md = extract(html).markdown;
        assert_eq!(
            md,
            "## Getting started\n\n```\ncargo new demo\n```\n\n> First line\n> Second line\n\n1. one\n\n2. two\n\n- alpha\n\n- beta"
        );
    }

    #[test]
    fn paragraph_inline_markup() {
        let html = r#"<article><p>Run <code>ls</code> with <strong>care</strong> and
            <em>style</em>, see <a href="https://x.dev">the docs</a>.</p></article>"#;
        let got = blocks(html);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, BlockKind::Paragraph);
        assert_eq!(
            got[0].text,
            "Run `ls` with **care** and *style*, see [the docs](https://x.dev)."
        );
    }

    #[test]
    fn short_paragraphs_are_noise() {
        let got = blocks("<article><p>Hi!</p><p>12345</p><p>123456</p></article>");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "123456");
    }

    #[test]
    fn chrome_and_test_ids_are_pruned() {
        let html = r#"<article>
            <nav><p>Navigation links here</p></nav>
            <div data-testid="storyFooter"><p>Footer paragraph text</p></div>
            <p>Real content paragraph</p>
            <footer><p>More footer text</p></footer>
        </article>"#;
        let got = blocks(html);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "Real content paragraph");
    }

    #[test]
    fn unknown_tags_are_not_recursed() {
        let html = "<article><table><tr><td><p>Inside a table cell</p></td></tr></table>\
                    <p>Outside the table</p></article>";
        let got = blocks(html);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "Outside the table");
    }

    #[test]
    fn figure_prefers_caption_over_alt() {
        let html = r#"<article>
            <figure><img src="a.png" alt="alt text"><figcaption>The caption</figcaption></figure>
            <figure><img src="b.png" alt="Only alt"></figure>
            <figure><img src="c.png"></figure>
        </article>"#;
        let got = blocks(html);
        assert_eq!(
            got,
            vec![
                ContentBlock::new(BlockKind::ImagePlaceholder, "The caption"),
                ContentBlock::new(BlockKind::ImagePlaceholder, "Only alt"),
            ]
        );
    }

    #[test]
    fn container_text_nodes_become_raw_text() {
        let got = blocks("<article><div>Loose text in a div<p>And a paragraph</p></div></article>");
        assert_eq!(got[0], ContentBlock::new(BlockKind::RawText, "Loose text in a div"));
        assert_eq!(got[1].kind, BlockKind::Paragraph);
    }

    #[test]
    fn repeated_short_block_is_emitted_once() {
        let html = "<article><p>Subscribe to our feed</p><p>Subscribe to our feed</p></article>";
        assert_eq!(blocks(html).len(), 1);

        let long = "word ".repeat(60);
        let html = format!("<article><p>{long}</p><p>{long}</p></article>");
        assert_eq!(blocks(&html).len(), 2);
    }

    #[test]
    fn fallback_when_no_container() {
        let body_text = "This sentence is long enough to survive the filter. ".repeat(6);
        let html = format!(
            "<html><body><div>{body_text}</div><nav>Navigation menu entries</nav>\
             <script>var tracking = 'ignored entirely';</script><span>tiny</span></body></html>"
        );
        let result = extract(&html);
        assert!(result.used_fallback);
        assert_eq!(result.selector, None);
        assert_eq!(result.markdown, body_text.trim());
    }

    #[test]
    fn fallback_is_truncated() {
        let mut config = ExtractorConfig::default();
        config.fallback_max_chars = 300;
        let body = "A paragraph that is long enough. ".repeat(40);
        let html = format!("<html><body><div>{body}</div></body></html>");
        let result = Extractor::new(config).extract(&Html::parse_document(&html));
        assert!(result.used_fallback);
        assert_eq!(result.markdown.chars().count(), 300);
    }

    #[test]
    fn empty_page_is_not_an_error() {
        let result = extract("<html><body><p>tiny</p></body></html>");
        assert!(result.used_fallback);
        assert!(result.is_empty());
    }

    #[test]
    fn malformed_markup_is_tolerated() {
        let result = extract("<article><p>Unclosed paragraph text<div><h2>Heading<p>more");
        assert!(!result.is_empty());
    }

    #[test]
    fn title_author_and_paywall() {
        let html = r#"<html><body>
            <h1>Page level heading</h1>
            <article><h1 data-testid="storyTitle">  The Story  </h1>
            <a rel="author">Jane Doe</a>
            <p>Member-only story, become a member to read on.</p></article>
        </body></html>"#;
        let document = Html::parse_document(html);
        let extractor = Extractor::default();
        assert_eq!(extractor.title(&document), "The Story");
        assert_eq!(extractor.author(&document).as_deref(), Some("Jane Doe"));
        assert_eq!(extractor.paywall_indicator(&document), Some("member-only story"));
    }

    #[test]
    fn untitled_when_no_heading() {
        let document = Html::parse_document("<p>no headings here</p>");
        assert_eq!(Extractor::default().title(&document), "Untitled");
    }

    #[test]
    fn not_found_heuristic() {
        let missing = Html::parse_document("<body><p>404 - Page not found</p></body>");
        assert!(NotFoundHeuristic.is_missing(&missing, "https://example.com/x"));

        let article = Html::parse_document("<body><h1>404 errors explained</h1><p>not found</p></body>");
        assert!(!NotFoundHeuristic.is_missing(&article, "https://example.com/x"));

        let custom = |_: &Html, url: &str| url.ends_with("/gone");
        assert!(custom.is_missing(&article, "https://example.com/gone"));
    }

    #[test]
    fn invalid_selectors_are_skipped() {
        let mut config = ExtractorConfig::default();
        config.container_selectors = vec!["[[broken".to_string(), "section".to_string()];
        let extractor = Extractor::new(config);
        let result = extractor.extract(&Html::parse_document(
            "<section><p>Section paragraph</p></section>",
        ));
        assert_eq!(result.selector.as_deref(), Some("section"));
    }

    #[test]
    fn same_heading_text_at_different_levels_is_kept() {
        let html = "<article><h2>Setup</h2><p>First section body text</p>\
                    <h3>Setup</h3><p>Second section body</p></article>";
        assert_eq!(
            extract(html).markdown,
            "## Setup\n\nFirst section body text\n\n### Setup\n\nSecond section body"
        );
    }

    #[test]
    fn lists_sharing_an_item_are_both_kept() {
        let html = "<article><ol><li>Install</li><li>Build</li></ol>\
                    <p>Windows steps follow here</p>\
                    <ol><li>Install</li><li>Test</li></ol>\
                    <ol><li>Install</li><li>Build</li></ol></article>";
        assert_eq!(
            extract(html).markdown,
            "1. Install\n\n2. Build\n\nWindows steps follow here\n\n1. Install\n\n2. Test"
        );
    }

    #[test]
    fn fallback_article_is_a_preview() {
        let body_text = "Only the teaser of this story is served to visitors. ".repeat(6);
        let html = format!("<html><body><div>{body_text}</div></body></html>");
        let article = Extractor::default().extract_article(&html, "https://medium.com/@a/b");
        assert!(article.used_fallback);
        assert!(article.is_preview);
        assert!(!article.markdown.is_empty());
    }

    #[test]
    fn paywall_phrase_marks_structural_article_as_preview() {
        let html = "<html><body><article><h1>Locked story</h1>\
                    <p>The first paragraph is visible to everyone.</p>\
                    <p>Member-only story. Become a member to keep reading.</p>\
                    </article></body></html>";
        let article = Extractor::default().extract_article(html, "https://medium.com/@a/b");
        assert!(!article.used_fallback);
        assert_eq!(article.selector.as_deref(), Some("article"));
        assert!(article.is_preview);
    }

    #[test]
    fn full_article_is_not_a_preview() {
        let html = "<html><body><article><p>Free to read for everybody.</p></article></body></html>";
        let article = Extractor::default().extract_article(html, "https://medium.com/@a/b");
        assert!(!article.is_preview);
    }
}
