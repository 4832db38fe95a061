use std::collections::HashSet;

use serde::Serialize;

/// Prefix the extractor puts in front of figure captions. The renderer
/// recognises it (and its translated forms) and keeps the paragraph verbatim.
pub const IMAGE_MARKER: &str = "[Image: ";

const DEDUP_KEY_CHARS: usize = 80;
const DEDUP_EXEMPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    Code,
    Blockquote,
    ListItem { ordered: bool, index: usize },
    ImagePlaceholder,
    RawText,
}

impl BlockKind {
    /// Dedup tag: the source element the block came from. Heading levels
    /// stay distinct; list items share their list's tag.
    fn tag(&self) -> &'static str {
        match self {
            BlockKind::Heading { level: 1 } => "h1",
            BlockKind::Heading { level: 2 } => "h2",
            BlockKind::Heading { level: 3 } => "h3",
            BlockKind::Heading { .. } => "h4",
            BlockKind::Paragraph => "p",
            BlockKind::Code => "pre",
            BlockKind::Blockquote => "blockquote",
            BlockKind::ListItem { ordered: true, .. } => "ol",
            BlockKind::ListItem { ordered: false, .. } => "ul",
            BlockKind::ImagePlaceholder => "figure",
            BlockKind::RawText => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ContentBlock {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Markdown form of the block, using the prefixes the renderer parses back.
    pub fn to_markdown(&self) -> String {
        let text = self.text.trim();
        match self.kind {
            BlockKind::Heading { level } => {
                format!("{} {}", "#".repeat(level.clamp(1, 4) as usize), text)
            }
            BlockKind::Code => format!("```\n{}\n```", text),
            BlockKind::Blockquote => text
                .lines()
                .map(|l| format!("> {}", l.trim()))
                .collect::<Vec<_>>()
                .join("\n"),
            BlockKind::ListItem { ordered: true, index } => format!("{}. {}", index, text),
            BlockKind::ListItem { ordered: false, .. } => format!("- {}", text),
            BlockKind::ImagePlaceholder => format!("{}{}]", IMAGE_MARKER, text),
            BlockKind::Paragraph | BlockKind::RawText => text.to_string(),
        }
    }
}

/// Ordered block sequence produced by one extraction pass.
#[derive(Debug, Default)]
pub struct Document {
    blocks: Vec<ContentBlock>,
    seen: HashSet<(&'static str, String)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block unless it is empty or repeats an earlier short block.
    /// Returns whether the block was kept.
    pub fn push(&mut self, block: ContentBlock) -> bool {
        let text = block.text.trim();
        if text.is_empty() || !self.first_sighting(block.kind.tag(), text) {
            return false;
        }
        self.blocks.push(block);
        true
    }

    /// Append a whole list. The list is deduplicated as one unit on its
    /// joined item text; items are numbered from 1 after empty ones are
    /// dropped.
    pub fn push_list<I, S>(&mut self, ordered: bool, items: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items
            .into_iter()
            .map(Into::into)
            .filter(|t| !t.trim().is_empty())
            .collect();
        if items.is_empty() {
            return false;
        }

        let kind = BlockKind::ListItem { ordered, index: 1 };
        if !self.first_sighting(kind.tag(), &items.join("\n")) {
            return false;
        }
        for (i, text) in items.into_iter().enumerate() {
            let kind = BlockKind::ListItem {
                ordered,
                index: i + 1,
            };
            self.blocks.push(ContentBlock::new(kind, text));
        }
        true
    }

    /// False when `(tag, text)` repeats an earlier key and the text is short
    /// enough to count as a duplicate.
    fn first_sighting(&mut self, tag: &'static str, text: &str) -> bool {
        let key: String = text.chars().take(DEDUP_KEY_CHARS).collect();
        let is_new = self.seen.insert((tag, key));
        is_new || text.chars().count() > DEDUP_EXEMPT_CHARS
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blank-line separated markdown of every non-empty block.
    pub fn to_markdown(&self) -> String {
        self.blocks
            .iter()
            .map(ContentBlock::to_markdown)
            .filter(|md| !md.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
