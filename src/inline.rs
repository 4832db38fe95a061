use once_cell::sync::Lazy;
use regex::Regex;

// Alternation order is the priority order: link, bold, italic, code.
static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]+)\]\(([^)]+)\)|\*\*(.+?)\*\*|\*(.+?)\*|`([^`]+)`").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStyle {
    Plain,
    Bold,
    Italic,
    Code,
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    pub text: String,
    pub style: SpanStyle,
}

impl InlineSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::styled(text, SpanStyle::Plain)
    }

    pub fn styled(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Split markdown-ish text into styled runs in one left-to-right scan.
/// Styles do not nest; text between matches becomes plain spans.
pub fn parse_inline(text: &str) -> Vec<InlineSpan> {
    let mut spans = Vec::new();
    let mut last_end = 0;

    for caps in INLINE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last_end {
            spans.push(InlineSpan::plain(&text[last_end..whole.start()]));
        }

        let span = if let (Some(label), Some(href)) = (caps.get(1), caps.get(2)) {
            InlineSpan::styled(label.as_str(), SpanStyle::Link(href.as_str().to_string()))
        } else if let Some(m) = caps.get(3) {
            InlineSpan::styled(m.as_str(), SpanStyle::Bold)
        } else if let Some(m) = caps.get(4) {
            InlineSpan::styled(m.as_str(), SpanStyle::Italic)
        } else if let Some(m) = caps.get(5) {
            InlineSpan::styled(m.as_str(), SpanStyle::Code)
        } else {
            InlineSpan::plain(whole.as_str())
        };
        spans.push(span);
        last_end = whole.end();
    }

    if last_end < text.len() {
        spans.push(InlineSpan::plain(&text[last_end..]));
    }
    if spans.is_empty() {
        spans.push(InlineSpan::plain(text));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_styles_in_order() {
        let spans = parse_inline("See [docs](http://x) for **bold** and *it* and `code`.");
        assert_eq!(
            spans,
            vec![
                InlineSpan::plain("See "),
                InlineSpan::styled("docs", SpanStyle::Link("http://x".to_string())),
                InlineSpan::plain(" for "),
                InlineSpan::styled("bold", SpanStyle::Bold),
                InlineSpan::plain(" and "),
                InlineSpan::styled("it", SpanStyle::Italic),
                InlineSpan::plain(" and "),
                InlineSpan::styled("code", SpanStyle::Code),
                InlineSpan::plain("."),
            ]
        );
    }

    #[test]
    fn plain_text_is_one_span() {
        assert_eq!(parse_inline("nothing special"), vec![InlineSpan::plain("nothing special")]);
    }

    #[test]
    fn empty_text_yields_one_empty_span() {
        assert_eq!(parse_inline(""), vec![InlineSpan::plain("")]);
    }

    #[test]
    fn bold_wins_over_italic() {
        let spans = parse_inline("**strong**");
        assert_eq!(spans, vec![InlineSpan::styled("strong", SpanStyle::Bold)]);
    }

    #[test]
    fn unbalanced_markers_stay_plain() {
        let spans = parse_inline("a * b and `c");
        assert_eq!(spans, vec![InlineSpan::plain("a * b and `c")]);
    }

    #[test]
    fn markup_inside_link_label_is_not_nested() {
        let spans = parse_inline("[**x**](http://y)");
        assert_eq!(
            spans,
            vec![InlineSpan::styled("**x**", SpanStyle::Link("http://y".to_string()))]
        );
    }
}
