//! Main-content extraction from HTML pages.
//!
//! Looks for the page's content region (`<article>`, `<main>`,
//! `[role="main"]`) and falls back to `<body>`. Navigation, chrome, scripts
//! and forms are skipped; whitespace is collapsed.

use insight_core::research::ContentExtractor;
use scraper::{ElementRef, Html, Node, Selector};

/// Content regions tried in order before falling back to `<body>`.
const CONTENT_REGIONS: &[&str] = &["article", "main", "[role=\"main\"]"];

/// A content region shorter than this is ignored in favour of the next one.
const MIN_REGION_CHARS: usize = 100;

const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "noscript", "svg", "aside", "form", "iframe",
    "template", "button",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "td", "th", "article",
    "section", "main", "blockquote", "pre", "figcaption", "dt", "dd", "table", "ul", "ol",
];

/// Markers that identify a document as HTML rather than plain text.
const HTML_MARKERS: &[&str] = &["<!doctype", "<html", "<body", "<div", "<p>", "<p "];

/// `scraper`-based [`ContentExtractor`].
///
/// Input without any markup is treated as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainContentExtractor;

impl MainContentExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ContentExtractor for MainContentExtractor {
    fn extract(&self, raw: &str) -> Option<String> {
        let text = if looks_like_html(raw) {
            html_to_text(raw)
        } else {
            collapse_whitespace(raw)
        };
        (!text.is_empty()).then_some(text)
    }
}

fn looks_like_html(raw: &str) -> bool {
    let head = raw.chars().take(1024).collect::<String>().to_ascii_lowercase();
    HTML_MARKERS.iter().any(|m| head.contains(m))
}

/// Parse HTML and return its readable text.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    for region in CONTENT_REGIONS {
        if let Ok(selector) = Selector::parse(region)
            && let Some(el) = doc.select(&selector).next()
        {
            let text = element_text(&el);
            if text.chars().count() >= MIN_REGION_CHARS {
                return text;
            }
        }
    }

    if let Ok(selector) = Selector::parse("body")
        && let Some(body) = doc.select(&selector).next()
    {
        return element_text(&body);
    }

    element_text(&doc.root_element())
}

fn element_text(el: &ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(el, &mut buf);
    collapse_whitespace(&buf)
}

fn collect_text(node: &ElementRef<'_>, buf: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(el) => {
                let tag = el.name();
                if SKIP_TAGS.contains(&tag) {
                    continue;
                }
                let is_block = BLOCK_TAGS.contains(&tag);
                if is_block {
                    buf.push('\n');
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(&child_ref, buf);
                }
                if is_block {
                    buf.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace within lines and squeeze blank-line runs to one.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && out.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
