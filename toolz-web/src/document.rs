//! Lenient HTML parsing plus the static facts we read off the tree.
//!
//! `scraper::Html` is not `Send`; keep a [`ParsedDocument`] inside a
//! synchronous scope and carry only the extracted values across awaits.

use scraper::{ElementRef, Html};
use serde::Serialize;

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

pub struct ParsedDocument {
    html: Html,
}

impl ParsedDocument {
    /// Never fails; malformed markup is repaired the way browsers do it.
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    /// Every element in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }

    fn first(&self, name: &str) -> Option<ElementRef<'_>> {
        self.elements().find(|el| el.value().name() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticMetadata {
    pub title: String,
    pub description: String,
    pub og_image: String,
}

pub fn extract_metadata(doc: &ParsedDocument) -> StaticMetadata {
    let title = doc
        .first("title")
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();
    StaticMetadata {
        title,
        description: meta_content(doc, "name", "description"),
        og_image: meta_content(doc, "property", "og:image"),
    }
}

fn meta_content(doc: &ParsedDocument, key: &str, value: &str) -> String {
    doc.elements()
        .filter(|el| el.value().name() == "meta")
        .find(|el| el.value().attr(key) == Some(value))
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
        .unwrap_or_default()
}

/// Elements that start a new line of visible text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "td", "th", "tr", "ul",
];

/// Text a reader would see in `<body>`. Inline runs share a line; each
/// block element starts a new one.
pub fn visible_text(doc: &ParsedDocument) -> String {
    let mut lines = TextLines::default();
    if let Some(body) = doc.first("body") {
        collect_text(body, &mut lines);
    }
    lines.finish().join("\n")
}

#[derive(Default)]
struct TextLines {
    current: String,
    done: Vec<String>,
}

impl TextLines {
    fn break_line(&mut self) {
        let line = collapse_whitespace(&self.current);
        if !line.is_empty() {
            self.done.push(line);
        }
        self.current.clear();
    }

    fn finish(mut self) -> Vec<String> {
        self.break_line();
        self.done
    }
}

fn collect_text(el: ElementRef<'_>, out: &mut TextLines) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.current.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if HIDDEN_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.break_line();
            }
            collect_text(child_el, out);
            if block {
                out.break_line();
            }
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
