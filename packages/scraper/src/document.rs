//! Parsed HTML documents.
//!
//! [`ParsedDocument`] wraps [`scraper::Html`]. It is not `Send`, so parse,
//! query and drop it inside a synchronous block rather than holding it
//! across an `.await`.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use crate::ScrapeError;

/// A parsed HTML document supporting selector lookup.
pub struct ParsedDocument {
    html: Html,
}

impl ParsedDocument {
    /// Parses a full HTML document. Malformed markup is repaired rather than
    /// rejected, as browsers do.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            html: Html::parse_document(raw),
        }
    }

    /// First element matching `selector` in document order.
    #[must_use]
    pub fn select_first(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.html.select(selector).next()
    }

    /// Every element matching `selector` in document order.
    #[must_use]
    pub fn select_all(&self, selector: &Selector) -> Vec<ElementRef<'_>> {
        self.html.select(selector).collect()
    }

    /// Whether any element matches `selector`.
    #[must_use]
    pub fn contains(&self, selector: &Selector) -> bool {
        self.select_first(selector).is_some()
    }

    /// The underlying parse tree.
    #[must_use]
    pub const fn html(&self) -> &Html {
        &self.html
    }
}

/// Parses a CSS selector string.
///
/// # Errors
///
/// Returns [`ScrapeError::Selector`] when the selector is not valid CSS.
pub fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_owned(),
        message: e.to_string(),
    })
}

/// Collapses runs of whitespace (including non-breaking spaces) into single
/// spaces and trims the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text content of `element`, whitespace-collapsed.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text content of `element` leaving out any descendant matching `exclude`.
///
/// Used for titles that embed a badge (e.g. `<h1>Prosecco <span>75cl</span></h1>`).
#[must_use]
pub fn element_text_excluding(element: ElementRef<'_>, exclude: &Selector) -> String {
    let excluded: HashSet<_> = element
        .select(exclude)
        .flat_map(|child| child.descendants().map(|node| node.id()))
        .collect();

    let mut text = String::new();
    for node in element.descendants() {
        if excluded.contains(&node.id()) {
            continue;
        }
        if let Some(fragment) = node.value().as_text() {
            text.push_str(fragment);
        }
    }

    collapse_whitespace(&text)
}

/// Attribute `name` of `element`, trimmed. Empty values count as absent.
#[must_use]
pub fn element_attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="bop-title"><h1>  Freixenet
              Prosecco <span>75cl</span></h1></div>
          <ul><li><a href="/a">A</a></li><li><a href=" /b ">B</a></li></ul>
          <meta itemprop="reviewCount" content="">
        </body></html>
    "#;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b\u{a0}c  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn selects_first_and_all() {
        let doc = ParsedDocument::parse(PAGE);
        let links = parse_selector("li a").unwrap();
        assert_eq!(doc.select_all(&links).len(), 2);
        let first = doc.select_first(&links).unwrap();
        assert_eq!(element_text(first), "A");
        assert!(!doc.contains(&parse_selector("table").unwrap()));
    }

    #[test]
    fn text_excluding_child_badge() {
        let doc = ParsedDocument::parse(PAGE);
        let title = doc
            .select_first(&parse_selector(".bop-title h1").unwrap())
            .unwrap();
        let span = parse_selector("span").unwrap();
        assert_eq!(element_text_excluding(title, &span), "Freixenet Prosecco");
        assert_eq!(element_text(title), "Freixenet Prosecco 75cl");
    }

    #[test]
    fn attributes_are_trimmed_and_empty_is_absent() {
        let doc = ParsedDocument::parse(PAGE);
        let second = doc.select_all(&parse_selector("li a").unwrap())[1];
        assert_eq!(element_attr(second, "href").as_deref(), Some("/b"));
        let meta = doc
            .select_first(&parse_selector("meta[itemprop='reviewCount']").unwrap())
            .unwrap();
        assert!(element_attr(meta, "content").is_none());
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = parse_selector("div[").unwrap_err();
        assert!(matches!(err, ScrapeError::Selector { ref selector, .. } if selector == "div["));
    }
}
