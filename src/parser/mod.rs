//! Selector-based reading of partial-response fragments.
//!
//! A single response may carry several copies of the same data island,
//! e.g. a hidden stale table next to the live one. Lookups here always
//! return the first instance, in document order, that is not hidden.

pub mod baseline;
pub mod detail;
pub mod procedures;
pub mod related;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::wire::PartialResponse;

static ONCLICK_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"getElementById\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Parsed HTML islands of one response.
pub struct Fragments {
    docs: Vec<Html>,
}

impl Fragments {
    pub fn from_response(response: &PartialResponse) -> Self {
        Self {
            docs: response
                .updates
                .iter()
                .map(|u| Html::parse_fragment(&u.content))
                .collect(),
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self {
            docs: vec![Html::parse_document(html)],
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// First live element matching `selector`.
    pub fn live(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.docs
            .iter()
            .flat_map(|doc| doc.select(selector))
            .find(|el| !is_hidden(*el))
    }

    /// Every live element matching `selector`, in document order.
    pub fn live_all<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.docs
            .iter()
            .flat_map(move |doc| doc.select(selector))
            .filter(|el| !is_hidden(*el))
    }

    /// Root of the first island holding a live match for `selector`.
    pub fn live_island(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.docs
            .iter()
            .find(|doc| doc.select(selector).any(|el| !is_hidden(el)))
            .map(|doc| doc.root_element())
    }
}

/// Hidden by class, `hidden` attribute, or inline `display:none`, on the
/// element itself or any ancestor.
pub fn is_hidden(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| {
            let v = e.value();
            v.classes().any(|c| c.eq_ignore_ascii_case("hidden"))
                || v.attr("hidden").is_some()
                || v.attr("style").is_some_and(|s| {
                    s.replace(char::is_whitespace, "")
                        .to_ascii_lowercase()
                        .contains("display:none")
                })
        })
}

/// Visible text with runs of whitespace collapsed to single spaces.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Procedure labels come rendered as `D0120 - Periodic evaluation >`.
pub fn strip_chevrons(s: &str) -> String {
    s.replace('>', "").trim().to_string()
}

/// Component id a JSF command link clicks, read from its `onclick`.
pub fn onclick_target(el: ElementRef<'_>) -> Option<String> {
    let onclick = el.value().attr("onclick")?;
    ONCLICK_TARGET_RE
        .captures(onclick)
        .map(|caps| caps[1].to_string())
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}
