use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{selector, text_of};
use crate::model::{RenderRef, SessionToken};

static VIEW_STATE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"input[name="javax.faces.ViewState"]"#));
static HEADER_SEL: LazyLock<Selector> = LazyLock::new(|| selector("table[id][onclick]"));
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static PLUS_SEL: LazyLock<Selector> = LazyLock::new(|| selector(".glyphicon-plus"));
static MINUS_SEL: LazyLock<Selector> = LazyLock::new(|| selector(".glyphicon-minus"));

/// A benefit category header on the baseline render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub name: String,
    pub ordinal: usize,
    pub expand_ref: RenderRef,
    pub expanded: bool,
}

/// Category listing of the baseline view, tied to the render it was read in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineSnapshot {
    pub render: u64,
    pub view_state: Option<SessionToken>,
    pub categories: Vec<CategoryNode>,
}

impl BaselineSnapshot {
    pub fn parse(page: &str, render: u64, category_ref: &Regex) -> Self {
        let html = Html::parse_document(page);
        let mut categories = Vec::new();

        for table in html.select(&HEADER_SEL) {
            let (Some(id), Some(onclick)) = (table.value().id(), table.value().attr("onclick")) else {
                continue;
            };
            if !category_ref.is_match(id) || !onclick.contains("jsf.ajax.request") {
                continue;
            }
            let Some((name, expanded)) = header_label(table) else {
                continue;
            };
            categories.push(CategoryNode {
                name,
                ordinal: categories.len(),
                expand_ref: RenderRef::new(id, render),
                expanded,
            });
        }

        Self {
            render,
            view_state: view_state_in(&html),
            categories,
        }
    }

    pub fn category(&self, ordinal: usize) -> Option<&CategoryNode> {
        self.categories.get(ordinal)
    }

    pub fn expanded_ordinal(&self) -> Option<usize> {
        self.categories.iter().find(|c| c.expanded).map(|c| c.ordinal)
    }

    pub fn names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }
}

/// Name and expanded flag from the first cell carrying a +/− glyph.
fn header_label(table: ElementRef<'_>) -> Option<(String, bool)> {
    for td in table.select(&CELL_SEL) {
        let expanded = if td.select(&MINUS_SEL).next().is_some() {
            true
        } else if td.select(&PLUS_SEL).next().is_some() {
            false
        } else {
            continue;
        };
        let name = text_of(td)
            .trim_matches(|c: char| c == '+' || c == '-' || c == '\u{2212}' || c.is_whitespace())
            .to_string();
        if name.is_empty() {
            return None;
        }
        return Some((name, expanded));
    }
    None
}

/// Hidden `javax.faces.ViewState` input of a full page.
pub fn view_state(page: &str) -> Option<SessionToken> {
    view_state_in(&Html::parse_document(page))
}

fn view_state_in(html: &Html) -> Option<SessionToken> {
    html.select(&VIEW_STATE_SEL)
        .filter_map(|input| input.value().attr("value"))
        .find(|v| !v.is_empty())
        .map(SessionToken::new)
}
