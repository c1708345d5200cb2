use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::{onclick_target, selector, strip_chevrons, text_of, Fragments};
use crate::model::{RelatedItems, RenderRef};

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]\d{4}\b").unwrap());

static CONTAINER_SEL: LazyLock<Selector> = LazyLock::new(|| selector("#proc-related-procedures"));
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| selector(r##"a[href="#"]"##));
static CONTROL_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a, button, input[type=submit]"));

/// Related procedures inside a detail panel, as a stub that may point at a
/// "More..." control.
pub fn parse_related(panel: ElementRef<'_>, render: u64) -> RelatedItems {
    let Some(container) = panel
        .select(&CONTAINER_SEL)
        .find(|el| !super::is_hidden(*el))
    else {
        return RelatedItems::default();
    };
    RelatedItems::Stub {
        labels: labels_in(container),
        more: more_control(container).map(|id| RenderRef::new(id, render)),
    }
}

/// Full list from the response to a "More..." click.
pub fn parse_expanded(fragments: &Fragments) -> Vec<String> {
    match fragments.live(&CONTAINER_SEL) {
        Some(container) => labels_in(container),
        None => fragments
            .live_island(&LINK_SEL)
            .map(labels_in)
            .unwrap_or_default(),
    }
}

fn labels_in(scope: ElementRef<'_>) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for link in scope.select(&LINK_SEL) {
        if super::is_hidden(link) {
            continue;
        }
        let label = strip_chevrons(&text_of(link));
        if LABEL_RE.is_match(&label) && !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Component id behind the "More..." control: the `getElementById` target of
/// its onclick, else its own id.
fn more_control(scope: ElementRef<'_>) -> Option<String> {
    scope
        .select(&CONTROL_SEL)
        .filter(|el| !super::is_hidden(*el))
        .filter(|el| is_more_label(&control_text(*el)))
        .find_map(|el| onclick_target(el).or_else(|| el.value().id().map(str::to_string)))
}

fn control_text(el: ElementRef<'_>) -> String {
    match el.value().attr("value") {
        Some(v) if el.value().name() == "input" => v.to_string(),
        _ => text_of(el),
    }
}

fn is_more_label(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("more") && (lower.contains("...") || lower.contains('\u{2026}'))
}

/// Union of the visible stub and the expanded list. Expanded order wins;
/// stub labels the expanded list lacks are appended so nothing seen is lost.
pub fn merge_related(stub: &[String], full: Vec<String>) -> Vec<String> {
    let mut merged = full;
    for label in stub {
        if !merged.contains(label) {
            merged.push(label.clone());
        }
    }
    merged
}
