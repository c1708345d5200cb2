//! Procedure detail panel.
//!
//! Six independent sub-sections. Each extractor returns an empty value when
//! its section is missing or malformed; none of them can fail the panel.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::related::parse_related;
use super::{selector, text_of, Fragments};
use crate::model::{DetailSections, PolicyNote, ProcedureAttributes, ServiceHistoryRow};

static CODE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Z]\d{4})\s*:").unwrap());

static PANEL_SEL: LazyLock<Selector> = LazyLock::new(|| selector("#benefitProcedurePanel"));
static HEADER_SEL: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static ATTRIBUTES_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("table#procedureDetailInfoTable1 tbody tr"));
static COST_SHARE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("table#procedureDetailInfoTable2 tbody td"));
static HISTORY_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("table#procedureServiceHistoryPanelList tbody tr"));
static POLICY_SEL: LazyLock<Selector> = LazyLock::new(|| selector("#policyDetails table tbody tr"));
static GLOSSARY_SEL: LazyLock<Selector> = LazyLock::new(|| selector("#proc-dictionary table tr"));
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| selector("span"));

/// The live detail panel of a response: `#benefitProcedurePanel` when the
/// portal renders one, otherwise the first island with a live `<h2>`.
pub fn live_panel(fragments: &Fragments) -> Option<ElementRef<'_>> {
    fragments
        .live(&PANEL_SEL)
        .or_else(|| fragments.live_island(&HEADER_SEL))
}

/// Procedure code in the panel header, e.g. `D0120` from
/// `<h2 class="h4">D0120: Periodic Evaluation</h2>`.
pub fn panel_code(panel: ElementRef<'_>) -> Option<String> {
    panel
        .select(&HEADER_SEL)
        .filter(|h| !super::is_hidden(*h))
        .find_map(|h| {
            CODE_HEADER_RE
                .captures(&text_of(h))
                .map(|caps| caps[1].to_string())
        })
}

/// Identifier the response actually carries.
pub fn returned_code(fragments: &Fragments) -> Option<String> {
    live_panel(fragments).and_then(panel_code)
}

/// All six sections of `panel`. `render` stamps the "More..." reference.
pub fn parse(panel: ElementRef<'_>, render: u64) -> DetailSections {
    DetailSections {
        attributes: attributes(panel),
        cost_share: cost_share(panel),
        related: parse_related(panel, render),
        service_history: service_history(panel),
        policy_notes: policy_notes(panel),
        glossary: glossary(panel),
    }
}

fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.select(&CELL_SEL).collect()
}

fn attributes(panel: ElementRef<'_>) -> Option<ProcedureAttributes> {
    let row = panel.select(&ATTRIBUTES_SEL).next()?;
    let c = cells(row);
    if c.len() < 6 {
        return None;
    }
    Some(ProcedureAttributes {
        covered: text_of(c[0]),
        allowance: text_of(c[1]),
        coverage: text_of(c[2]),
        limitations: text_of(c[3]),
        applies_to_deductible: text_of(c[4]),
        applies_to_maximum: text_of(c[5]),
    })
}

fn cost_share(panel: ElementRef<'_>) -> Option<String> {
    panel
        .select(&COST_SHARE_SEL)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

fn service_history(panel: ElementRef<'_>) -> Vec<ServiceHistoryRow> {
    panel
        .select(&HISTORY_SEL)
        .filter_map(|row| {
            let c = cells(row);
            (c.len() >= 4).then(|| ServiceHistoryRow {
                date_of_service: text_of(c[0]),
                procedure: text_of(c[1]),
                tooth: text_of(c[2]),
                surface: text_of(c[3]),
            })
        })
        .collect()
}

fn policy_notes(panel: ElementRef<'_>) -> Vec<PolicyNote> {
    panel
        .select(&POLICY_SEL)
        .filter_map(|row| {
            let c = cells(row);
            (c.len() >= 2).then(|| PolicyNote {
                policy_type: text_of(c[0]),
                description: text_of(c[1]),
            })
        })
        .collect()
}

fn glossary(panel: ElementRef<'_>) -> BTreeMap<String, String> {
    let mut terms = BTreeMap::new();
    for row in panel.select(&GLOSSARY_SEL) {
        let c = cells(row);
        if c.len() < 2 {
            continue;
        }
        let key = text_of(c[0]);
        // the definition sits in a span when present
        let value = c[1]
            .select(&SPAN_SEL)
            .next()
            .map(text_of)
            .unwrap_or_else(|| text_of(c[1]));
        if !key.is_empty() && !value.is_empty() {
            terms.insert(key, value);
        }
    }
    terms
}
