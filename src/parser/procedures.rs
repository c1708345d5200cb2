use std::sync::LazyLock;

use scraper::Selector;
use tracing::{debug, warn};

use super::{selector, strip_chevrons, text_of, Fragments};
use crate::model::ProcedureSummary;

const MIN_CELLS: usize = 8;

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector("table#benefitDetailAllServiceProceduresList"));
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| selector("tbody > tr"));
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a"));

/// Procedure rows of the live category table.
///
/// Columns: code, name link, covered, allowance, coverage, limitation,
/// applies to deductible, applies to maximum. Short rows are skipped.
pub fn parse_procedure_table(fragments: &Fragments, category: &str) -> Vec<ProcedureSummary> {
    let Some(table) = fragments.live(&TABLE_SEL) else {
        warn!(category, islands = fragments.len(), "No visible procedure table in response");
        return Vec::new();
    };

    let mut procedures = Vec::new();
    for row in table.select(&ROW_SEL) {
        let cells: Vec<_> = row.select(&CELL_SEL).collect();
        if cells.len() < MIN_CELLS {
            continue;
        }
        let code = text_of(cells[0]);
        if code.is_empty() {
            continue;
        }
        let name = cells[1]
            .select(&LINK_SEL)
            .next()
            .map(text_of)
            .unwrap_or_else(|| text_of(cells[1]));

        debug!(category, code = code.as_str(), allowance = %text_of(cells[3]), "Procedure row");
        procedures.push(ProcedureSummary {
            code,
            name: strip_chevrons(&name),
            category: category.to_string(),
            covered: text_of(cells[2]),
            allowance: text_of(cells[3]),
            coverage: text_of(cells[4]),
            limitation: text_of(cells[5]),
            applies_to_deductible: text_of(cells[6]),
            applies_to_maximum: text_of(cells[7]),
        });
    }
    procedures
}
