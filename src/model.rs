use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Opaque continuation token ("ViewState") issued by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines; tokens run to several kilobytes.
    pub fn preview(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(16)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A component id that is only valid for the render that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRef {
    pub id: String,
    pub render: u64,
}

impl RenderRef {
    pub fn new(id: impl Into<String>, render: u64) -> Self {
        Self {
            id: id.into(),
            render,
        }
    }
}

/// Position of a procedure inside the current baseline render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub category: usize,
    pub item: usize,
}

/// One row of an expanded category table. Cheap to obtain and always kept,
/// even when the detail fetch fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureSummary {
    pub code: String,
    pub name: String,
    pub category: String,
    pub covered: String,
    pub allowance: String,
    pub coverage: String,
    pub limitation: String,
    pub applies_to_deductible: String,
    pub applies_to_maximum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcedureAttributes {
    pub covered: String,
    pub allowance: String,
    pub coverage: String,
    pub limitations: String,
    pub applies_to_deductible: String,
    pub applies_to_maximum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHistoryRow {
    pub date_of_service: String,
    pub procedure: String,
    pub tooth: String,
    pub surface: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyNote {
    pub policy_type: String,
    pub description: String,
}

/// Related procedures as rendered on the detail panel. The portal truncates
/// long lists behind a "More..." control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelatedItems {
    Stub {
        labels: Vec<String>,
        #[serde(skip)]
        more: Option<RenderRef>,
    },
    Full {
        labels: Vec<String>,
    },
}

impl Default for RelatedItems {
    fn default() -> Self {
        Self::Stub {
            labels: Vec::new(),
            more: None,
        }
    }
}

impl RelatedItems {
    pub fn labels(&self) -> &[String] {
        match self {
            Self::Stub { labels, .. } | Self::Full { labels } => labels,
        }
    }

    pub fn more(&self) -> Option<&RenderRef> {
        match self {
            Self::Stub { more, .. } => more.as_ref(),
            Self::Full { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailSections {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ProcedureAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_share: Option<String>,
    pub related: RelatedItems,
    pub service_history: Vec<ServiceHistoryRow>,
    pub policy_notes: Vec<PolicyNote>,
    pub glossary: BTreeMap<String, String>,
}

/// Detail panel for a procedure whose identity was checked against the
/// requested code. There is no public constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureDetail {
    verified_code: String,
    #[serde(flatten)]
    pub sections: DetailSections,
}

impl ProcedureDetail {
    pub(crate) fn verified(code: impl Into<String>, sections: DetailSections) -> Self {
        Self {
            verified_code: code.into(),
            sections,
        }
    }

    pub fn verified_code(&self) -> &str {
        &self.verified_code
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureEntry {
    #[serde(flatten)]
    pub summary: ProcedureSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ProcedureDetail>,
}

impl ProcedureEntry {
    pub fn is_degraded(&self) -> bool {
        self.detail.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryResult {
    #[serde(skip)]
    pub name: String,
    pub ordinal: usize,
    pub summary_count: usize,
    pub procedures: Vec<ProcedureEntry>,
}

impl CategoryResult {
    pub fn degraded(&self) -> impl Iterator<Item = &ProcedureEntry> {
        self.procedures.iter().filter(|p| p.is_degraded())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub categories: usize,
    pub procedures: usize,
    pub detailed: usize,
    pub degraded: usize,
    pub degraded_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub extracted_at: DateTime<Utc>,
    pub stats: RunStats,
    #[serde(serialize_with = "categories_by_name")]
    pub categories: Vec<CategoryResult>,
}

impl Default for ExtractionResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self {
            extracted_at: Utc::now(),
            stats: RunStats::default(),
            categories: Vec::new(),
        }
    }

    pub fn push(&mut self, category: CategoryResult) {
        self.stats.categories += 1;
        self.stats.procedures += category.procedures.len();
        for entry in &category.procedures {
            if entry.is_degraded() {
                self.stats.degraded += 1;
                self.stats.degraded_codes.push(entry.summary.code.clone());
            } else {
                self.stats.detailed += 1;
            }
        }
        self.categories.push(category);
    }

    pub fn category(&self, name: &str) -> Option<&CategoryResult> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// `(category, code)` pairs in the order they were visited.
    pub fn visit_order(&self) -> Vec<(String, String)> {
        self.categories
            .iter()
            .flat_map(|c| {
                c.procedures
                    .iter()
                    .map(move |p| (c.name.clone(), p.summary.code.clone()))
            })
            .collect()
    }
}

// Categories are a JSON object keyed by name, in discovery order.
fn categories_by_name<S: Serializer>(
    categories: &[CategoryResult],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(categories.len()))?;
    for category in categories {
        map.serialize_entry(&category.name, category)?;
    }
    map.end()
}
