//! Traversal of the benefits tree: reset, category expansion, per-item
//! detail fetch with identity verification, related expansion, and the
//! orchestrator that sequences them.

pub mod category;
pub mod navigator;
pub mod orchestrator;
pub mod related;
pub mod reset;

use std::ops::Deref;

use regex::Regex;

use crate::config::PortalLayout;
use crate::error::ExtractError;

pub use category::expand_category;
pub use navigator::fetch_detail;
pub use orchestrator::Orchestrator;
pub use related::expand_related;
pub use reset::{refresh_baseline, reset_to_baseline};

/// Where the orchestrator stands relative to the server-side view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Baseline,
    CategoryExpanded,
    ItemVerified,
    ItemDetailed,
    ItemDegraded,
}

impl Phase {
    pub fn can_advance(self, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, to),
            (Baseline, Baseline)
                | (Baseline, CategoryExpanded)
                | (CategoryExpanded, ItemVerified)
                | (CategoryExpanded, ItemDegraded)
                | (CategoryExpanded, Baseline)
                | (ItemVerified, ItemDetailed)
                | (ItemDetailed, Baseline)
                | (ItemDegraded, Baseline)
        )
    }

    pub fn advance(&mut self, to: Phase) -> Result<(), ExtractError> {
        if !self.can_advance(to) {
            return Err(ExtractError::IllegalTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

/// [`PortalLayout`] with its category reference pattern compiled.
#[derive(Debug, Clone)]
pub struct Layout {
    inner: PortalLayout,
    category_ref: Regex,
}

impl Layout {
    pub fn new(inner: PortalLayout) -> Result<Self, regex::Error> {
        let category_ref = Regex::new(&inner.category_ref_pattern)?;
        Ok(Self {
            inner,
            category_ref,
        })
    }

    pub fn category_ref(&self) -> &Regex {
        &self.category_ref
    }
}

impl Deref for Layout {
    type Target = PortalLayout;

    fn deref(&self) -> &PortalLayout {
        &self.inner
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(PortalLayout::default()).unwrap()
    }
}
