use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{expand_category, expand_related, fetch_detail, reset_to_baseline, Layout, Phase};
use crate::error::{Aborted, ExtractError};
use crate::model::{
    CategoryResult, ExtractionResult, ItemKey, ProcedureDetail, ProcedureEntry, ProcedureSummary,
    RelatedItems,
};
use crate::parser::baseline::{BaselineSnapshot, CategoryNode};
use crate::retry::RetryPolicy;
use crate::session::SessionContext;
use crate::transport::Transport;

/// Sequences resets, expansions and detail fetches over the whole tree.
///
/// Categories and their items are visited in discovered order and the
/// session returns to the baseline view between any two items and between
/// categories. Cancellation is only observed there.
pub struct Orchestrator<T> {
    ctx: SessionContext<T>,
    layout: Layout,
    policy: RetryPolicy,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
    phase: Phase,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(ctx: SessionContext<T>, layout: Layout, policy: RetryPolicy) -> Self {
        Self {
            ctx,
            layout,
            policy,
            cancel: CancellationToken::new(),
            progress: None,
            phase: Phase::Baseline,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &SessionContext<T> {
        &self.ctx
    }

    pub fn into_session(self) -> SessionContext<T> {
        self.ctx
    }

    /// Categories listed on a fresh baseline render.
    pub async fn categories(&mut self) -> Result<Vec<CategoryNode>, ExtractError> {
        Ok(self.rebaseline().await?.categories)
    }

    /// Walk every category and item.
    pub async fn run(&mut self) -> Result<ExtractionResult, Aborted> {
        let mut result = ExtractionResult::new();

        let total = match self.rebaseline().await {
            Ok(snapshot) => snapshot.categories.len(),
            Err(source) => return Err(Aborted { source, partial: result }),
        };
        info!(categories = total, "Starting extraction");

        for ordinal in 0..total {
            if let Err(source) = self.extract_category(ordinal, &mut result).await {
                return Err(self.abort(source, result));
            }
        }

        self.report(&result);
        Ok(result)
    }

    /// Walk a single category, e.g. to re-run one that came back degraded.
    pub async fn run_category(&mut self, ordinal: usize) -> Result<ExtractionResult, Aborted> {
        let mut result = ExtractionResult::new();
        if let Err(source) = self.rebaseline().await {
            return Err(Aborted { source, partial: result });
        }
        if let Err(source) = self.extract_category(ordinal, &mut result).await {
            return Err(self.abort(source, result));
        }
        self.report(&result);
        Ok(result)
    }

    async fn extract_category(
        &mut self,
        ordinal: usize,
        result: &mut ExtractionResult,
    ) -> Result<(), ExtractError> {
        self.checkpoint()?;
        if self.phase != Phase::Baseline || self.ctx.baseline().is_none() {
            self.rebaseline().await?;
        }
        let node = self.live_category(ordinal)?;

        let summaries = self.expand(node.clone()).await?;
        self.phase.advance(Phase::CategoryExpanded)?;
        if let Some(pb) = &self.progress {
            pb.inc_length(summaries.len() as u64);
            pb.set_message(node.name.clone());
        }

        let mut category = CategoryResult {
            name: node.name.clone(),
            ordinal,
            summary_count: summaries.len(),
            procedures: Vec::with_capacity(summaries.len()),
        };

        let outcome = if summaries.is_empty() {
            info!(category = node.name.as_str(), "Category has no procedures");
            self.rebaseline().await.map(|_| ())
        } else {
            self.extract_items(&node, summaries, &mut category).await
        };

        if outcome.is_ok() || !category.procedures.is_empty() {
            result.push(category);
        }
        outcome
    }

    async fn extract_items(
        &mut self,
        node: &CategoryNode,
        summaries: Vec<ProcedureSummary>,
        category: &mut CategoryResult,
    ) -> Result<(), ExtractError> {
        for (item, summary) in summaries.into_iter().enumerate() {
            if item > 0 {
                self.checkpoint()?;
                // The category stays expanded across the reset.
                self.phase.advance(Phase::CategoryExpanded)?;
            }

            let key = ItemKey {
                category: node.ordinal,
                item,
            };
            let detail =
                fetch_detail(&mut self.ctx, &self.layout, key, &summary.code, &self.policy).await?;

            let detail = match detail {
                Some(mut detail) => {
                    self.phase.advance(Phase::ItemVerified)?;
                    self.complete_related(key, &mut detail).await?;
                    self.phase.advance(Phase::ItemDetailed)?;
                    Some(detail)
                }
                None => {
                    self.phase.advance(Phase::ItemDegraded)?;
                    warn!(
                        category = node.name.as_str(),
                        code = summary.code.as_str(),
                        "Keeping summary only"
                    );
                    None
                }
            };
            debug!(code = summary.code.as_str(), detailed = detail.is_some(), "Item done");
            category.procedures.push(ProcedureEntry { summary, detail });

            self.rebaseline().await?;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }
        Ok(())
    }

    /// Replace a truncated related stub with the full list.
    ///
    /// A timed-out "More..." click is retried from a fresh baseline: the
    /// detail panel is fetched and verified again, then clicked again. Once
    /// the transport budget is spent the fault ends the run. A JSF error or a
    /// malformed answer keeps the stub.
    async fn complete_related(
        &mut self,
        key: ItemKey,
        detail: &mut ProcedureDetail,
    ) -> Result<(), ExtractError> {
        let attempts = self.policy.attempts();
        let mut faults = 0;
        loop {
            let RelatedItems::Stub {
                labels,
                more: Some(more),
            } = &detail.sections.related
            else {
                return Ok(());
            };

            match expand_related(&mut self.ctx, &self.layout, more, labels).await {
                Ok(full) => {
                    detail.sections.related = RelatedItems::Full { labels: full };
                    return Ok(());
                }
                Err(err) if err.is_transport_fault() => {
                    faults += 1;
                    if faults >= attempts {
                        return Err(err);
                    }
                    warn!(
                        code = detail.verified_code(),
                        attempt = faults,
                        attempts,
                        error = %err,
                        "Related expansion outcome unknown"
                    );
                }
                Err(err) if err.is_unknown_outcome() => {
                    warn!(
                        code = detail.verified_code(),
                        error = %err,
                        "Related expansion failed, keeping stub"
                    );
                    return Ok(());
                }
                Err(err) => return Err(err),
            }

            self.policy.wait_before(faults + 1).await;
            reset_to_baseline(&mut self.ctx, &self.layout).await?;
            let code = detail.verified_code().to_string();
            match fetch_detail(&mut self.ctx, &self.layout, key, &code, &self.policy).await? {
                Some(fresh) => *detail = fresh,
                None => {
                    warn!(code = code.as_str(), "Detail lost on related retry, keeping stub");
                    return Ok(());
                }
            }
        }
    }

    /// Expand with recovery: an unknown outcome re-baselines and clicks the
    /// freshly discovered header again, within the retry budget.
    async fn expand(&mut self, mut node: CategoryNode) -> Result<Vec<ProcedureSummary>, ExtractError> {
        let attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            match expand_category(&mut self.ctx, &self.layout, &node).await {
                Ok(summaries) => return Ok(summaries),
                Err(err) if err.is_unknown_outcome() && attempt < attempts => {
                    warn!(
                        category = node.name.as_str(),
                        attempt,
                        attempts,
                        error = %err,
                        "Category expansion outcome unknown"
                    );
                }
                Err(err) => return Err(err),
            }
            attempt += 1;
            self.policy.wait_before(attempt).await;
            self.rebaseline().await?;
            node = self.live_category(node.ordinal)?;
        }
    }

    async fn rebaseline(&mut self) -> Result<BaselineSnapshot, ExtractError> {
        let snapshot = reset_to_baseline(&mut self.ctx, &self.layout).await?;
        self.phase.advance(Phase::Baseline)?;
        Ok(snapshot)
    }

    fn live_category(&self, ordinal: usize) -> Result<CategoryNode, ExtractError> {
        self.ctx
            .baseline()
            .and_then(|b| b.category(ordinal))
            .cloned()
            .ok_or(ExtractError::CategoryMissing(ordinal))
    }

    fn checkpoint(&self) -> Result<(), ExtractError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        Ok(())
    }

    fn abort(&self, source: ExtractError, partial: ExtractionResult) -> Aborted {
        warn!(
            error = %source,
            phase = ?self.phase,
            categories = partial.stats.categories,
            procedures = partial.stats.procedures,
            "Extraction aborted"
        );
        Aborted { source, partial }
    }

    fn report(&self, result: &ExtractionResult) {
        let stats = &result.stats;
        info!(
            categories = stats.categories,
            procedures = stats.procedures,
            detailed = stats.detailed,
            degraded = stats.degraded,
            "Extraction finished"
        );
        if !stats.degraded_codes.is_empty() {
            warn!(codes = ?stats.degraded_codes, "Items degraded to summary only");
        }
    }
}
