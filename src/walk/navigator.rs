use tracing::{debug, info, warn};

use super::{expand_category, reset_to_baseline, Layout};
use crate::error::ExtractError;
use crate::model::{DetailSections, ItemKey, ProcedureDetail};
use crate::parser::{detail, Fragments};
use crate::retry::RetryPolicy;
use crate::session::SessionContext;
use crate::transport::Transport;
use crate::wire::{AjaxRequest, PartialResponse};

enum Identity {
    Verified(DetailSections),
    Mismatch(Option<String>),
}

/// Fetch the detail panel of the `key.item`-th procedure of `key.category`
/// and accept it only if it carries `expected_code`.
///
/// Items are addressed by position within the current render, never by
/// code. Every failed try is followed by a wait, a reset and a forced
/// re-expansion of the category. Two budgets of `policy.attempts()` apply:
///
/// - desync (a panel for another procedure, or a JSF error or malformed
///   answer): once spent, give up with `Ok(None)` and keep the summary;
/// - transport faults (timeout, HTTP status): once spent, the fault is
///   returned and the run stops.
///
/// Reset faults and connection failures end the fetch with an error at once.
pub async fn fetch_detail<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
    key: ItemKey,
    expected_code: &str,
    policy: &RetryPolicy,
) -> Result<Option<ProcedureDetail>, ExtractError> {
    let attempts = policy.attempts();
    let mut mismatches = 0;
    let mut faults = 0;

    loop {
        let tries = mismatches + faults;
        if tries > 0 {
            policy.wait_before(tries + 1).await;
            reset_to_baseline(ctx, layout).await?;
        }

        match try_item(ctx, layout, key, expected_code, tries > 0).await {
            Ok(Identity::Verified(sections)) => {
                debug!(code = expected_code, tries = tries + 1, "Identity verified");
                return Ok(Some(ProcedureDetail::verified(expected_code, sections)));
            }
            Ok(Identity::Mismatch(returned)) => {
                mismatches += 1;
                warn!(
                    expected = expected_code,
                    returned = returned.as_deref().unwrap_or("<none>"),
                    category = key.category,
                    item = key.item,
                    attempt = mismatches,
                    attempts,
                    "Detail response belongs to another procedure"
                );
            }
            Err(err) if err.is_transport_fault() => {
                faults += 1;
                if faults >= attempts {
                    warn!(code = expected_code, faults, error = %err, "Detail request keeps failing");
                    return Err(err);
                }
                warn!(
                    code = expected_code,
                    attempt = faults,
                    attempts,
                    error = %err,
                    "Detail request outcome unknown"
                );
            }
            Err(err) if err.is_unknown_outcome() => {
                mismatches += 1;
                warn!(
                    code = expected_code,
                    attempt = mismatches,
                    attempts,
                    error = %err,
                    "Portal rejected detail request"
                );
            }
            Err(err) => return Err(err),
        }

        if mismatches >= attempts {
            info!(code = expected_code, attempts, "Giving up on detail, keeping summary");
            return Ok(None);
        }
    }
}

async fn try_item<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
    key: ItemKey,
    expected_code: &str,
    reexpand: bool,
) -> Result<Identity, ExtractError> {
    ensure_expanded(ctx, layout, key.category, reexpand).await?;

    let category_ref = ctx
        .latest_baseline()
        .and_then(|b| b.category(key.category))
        .map(|node| node.expand_ref.id.clone())
        .ok_or(ExtractError::CategoryMissing(key.category))?;
    let request = AjaxRequest::action(
        layout.item_source(&category_ref, key.item),
        &layout.detail_render,
    );
    debug!(source = request.source.as_str(), code = expected_code, "Requesting detail");

    let response = ctx.submit(&request).await?;
    Ok(verify(&response, expected_code, ctx.render()))
}

/// Make sure `category` is the one expanded server-side. With `force`, or
/// when the session state is in doubt, click it again from a fresh baseline.
async fn ensure_expanded<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
    category: usize,
    force: bool,
) -> Result<(), ExtractError> {
    let stale = ctx.baseline().is_none() && (force || ctx.expanded_category() != Some(category));
    if ctx.is_poisoned() || stale {
        reset_to_baseline(ctx, layout).await?;
    }
    if !force && ctx.expanded_category() == Some(category) {
        return Ok(());
    }
    let node = ctx
        .baseline()
        .and_then(|b| b.category(category))
        .cloned()
        .ok_or(ExtractError::CategoryMissing(category))?;
    debug!(category = node.name.as_str(), "Re-expanding category");
    expand_category(ctx, layout, &node).await?;
    Ok(())
}

fn verify(response: &PartialResponse, expected_code: &str, render: u64) -> Identity {
    let fragments = Fragments::from_response(response);
    let Some(panel) = detail::live_panel(&fragments) else {
        return Identity::Mismatch(None);
    };
    match detail::panel_code(panel) {
        Some(code) if code == expected_code => Identity::Verified(detail::parse(panel, render)),
        other => Identity::Mismatch(other),
    }
}
