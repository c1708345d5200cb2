use tracing::{debug, warn};

use super::Layout;
use crate::error::ExtractError;
use crate::parser::baseline::BaselineSnapshot;
use crate::session::SessionContext;
use crate::transport::Transport;
use crate::wire::AjaxRequest;

/// Click "Back to Benefits View" and re-read the category listing.
///
/// Every failure comes back as [`ExtractError::Reset`]: there is nothing
/// below a reset to recover with, so callers must not continue on the held
/// token. The returned snapshot is stamped with the render the reset created
/// and becomes the session's baseline.
pub async fn reset_to_baseline<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
) -> Result<BaselineSnapshot, ExtractError> {
    let request = AjaxRequest::action(&layout.reset_source, &layout.reset_render);
    let response = ctx.submit(&request).await.map_err(ExtractError::reset)?;

    let page = ctx
        .fetch_page()
        .await
        .map_err(|e| ExtractError::reset(e.into()))?;
    let snapshot = BaselineSnapshot::parse(&page, ctx.render(), layout.category_ref());

    if response.token.is_none() {
        // No token update in the partial response: the page carries one.
        match &snapshot.view_state {
            Some(token) => {
                warn!(token = token.preview(), "Reset returned no view state, using page token");
                ctx.replace(token.clone());
            }
            None => return Err(ExtractError::reset(ExtractError::MissingToken)),
        }
    }

    if snapshot.categories.is_empty() {
        warn!(render = snapshot.render, "Baseline page lists no categories");
    }
    debug!(
        render = snapshot.render,
        categories = snapshot.categories.len(),
        expanded = ?snapshot.expanded_ordinal(),
        "Baseline snapshot"
    );
    debug!(token = ctx.current_token().preview(), "Reset to baseline");

    ctx.set_baseline(snapshot.clone());
    Ok(snapshot)
}

/// Re-read the category listing without posting anything.
///
/// The token and render stay as they are; the snapshot is stamped with the
/// current render, so its references are live for the next click. A poisoned
/// session cannot be trusted this way and gets a full reset instead.
pub async fn refresh_baseline<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
) -> Result<BaselineSnapshot, ExtractError> {
    if ctx.is_poisoned() {
        warn!("Session poisoned, resetting instead of refreshing");
        return reset_to_baseline(ctx, layout).await;
    }

    let page = ctx.fetch_page().await?;
    let snapshot = BaselineSnapshot::parse(&page, ctx.render(), layout.category_ref());
    if let Some(token) = &snapshot.view_state {
        if token != ctx.current_token() {
            warn!(token = token.preview(), "Page token differs from held token, keeping held one");
        }
    }
    debug!(
        render = snapshot.render,
        expanded = ?snapshot.expanded_ordinal(),
        "Refreshed baseline snapshot"
    );

    ctx.set_baseline(snapshot.clone());
    Ok(snapshot)
}
