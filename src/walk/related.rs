use tracing::{debug, warn};

use super::Layout;
use crate::error::ExtractError;
use crate::model::RenderRef;
use crate::parser::related::{merge_related, parse_expanded};
use crate::parser::Fragments;
use crate::session::SessionContext;
use crate::transport::Transport;
use crate::wire::AjaxRequest;

/// Click "More..." on the detail panel currently shown and return the full
/// related list. The result always contains every label of `stub`.
pub async fn expand_related<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
    more: &RenderRef,
    stub: &[String],
) -> Result<Vec<String>, ExtractError> {
    ctx.check(more)?;

    let request = AjaxRequest::action(&more.id, &layout.related_render);
    let response = ctx.submit(&request).await?;
    let full = parse_expanded(&Fragments::from_response(&response));

    if full.is_empty() {
        warn!(source = more.id.as_str(), "Related expansion returned no labels");
    }
    let merged = merge_related(stub, full);
    debug!(stub = stub.len(), full = merged.len(), "Expanded related procedures");
    Ok(merged)
}
