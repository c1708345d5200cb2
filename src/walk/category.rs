use tracing::info;

use super::Layout;
use crate::error::ExtractError;
use crate::model::ProcedureSummary;
use crate::parser::baseline::CategoryNode;
use crate::parser::procedures::parse_procedure_table;
use crate::parser::Fragments;
use crate::session::SessionContext;
use crate::transport::Transport;
use crate::wire::AjaxRequest;

/// Reveal the procedure list under `node`.
///
/// `node` must come from the live baseline render. On success the server's
/// current category is `node`, and rows come back in document order.
pub async fn expand_category<T: Transport>(
    ctx: &mut SessionContext<T>,
    layout: &Layout,
    node: &CategoryNode,
) -> Result<Vec<ProcedureSummary>, ExtractError> {
    ctx.check(&node.expand_ref)?;

    let request = AjaxRequest::click(&node.expand_ref.id, &layout.category_render);
    // The server may have switched category even if the answer is lost.
    ctx.set_expanded(None);
    let response = ctx.submit(&request).await?;
    ctx.set_expanded(Some(node.ordinal));

    let procedures = parse_procedure_table(&Fragments::from_response(&response), &node.name);
    info!(
        category = node.name.as_str(),
        ordinal = node.ordinal,
        procedures = procedures.len(),
        "Expanded category"
    );
    Ok(procedures)
}
