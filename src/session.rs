use tracing::{debug, warn};

use crate::error::{ExtractError, TransportError};
use crate::model::{RenderRef, SessionToken};
use crate::parser::baseline::{self, BaselineSnapshot};
use crate::transport::Transport;
use crate::wire::{parse_partial_response, AjaxRequest, PartialResponse};

/// Owner of the view token and of everything that dies with a render.
///
/// Every state-mutating request goes through [`SessionContext::submit`],
/// which takes `&mut self`: two requests can never be in flight on one
/// session. The render counter advances on each such request, which is how
/// render-scoped references are recognised as stale.
pub struct SessionContext<T> {
    transport: T,
    token: SessionToken,
    render: u64,
    poisoned: bool,
    expanded: Option<usize>,
    baseline: Option<BaselineSnapshot>,
}

impl<T: Transport> SessionContext<T> {
    pub fn new(transport: T, token: SessionToken) -> Self {
        Self {
            transport,
            token,
            render: 0,
            poisoned: false,
            expanded: None,
            baseline: None,
        }
    }

    /// Start from the token embedded in the baseline page.
    pub async fn discover(transport: T) -> Result<Self, ExtractError> {
        let page = transport.fetch_page().await?;
        let token = baseline::view_state(&page).ok_or(ExtractError::MissingToken)?;
        debug!(token = token.preview(), "Discovered initial view state");
        Ok(Self::new(transport, token))
    }

    pub fn current_token(&self) -> &SessionToken {
        &self.token
    }

    pub fn replace(&mut self, token: SessionToken) {
        self.token = token;
    }

    pub fn render(&self) -> u64 {
        self.render
    }

    /// True when the last state-mutating request did not complete, so the
    /// held token may no longer match the server.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Category the server currently shows expanded, as far as we know.
    pub fn expanded_category(&self) -> Option<usize> {
        self.expanded
    }

    pub(crate) fn set_expanded(&mut self, category: Option<usize>) {
        self.expanded = category;
    }

    /// Latest baseline snapshot, only while it still belongs to the live
    /// render.
    pub fn baseline(&self) -> Option<&BaselineSnapshot> {
        self.baseline.as_ref().filter(|b| b.render == self.render)
    }

    /// Most recent snapshot regardless of render. Only positions may be read
    /// from it; its references are dead once the render moved on.
    pub fn latest_baseline(&self) -> Option<&BaselineSnapshot> {
        self.baseline.as_ref()
    }

    pub(crate) fn set_baseline(&mut self, snapshot: BaselineSnapshot) {
        self.expanded = snapshot.expanded_ordinal();
        self.baseline = Some(snapshot);
        self.poisoned = false;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reject a reference issued by an earlier render.
    pub fn check(&self, reference: &RenderRef) -> Result<(), ExtractError> {
        if reference.render != self.render {
            return Err(ExtractError::StaleReference {
                id: reference.id.clone(),
                issued: reference.render,
                current: self.render,
            });
        }
        Ok(())
    }

    /// Send one partial request with the current token and adopt the token
    /// the portal hands back.
    ///
    /// The render advances and the session is marked poisoned before sending.
    /// The flag is only cleared once a well-formed answer has been adopted,
    /// so a request that errors or is dropped mid-flight leaves it set.
    pub async fn submit(&mut self, request: &AjaxRequest) -> Result<PartialResponse, ExtractError> {
        let form = request.form_fields(&self.token);
        self.poisoned = true;
        self.render += 1;
        let raw = self.transport.submit(&form).await?;
        let mut response = parse_partial_response(&raw)?;

        if let Some(url) = response.redirect.take() {
            return Err(ExtractError::SessionExpired(url));
        }
        if let Some(message) = response.error.take() {
            return Err(ExtractError::Server(message));
        }

        match &response.token {
            Some(token) => {
                debug!(
                    source = request.source.as_str(),
                    render = self.render,
                    token = token.preview(),
                    "View state advanced"
                );
                self.token = token.clone();
            }
            None => warn!(
                source = request.source.as_str(),
                "No view state update in response, keeping previous token"
            ),
        }
        self.poisoned = false;
        Ok(response)
    }

    pub async fn fetch_page(&self) -> Result<String, TransportError> {
        self.transport.fetch_page().await
    }
}
