use thiserror::Error;

use crate::model::ExtractionResult;
use crate::walk::Phase;

/// Failures below the JSF layer: the request either never reached the portal
/// or came back without a usable body.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Classify a reqwest error the way the retry logic needs it.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Http(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed partial response: {0}")]
    Malformed(String),

    #[error("response is not a partial-response document")]
    NotPartial,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("portal rejected partial request: {0}")]
    Server(String),

    #[error("session expired, portal redirected to {0}")]
    SessionExpired(String),

    #[error("reset to baseline failed: {0}")]
    Reset(#[source] Box<ExtractError>),

    #[error("no view state token in baseline page")]
    MissingToken,

    #[error("category #{0} not present in baseline snapshot")]
    CategoryMissing(usize),

    #[error("reference {id} belongs to render {issued}, session is at render {current}")]
    StaleReference { id: String, issued: u64, current: u64 },

    #[error("illegal traversal transition {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    /// The request may or may not have advanced server state. The session
    /// token can no longer be trusted and must be re-baselined.
    pub fn is_unknown_outcome(&self) -> bool {
        match self {
            Self::Transport(TransportError::Connect(_)) => false,
            Self::Transport(_) | Self::Server(_) | Self::Wire(_) => true,
            _ => false,
        }
    }

    /// Timeout, HTTP status or client failure on a request that did reach
    /// the portal. These are retried on their own budget and, once it is
    /// spent, end the run instead of degrading an item.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Timeout | TransportError::Status(_) | TransportError::Http(_))
        )
    }

    pub(crate) fn reset(err: ExtractError) -> Self {
        match err {
            already @ Self::Reset(_) => already,
            other => Self::Reset(Box::new(other)),
        }
    }
}

/// A run that stopped before covering every category. `partial` holds what
/// was collected up to the failure.
#[derive(Debug, Error)]
#[error("extraction aborted: {source}")]
pub struct Aborted {
    #[source]
    pub source: ExtractError,
    pub partial: ExtractionResult,
}
