//! Walks the benefit tree of a JSF portal: categories, their procedures,
//! each procedure's detail panel and its related procedures, threading the
//! view state through one strictly sequential request chain.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod retry;
pub mod session;
pub mod transport;
pub mod walk;
pub mod wire;

pub use error::{Aborted, ExtractError, TransportError};
pub use model::ExtractionResult;
pub use session::SessionContext;
pub use transport::{HttpTransport, Transport};
pub use walk::{Layout, Orchestrator};
