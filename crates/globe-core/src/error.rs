//! Typed failures for the two remote calls the core makes.
//!
//! Both enums are `Clone + PartialEq` because they are stored in view state
//! (as displayable messages) and compared in tests.  reqwest errors are
//! flattened to strings at the call site for the same reason.

use thiserror::Error;

/// Country catalog load failed.  The catalog stays empty; there is no
/// automatic retry — only a fresh session reloads it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("country directory unreachable: {0}")]
    Http(String),
    #[error("country directory returned HTTP {0}")]
    Status(u16),
    #[error("country directory returned malformed data: {0}")]
    Malformed(String),
    #[error("country directory returned no countries")]
    Empty,
}

/// Station fetch for one country failed.  Scoped to that selection; the
/// user can pick another country at any time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("station directory unreachable: {0}")]
    Http(String),
    #[error("station directory returned HTTP {0}")]
    Status(u16),
    #[error("station directory returned malformed data: {0}")]
    Malformed(String),
}
