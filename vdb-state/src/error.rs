/// Boundary error kinds shared by every crate in the workspace. SQL "no rows"
/// normalizes to [`Error::NotFound`]; malformed RLP coming out of the index is
/// an [`Error::InvariantViolation`] because the indexer wrote it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("multiple headers exist for block hash {0}")]
    MultipleHeadersForHash(String),
    #[error("transaction indexed in more than one canonical block")]
    TxInMultipleBlocks,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("upstream node unreachable: {0}")]
    ProxyUnavailable(String),
    #[error("upstream node failure: {0}")]
    ProxyError(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("chain database is read-only")]
    ReadOnly,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// True for the kinds that mean "the row you asked for is absent" rather
    /// than "something went wrong".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
