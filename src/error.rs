use thiserror::Error;

/// Error taxonomy for the signal-and-portfolio engine.
///
/// Recovery policy per variant lives with the caller: transient upstream
/// errors are retried by the scheduler, permanent upstream errors mark a
/// symbol inactive, ledger conflicts from idempotent replay are treated as
/// success, invariant violations roll back the enclosing transaction, and
/// configuration errors are fatal to startup.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient upstream error for {symbol}: {source}")]
    TransientUpstream {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("permanent upstream error for {symbol}: {reason}")]
    PermanentUpstream { symbol: String, reason: String },

    #[error("ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("chat input error: {0}")]
    ChatInput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True when the scheduler should simply skip this symbol's tick and
    /// retry on the next cadence rather than surfacing to the operator.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransientUpstream { .. })
    }

    /// True when a ledger unique-constraint violation was hit on replay —
    /// per the error taxonomy this is success, not failure.
    pub fn is_idempotent_conflict(&self) -> bool {
        match self {
            EngineError::LedgerConflict(_) => true,
            EngineError::Sqlx(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("2067") || db_err.message().contains("UNIQUE")
            }
            _ => false,
        }
    }
}
