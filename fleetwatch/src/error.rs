use thiserror::Error;

/// Result alias used across the state engine.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors surfaced by the persistence-facing parts of the engine.
///
/// Extraction never produces these: malformed configuration fragments degrade
/// to empty facts instead.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A batch locking call was made without any daemon.
    #[error("no daemons specified for select for update")]
    NoDaemonsSpecified,
    /// The row was deleted or never existed.
    #[error("{entity} with id {id} does not exist")]
    NotFound { entity: &'static str, id: i64 },
    /// The daemon configuration changed after the caller read it.
    #[error("configuration of daemon {daemon_id} changed (expected hash '{expected}', found '{actual}')")]
    Stale {
        daemon_id: i64,
        expected: String,
        actual: String,
    },
    /// The row lock could not be taken within the configured wait.
    #[error("daemon {daemon_id} is locked by another transaction")]
    LockConflict { daemon_id: i64 },
    /// The write would break a persisted-state invariant.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The configuration document could not be used.
    #[error("invalid configuration for daemon {daemon_id}: {reason}")]
    InvalidConfig { daemon_id: i64, reason: String },
    /// A storage operation failed.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },
    /// A stored value could not be encoded or decoded.
    #[error("{context}: {source}")]
    Encoding {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FleetError {
    /// True when repeating the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::LockConflict { .. })
    }

    /// True when the addressed row is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Attach context to storage errors, mirroring `anyhow::Context` for the
/// typed error used by the library.
pub(crate) trait StorageContext<T> {
    fn storage_context<F>(self, context: F) -> FleetResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> StorageContext<T> for Result<T, rusqlite::Error> {
    fn storage_context<F>(self, context: F) -> FleetResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| FleetError::Storage {
            context: context(),
            source,
        })
    }
}

impl<T> StorageContext<T> for Result<T, serde_json::Error> {
    fn storage_context<F>(self, context: F) -> FleetResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| FleetError::Encoding {
            context: context(),
            source,
        })
    }
}
