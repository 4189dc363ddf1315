use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error(
        "{} exists, the last checkpoint may have been corrupted during saving",
        path.display()
    )]
    CorruptedCheckpoint { path: PathBuf },

    #[error("cannot decode {}: {reason}", path.display())]
    Codec { path: PathBuf, reason: String },

    #[error(
        "root index size mismatch: {lemmata} lemmata, {existing} existing, \
         {source_embeddings} source embeddings, {target_embeddings} target \
         embeddings, {definitions} definitions, {documented} documented"
    )]
    InvariantViolation {
        lemmata: usize,
        existing: usize,
        source_embeddings: usize,
        target_embeddings: usize,
        definitions: usize,
        documented: usize,
    },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("{provider} provider failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("query failed unexpectedly: {0}")]
    UnexpectedQuery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    pub(crate) fn provider(
        provider: &'static str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.to_string(),
        }
    }

    /// Errors that must stop an indexing run and be looked at by an operator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CorruptedCheckpoint { .. }
                | Self::InvariantViolation { .. }
                | Self::Codec { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damaged_indexes_are_fatal() {
        let corrupted = Error::CorruptedCheckpoint {
            path: PathBuf::from("index/root/lemmata.tmp"),
        };
        assert!(corrupted.is_fatal());
        assert!(!Error::provider("gloss", "timed out").is_fatal());
        assert!(!Error::Config("bad key scheme".into()).is_fatal());
    }
}
