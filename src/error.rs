pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("metadata database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("metadata storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("metadata transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("metadata table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("metadata commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported language: {0}. Supported: python, typescript")]
    UnsupportedLanguage(String),

    #[error("language backend for {language} unavailable: {reason}")]
    BackendUnavailable {
        language: &'static str,
        reason: String,
    },

    #[error("language backend exceeded its {0} second budget")]
    BackendTimeout(u64),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors the service reports to the caller as bad input
    /// rather than logging as failures.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::UnsupportedLanguage(_)
        )
    }
}
