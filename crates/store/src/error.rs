//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use exn::ResultExt;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Not Found
/// Returned by write paths that require an existing target. Read paths return
/// `Ok(None)` (or an empty list) instead.
/// - [`ErrorKind::PageNotFound`]
/// - [`ErrorKind::RevisionNotFound`]
/// - [`ErrorKind::FileNotFound`]
/// - [`ErrorKind::FileRevisionNotFound`]
/// - [`ErrorKind::ArchivedPageNotFound`]
/// - [`ErrorKind::ArchivedRevisionNotFound`]
///
/// ### Rejected Before Writing
/// - [`ErrorKind::Invariant`]
/// - [`ErrorKind::Conflict`]
///
/// ### Storage
/// - [`ErrorKind::Database`]
/// - [`ErrorKind::Migration`]
/// - [`ErrorKind::InvalidData`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("page not found: {_0}")]
    PageNotFound(#[error(not(source))] String),
    #[display("revision {revision} of page {page_id} not found")]
    RevisionNotFound { page_id: i64, revision: u32 },
    #[display("file not found: ({page}, {file})")]
    FileNotFound { page: String, file: String },
    #[display("revision {revision} of file {file_id} not found")]
    FileRevisionNotFound { file_id: i64, revision: u32 },
    #[display("archived page not found: {_0}")]
    ArchivedPageNotFound(#[error(not(source))] i64),
    #[display("archived revision {revision} of page {page_id} not found")]
    ArchivedRevisionNotFound { page_id: i64, revision: u32 },
    /// The operation would leave the store in a state that breaks one of its
    /// invariants. Nothing was written.
    #[display("invariant violation: {_0}")]
    Invariant(#[error(not(source))] &'static str),
    /// Another writer changed the same page or file between this operation
    /// reading it and writing it back. Nothing was written.
    #[display("concurrent modification detected")]
    Conflict,
    /// A stored value could not be converted to or from its model type.
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Returns `true` for any of the "not found" categories.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PageNotFound(_)
                | Self::RevisionNotFound { .. }
                | Self::FileNotFound { .. }
                | Self::FileRevisionNotFound { .. }
                | Self::ArchivedPageNotFound(_)
                | Self::ArchivedRevisionNotFound { .. }
        )
    }
}

/// Classify a failed write so that lost races surface as
/// [`ErrorKind::Conflict`] and key collisions as the supplied kind.
///
/// SQLite reports a busy database (`5`) or a stale read snapshot (`517`) when
/// another connection committed a write after this transaction started
/// reading; both mean the caller should reload and retry.
fn classify(err: &sqlx::Error, on_unique: ErrorKind) -> ErrorKind {
    let Some(db) = err.as_database_error() else {
        return ErrorKind::Database;
    };
    if db.is_unique_violation() {
        return on_unique;
    }
    match db.code().as_deref() {
        Some("5" | "517") => ErrorKind::Conflict,
        _ => ErrorKind::Database,
    }
}

/// Like [`exn::ResultExt::or_raise`] for write statements, choosing the kind
/// from the underlying SQLite error.
pub(crate) trait WriteResultExt<T> {
    fn or_classify(self, on_unique: ErrorKind) -> Result<T>;
}
impl<T> WriteResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[track_caller]
    fn or_classify(self, on_unique: ErrorKind) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = classify(&err, on_unique);
                Err(err).or_raise(|| kind)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::PageNotFound("help::intro".to_string()).to_string(), "page not found: help::intro");
        assert_eq!(
            ErrorKind::RevisionNotFound { page_id: 7, revision: 3 }.to_string(),
            "revision 3 of page 7 not found"
        );
        assert_eq!(
            ErrorKind::Invariant("cannot archive the current revision").to_string(),
            "invariant violation: cannot archive the current revision"
        );
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Conflict.is_retryable());
        assert!(!ErrorKind::Database.is_retryable());
        assert!(!ErrorKind::ArchivedPageNotFound(1).is_retryable());
    }

    #[test]
    fn error_kind_not_found() {
        assert!(ErrorKind::FileNotFound { page: "a".to_string(), file: "b.png".to_string() }.is_not_found());
        assert!(!ErrorKind::Invariant("nope").is_not_found());
    }

    #[test]
    fn classify_non_database_error() {
        assert_eq!(classify(&sqlx::Error::RowNotFound, ErrorKind::Conflict), ErrorKind::Database);
        let result: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        assert_eq!(*result.or_classify(ErrorKind::Conflict).unwrap_err(), ErrorKind::Database);
    }

    #[test]
    fn error_from_result() {
        let result: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::PoolClosed);
        let err: Result<()> = result.or_raise(|| ErrorKind::Database);
        // Exn<E> implements Deref<Target = E>
        assert_eq!(*err.unwrap_err(), ErrorKind::Database);
    }
}
