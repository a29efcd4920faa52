//! Centime is the expense ledger core of a personal finance tracker.
//!
//! This library owns the expense and category records, the per-user running
//! total that must always equal the sum of that user's expenses, the
//! read-side analytics over the ledger, and CSV export. Transport concerns
//! (authentication, routing, file storage, payments) are left to the
//! surrounding application; callers hand this library a user ID and a
//! validated payload and get back records, summaries, or an [Error].

#![warn(missing_docs)]

use crate::{database_id::CategoryId, money::Money};

pub mod analytics;
pub mod category;
pub mod database_id;
pub mod db;
pub mod expense;
pub mod export;
pub mod money;
pub mod pagination;
mod window;

pub use db::initialize as initialize_db;

/// The errors that may occur in the ledger core.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An expense amount that is zero or negative.
    #[error("expense amounts must be greater than zero, got {0}")]
    InvalidAmount(Money),

    /// A string that could not be parsed as a currency amount.
    #[error("could not parse \"{0}\" as a currency amount")]
    InvalidAmountFormat(String),

    /// An expense description outside the allowed length.
    #[error("descriptions must be between 1 and 200 characters, got {0}")]
    InvalidDescription(usize),

    /// A string that could not be parsed as a calendar date.
    #[error("could not parse \"{0}\" as a date (expected YYYY-MM-DD)")]
    InvalidDate(String),

    /// An empty string was used to create a category name.
    #[error("category name cannot be empty")]
    EmptyCategoryName,

    /// A category name longer than the allowed 50 characters.
    #[error("category names must be at most 50 characters, got {0}")]
    CategoryNameTooLong(usize),

    /// A color that is not a 6-digit hex code.
    #[error("\"{0}\" is not a 6-digit hex color")]
    InvalidColor(String),

    /// The category ID on an expense did not match one of the user's
    /// categories.
    #[error("invalid category: the category ID does not refer to one of the user's categories")]
    InvalidCategory(Option<CategoryId>),

    /// The user already has a category with this name.
    ///
    /// Category names are unique per user, compared case-insensitively.
    #[error("a category named \"{0}\" already exists")]
    DuplicateCategoryName(String),

    /// The requested record was not found, or does not belong to the caller.
    ///
    /// Records owned by another user are reported as missing rather than
    /// forbidden so that IDs cannot be probed across users.
    #[error("the requested record could not be found")]
    NotFound,

    /// An atomic unit (record write plus aggregate delta) failed to commit.
    ///
    /// Nothing was applied; the caller may resubmit the whole mutation.
    #[error("the mutation could not be committed and was rolled back: {0}")]
    Consistency(String),

    /// A CSV export could not be serialized.
    #[error("could not serialize CSV: {0}")]
    CsvWriteError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

/// The broad classification of an [Error], for callers that map errors onto a
/// transport (e.g. HTTP status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input; user-correctable.
    Validation,
    /// The referenced record is absent or not owned by the caller.
    NotFound,
    /// The request clashes with existing state (duplicate category name).
    Conflict,
    /// The datastore could not complete the atomic unit; nothing was applied.
    Consistency,
}

impl Error {
    /// Classify this error per the ledger's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAmount(_)
            | Error::InvalidAmountFormat(_)
            | Error::InvalidDescription(_)
            | Error::InvalidDate(_)
            | Error::EmptyCategoryName
            | Error::CategoryNameTooLong(_)
            | Error::InvalidColor(_)
            | Error::InvalidCategory(_) => ErrorKind::Validation,
            Error::DuplicateCategoryName(_) => ErrorKind::Conflict,
            Error::NotFound => ErrorKind::NotFound,
            Error::Consistency(_) | Error::CsvWriteError(_) | Error::SqlError(_) => {
                ErrorKind::Consistency
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
