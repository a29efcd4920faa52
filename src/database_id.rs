//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// The ID of a user. Users are owned by the surrounding application; the
/// ledger only scopes records by this value.
pub type UserId = i64;

/// The ID of a category row.
pub type CategoryId = DatabaseId;

/// The ID of an expense row.
pub type ExpenseId = DatabaseId;
