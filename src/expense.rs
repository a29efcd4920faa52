//! The expense ledger: the authoritative store of expense records, and the
//! sole writer of each user's running total.
//!
//! Every mutation applies its record write and the matching aggregate delta
//! inside one SQLite transaction. The delta is always expressed as
//! `running_total = running_total + ?` so concurrent mutations commute;
//! the total is never read into application code, adjusted, and written
//! back.

use rusqlite::{Connection, Row, types::Value};
use serde::{Deserialize, Serialize};
use time::{Date, macros::format_description};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    Error,
    database_id::{CategoryId, ExpenseId, UserId},
    money::Money,
    pagination::{Page, PageQuery},
};

/// The most graphemes allowed in an expense description.
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// A single spending event recorded in the ledger.
///
/// To create a new `Expense`, use [Expense::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// The ID of the expense.
    pub id: ExpenseId,
    /// The user the expense belongs to.
    pub user_id: UserId,
    /// How much was spent. Always positive.
    pub amount: Money,
    /// What the expense was for.
    pub description: String,
    /// The calendar date of the expense.
    pub date: Date,
    /// The category the expense is filed under, if any.
    pub category_id: Option<CategoryId>,
    /// An opaque reference to a stored receipt, owned by an external file
    /// store.
    pub receipt_ref: Option<String>,
}

impl Expense {
    /// Start building a new expense.
    ///
    /// Shortcut for [ExpenseBuilder] for discoverability.
    pub fn build(amount: Money, date: Date, description: &str) -> ExpenseBuilder {
        ExpenseBuilder {
            amount,
            date,
            description: description.to_owned(),
            category_id: None,
            receipt_ref: None,
        }
    }
}

/// A builder for creating [Expense] records via [create_expense].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseBuilder {
    /// How much was spent. Must be greater than zero.
    pub amount: Money,
    /// The calendar date of the expense.
    pub date: Date,
    /// What the expense was for, 1 to [MAX_DESCRIPTION_LENGTH] graphemes.
    pub description: String,
    /// The category to file the expense under. Must belong to the same user.
    pub category_id: Option<CategoryId>,
    /// An opaque receipt reference from the external file store.
    pub receipt_ref: Option<String>,
}

impl ExpenseBuilder {
    /// Set the category for the expense.
    pub fn category_id(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set the receipt reference for the expense.
    pub fn receipt_ref(mut self, receipt_ref: Option<String>) -> Self {
        self.receipt_ref = receipt_ref;
        self
    }
}

/// The fields of an expense that may be changed by [update_expense].
///
/// `None` fields are left unchanged. `category_id` is doubly optional so the
/// update can distinguish "leave the category alone" (`None`) from "detach
/// the expense" (`Some(None)`).
#[derive(Debug, Default, Clone)]
pub struct ExpenseUpdate {
    /// Replacement amount. The running total is adjusted by the difference.
    pub amount: Option<Money>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement date.
    pub date: Option<Date>,
    /// Replacement category assignment.
    pub category_id: Option<Option<CategoryId>>,
}

/// A filter over a user's expenses, shared by listing and CSV export.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseFilter {
    /// Earliest date to include, inclusive.
    pub date_from: Option<Date>,
    /// Latest date to include, inclusive.
    pub date_to: Option<Date>,
    /// Only expenses filed under this category.
    pub category_id: Option<CategoryId>,
}

/// Parse a `YYYY-MM-DD` string into a calendar date.
///
/// # Errors
/// Returns [Error::InvalidDate] if the string is not a valid calendar date.
pub fn parse_date(input: &str) -> Result<Date, Error> {
    Date::parse(input, format_description!("[year]-[month]-[day]"))
        .map_err(|_| Error::InvalidDate(input.to_string()))
}

/// Record a new expense and add its amount to the user's running total, as
/// one atomic unit.
///
/// # Errors
/// Returns:
/// - [Error::InvalidAmount] if the amount is not positive,
/// - [Error::InvalidDescription] if the description is empty or too long,
/// - [Error::InvalidCategory] if `category_id` is set but does not refer to
///   one of the user's categories,
/// - [Error::Consistency] if the atomic unit failed to commit (nothing was
///   applied),
/// - [Error::SqlError] on other SQL errors.
pub fn create_expense(
    user_id: UserId,
    builder: ExpenseBuilder,
    connection: &mut Connection,
) -> Result<Expense, Error> {
    check_amount(builder.amount)?;
    check_description(&builder.description)?;

    let transaction = connection.transaction()?;

    ensure_category_belongs_to_user(user_id, builder.category_id, &transaction)?;

    let expense = transaction
        .prepare(
            "INSERT INTO expense (user_id, amount, description, date, category_id, receipt_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, user_id, amount, description, date, category_id, receipt_ref",
        )?
        .query_row(
            (
                user_id,
                builder.amount,
                &builder.description,
                builder.date,
                builder.category_id,
                &builder.receipt_ref,
            ),
            map_expense_row,
        )?;

    apply_aggregate_delta(user_id, expense.amount, &transaction)?;

    commit_atomic_unit(transaction)?;

    Ok(expense)
}

/// Update one of a user's expenses, adjusting the running total by the
/// amount difference in the same atomic unit.
///
/// The old amount is read inside the transaction that performs the write, so
/// two concurrent updates of the same expense cannot lose an adjustment.
///
/// # Errors
/// Returns [Error::NotFound] if the expense does not belong to the user;
/// otherwise the same errors as [create_expense].
pub fn update_expense(
    user_id: UserId,
    expense_id: ExpenseId,
    update: ExpenseUpdate,
    connection: &mut Connection,
) -> Result<Expense, Error> {
    if let Some(amount) = update.amount {
        check_amount(amount)?;
    }
    if let Some(description) = &update.description {
        check_description(description)?;
    }

    let transaction = connection.transaction()?;

    let current = select_expense(user_id, expense_id, &transaction)?;

    let category_id = update.category_id.unwrap_or(current.category_id);
    if category_id != current.category_id {
        ensure_category_belongs_to_user(user_id, category_id, &transaction)?;
    }

    let updated = Expense {
        id: current.id,
        user_id,
        amount: update.amount.unwrap_or(current.amount),
        description: update.description.unwrap_or(current.description),
        date: update.date.unwrap_or(current.date),
        category_id,
        receipt_ref: current.receipt_ref,
    };

    transaction.execute(
        "UPDATE expense SET amount = ?1, description = ?2, date = ?3, category_id = ?4
         WHERE id = ?5 AND user_id = ?6",
        (
            updated.amount,
            &updated.description,
            updated.date,
            updated.category_id,
            expense_id,
            user_id,
        ),
    )?;

    let delta = updated.amount - current.amount;
    if delta != Money::zero() {
        apply_aggregate_delta(user_id, delta, &transaction)?;
    }

    commit_atomic_unit(transaction)?;

    Ok(updated)
}

/// Delete one of a user's expenses and subtract its amount from the running
/// total, as one atomic unit.
///
/// # Errors
/// Returns [Error::NotFound] if the expense does not belong to the user,
/// [Error::Consistency] if the atomic unit failed to commit, or
/// [Error::SqlError] on other SQL errors.
pub fn delete_expense(
    user_id: UserId,
    expense_id: ExpenseId,
    connection: &mut Connection,
) -> Result<(), Error> {
    delete_expense_with_receipt_cleanup(user_id, expense_id, |_| Ok(()), connection)
}

/// [delete_expense], then hand any receipt reference to `cleanup`.
///
/// The ledger record and the running total are the values being protected
/// here; a failure in the external receipt store must not block the
/// deletion, so cleanup runs after the atomic unit commits and its errors
/// are logged rather than propagated.
///
/// # Errors
/// The same errors as [delete_expense]. Cleanup failures are never returned.
pub fn delete_expense_with_receipt_cleanup(
    user_id: UserId,
    expense_id: ExpenseId,
    cleanup: impl FnOnce(&str) -> Result<(), Box<dyn std::error::Error>>,
    connection: &mut Connection,
) -> Result<(), Error> {
    let transaction = connection.transaction()?;

    let expense = select_expense(user_id, expense_id, &transaction)?;

    transaction.execute(
        "DELETE FROM expense WHERE id = ?1 AND user_id = ?2",
        (expense_id, user_id),
    )?;
    apply_aggregate_delta(user_id, -expense.amount, &transaction)?;

    commit_atomic_unit(transaction)?;

    if let Some(receipt_ref) = &expense.receipt_ref
        && let Err(error) = cleanup(receipt_ref)
    {
        tracing::warn!(
            "could not clean up receipt \"{receipt_ref}\" for deleted expense {expense_id}: {error}"
        );
    }

    Ok(())
}

/// Retrieve one of a user's expenses by ID.
///
/// # Errors
/// Returns [Error::NotFound] if the expense does not exist or belongs to a
/// different user, or [Error::SqlError] on other SQL errors.
pub fn get_expense(
    user_id: UserId,
    expense_id: ExpenseId,
    connection: &Connection,
) -> Result<Expense, Error> {
    select_expense(user_id, expense_id, connection)
}

/// List a user's expenses matching `filter`, newest first, one page at a
/// time.
///
/// A page past the end of the results returns an empty item list with the
/// correct counts rather than an error.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn list_expenses(
    user_id: UserId,
    filter: &ExpenseFilter,
    page: PageQuery,
    connection: &Connection,
) -> Result<Page<Expense>, Error> {
    let (where_clause, params) = filter_conditions(user_id, filter);

    // SQLite integers are signed; COUNT cannot go negative.
    let total_count = connection
        .prepare(&format!(
            "SELECT COUNT(id) FROM expense WHERE {where_clause}"
        ))?
        .query_row(rusqlite::params_from_iter(params.iter()), |row| {
            row.get::<_, i64>(0)
        })? as u64;

    // Sort by date, then ID to keep row order stable after updates.
    let mut params = params;
    params.push(Value::Integer(page.page_size() as i64));
    params.push(Value::Integer(page.offset() as i64));
    let items = connection
        .prepare(&format!(
            "SELECT id, user_id, amount, description, date, category_id, receipt_ref
             FROM expense
             WHERE {where_clause}
             ORDER BY date DESC, id ASC
             LIMIT ? OFFSET ?"
        ))?
        .query_map(rusqlite::params_from_iter(params.iter()), map_expense_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(items, total_count, page))
}

/// Read a user's running total. Users with no recorded expenses have a total
/// of zero.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn running_total(user_id: UserId, connection: &Connection) -> Result<Money, Error> {
    let total = connection
        .prepare("SELECT running_total FROM user_aggregate WHERE user_id = :user_id")?
        .query_row(&[(":user_id", &user_id)], |row| row.get(0));

    match total {
        Ok(total) => Ok(total),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Money::zero()),
        Err(error) => Err(error.into()),
    }
}

/// Re-derive a user's running total from their expenses and repair the
/// stored aggregate if it has drifted.
///
/// The ledger's mutations keep the aggregate exact, so drift indicates an
/// outside writer or corruption; it is logged at error level. Returns the
/// derived total.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn recompute_running_total(
    user_id: UserId,
    connection: &mut Connection,
) -> Result<Money, Error> {
    let transaction = connection.transaction()?;

    let derived: Money = transaction
        .prepare("SELECT COALESCE(SUM(amount), 0) FROM expense WHERE user_id = :user_id")?
        .query_row(&[(":user_id", &user_id)], |row| row.get(0))?;
    let stored = running_total(user_id, &transaction)?;

    if stored != derived {
        tracing::error!(
            "running total for user {user_id} drifted: stored {stored}, derived {derived}"
        );
        transaction.execute(
            "INSERT INTO user_aggregate (user_id, running_total) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET running_total = excluded.running_total",
            (user_id, derived),
        )?;
    }

    commit_atomic_unit(transaction)?;

    Ok(derived)
}

/// Build the `WHERE` clause and parameters shared by every query that
/// applies [ExpenseFilter] semantics (listing, export, analytics).
pub(crate) fn filter_conditions(
    user_id: UserId,
    filter: &ExpenseFilter,
) -> (String, Vec<Value>) {
    let mut clauses = vec!["expense.user_id = ?".to_string()];
    let mut params = vec![Value::Integer(user_id)];

    if let Some(date_from) = filter.date_from {
        clauses.push("expense.date >= ?".to_string());
        params.push(Value::Text(date_from.to_string()));
    }

    if let Some(date_to) = filter.date_to {
        clauses.push("expense.date <= ?".to_string());
        params.push(Value::Text(date_to.to_string()));
    }

    if let Some(category_id) = filter.category_id {
        clauses.push("expense.category_id = ?".to_string());
        params.push(Value::Integer(category_id));
    }

    (clauses.join(" AND "), params)
}

/// Add `delta` to the user's running total as a commutative in-database
/// increment, creating the aggregate row on first use.
fn apply_aggregate_delta(
    user_id: UserId,
    delta: Money,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO user_aggregate (user_id, running_total) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET running_total = running_total + excluded.running_total",
        (user_id, delta),
    )?;

    Ok(())
}

/// Commit the transaction, mapping a failed commit to [Error::Consistency]
/// since nothing in the atomic unit was applied.
fn commit_atomic_unit(transaction: rusqlite::Transaction) -> Result<(), Error> {
    transaction.commit().map_err(|error| {
        tracing::error!("atomic unit failed to commit and was rolled back: {error}");
        Error::Consistency(error.to_string())
    })
}

fn select_expense(
    user_id: UserId,
    expense_id: ExpenseId,
    connection: &Connection,
) -> Result<Expense, Error> {
    let expense = connection
        .prepare(
            "SELECT id, user_id, amount, description, date, category_id, receipt_ref
             FROM expense WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &expense_id), (":user_id", &user_id)],
            map_expense_row,
        )?;

    Ok(expense)
}

fn ensure_category_belongs_to_user(
    user_id: UserId,
    category_id: Option<CategoryId>,
    connection: &Connection,
) -> Result<(), Error> {
    let Some(category_id) = category_id else {
        return Ok(());
    };

    connection
        .prepare("SELECT id FROM category WHERE id = :id AND user_id = :user_id")?
        .query_row(&[(":id", &category_id), (":user_id", &user_id)], |_| Ok(()))
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::InvalidCategory(Some(category_id)),
            error => error.into(),
        })
}

fn check_amount(amount: Money) -> Result<(), Error> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(Error::InvalidAmount(amount))
    }
}

fn check_description(description: &str) -> Result<(), Error> {
    let length = description.graphemes(true).count();

    if (1..=MAX_DESCRIPTION_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(Error::InvalidDescription(length))
    }
}

/// Create the expense table and its lookup indexes.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL
/// error.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS expense (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            category_id INTEGER REFERENCES category(id),
            receipt_ref TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_expense_user ON expense(user_id);
        CREATE INDEX IF NOT EXISTS idx_expense_user_date ON expense(user_id, date);",
    )?;

    Ok(())
}

/// Create the per-user running total table.
///
/// Only this module writes to `user_aggregate`; every write is a delta
/// applied inside the same transaction as the expense row it accounts for.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL
/// error.
pub fn create_user_aggregate_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user_aggregate (
            user_id INTEGER PRIMARY KEY,
            running_total INTEGER NOT NULL DEFAULT 0
        )",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Expense].
pub(crate) fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    Ok(Expense {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        date: row.get(4)?,
        category_id: row.get(5)?,
        receipt_ref: row.get(6)?,
    })
}
