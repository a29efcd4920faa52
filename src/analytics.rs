//! Read-side aggregation over the expense ledger.
//!
//! Every function here is a point-in-time snapshot query. Functions anchored
//! to "now" take today's date as an argument so callers own the clock.

use rusqlite::{Connection, types::Value};
use serde::Serialize;
use time::{Date, Month};

use crate::{
    Error,
    database_id::{CategoryId, UserId},
    expense::{Expense, ExpenseFilter, filter_conditions, map_expense_row},
    money::Money,
    window::{DateRange, month_bounds, month_to_date, previous_month, year_to_date},
};

/// The bucket name for expenses with no category.
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

/// Spending totals over the three dashboard windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyTotals {
    /// Total spent from the first of the current month through today.
    pub current_month: Money,
    /// Total spent over the whole previous calendar month.
    pub previous_month: Money,
    /// Total spent from the first of January through today.
    pub year_to_date: Money,
}

/// One category's share of spending over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    /// The category, or `None` for the uncategorized bucket.
    pub category_id: Option<CategoryId>,
    /// The category name, or [UNCATEGORIZED_LABEL].
    pub category_name: String,
    /// Total spent in the category.
    pub total: Money,
    /// Number of expenses in the category.
    pub count: u64,
    /// Share of the window's grand total, as a percentage rounded to two
    /// decimals. Zero when the grand total is zero.
    pub percentage: f64,
}

/// Progress against a monthly budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetTracking {
    /// The configured monthly budget.
    pub budget: Money,
    /// Total spent so far this calendar month.
    pub spent: Money,
    /// Budget minus spent. Negative when over budget, so callers can show
    /// how far over the user is.
    pub remaining: Money,
    /// Spent as a percentage of the budget, rounded to two decimals and not
    /// capped at 100.
    pub percentage_used: f64,
    /// Number of days in the current calendar month.
    pub days_in_month: u8,
    /// Days left in the month, counting today.
    pub days_remaining: u8,
    /// Whether spending has exceeded the budget.
    pub is_over_budget: bool,
}

/// Totals and per-category breakdown for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// Total spent in the month.
    pub total: Money,
    /// Number of expenses in the month.
    pub count: u64,
    /// Per-category totals for the month, largest first.
    pub category_breakdown: Vec<CategorySpend>,
}

/// Sum a user's spending over the current month, the previous month, and
/// the year to date. Windows with no expenses yield zero.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn monthly_totals(
    user_id: UserId,
    today: Date,
    connection: &Connection,
) -> Result<MonthlyTotals, Error> {
    Ok(MonthlyTotals {
        current_month: sum_window(user_id, month_to_date(today), connection)?,
        previous_month: sum_window(user_id, previous_month(today), connection)?,
        year_to_date: sum_window(user_id, year_to_date(today), connection)?,
    })
}

/// Group a user's spending by category over an optional date window,
/// largest total first.
///
/// Expenses without a category are grouped under [UNCATEGORIZED_LABEL].
/// Percentages are shares of the window's grand total; a zero grand total
/// produces zero percentages rather than an error.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn category_distribution(
    user_id: UserId,
    start: Option<Date>,
    end: Option<Date>,
    connection: &Connection,
) -> Result<Vec<CategorySpend>, Error> {
    let filter = ExpenseFilter {
        date_from: start,
        date_to: end,
        category_id: None,
    };
    let (where_clause, params) = filter_conditions(user_id, &filter);

    let mut groups = connection
        .prepare(&format!(
            "SELECT expense.category_id, category.name,
                    SUM(expense.amount), COUNT(expense.id)
             FROM expense
             LEFT JOIN category ON category.id = expense.category_id
             WHERE {where_clause}
             GROUP BY expense.category_id
             ORDER BY SUM(expense.amount) DESC"
        ))?
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let category_name: Option<String> = row.get(1)?;

            Ok(CategorySpend {
                category_id: row.get(0)?,
                category_name: category_name
                    .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string()),
                total: row.get(2)?,
                // SQLite integers are signed; COUNT cannot go negative.
                count: row.get::<_, i64>(3)? as u64,
                percentage: 0.0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let grand_total: Money = groups.iter().map(|group| group.total).sum();
    for group in &mut groups {
        group.percentage = group
            .total
            .ratio_of(grand_total)
            .map_or(0.0, |ratio| round2(ratio * 100.0));
    }

    Ok(groups)
}

/// Compare this month's spending against a monthly budget.
///
/// Returns `None` when no budget is configured or the budget is not
/// positive. `remaining` goes negative when the user is over budget;
/// clamping for display is the caller's choice.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn budget_tracking(
    user_id: UserId,
    monthly_budget: Option<Money>,
    today: Date,
    connection: &Connection,
) -> Result<Option<BudgetTracking>, Error> {
    let Some(budget) = monthly_budget.filter(|budget| budget.is_positive()) else {
        return Ok(None);
    };

    let spent = sum_window(user_id, month_to_date(today), connection)?;
    let days_in_month = today.month().length(today.year());

    Ok(Some(BudgetTracking {
        budget,
        spent,
        remaining: budget - spent,
        percentage_used: spent
            .ratio_of(budget)
            .map_or(0.0, |ratio| round2(ratio * 100.0)),
        days_in_month,
        days_remaining: days_in_month - today.day() + 1,
        is_over_budget: spent > budget,
    }))
}

/// Summarize a user's spending for one calendar month of any year.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn monthly_summary(
    user_id: UserId,
    year: i32,
    month: Month,
    connection: &Connection,
) -> Result<MonthlySummary, Error> {
    let window = month_bounds(year, month);
    let category_breakdown =
        category_distribution(user_id, Some(window.start), Some(window.end), connection)?;

    Ok(MonthlySummary {
        total: category_breakdown.iter().map(|group| group.total).sum(),
        count: category_breakdown.iter().map(|group| group.count).sum(),
        category_breakdown,
    })
}

/// The most recent expenses for a user, newest first, optionally limited to
/// a date window.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn recent_expenses(
    user_id: UserId,
    limit: u64,
    start: Option<Date>,
    end: Option<Date>,
    connection: &Connection,
) -> Result<Vec<Expense>, Error> {
    let filter = ExpenseFilter {
        date_from: start,
        date_to: end,
        category_id: None,
    };
    let (where_clause, mut params) = filter_conditions(user_id, &filter);
    params.push(Value::Integer(limit as i64));

    let expenses = connection
        .prepare(&format!(
            "SELECT id, user_id, amount, description, date, category_id, receipt_ref
             FROM expense
             WHERE {where_clause}
             ORDER BY date DESC, id ASC
             LIMIT ?"
        ))?
        .query_map(rusqlite::params_from_iter(params.iter()), map_expense_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(expenses)
}

fn sum_window(
    user_id: UserId,
    window: DateRange,
    connection: &Connection,
) -> Result<Money, Error> {
    let total = connection
        .prepare(
            "SELECT COALESCE(SUM(amount), 0) FROM expense
             WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3",
        )?
        .query_row(
            rusqlite::params![user_id, window.start.to_string(), window.end.to_string()],
            |row| row.get(0),
        )?;

    Ok(total)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod monthly_totals_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        db::initialize,
        expense::{Expense, create_expense},
        money::Money,
    };

    use super::monthly_totals;

    const USER: i64 = 1;

    #[test]
    fn totals_split_across_dashboard_windows() {
        let mut connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        for (cents, date) in [
            (1000, date!(2025 - 06 - 02)),
            (500, date!(2025 - 06 - 14)),
            (2000, date!(2025 - 05 - 20)),
            (3000, date!(2025 - 01 - 15)),
            (9999, date!(2024 - 12 - 31)),
        ] {
            create_expense(
                USER,
                Expense::build(Money::from_cents(cents), date, "expense"),
                &mut connection,
            )
            .unwrap();
        }

        let totals = monthly_totals(USER, date!(2025 - 06 - 15), &connection).unwrap();

        assert_eq!(totals.current_month, Money::from_cents(1500));
        assert_eq!(totals.previous_month, Money::from_cents(2000));
        assert_eq!(totals.year_to_date, Money::from_cents(6500));
    }

    #[test]
    fn empty_windows_yield_zero() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let totals = monthly_totals(USER, date!(2025 - 06 - 15), &connection).unwrap();

        assert_eq!(totals.current_month, Money::zero());
        assert_eq!(totals.previous_month, Money::zero());
        assert_eq!(totals.year_to_date, Money::zero());
    }
}
