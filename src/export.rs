//! CSV export of a filtered slice of the expense ledger.

use rusqlite::Connection;
use time::Date;

use crate::{
    Error,
    database_id::UserId,
    expense::{ExpenseFilter, filter_conditions},
    money::Money,
};

/// A rendered CSV document ready to be streamed as a file download.
///
/// The transport layer owns the HTTP side (content type and disposition
/// headers); this is just the bytes and a suggested name.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    /// The CSV text, header row first.
    pub content: String,
    /// A download filename of the form `expenses_<today>.csv`.
    pub filename: String,
}

struct ExportRow {
    date: Date,
    description: String,
    amount: Money,
    category_name: Option<String>,
    receipt_ref: Option<String>,
}

/// Render every expense matching `filter` as CSV, newest first.
///
/// Applies the same filter semantics as expense listing but without
/// pagination. Fields containing commas, quotes, or newlines are quoted per
/// standard CSV rules, and amounts are written with exactly two decimal
/// places.
///
/// # Errors
/// Returns [Error::CsvWriteError] if a row cannot be serialized, or
/// [Error::SqlError] if there is an SQL error.
pub fn export_csv(
    user_id: UserId,
    filter: &ExpenseFilter,
    today: Date,
    connection: &Connection,
) -> Result<CsvExport, Error> {
    let (where_clause, params) = filter_conditions(user_id, filter);

    let rows = connection
        .prepare(&format!(
            "SELECT expense.date, expense.description, expense.amount,
                    category.name, expense.receipt_ref
             FROM expense
             LEFT JOIN category ON category.id = expense.category_id
             WHERE {where_clause}
             ORDER BY expense.date DESC, expense.id ASC"
        ))?
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(ExportRow {
                date: row.get(0)?,
                description: row.get(1)?,
                amount: row.get(2)?,
                category_name: row.get(3)?,
                receipt_ref: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["Date", "Description", "Amount", "Category", "ReceiptRef"])
        .map_err(|error| Error::CsvWriteError(error.to_string()))?;

    for row in rows {
        writer
            .write_record([
                row.date.to_string(),
                row.description,
                row.amount.to_decimal_string(),
                row.category_name.unwrap_or_default(),
                row.receipt_ref.unwrap_or_default(),
            ])
            .map_err(|error| Error::CsvWriteError(error.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| Error::CsvWriteError(error.to_string()))?;
    let content =
        String::from_utf8(bytes).map_err(|error| Error::CsvWriteError(error.to_string()))?;

    Ok(CsvExport {
        content,
        filename: format!("expenses_{today}.csv"),
    })
}
