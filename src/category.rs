//! The category store: user-scoped, named groupings for expenses.
//!
//! Category names are unique per user (case-insensitive). Deleting a
//! category is a soft cascade: expenses that reference it are detached, not
//! deleted, and the two steps run in one atomic unit so no expense is ever
//! left pointing at a missing category.

use std::{fmt::Display, str::FromStr};

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    Error,
    database_id::{CategoryId, UserId},
};

/// The most graphemes allowed in a category name.
pub const MAX_CATEGORY_NAME_LENGTH: usize = 50;

/// The color applied to categories created without one.
pub const DEFAULT_COLOR: &str = "#9e9e9e";

/// The default category set installed for a new user at registration.
const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("Dining Out", "#ff9800", "utensils"),
    ("Entertainment", "#9c27b0", "film"),
    ("Groceries", "#4caf50", "cart"),
    ("Health", "#f44336", "heart"),
    ("Housing", "#795548", "home"),
    ("Other", "#9e9e9e", "tag"),
    ("Transport", "#2196f3", "bus"),
    ("Utilities", "#607d8b", "bolt"),
];

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// # Errors
    /// Returns [Error::EmptyCategoryName] if `name` trims to an empty string,
    /// or [Error::CategoryNameTooLong] if it exceeds
    /// [MAX_CATEGORY_NAME_LENGTH] graphemes.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            return Err(Error::EmptyCategoryName);
        }

        let length = name.graphemes(true).count();
        if length > MAX_CATEGORY_NAME_LENGTH {
            return Err(Error::CategoryNameTooLong(length));
        }

        Ok(Self(name.to_string()))
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is non-empty and within the
    /// length limit. Violating this causes incorrect behaviour but is not
    /// unsafe.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CategoryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryName::new(s)
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 6-digit hex color such as `#4caf50`, stored in canonical lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Color(String);

impl Color {
    /// Parse a color from `RRGGBB` or `#RRGGBB`.
    ///
    /// # Errors
    /// Returns [Error::InvalidColor] if the string is not 6 hex digits.
    pub fn new(color: &str) -> Result<Self, Error> {
        let digits = color.strip_prefix('#').unwrap_or(color);

        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidColor(color.to_string()));
        }

        Ok(Self(format!("#{}", digits.to_ascii_lowercase())))
    }

    /// Wrap an already-canonical color string without validation.
    pub fn new_unchecked(color: &str) -> Self {
        Self(color.to_string())
    }
}

impl Default for Color {
    fn default() -> Self {
        Self(DEFAULT_COLOR.to_string())
    }
}

impl AsRef<str> for Color {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user-scoped grouping for expenses, e.g. "Groceries" or "Transport".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,
    /// The user this category belongs to.
    pub user_id: UserId,
    /// The name of the category.
    pub name: CategoryName,
    /// The display color of the category.
    pub color: Color,
    /// An optional short icon identifier for display layers.
    pub icon: Option<String>,
    /// Whether this category came from the default set installed at
    /// registration.
    pub is_default: bool,
}

/// A category plus how many of the user's expenses currently reference it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryListEntry {
    /// The category record.
    pub category: Category,
    /// The number of expenses referencing the category.
    pub expense_count: u64,
}

/// The fields of a category that may be changed by an update.
///
/// `None` fields are left unchanged. The icon cannot be cleared through an
/// update; deleting and recreating the category is the escape hatch.
#[derive(Debug, Default, Clone)]
pub struct CategoryUpdate {
    /// Replacement name, subject to the per-user uniqueness rule.
    pub name: Option<CategoryName>,
    /// Replacement display color.
    pub color: Option<Color>,
    /// Replacement icon identifier.
    pub icon: Option<String>,
}

/// The outcome of deleting a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryDeletion {
    /// How many expenses were detached from the deleted category.
    pub expenses_updated: u64,
}

/// Create a category for a user.
///
/// # Errors
/// Returns [Error::DuplicateCategoryName] if the user already has a category
/// with this name (case-insensitive), or [Error::SqlError] on other SQL
/// errors.
pub fn create_category(
    user_id: UserId,
    name: CategoryName,
    color: Option<Color>,
    icon: Option<String>,
    connection: &Connection,
) -> Result<Category, Error> {
    insert_category(user_id, name, color, icon, false, connection)
}

/// Install the fixed default category set for a new user.
///
/// Names that the user already has are skipped, so calling this twice (e.g.
/// on a retried registration) is harmless. Returns the categories that were
/// created by this call.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn create_default_categories(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    let mut created = Vec::new();

    for (name, color, icon) in DEFAULT_CATEGORIES {
        let result = insert_category(
            user_id,
            CategoryName::new_unchecked(name),
            Some(Color::new_unchecked(color)),
            Some(icon.to_string()),
            true,
            connection,
        );

        match result {
            Ok(category) => created.push(category),
            Err(Error::DuplicateCategoryName(_)) => continue,
            Err(error) => return Err(error),
        }
    }

    Ok(created)
}

fn insert_category(
    user_id: UserId,
    name: CategoryName,
    color: Option<Color>,
    icon: Option<String>,
    is_default: bool,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare(
            "INSERT INTO category (user_id, name, color, icon, is_default)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, user_id, name, color, icon, is_default",
        )?
        .query_row(
            (
                user_id,
                name.as_ref(),
                color.unwrap_or_default().as_ref(),
                &icon,
                is_default,
            ),
            map_category_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateCategoryName(name.to_string()),
            error => error.into(),
        })
}

/// Retrieve one of a user's categories by ID.
///
/// # Errors
/// Returns [Error::NotFound] if the category does not exist or belongs to a
/// different user, or [Error::SqlError] on other SQL errors.
pub fn get_category(
    user_id: UserId,
    category_id: CategoryId,
    connection: &Connection,
) -> Result<Category, Error> {
    let category = connection
        .prepare(
            "SELECT id, user_id, name, color, icon, is_default FROM category
             WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &category_id), (":user_id", &user_id)],
            map_category_row,
        )?;

    Ok(category)
}

/// Update a user's category.
///
/// The uniqueness check naturally excludes the category being updated, so
/// re-saving a category under its own name (or a re-cased variant of it)
/// succeeds.
///
/// # Errors
/// Returns [Error::NotFound] if the category does not belong to the user,
/// [Error::DuplicateCategoryName] if the new name collides with another of
/// the user's categories, or [Error::SqlError] on other SQL errors.
pub fn update_category(
    user_id: UserId,
    category_id: CategoryId,
    update: CategoryUpdate,
    connection: &Connection,
) -> Result<Category, Error> {
    let current = get_category(user_id, category_id, connection)?;

    let name = update.name.unwrap_or(current.name);
    let color = update.color.unwrap_or(current.color);
    let icon = update.icon.or(current.icon);

    connection
        .execute(
            "UPDATE category SET name = ?1, color = ?2, icon = ?3 WHERE id = ?4 AND user_id = ?5",
            (name.as_ref(), color.as_ref(), &icon, category_id, user_id),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateCategoryName(name.to_string()),
            error => error.into(),
        })?;

    Ok(Category {
        id: category_id,
        user_id,
        name,
        color,
        icon,
        is_default: current.is_default,
    })
}

/// Delete a user's category, detaching any expenses that reference it.
///
/// Detaching and deleting happen in one transaction: either both apply or
/// neither does, so a crash or retry can never leave an expense pointing at
/// a missing category.
///
/// # Errors
/// Returns [Error::NotFound] if the category does not belong to the user, or
/// [Error::SqlError] on other SQL errors.
pub fn delete_category(
    user_id: UserId,
    category_id: CategoryId,
    connection: &mut Connection,
) -> Result<CategoryDeletion, Error> {
    let transaction = connection.transaction()?;

    let expenses_updated = transaction.execute(
        "UPDATE expense SET category_id = NULL WHERE category_id = ?1 AND user_id = ?2",
        (category_id, user_id),
    )?;

    let categories_deleted = transaction.execute(
        "DELETE FROM category WHERE id = ?1 AND user_id = ?2",
        (category_id, user_id),
    )?;

    if categories_deleted == 0 {
        // Dropping the transaction rolls back the detach.
        return Err(Error::NotFound);
    }

    transaction
        .commit()
        .map_err(|error| Error::Consistency(error.to_string()))?;

    Ok(CategoryDeletion {
        expenses_updated: expenses_updated as u64,
    })
}

/// List a user's categories with per-category expense counts, default
/// categories first and then alphabetically.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn list_categories(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<CategoryListEntry>, Error> {
    connection
        .prepare(
            "SELECT category.id, category.user_id, category.name, category.color,
                    category.icon, category.is_default, COUNT(expense.id)
             FROM category
             LEFT JOIN expense ON expense.category_id = category.id
             WHERE category.user_id = :user_id
             GROUP BY category.id
             ORDER BY category.is_default DESC, lower(category.name) ASC",
        )?
        .query_map(&[(":user_id", &user_id)], |row| {
            let category = map_category_row(row)?;
            // SQLite integers are signed; COUNT cannot go negative.
            let expense_count = row.get::<_, i64>(6)? as u64;

            Ok(CategoryListEntry {
                category,
                expense_count,
            })
        })?
        .map(|maybe_entry| maybe_entry.map_err(Error::SqlError))
        .collect()
}

/// Create the category table and its per-user unique name index.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL
/// error.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            icon TEXT,
            is_default INTEGER NOT NULL DEFAULT 0
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_category_user_name
            ON category(user_id, lower(name));",
    )?;

    Ok(())
}

/// Map a database row to a [Category].
pub(crate) fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let raw_name: String = row.get(2)?;
    let raw_color: String = row.get(3)?;

    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: CategoryName::new_unchecked(&raw_name),
        color: Color::new_unchecked(&raw_color),
        icon: row.get(4)?,
        is_default: row.get(5)?,
    })
}

#[cfg(test)]
mod category_name_tests {
    use crate::{Error, category::CategoryName};

    #[test]
    fn new_fails_on_empty_string() {
        assert_eq!(CategoryName::new(""), Err(Error::EmptyCategoryName));
        assert_eq!(CategoryName::new("\n\t \r"), Err(Error::EmptyCategoryName));
    }

    #[test]
    fn new_fails_on_name_over_fifty_graphemes() {
        let name = "a".repeat(51);

        assert_eq!(CategoryName::new(&name), Err(Error::CategoryNameTooLong(51)));
    }

    #[test]
    fn new_counts_graphemes_not_bytes() {
        // 50 multi-byte graphemes are within the limit.
        let name = "é".repeat(50);

        assert!(CategoryName::new(&name).is_ok());
    }

    #[test]
    fn new_trims_whitespace() {
        let name = CategoryName::new("  Groceries  ").unwrap();

        assert_eq!(name.as_ref(), "Groceries");
    }
}

#[cfg(test)]
mod color_tests {
    use crate::{Error, category::Color};

    #[test]
    fn new_accepts_hex_with_and_without_hash() {
        assert_eq!(Color::new("#4CAF50").unwrap().as_ref(), "#4caf50");
        assert_eq!(Color::new("4caf50").unwrap().as_ref(), "#4caf50");
    }

    #[test]
    fn new_rejects_non_hex_input() {
        for input in ["12345", "#1234567", "12345g", "", "#fff"] {
            assert_eq!(
                Color::new(input),
                Err(Error::InvalidColor(input.to_string())),
                "input {input:?} should be rejected"
            );
        }
    }
}

#[cfg(test)]
mod category_query_tests {
    use rusqlite::Connection;

    use crate::{
        Error,
        category::{
            Category, CategoryName, CategoryUpdate, Color, create_category,
            create_default_categories, get_category, list_categories, update_category,
        },
        db::initialize,
    };

    const USER: i64 = 1;
    const OTHER_USER: i64 = 2;

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    fn must_create(name: &str, user_id: i64, connection: &Connection) -> Category {
        create_category(
            user_id,
            CategoryName::new_unchecked(name),
            None,
            None,
            connection,
        )
        .expect("could not create test category")
    }

    #[test]
    fn create_category_succeeds_with_default_color() {
        let connection = get_test_connection();
        let name = CategoryName::new("Groceries").unwrap();

        let category =
            create_category(USER, name.clone(), None, None, &connection).unwrap();

        assert!(category.id > 0);
        assert_eq!(category.name, name);
        assert_eq!(category.color, Color::default());
        assert!(!category.is_default);
    }

    #[test]
    fn create_category_rejects_duplicate_name_case_insensitively() {
        let connection = get_test_connection();
        must_create("Groceries", USER, &connection);

        let result = create_category(
            USER,
            CategoryName::new_unchecked("GROCERIES"),
            None,
            None,
            &connection,
        );

        assert_eq!(
            result,
            Err(Error::DuplicateCategoryName("GROCERIES".to_string()))
        );
    }

    #[test]
    fn same_name_is_allowed_for_different_users() {
        let connection = get_test_connection();
        must_create("Groceries", USER, &connection);

        let result = create_category(
            OTHER_USER,
            CategoryName::new_unchecked("Groceries"),
            None,
            None,
            &connection,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn get_category_scopes_by_user() {
        let connection = get_test_connection();
        let category = must_create("Groceries", USER, &connection);

        assert_eq!(
            get_category(USER, category.id, &connection),
            Ok(category.clone())
        );
        assert_eq!(
            get_category(OTHER_USER, category.id, &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn update_category_changes_fields() {
        let connection = get_test_connection();
        let category = must_create("Groceries", USER, &connection);

        let updated = update_category(
            USER,
            category.id,
            CategoryUpdate {
                name: Some(CategoryName::new_unchecked("Food")),
                color: Some(Color::new("#123abc").unwrap()),
                icon: Some("cart".to_string()),
            },
            &connection,
        )
        .unwrap();

        assert_eq!(updated.name.as_ref(), "Food");
        assert_eq!(updated.color.as_ref(), "#123abc");
        assert_eq!(updated.icon.as_deref(), Some("cart"));
        assert_eq!(get_category(USER, category.id, &connection), Ok(updated));
    }

    #[test]
    fn update_category_excludes_itself_from_uniqueness_check() {
        let connection = get_test_connection();
        let category = must_create("groceries", USER, &connection);

        let result = update_category(
            USER,
            category.id,
            CategoryUpdate {
                name: Some(CategoryName::new_unchecked("Groceries")),
                ..Default::default()
            },
            &connection,
        );

        assert!(result.is_ok(), "re-casing a name should succeed: {result:?}");
    }

    #[test]
    fn update_category_rejects_name_taken_by_sibling() {
        let connection = get_test_connection();
        must_create("Groceries", USER, &connection);
        let category = must_create("Transport", USER, &connection);

        let result = update_category(
            USER,
            category.id,
            CategoryUpdate {
                name: Some(CategoryName::new_unchecked("groceries")),
                ..Default::default()
            },
            &connection,
        );

        assert_eq!(
            result,
            Err(Error::DuplicateCategoryName("groceries".to_string()))
        );
    }

    #[test]
    fn update_category_with_wrong_user_returns_not_found() {
        let connection = get_test_connection();
        let category = must_create("Groceries", USER, &connection);

        let result = update_category(
            OTHER_USER,
            category.id,
            CategoryUpdate::default(),
            &connection,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn list_categories_sorts_defaults_first_then_alphabetically() {
        let connection = get_test_connection();
        create_default_categories(USER, &connection).unwrap();
        must_create("Books", USER, &connection);
        must_create("Travel", USER, &connection);

        let entries = list_categories(USER, &connection).unwrap();

        let (defaults, customs): (Vec<_>, Vec<_>) = entries
            .iter()
            .partition(|entry| entry.category.is_default);
        assert!(!defaults.is_empty());
        assert_eq!(customs.len(), 2);

        // Defaults come before customs, and each group is alphabetical.
        let names: Vec<&str> = entries
            .iter()
            .map(|entry| entry.category.name.as_ref())
            .collect();
        let default_count = defaults.len();
        assert!(entries[..default_count]
            .iter()
            .all(|entry| entry.category.is_default));
        assert!(names[..default_count].is_sorted());
        assert_eq!(&names[default_count..], &["Books", "Travel"]);
    }

    #[test]
    fn list_categories_counts_referencing_expenses() {
        use time::macros::date;

        use crate::{
            expense::{Expense, create_expense},
            money::Money,
        };

        let mut connection = get_test_connection();
        let groceries = must_create("Groceries", USER, &connection);
        must_create("Transport", USER, &connection);
        for i in 0..2 {
            create_expense(
                USER,
                Expense::build(Money::from_cents(100 + i), date!(2025 - 06 - 01), "shop")
                    .category_id(Some(groceries.id)),
                &mut connection,
            )
            .unwrap();
        }

        let entries = list_categories(USER, &connection).unwrap();

        let counts: Vec<(&str, u64)> = entries
            .iter()
            .map(|entry| (entry.category.name.as_ref(), entry.expense_count))
            .collect();
        assert_eq!(counts, vec![("Groceries", 2), ("Transport", 0)]);
    }

    #[test]
    fn create_default_categories_skips_existing_names() {
        let connection = get_test_connection();
        must_create("Groceries", USER, &connection);

        let first = create_default_categories(USER, &connection).unwrap();
        let second = create_default_categories(USER, &connection).unwrap();

        assert!(first.iter().all(|c| c.name.as_ref() != "Groceries"));
        assert!(second.is_empty());
    }
}

#[cfg(test)]
mod category_deletion_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        category::{CategoryName, create_category, delete_category, get_category},
        db::initialize,
        expense::{Expense, create_expense, get_expense},
        money::Money,
    };

    const USER: i64 = 1;

    fn get_test_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    #[test]
    fn delete_category_detaches_every_referencing_expense() {
        let mut connection = get_test_connection();
        let category = create_category(
            USER,
            CategoryName::new_unchecked("Groceries"),
            None,
            None,
            &connection,
        )
        .unwrap();
        let expense_count = 3;
        let mut expense_ids = Vec::new();
        for i in 0..expense_count {
            let expense = create_expense(
                USER,
                Expense::build(Money::from_cents(100 + i), date!(2025 - 06 - 01), "weekly shop")
                    .category_id(Some(category.id)),
                &mut connection,
            )
            .unwrap();
            expense_ids.push(expense.id);
        }
        // An unrelated expense must not be touched.
        let other_category = create_category(
            USER,
            CategoryName::new_unchecked("Transport"),
            None,
            None,
            &connection,
        )
        .unwrap();
        let unrelated = create_expense(
            USER,
            Expense::build(Money::from_cents(500), date!(2025 - 06 - 02), "bus fare")
                .category_id(Some(other_category.id)),
            &mut connection,
        )
        .unwrap();

        let deletion = delete_category(USER, category.id, &mut connection).unwrap();

        assert_eq!(deletion.expenses_updated, expense_count as u64);
        for expense_id in expense_ids {
            let expense = get_expense(USER, expense_id, &connection).unwrap();
            assert_eq!(expense.category_id, None);
        }
        assert_eq!(
            get_expense(USER, unrelated.id, &connection).unwrap().category_id,
            Some(other_category.id)
        );
        assert_eq!(
            get_category(USER, category.id, &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn delete_category_with_invalid_id_returns_not_found() {
        let mut connection = get_test_connection();

        let result = delete_category(USER, 999_999, &mut connection);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn delete_category_with_no_expenses_reports_zero_updated() {
        let mut connection = get_test_connection();
        let category = create_category(
            USER,
            CategoryName::new_unchecked("Groceries"),
            None,
            None,
            &connection,
        )
        .unwrap();

        let deletion = delete_category(USER, category.id, &mut connection).unwrap();

        assert_eq!(deletion.expenses_updated, 0);
    }
}
