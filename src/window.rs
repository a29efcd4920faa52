//! Calendar window helpers shared by the analytics queries.

use time::{Date, Duration, Month};

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DateRange {
    pub start: Date,
    pub end: Date,
}

/// The full calendar month containing the given year and month.
pub(crate) fn month_bounds(year: i32, month: Month) -> DateRange {
    let start = Date::from_calendar_date(year, month, 1).expect("invalid month start date");
    let end = Date::from_calendar_date(year, month, last_day_of_month(year, month))
        .expect("invalid month end date");

    DateRange { start, end }
}

/// The window from the first of the current month up to `today`.
pub(crate) fn month_to_date(today: Date) -> DateRange {
    DateRange {
        start: today.replace_day(1).expect("day 1 is always valid"),
        end: today,
    }
}

/// The full calendar month before the one containing `today`.
pub(crate) fn previous_month(today: Date) -> DateRange {
    let last_of_previous = today.replace_day(1).expect("day 1 is always valid") - Duration::days(1);

    month_bounds(last_of_previous.year(), last_of_previous.month())
}

/// The window from the first of January up to `today`.
pub(crate) fn year_to_date(today: Date) -> DateRange {
    DateRange {
        start: Date::from_calendar_date(today.year(), Month::January, 1)
            .expect("invalid year start date"),
        end: today,
    }
}

/// The number of days in the given month.
pub(crate) fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
