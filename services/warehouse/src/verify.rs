//! Re-derives DateDim's calendar fields from FullDate and reports drift
//!
//! Derived fields are pure functions of the date, so a stored row whose
//! Year/Quarter/Month/DayOfWeek/WeekOfYear disagree with a fresh derivation
//! was written by something other than this loader.

use chrono::NaiveDate;

use crate::dimensions::{DateAttributes, Dimension, SurrogateKey};
use crate::error::Result;
use crate::sink::StoredDateRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMismatch {
    pub date_key: SurrogateKey,
    pub full_date: NaiveDate,
    pub field: &'static str,
    pub stored: String,
    pub derived: String,
}

/// Check stored DateDim rows. Fails outright if FullDate or DateKey repeat.
pub fn verify_date_dimension(rows: &[StoredDateRow]) -> Result<Vec<DateMismatch>> {
    Dimension::from_rows(
        "DateDim",
        rows.iter().map(|r| (r.date_key, r.full_date)).collect(),
    )
    .validate()?;

    let mut mismatches = Vec::new();
    for row in rows {
        let derived = DateAttributes::derive(row.full_date);
        let fields = [
            ("Year", row.year.to_string(), derived.year.to_string()),
            ("Quarter", row.quarter.to_string(), derived.quarter.to_string()),
            ("Month", row.month.to_string(), derived.month.to_string()),
            ("DayOfWeek", row.day_of_week.clone(), derived.day_of_week.to_string()),
            ("WeekOfYear", row.week_of_year.to_string(), derived.week_of_year.to_string()),
        ];
        for (field, stored, derived) in fields {
            if stored != derived {
                mismatches.push(DateMismatch {
                    date_key: row.date_key,
                    full_date: row.full_date,
                    field,
                    stored,
                    derived,
                });
            }
        }
    }

    Ok(mismatches)
}
