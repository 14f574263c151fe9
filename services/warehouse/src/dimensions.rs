//! Dimension Builder - derives the four dimension tables from raw records
//!
//! Each dimension is a set of distinct natural keys, each with a dense
//! surrogate key assigned in order of first occurrence. Natural values are
//! compared exactly: "North", "north" and " North" are three regions.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::error::{EtlError, Result};
use crate::source::RawRecord;

pub type SurrogateKey = i32;

/// First surrogate key of every dimension (same origin as a SERIAL column)
pub const KEY_ORIGIN: SurrogateKey = 1;

/// Fixed format of the export's Date column
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Parse a raw export date. Unparseable input is a missing value, not an error.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

// =============================================================================
// DATE ATTRIBUTES
// =============================================================================

/// Calendar attributes stored alongside each DateDim row.
/// Always derived from the parsed date, never from the raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateAttributes {
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    pub day_of_week: &'static str,
    pub week_of_year: i32,
}

impl DateAttributes {
    pub fn derive(date: NaiveDate) -> Self {
        let month = date.month() as i32;
        Self {
            year: date.year(),
            quarter: (month - 1) / 3 + 1,
            month,
            day_of_week: weekday_name(date.weekday()),
            week_of_year: date.iso_week().week() as i32,
        }
    }

    pub fn month_name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "January", "February", "March", "April", "May", "June", "July", "August",
            "September", "October", "November", "December",
        ];
        NAMES[(self.month - 1) as usize]
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// One DateDim row as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateDimensionRow {
    pub date_key: SurrogateKey,
    pub full_date: NaiveDate,
    pub attributes: DateAttributes,
}

// =============================================================================
// GENERIC DIMENSION TABLE
// =============================================================================

/// Natural key of ProductDim: same name under two categories is two products
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductKey {
    pub category: String,
    pub name: String,
}

impl ProductKey {
    pub fn of(record: &RawRecord) -> Self {
        Self {
            category: record.product_category.clone(),
            name: record.product_name.clone(),
        }
    }
}

/// A dimension table: `(surrogate key, natural key)` rows plus a lookup index
#[derive(Debug, Clone)]
pub struct Dimension<K> {
    name: &'static str,
    rows: Vec<(SurrogateKey, K)>,
    index: HashMap<K, SurrogateKey>,
    next_key: SurrogateKey,
}

impl<K> Dimension<K>
where
    K: Clone + Eq + Hash + Debug,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: Vec::new(),
            index: HashMap::new(),
            next_key: KEY_ORIGIN,
        }
    }

    /// Build a table from rows produced elsewhere (e.g. read back from the
    /// store). Rows are kept as given, duplicates included; see `validate`.
    pub fn from_rows(name: &'static str, rows: Vec<(SurrogateKey, K)>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (key, natural) in &rows {
            index.entry(natural.clone()).or_insert(*key);
        }
        let next_key = rows
            .iter()
            .map(|(key, _)| key.saturating_add(1))
            .max()
            .unwrap_or(KEY_ORIGIN);
        Self {
            name,
            rows,
            index,
            next_key,
        }
    }

    /// Surrogate key for `natural`, assigning the next one on first sight
    pub fn intern(&mut self, natural: K) -> SurrogateKey {
        if let Some(&key) = self.index.get(&natural) {
            return key;
        }
        let key = self.next_key;
        self.next_key += 1;
        self.index.insert(natural.clone(), key);
        self.rows.push((key, natural));
        key
    }

    pub fn key_of(&self, natural: &K) -> Option<SurrogateKey> {
        self.index.get(natural).copied()
    }

    pub fn rows(&self) -> &[(SurrogateKey, K)] {
        &self.rows
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Natural keys and surrogate keys must both be pairwise distinct
    pub fn validate(&self) -> Result<()> {
        let mut naturals = HashSet::with_capacity(self.rows.len());
        let mut keys = HashSet::with_capacity(self.rows.len());
        for (key, natural) in &self.rows {
            if !naturals.insert(natural) {
                return Err(EtlError::DimensionIntegrity {
                    dimension: self.name,
                    what: "natural key",
                    value: format!("{:?}", natural),
                });
            }
            if !keys.insert(*key) {
                return Err(EtlError::DimensionIntegrity {
                    dimension: self.name,
                    what: "surrogate key",
                    value: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// THE FOUR DIMENSIONS
// =============================================================================

#[derive(Debug, Clone)]
pub struct DimensionSet {
    pub date: Dimension<NaiveDate>,
    pub product: Dimension<ProductKey>,
    pub region: Dimension<String>,
    pub payment: Dimension<String>,
}

impl DimensionSet {
    pub fn empty() -> Self {
        Self {
            date: Dimension::new("DateDim"),
            product: Dimension::new("ProductDim"),
            region: Dimension::new("RegionDim"),
            payment: Dimension::new("PaymentDim"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.date.validate()?;
        self.product.validate()?;
        self.region.validate()?;
        self.payment.validate()
    }

    /// DateDim rows with their derived calendar attributes
    pub fn date_rows(&self) -> impl Iterator<Item = DateDimensionRow> + '_ {
        self.date.rows().iter().map(|(key, date)| DateDimensionRow {
            date_key: *key,
            full_date: *date,
            attributes: DateAttributes::derive(*date),
        })
    }
}

/// Project, deduplicate, and key every dimension present in `records`
pub fn build_dimensions(records: &[RawRecord]) -> Result<DimensionSet> {
    let mut dims = DimensionSet::empty();
    let mut unparsed_dates = 0usize;

    for record in records {
        match record.parsed_date() {
            Some(date) => {
                dims.date.intern(date);
            }
            None => unparsed_dates += 1,
        }
        dims.product.intern(ProductKey::of(record));
        dims.region.intern(record.region.clone());
        dims.payment.intern(record.payment_method.clone());
    }

    if unparsed_dates > 0 {
        tracing::warn!(
            rows = unparsed_dates,
            format = DATE_FORMAT,
            "dates did not parse; those facts get a null DateKey"
        );
    }

    dims.validate()?;

    tracing::info!(
        dates = dims.date.len(),
        products = dims.product.len(),
        regions = dims.region.len(),
        payments = dims.payment.len(),
        "dimensions built"
    );
    Ok(dims)
}
