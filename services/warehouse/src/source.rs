//! Source Loader - reads the flat sales export into raw records
//!
//! The loader validates the header and the numeric measures but leaves the
//! date column as the raw string: parsing happens once, in
//! `dimensions::parse_date`, so the dimension and the fact side agree.

use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::fs;

use crate::dimensions::parse_date;
use crate::error::{EtlError, Result};

/// Canonical column names. Header cells are compared with spaces removed,
/// so the export's "Transaction ID" spelling matches "TransactionID".
pub const EXPECTED_COLUMNS: &[&str] = &[
    "TransactionID",
    "Date",
    "ProductCategory",
    "ProductName",
    "Region",
    "PaymentMethod",
    "UnitsSold",
    "UnitPrice",
    "TotalRevenue",
];

const TRANSACTION_ID: usize = 0;
const DATE: usize = 1;
const PRODUCT_CATEGORY: usize = 2;
const PRODUCT_NAME: usize = 3;
const REGION: usize = 4;
const PAYMENT_METHOD: usize = 5;
const UNITS_SOLD: usize = 6;
const UNIT_PRICE: usize = 7;
const TOTAL_REVENUE: usize = 8;

/// One row of the sales export, exactly as read
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub transaction_id: i64,
    pub date: String,
    pub product_category: String,
    pub product_name: String,
    pub region: String,
    pub payment_method: String,
    pub units_sold: i32,
    pub unit_price: Decimal,
    pub total_revenue: Decimal,
}

impl RawRecord {
    /// Calendar date of the sale, `None` when the raw string does not parse
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }
}

/// Map each canonical column to its position in the file's header
fn column_positions(headers: &csv::StringRecord) -> Result<[usize; 9]> {
    if headers.len() != EXPECTED_COLUMNS.len() {
        return Err(EtlError::source_read(
            "header",
            format!(
                "expected {} columns, found {}: {:?}",
                EXPECTED_COLUMNS.len(),
                headers.len(),
                headers.iter().collect::<Vec<_>>()
            ),
        ));
    }

    let mut positions = [usize::MAX; 9];
    for (idx, header) in headers.iter().enumerate() {
        let compact: String = header.chars().filter(|c| !c.is_whitespace()).collect();
        let slot = EXPECTED_COLUMNS
            .iter()
            .position(|expected| *expected == compact)
            .ok_or_else(|| {
                EtlError::source_read("header", format!("unexpected column '{}'", header))
            })?;
        if positions[slot] != usize::MAX {
            return Err(EtlError::source_read(
                "header",
                format!("column '{}' appears more than once", EXPECTED_COLUMNS[slot]),
            ));
        }
        positions[slot] = idx;
    }

    Ok(positions)
}

fn parse_field<T>(raw: &str, column: usize, line: u64) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        EtlError::source_read(
            format!("line {}", line),
            format!("invalid {} value '{}': {}", EXPECTED_COLUMNS[column], raw, e),
        )
    })
}

/// Parse the export's content into raw records.
/// Deterministic: same content = same records, in file order.
pub fn parse_source(content: &str) -> Result<Vec<RawRecord>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| EtlError::source_read("header", e))?
        .clone();
    let positions = column_positions(&headers)?;

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let fallback_line = idx as u64 + 2; // header is line 1
        let record = result.map_err(|e| {
            EtlError::source_read(format!("line {}", fallback_line), e)
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
        let field = |column: usize| record.get(positions[column]).unwrap_or("");

        records.push(RawRecord {
            transaction_id: parse_field(field(TRANSACTION_ID), TRANSACTION_ID, line)?,
            date: field(DATE).to_string(),
            product_category: field(PRODUCT_CATEGORY).to_string(),
            product_name: field(PRODUCT_NAME).to_string(),
            region: field(REGION).to_string(),
            payment_method: field(PAYMENT_METHOD).to_string(),
            units_sold: parse_field(field(UNITS_SOLD), UNITS_SOLD, line)?,
            unit_price: parse_field(field(UNIT_PRICE), UNIT_PRICE, line)?,
            total_revenue: parse_field(field(TOTAL_REVENUE), TOTAL_REVENUE, line)?,
        });
    }

    Ok(records)
}

/// Read and parse the export at `path`
pub async fn load_source(path: &Path) -> Result<Vec<RawRecord>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| EtlError::source_read(path.display().to_string(), e))?;

    let records = parse_source(&content).map_err(|err| match err {
        EtlError::SourceRead { location, reason } => EtlError::SourceRead {
            location: format!("{} ({})", path.display(), location),
            reason,
        },
        other => other,
    })?;

    tracing::info!(path = %path.display(), rows = records.len(), bytes = content.len(), "source loaded");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "TransactionID,Date,ProductCategory,ProductName,Region,PaymentMethod,UnitsSold,UnitPrice,TotalRevenue";

    // -------------------------------------------------------------------------
    // HEADER VALIDATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_basic_row() {
        let csv = format!("{HEADER}\n1001,05/03/2023,Electronics,Phone,West,Card,2,199.99,399.98\n");
        let records = parse_source(&csv).unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.transaction_id, 1001);
        assert_eq!(r.date, "05/03/2023");
        assert_eq!(r.product_category, "Electronics");
        assert_eq!(r.product_name, "Phone");
        assert_eq!(r.region, "West");
        assert_eq!(r.payment_method, "Card");
        assert_eq!(r.units_sold, 2);
        assert_eq!(r.unit_price, Decimal::new(19999, 2));
        assert_eq!(r.total_revenue, Decimal::new(39998, 2));
    }

    #[test]
    fn test_export_header_spelling_accepted() {
        let csv = "Transaction ID,Date,Product Category,Product Name,Units Sold,Unit Price,Total Revenue,Region,Payment Method\n\
                   10001,01/01/2024,Electronics,iPhone 14 Pro,2,999.99,1999.98,North America,Credit Card\n";
        let records = parse_source(csv).unwrap();

        assert_eq!(records[0].transaction_id, 10001);
        assert_eq!(records[0].region, "North America");
        assert_eq!(records[0].payment_method, "Credit Card");
        assert_eq!(records[0].units_sold, 2);
    }

    #[test]
    fn test_wrong_column_count_fails() {
        let csv = "TransactionID,Date,ProductCategory,ProductName,Region,PaymentMethod,UnitsSold,UnitPrice\n\
                   1,05/03/2023,A,B,C,D,1,1.00\n";
        let err = parse_source(csv).unwrap_err();
        assert!(matches!(err, EtlError::SourceRead { .. }));
        assert!(err.to_string().contains("expected 9 columns"));
    }

    #[test]
    fn test_unknown_column_fails() {
        let csv = "TransactionID,Date,ProductCategory,ProductName,Region,PaymentMethod,UnitsSold,UnitPrice,Discount\n";
        let err = parse_source(csv).unwrap_err();
        assert!(err.to_string().contains("unexpected column 'Discount'"));
    }

    #[test]
    fn test_duplicate_column_fails() {
        let csv = "TransactionID,Date,ProductCategory,ProductName,Region,Region,UnitsSold,UnitPrice,TotalRevenue\n";
        let err = parse_source(csv).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_empty_content_fails() {
        assert!(matches!(parse_source(""), Err(EtlError::SourceRead { .. })));
    }

    #[test]
    fn test_header_only_is_empty() {
        let records = parse_source(&format!("{HEADER}\n")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_bom_stripped() {
        let csv = format!("\u{feff}{HEADER}\n1,05/03/2023,A,B,C,D,1,1.00,1.00\n");
        assert_eq!(parse_source(&csv).unwrap().len(), 1);
    }

    // -------------------------------------------------------------------------
    // ROW VALIDATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_short_row_fails() {
        let csv = format!("{HEADER}\n1,05/03/2023,A,B,C,D,1,1.00\n");
        assert!(matches!(parse_source(&csv), Err(EtlError::SourceRead { .. })));
    }

    #[test]
    fn test_bad_measure_names_line_and_value() {
        let csv = format!(
            "{HEADER}\n1,05/03/2023,A,B,C,D,1,1.00,1.00\n2,05/03/2023,A,B,C,D,two,1.00,2.00\n"
        );
        let err = parse_source(&csv).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{err}");
        assert!(err.contains("UnitsSold"), "{err}");
        assert!(err.contains("'two'"), "{err}");
    }

    #[test]
    fn test_date_left_unparsed() {
        let csv = format!("{HEADER}\n1,31/13/2023,A,B,C,D,1,1.00,1.00\n");
        let records = parse_source(&csv).unwrap();
        assert_eq!(records[0].date, "31/13/2023");
        assert_eq!(records[0].parsed_date(), None);
    }

    #[test]
    fn test_dimension_values_not_normalized() {
        let csv = format!("{HEADER}\n1,05/03/2023,A,B, north ,D,1,1.00,1.00\n");
        let records = parse_source(&csv).unwrap();
        assert_eq!(records[0].region, " north ");
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let err = load_source(Path::new("/nonexistent/online_sales.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::SourceRead { .. }));
        assert!(err.to_string().contains("/nonexistent/online_sales.csv"));
    }
}
