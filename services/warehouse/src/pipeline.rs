//! Builder -> Resolver -> Assembler, with no I/O
//!
//! DETERMINISTIC: the same records always produce the same plan, keys
//! included, which is what makes a replace load idempotent.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::dimensions::{build_dimensions, DimensionSet};
use crate::error::Result;
use crate::facts::{assemble_facts, check_unique_transactions, FactRow};
use crate::resolver::resolve_keys;
use crate::source::RawRecord;

/// Everything the sink writes for one run
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub dimensions: DimensionSet,
    pub facts: Vec<FactRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source_rows: usize,
    pub date_rows: usize,
    pub product_rows: usize,
    pub region_rows: usize,
    pub payment_rows: usize,
    pub fact_rows: usize,
    pub null_date_keys: usize,
    pub facts_with_null_key: usize,
    pub units_sold: i64,
    pub total_revenue: Decimal,
}

pub fn plan_load(records: &[RawRecord]) -> Result<LoadPlan> {
    let dimensions = build_dimensions(records)?;
    let keyed = resolve_keys(records, &dimensions)?;
    let facts = assemble_facts(&keyed);
    check_unique_transactions(&facts)?;

    Ok(LoadPlan { dimensions, facts })
}

impl LoadPlan {
    pub fn summary(&self, source_rows: usize) -> RunSummary {
        let facts = &self.facts;
        RunSummary {
            source_rows,
            date_rows: self.dimensions.date.len(),
            product_rows: self.dimensions.product.len(),
            region_rows: self.dimensions.region.len(),
            payment_rows: self.dimensions.payment.len(),
            fact_rows: facts.len(),
            null_date_keys: facts.iter().filter(|f| f.date_key.is_none()).count(),
            facts_with_null_key: facts
                .iter()
                .filter(|f| {
                    f.date_key.is_none()
                        || f.product_key.is_none()
                        || f.region_key.is_none()
                        || f.payment_key.is_none()
                })
                .count(),
            units_sold: facts.iter().map(|f| f.units_sold as i64).sum(),
            total_revenue: facts.iter().map(|f| f.total_revenue).sum(),
        }
    }
}
