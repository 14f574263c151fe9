//! Fact Assembler - projects resolved records onto the FactSales columns

use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::dimensions::SurrogateKey;
use crate::error::{EtlError, Result};
use crate::resolver::KeyedRecord;

/// Scale of the NUMERIC(12,2) measure columns
pub const MONEY_SCALE: u32 = 2;

/// One FactSales row
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub transaction_id: i64,
    pub date_key: Option<SurrogateKey>,
    pub product_key: Option<SurrogateKey>,
    pub region_key: Option<SurrogateKey>,
    pub payment_key: Option<SurrogateKey>,
    pub units_sold: i32,
    pub unit_price: Decimal,
    pub total_revenue: Decimal,
}

/// Round to cents the way Postgres NUMERIC does (half away from zero)
pub fn to_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn assemble_facts(keyed: &[KeyedRecord<'_>]) -> Vec<FactRow> {
    keyed
        .iter()
        .map(|k| FactRow {
            transaction_id: k.record.transaction_id,
            date_key: k.date_key,
            product_key: k.product_key,
            region_key: k.region_key,
            payment_key: k.payment_key,
            units_sold: k.record.units_sold,
            unit_price: to_money(k.record.unit_price),
            total_revenue: to_money(k.record.total_revenue),
        })
        .collect()
}

/// TransactionID is the FactSales primary key: a collision is rejected
/// before anything is written, never merged.
pub fn check_unique_transactions(facts: &[FactRow]) -> Result<()> {
    let mut seen = HashSet::with_capacity(facts.len());
    for fact in facts {
        if !seen.insert(fact.transaction_id) {
            return Err(EtlError::Persist {
                target: "FactSales".to_string(),
                reason: format!("duplicate TransactionID {}", fact.transaction_id),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::build_dimensions;
    use crate::resolver::resolve_keys;
    use crate::source::RawRecord;

    fn record(id: i64, date: &str, price: Decimal, revenue: Decimal) -> RawRecord {
        RawRecord {
            transaction_id: id,
            date: date.to_string(),
            product_category: "Electronics".to_string(),
            product_name: "Phone".to_string(),
            region: "West".to_string(),
            payment_method: "Card".to_string(),
            units_sold: 2,
            unit_price: price,
            total_revenue: revenue,
        }
    }

    #[test]
    fn test_assemble_scenario_row() {
        let records = vec![record(1001, "05/03/2023", Decimal::new(19999, 2), Decimal::new(39998, 2))];
        let dims = build_dimensions(&records).unwrap();
        let keyed = resolve_keys(&records, &dims).unwrap();
        let facts = assemble_facts(&keyed);

        assert_eq!(
            facts,
            vec![FactRow {
                transaction_id: 1001,
                date_key: Some(1),
                product_key: Some(1),
                region_key: Some(1),
                payment_key: Some(1),
                units_sold: 2,
                unit_price: Decimal::new(19999, 2),
                total_revenue: Decimal::new(39998, 2),
            }]
        );
    }

    #[test]
    fn test_one_fact_per_record() {
        let records: Vec<_> = (0..10)
            .map(|i| record(i, if i % 4 == 0 { "bad" } else { "05/03/2023" }, Decimal::ONE, Decimal::ONE))
            .collect();
        let dims = build_dimensions(&records).unwrap();
        let facts = assemble_facts(&resolve_keys(&records, &dims).unwrap());

        assert_eq!(facts.len(), records.len());
        assert_eq!(facts.iter().filter(|f| f.date_key.is_none()).count(), 3);
    }

    #[test]
    fn test_money_rounds_to_cents() {
        assert_eq!(to_money(Decimal::new(199995, 3)), Decimal::new(20000, 2));
        assert_eq!(to_money(Decimal::new(199994, 3)), Decimal::new(19999, 2));
        assert_eq!(to_money(Decimal::new(-25, 3)), Decimal::new(-3, 2));
        assert_eq!(to_money(Decimal::new(7, 0)).to_string(), "7");
    }

    #[test]
    fn test_duplicate_transaction_rejected() {
        let records = vec![
            record(1001, "05/03/2023", Decimal::ONE, Decimal::ONE),
            record(1001, "06/03/2023", Decimal::TWO, Decimal::TWO),
        ];
        let dims = build_dimensions(&records).unwrap();
        let facts = assemble_facts(&resolve_keys(&records, &dims).unwrap());

        let err = check_unique_transactions(&facts).unwrap_err();
        assert!(matches!(err, EtlError::Persist { .. }));
        assert!(err.to_string().contains("1001"));
    }

    #[test]
    fn test_unique_transactions_pass() {
        let records = vec![
            record(1, "05/03/2023", Decimal::ONE, Decimal::ONE),
            record(2, "05/03/2023", Decimal::ONE, Decimal::ONE),
        ];
        let dims = build_dimensions(&records).unwrap();
        let facts = assemble_facts(&resolve_keys(&records, &dims).unwrap());
        assert!(check_unique_transactions(&facts).is_ok());
    }
}
