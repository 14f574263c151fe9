//! Key Resolver - attaches the four surrogate keys to every raw record
//!
//! Four left joins in a fixed order: Date, Product, Region, Payment.
//! A record with no match keeps a null key; it is never dropped. A natural
//! key matching several surrogate keys fans the record out, which the
//! cardinality check after each join turns into an error.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::dimensions::{Dimension, DimensionSet, ProductKey, SurrogateKey};
use crate::error::{EtlError, Result};
use crate::source::RawRecord;

/// A raw record plus the surrogate keys resolved so far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyedRecord<'a> {
    pub record: &'a RawRecord,
    pub date_key: Option<SurrogateKey>,
    pub product_key: Option<SurrogateKey>,
    pub region_key: Option<SurrogateKey>,
    pub payment_key: Option<SurrogateKey>,
}

impl<'a> KeyedRecord<'a> {
    fn unresolved(record: &'a RawRecord) -> Self {
        Self {
            record,
            date_key: None,
            product_key: None,
            region_key: None,
            payment_key: None,
        }
    }

    pub fn has_null_key(&self) -> bool {
        self.date_key.is_none()
            || self.product_key.is_none()
            || self.region_key.is_none()
            || self.payment_key.is_none()
    }
}

/// Left join `rows` to `dimension` on the natural key extracted by `natural_of`.
/// `None` from `natural_of` never matches.
fn left_join<'a, K, F, A>(
    rows: Vec<KeyedRecord<'a>>,
    dimension: &Dimension<K>,
    natural_of: F,
    assign: A,
) -> Result<Vec<KeyedRecord<'a>>>
where
    K: Clone + Eq + Hash + Debug,
    F: Fn(&KeyedRecord<'a>) -> Option<K>,
    A: Fn(&mut KeyedRecord<'a>, SurrogateKey),
{
    // All surrogate keys per natural key, so a non-unique dimension shows up
    // as fan-out instead of silently picking one
    let mut index: HashMap<&K, Vec<SurrogateKey>> = HashMap::with_capacity(dimension.len());
    for (key, natural) in dimension.rows() {
        index.entry(natural).or_default().push(*key);
    }

    let input_rows = rows.len();
    let mut output = Vec::with_capacity(input_rows);
    let mut fanned_out: Option<K> = None;

    for row in rows {
        let natural = natural_of(&row);
        match natural.as_ref().and_then(|n| index.get(n)) {
            None => output.push(row),
            Some(keys) => {
                if keys.len() > 1 && fanned_out.is_none() {
                    fanned_out = natural.clone();
                }
                for &key in keys {
                    let mut joined = row;
                    assign(&mut joined, key);
                    output.push(joined);
                }
            }
        }
    }

    if output.len() != input_rows {
        return Err(EtlError::JoinCardinality {
            dimension: dimension.name(),
            value: fanned_out
                .map(|natural| format!("{:?}", natural))
                .unwrap_or_default(),
            input_rows,
            output_rows: output.len(),
        });
    }

    Ok(output)
}

/// Resolve all four surrogate keys; exactly one output row per input record
pub fn resolve_keys<'a>(
    records: &'a [RawRecord],
    dims: &DimensionSet,
) -> Result<Vec<KeyedRecord<'a>>> {
    let rows: Vec<KeyedRecord<'a>> = records.iter().map(KeyedRecord::unresolved).collect();

    // Date joins on the parsed value, never the raw string
    let rows = left_join(
        rows,
        &dims.date,
        |r| r.record.parsed_date(),
        |r, key| r.date_key = Some(key),
    )?;
    let rows = left_join(
        rows,
        &dims.product,
        |r| Some(ProductKey::of(r.record)),
        |r, key| r.product_key = Some(key),
    )?;
    let rows = left_join(
        rows,
        &dims.region,
        |r| Some(r.record.region.clone()),
        |r, key| r.region_key = Some(key),
    )?;
    let rows = left_join(
        rows,
        &dims.payment,
        |r| Some(r.record.payment_method.clone()),
        |r, key| r.payment_key = Some(key),
    )?;

    let partial = rows.iter().filter(|r| r.has_null_key()).count();
    if partial > 0 {
        tracing::warn!(rows = partial, "records resolved with at least one null key");
    }
    tracing::debug!(rows = rows.len(), "keys resolved");

    Ok(rows)
}
