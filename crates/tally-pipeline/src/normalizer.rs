//! Record normalization: one extraction result to ledger records
//!
//! Pure transform. The only non-deterministic inputs (correlation id and
//! timestamp) are generated by [`normalize`]; [`normalize_with`] takes them
//! as arguments.

use chrono::{DateTime, Utc};
use tally_domain::{CorrelationId, ExtractionResult, LedgerRecord, Source, UNKNOWN_ITEM};

/// Records of one extraction event plus the computed total
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    /// Correlation id shared by every record
    pub correlation: CorrelationId,

    /// Records in position order
    pub records: Vec<LedgerRecord>,

    /// Event total
    pub total: f64,
}

/// Normalize with a fresh correlation id and the current time
pub fn normalize(
    user_id: i64,
    source: Source,
    raw_text: Option<&str>,
    result: &ExtractionResult,
) -> Result<NormalizedBatch, serde_json::Error> {
    normalize_with(CorrelationId::new(), Utc::now(), user_id, source, raw_text, result)
}

/// Expand a result into ledger records.
///
/// Empty positions produce a single `"Unknown item"` record priced at the
/// total under the bare correlation id. Otherwise there is one record per
/// position, id `{correlation}-{index}`.
pub fn normalize_with(
    correlation: CorrelationId,
    created_at: DateTime<Utc>,
    user_id: i64,
    source: Source,
    raw_text: Option<&str>,
    result: &ExtractionResult,
) -> Result<NormalizedBatch, serde_json::Error> {
    let total = result.total();
    let json = serde_json::to_string(result)?;

    let record = |id: String, item_name: &str, item_price: f64| LedgerRecord {
        id,
        user_id,
        created_at,
        source,
        raw_text: raw_text.map(str::to_string),
        spend_total: total,
        currency: result.currency.clone(),
        item_name: item_name.to_string(),
        item_price,
        cashier_name: result.cashier_name.clone(),
        json: json.clone(),
    };

    let records = if result.positions.is_empty() {
        vec![record(correlation.to_string(), UNKNOWN_ITEM, total)]
    } else {
        result
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| record(correlation.record_id(i), &p.name, p.price))
            .collect()
    };

    Ok(NormalizedBatch {
        correlation,
        records,
        total,
    })
}
