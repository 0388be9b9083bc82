//! Structured expense data produced by the extraction backend

use serde::{Deserialize, Deserializer, Serialize};

/// One receipt line item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Item name as printed or spoken
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Item price in the receipt currency
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
}

impl Position {
    /// Create a new position
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// Output of one extraction call.
///
/// Immutable once produced. `spend == 0.0` means the backend did not find an
/// explicit total. The serialized form is what ends up in the ledger's `json`
/// column, so the field names are part of the storage format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// ISO currency code (may be empty)
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: String,

    /// Explicit total, 0 when unset
    #[serde(default, deserialize_with = "null_as_default")]
    pub spend: f64,

    /// Line items in receipt order
    #[serde(default, deserialize_with = "positions_or_default")]
    pub positions: Vec<Position>,

    /// Cashier name (may be empty)
    #[serde(
        default,
        rename = "cachier",
        alias = "cashier",
        deserialize_with = "null_as_default"
    )]
    pub cashier_name: String,
}

/// Models sometimes answer `null` for a value they could not find; treat it
/// like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Like [`null_as_default`], also for `null` entries inside the list
fn positions_or_default<'de, D>(deserializer: D) -> Result<Vec<Position>, D::Error>
where
    D: Deserializer<'de>,
{
    let positions = Option::<Vec<Option<Position>>>::deserialize(deserializer)?;
    Ok(positions
        .unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

impl ExtractionResult {
    /// Total spend for this event.
    ///
    /// An explicit nonzero `spend` wins over the sum of position prices, even
    /// when the two disagree.
    pub fn total(&self) -> f64 {
        if self.spend != 0.0 {
            self.spend
        } else {
            self.positions.iter().map(|p| p.price).sum()
        }
    }

    /// True if a cashier name was extracted
    pub fn has_cashier(&self) -> bool {
        !self.cashier_name.trim().is_empty()
    }
}
