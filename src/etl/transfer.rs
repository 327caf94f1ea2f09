//! Records and query scopes flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One NFT ownership-transfer event, as returned by the upstream API.
///
/// Everything except the block timestamp is kept as the opaque string the API
/// emits. Transfers are never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    #[serde(default, deserialize_with = "nullable_default")]
    pub token_address: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub token_id: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub from_address: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub to_address: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub contract_type: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub price: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub quantity: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub block_number: String,
    /// RFC3339 timestamp (sub-second precision allowed), normalized to UTC.
    pub block_timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable_default")]
    pub block_hash: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub transaction_hash: String,
    #[serde(default, deserialize_with = "nullable_default")]
    pub transaction_type: String,
}

impl Transfer {
    /// Key identifying a transfer across overlapping fetches.
    ///
    /// The pipeline itself never deduplicates; downstream consumers can.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.transaction_hash, self.token_id, self.from_address, self.to_address
        )
    }
}

/// Result of one fetch: transfers in API order plus the continuation cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default, deserialize_with = "nullable_default")]
    pub page_size: u64,

    #[serde(default, deserialize_with = "nullable_default")]
    pub page_number: u64,

    /// Continuation cursor. Empty means no further pages for this scope.
    #[serde(default, deserialize_with = "nullable_default")]
    pub cursor: String,

    #[serde(default, deserialize_with = "nullable_default")]
    pub transfers: Vec<Transfer>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn has_next(&self) -> bool {
        !self.cursor.is_empty()
    }
}

/// What a single paginator run is bound to.
///
/// Cursors returned for one scope are not valid for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryScope {
    /// Historical range, both ends inclusive.
    BlockRange { from_block: u64, to_block: u64 },

    /// A single mined block.
    Block { block_number: u64 },
}

impl QueryScope {
    pub fn range(from_block: u64, to_block: u64) -> Self {
        Self::BlockRange {
            from_block,
            to_block,
        }
    }

    pub fn block(block_number: u64) -> Self {
        Self::Block { block_number }
    }
}

impl fmt::Display for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockRange {
                from_block,
                to_block,
            } => write!(f, "blocks {from_block}..={to_block}"),
            Self::Block { block_number } => write!(f, "block {block_number}"),
        }
    }
}

/// Treats an explicit `null` like a missing field.
fn nullable_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
