//! Snapshot data structures.
//!
//! A [`Snapshot`] is the whole inventory at one instant plus a link to the
//! snapshot it was derived from. Its canonical form is compact JSON:
//!
//! ```text
//! {"items":{"<name>":{"quantity":2,"tags":["a"]}},"previousVersion":null,"timestamp":"2024-05-01T09:30:00.000Z"}
//! ```
//!
//! Items are kept in a [`BTreeMap`], so the canonical form lists them by name.

use crate::hash::VersionHash;
use crate::{SnapshotError, SnapshotResult};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Largest quantity accepted as-is; anything above is coerced like any other invalid input.
pub const MAX_QUANTITY: u64 = 9_007_199_254_740_991;

/// A single inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// How many are on hand.
    pub quantity: u64,

    /// Free-text tags, in the order they were given.
    pub tags: Vec<String>,
}

impl Item {
    /// Create an item.
    pub fn new<T: Into<String>>(quantity: u64, tags: impl IntoIterator<Item = T>) -> Self {
        Self {
            quantity,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if this item carries a tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Items by name.
pub type Items = BTreeMap<String, Item>;

/// An item as supplied by an editor, before quantity normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    /// Requested quantity; anything but a non-negative integer becomes `1`.
    pub quantity: f64,

    /// Tags, already split by the caller.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ItemDraft {
    /// Create a draft.
    pub fn new<T: Into<String>>(quantity: f64, tags: impl IntoIterator<Item = T>) -> Self {
        Self {
            quantity,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Normalize into a committed item.
    pub fn into_item(self) -> Item {
        Item {
            quantity: normalize_quantity(self.quantity),
            tags: self.tags,
        }
    }
}

impl From<Item> for ItemDraft {
    fn from(item: Item) -> Self {
        Self {
            quantity: item.quantity as f64,
            tags: item.tags,
        }
    }
}

/// Coerce a requested quantity to a valid one.
///
/// Non-negative integers up to [`MAX_QUANTITY`] pass through; negative,
/// fractional, non-finite and oversized values become `1`.
pub fn normalize_quantity(quantity: f64) -> u64 {
    if quantity.is_finite()
        && quantity >= 0.0
        && quantity.fract() == 0.0
        && quantity <= MAX_QUANTITY as f64
    {
        quantity as u64
    } else {
        1
    }
}

/// An immutable inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    items: Items,

    #[serde(deserialize_with = "required")]
    previous_version: Option<VersionHash>,

    #[serde(with = "timestamp")]
    timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot. The timestamp is truncated to milliseconds.
    pub fn new(
        items: Items,
        previous_version: Option<VersionHash>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            items,
            previous_version,
            timestamp: timestamp.trunc_subsecs(3),
        }
    }

    /// Items by name.
    pub fn items(&self) -> &Items {
        &self.items
    }

    /// Look up a single item.
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    /// Hash of the snapshot this one was derived from.
    pub fn previous_version(&self) -> Option<&VersionHash> {
        self.previous_version.as_ref()
    }

    /// When the snapshot was taken.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this snapshot starts a chain.
    pub fn is_root(&self) -> bool {
        self.previous_version.is_none()
    }

    /// Take the items out of the snapshot.
    pub fn into_items(self) -> Items {
        self.items
    }

    /// Canonical serialization.
    pub fn to_canonical_json(&self) -> SnapshotResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a serialized snapshot.
    pub fn from_json(text: &str) -> SnapshotResult<Self> {
        serde_json::from_str(text).map_err(|e| SnapshotError::malformed("<input>", e))
    }

    /// Content hash of the canonical serialization.
    pub fn hash(&self) -> SnapshotResult<VersionHash> {
        crate::hash::hash_snapshot(self)
    }
}

/// Deserialize an `Option` whose key must be present, even when its value is `null`.
fn required<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(3))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}
