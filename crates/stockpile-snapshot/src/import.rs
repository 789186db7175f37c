//! The bulk import/export boundary.
//!
//! Bulk data is a plain JSON object of item name to `{quantity, tags}`.
//! Anything else is rejected with a [`SnapshotError::SchemaViolation`] that
//! says which entry and field is wrong. Quantities go through the same
//! normalization as single edits.

use crate::snapshot::ItemDraft;
use crate::{Items, SnapshotError, SnapshotResult};
use serde_json::Value;

/// Validate externally supplied item data.
pub fn items_from_value(value: &Value) -> SnapshotResult<Items> {
    let Value::Object(entries) = value else {
        return Err(SnapshotError::schema(format!(
            "expected an object of items, found {}",
            describe(value)
        )));
    };

    let mut items = Items::new();
    for (name, entry) in entries {
        if name.trim().is_empty() {
            return Err(SnapshotError::schema("item names must not be empty"));
        }
        let draft = draft_from_value(name, entry)?;
        items.insert(name.clone(), draft.into_item());
    }
    Ok(items)
}

/// Parse and validate item data given as JSON text.
pub fn items_from_json(text: &str) -> SnapshotResult<Items> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SnapshotError::schema(format!("invalid JSON: {e}")))?;
    items_from_value(&value)
}

/// Render items in the import shape.
pub fn items_to_json(items: &Items) -> SnapshotResult<String> {
    Ok(serde_json::to_string_pretty(items)?)
}

fn draft_from_value(name: &str, entry: &Value) -> SnapshotResult<ItemDraft> {
    let Value::Object(fields) = entry else {
        return Err(SnapshotError::schema(format!(
            "item {name:?}: expected an object, found {}",
            describe(entry)
        )));
    };

    if let Some(unknown) = fields.keys().find(|k| *k != "quantity" && *k != "tags") {
        return Err(SnapshotError::schema(format!(
            "item {name:?}: unknown field {unknown:?}"
        )));
    }

    let quantity = match fields.get("quantity") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(other) => {
            return Err(SnapshotError::schema(format!(
                "item {name:?}: quantity must be a number, found {}",
                describe(other)
            )))
        }
        None => {
            return Err(SnapshotError::schema(format!(
                "item {name:?}: missing quantity"
            )))
        }
    };

    let tags = match fields.get("tags") {
        Some(Value::Array(values)) => values
            .iter()
            .enumerate()
            .map(|(i, tag)| match tag {
                Value::String(s) if !s.is_empty() => Ok(s.clone()),
                Value::String(_) => Err(SnapshotError::schema(format!(
                    "item {name:?}: tag {i} is empty"
                ))),
                other => Err(SnapshotError::schema(format!(
                    "item {name:?}: tag {i} must be a string, found {}",
                    describe(other)
                ))),
            })
            .collect::<SnapshotResult<Vec<_>>>()?,
        Some(other) => {
            return Err(SnapshotError::schema(format!(
                "item {name:?}: tags must be an array, found {}",
                describe(other)
            )))
        }
        None => {
            return Err(SnapshotError::schema(format!(
                "item {name:?}: missing tags"
            )))
        }
    };

    Ok(ItemDraft { quantity, tags })
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
