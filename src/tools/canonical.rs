//! Canonical JSON form used for tool-argument hashing (§4.8).
//!
//! Object keys sorted, numbers kept in their shortest round-trip form, strings
//! normalized to NFC. Two argument objects that are logically equivalent — reordered
//! keys, varied whitespace, equivalent number spellings — canonicalize identically.

use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

pub fn canonicalize(value: &Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut sorted = Map::new();
			let mut keys: Vec<&String> = map.keys().collect();
			keys.sort();
			for key in keys {
				sorted.insert(key.nfc().collect(), canonicalize(&map[key]));
			}
			Value::Object(sorted)
		},
		Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
		Value::String(s) => Value::String(s.nfc().collect()),
		other => other.clone(),
	}
}

/// Serializes a value already passed through [`canonicalize`] to its canonical string
/// form. `serde_json` preserves key insertion order and emits the shortest round-trip
/// float representation by default, so no further number handling is needed here.
pub fn canonical_json_string(value: &Value) -> String {
	serde_json::to_string(value).expect("canonical value always serializes")
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn reordered_keys_canonicalize_identically() {
		let a = json!({"b": 1, "a": 2});
		let b = json!({"a": 2, "b": 1});
		assert_eq!(
			canonical_json_string(&canonicalize(&a)),
			canonical_json_string(&canonicalize(&b))
		);
	}

	#[test]
	fn nested_objects_sort_recursively() {
		let a = json!({"outer": {"z": 1, "a": 2}});
		let b = json!({"outer": {"a": 2, "z": 1}});
		assert_eq!(
			canonical_json_string(&canonicalize(&a)),
			canonical_json_string(&canonicalize(&b))
		);
	}

	#[test]
	fn arrays_preserve_order() {
		let a = json!({"xs": [3, 1, 2]});
		let canon = canonicalize(&a);
		assert_eq!(canon["xs"], json!([3, 1, 2]));
	}
}
