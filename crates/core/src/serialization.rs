//! Canonical JSON for persisted documents
//!
//! Model artifacts and tracking records are written through
//! [`to_canonical_json`]: the value is lowered to a `serde_json::Value` first,
//! whose object maps are ordered by key, so struct fields and map entries
//! always come out sorted and two equal documents serialise to the same bytes.
//!
//! Self-hashing documents store their BLAKE3 digest in one of their own string
//! fields. [`content_hash`] hashes the canonical form with that field blanked,
//! so a stamped document can be re-verified after loading.

use serde::Serialize;
use serde_json::Value;

/// Pretty-printed JSON with object keys in sorted order
pub fn to_canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::to_value(value)?)
}

/// BLAKE3 hex digest of the canonical JSON, with the top-level string field
/// `hash_field` replaced by `""` when present
pub fn content_hash<T: Serialize>(value: &T, hash_field: &str) -> serde_json::Result<String> {
    let mut document = serde_json::to_value(value)?;
    if let Value::Object(fields) = &mut document {
        if fields.contains_key(hash_field) {
            fields.insert(hash_field.to_string(), Value::String(String::new()));
        }
    }
    let json = serde_json::to_string_pretty(&document)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Stamped {
        zeta: u32,
        alpha: &'static str,
        hash: String,
    }

    #[test]
    fn struct_fields_and_map_keys_are_sorted() {
        let json = to_canonical_json(&Stamped {
            zeta: 1,
            alpha: "a",
            hash: String::new(),
        })
        .unwrap();
        assert!(json.find("\"alpha\"").unwrap() < json.find("\"hash\"").unwrap());
        assert!(json.find("\"hash\"").unwrap() < json.find("\"zeta\"").unwrap());

        let map: HashMap<&str, u8> = [("num_leaves", 1), ("learning_rate", 2)].into();
        let json = to_canonical_json(&map).unwrap();
        assert!(json.find("learning_rate").unwrap() < json.find("num_leaves").unwrap());
    }

    #[test]
    fn content_hash_ignores_the_hash_field() {
        let blank = Stamped {
            zeta: 7,
            alpha: "lgbm",
            hash: String::new(),
        };
        let stamped = Stamped {
            hash: "f00d".to_string(),
            ..blank
        };
        let h1 = content_hash(&stamped, "hash").unwrap();
        assert_eq!(h1.len(), 64);
        assert_eq!(
            h1,
            content_hash(
                &Stamped {
                    zeta: 7,
                    alpha: "lgbm",
                    hash: String::new()
                },
                "hash"
            )
            .unwrap()
        );

        let changed = Stamped {
            zeta: 8,
            alpha: "lgbm",
            hash: "f00d".to_string(),
        };
        assert_ne!(h1, content_hash(&changed, "hash").unwrap());
    }
}
