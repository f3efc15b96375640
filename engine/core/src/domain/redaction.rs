// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PII Redaction Policy
//!
//! Rules applied to an audit record before it leaves the process. Fields are
//! addressed by dotted JSON paths into the serialized record (`user.email`,
//! `request.headers.authorization`, `decision.reason`).
//!
//! Rules run in a fixed order:
//!
//! 1. `pii_exclusion`: the field is removed.
//! 2. `hash_fields`: the value is replaced by `sha256:<hex>`.
//! 3. `max_lengths` / `default_max_length`: strings are cut to N characters.
//!    Hashed fields are exempt.
//!
//! The [`STRUCTURAL_FIELDS`] carry the record's identity and correlation keys
//! and must survive redaction verbatim. `default_max_length` skips them and
//! [`PiiPolicy::validate`] rejects explicit rules that name them.
//!
//! [`PiiPolicy::apply`] is idempotent: applying it to its own output changes
//! nothing. Already-hashed values are recognised by their prefix and left alone.
//!
//! The hash is unsalted SHA-256. It exists for correlation across records, not
//! secrecy: anyone holding a list of candidate emails can reverse it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::decision::{truncate_chars, MAX_REASON_LEN};

pub const HASH_PREFIX: &str = "sha256:";

/// Paths no redaction rule may touch.
pub const STRUCTURAL_FIELDS: &[&str] = &[
    "decision_id",
    "timestamp",
    "trace_id",
    "span_id",
    "decision.rule",
    "decision.policy_id",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiPolicy {
    #[serde(default = "default_exclusions")]
    pub pii_exclusion: Vec<String>,

    #[serde(default = "default_hash_fields")]
    pub hash_fields: Vec<String>,

    #[serde(default = "default_max_lengths")]
    pub max_lengths: BTreeMap<String, usize>,

    /// Cap applied to every string not listed in `max_lengths`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_length: Option<usize>,
}

impl Default for PiiPolicy {
    fn default() -> Self {
        Self {
            pii_exclusion: default_exclusions(),
            hash_fields: default_hash_fields(),
            max_lengths: default_max_lengths(),
            default_max_length: None,
        }
    }
}

impl PiiPolicy {
    /// Rejects rules that would rewrite a structural field. Returns the
    /// offending rule as `<rule>: <path>`.
    pub fn validate(&self) -> Result<(), String> {
        let explicit = self
            .pii_exclusion
            .iter()
            .map(|p| ("pii_exclusion", p))
            .chain(self.hash_fields.iter().map(|p| ("hash_fields", p)))
            .chain(self.max_lengths.keys().map(|p| ("max_lengths", p)));
        for (rule, path) in explicit {
            if is_structural(path) {
                return Err(format!("{rule}: '{path}' is a structural audit field and cannot be redacted"));
            }
        }
        Ok(())
    }

    pub fn apply(&self, mut value: Value) -> Value {
        for path in &self.pii_exclusion {
            remove_path(&mut value, path);
        }

        for path in &self.hash_fields {
            if let Some(field) = get_path_mut(&mut value, path) {
                hash_in_place(field);
            }
        }

        for (path, max) in &self.max_lengths {
            if self.is_hashed(path) {
                continue;
            }
            if let Some(Value::String(s)) = get_path_mut(&mut value, path) {
                if s.chars().count() > *max {
                    *s = truncate_chars(s, *max);
                }
            }
        }

        if let Some(max) = self.default_max_length {
            let mut prefix = Vec::new();
            self.truncate_unlisted(&mut value, &mut prefix, max);
        }

        value
    }

    fn is_hashed(&self, path: &str) -> bool {
        self.hash_fields.iter().any(|h| h == path)
    }

    fn truncate_unlisted(&self, value: &mut Value, prefix: &mut Vec<String>, max: usize) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    prefix.push(key.clone());
                    self.truncate_unlisted(child, prefix, max);
                    prefix.pop();
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.truncate_unlisted(item, prefix, max);
                }
            }
            Value::String(s) => {
                let path = prefix.join(".");
                if self.max_lengths.contains_key(&path) || self.is_hashed(&path) || is_structural(&path) {
                    return;
                }
                if s.chars().count() > max {
                    *s = truncate_chars(s, max);
                }
            }
            _ => {}
        }
    }
}

fn is_structural(path: &str) -> bool {
    STRUCTURAL_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(path))
}

/// One-way, unsalted hash used for correlation fields.
pub fn hash_value(raw: &str) -> String {
    format!("{}{}", HASH_PREFIX, hex::encode(Sha256::digest(raw.as_bytes())))
}

fn hash_in_place(field: &mut Value) {
    match field {
        Value::Null => {}
        Value::String(s) if s.starts_with(HASH_PREFIX) => {}
        Value::String(s) => *s = hash_value(s),
        other => {
            let rendered = other.to_string();
            *other = Value::String(hash_value(&rendered));
        }
    }
}

fn get_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object_mut()?.get_mut(key))
}

fn remove_path(value: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (get_path_mut(value, parent), leaf),
        None => (Some(value), path),
    };
    if let Some(Value::Object(map)) = parent {
        remove_key(map, leaf);
    }
}

fn remove_key(map: &mut Map<String, Value>, key: &str) {
    // Header names arrive in arbitrary case.
    let matching: Vec<String> = map
        .keys()
        .filter(|k| k.eq_ignore_ascii_case(key))
        .cloned()
        .collect();
    for k in matching {
        map.remove(&k);
    }
}

fn default_exclusions() -> Vec<String> {
    vec![
        "request.body".to_string(),
        "request.headers.authorization".to_string(),
        "request.headers.cookie".to_string(),
    ]
}

fn default_hash_fields() -> Vec<String> {
    vec!["user.email".to_string()]
}

fn default_max_lengths() -> BTreeMap<String, usize> {
    BTreeMap::from([
        ("decision.reason".to_string(), MAX_REASON_LEN),
        ("metadata.user_agent".to_string(), 256),
        ("request.path".to_string(), 2048),
    ])
}
