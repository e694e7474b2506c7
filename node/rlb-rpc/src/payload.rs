// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A JSON-like value that can hold an explicit "undefined", the one thing
//! plain JSON cannot represent.
//!
//! Naively `serde_json`-encoding a payload that carries `Undefined` would
//! either refuse to compile (no such JSON value) or silently drop the
//! field. [`encode`]/[`decode`] round-trip `Undefined` through the
//! wire-safe sentinel string `__RLB_undefined` instead, so a payload that
//! is `{"a": Undefined}` arrives as `{"a": Undefined}`, not `{}`.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// The sentinel substituted for [`Payload::Undefined`] on the wire.
pub const UNDEFINED_SENTINEL: &str = "__RLB_undefined";

/// A JSON-like value with an explicit undefined, used for RPC payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
}

impl Payload {
    pub fn object(fields: impl IntoIterator<Item = (String, Payload)>) -> Self {
        Payload::Object(fields.into_iter().collect())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::String(s.to_owned())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::String(s)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Number(n.into())
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

/// Converts a [`Payload`] into a wire-safe [`serde_json::Value`],
/// substituting [`UNDEFINED_SENTINEL`] for every [`Payload::Undefined`].
pub fn encode(payload: &Payload) -> Value {
    match payload {
        Payload::Undefined => Value::String(UNDEFINED_SENTINEL.to_owned()),
        Payload::Null => Value::Null,
        Payload::Bool(b) => Value::Bool(*b),
        Payload::Number(n) => Value::Number(n.clone()),
        Payload::String(s) => Value::String(s.clone()),
        Payload::Array(items) => Value::Array(items.iter().map(encode).collect()),
        Payload::Object(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k.clone(), encode(v));
            }
            Value::Object(map)
        }
    }
}

/// Converts a wire [`serde_json::Value`] back into a [`Payload`],
/// restoring [`UNDEFINED_SENTINEL`] strings to [`Payload::Undefined`].
pub fn decode(value: Value) -> Payload {
    match value {
        Value::String(s) if s == UNDEFINED_SENTINEL => Payload::Undefined,
        Value::String(s) => Payload::String(s),
        Value::Null => Payload::Null,
        Value::Bool(b) => Payload::Bool(b),
        Value::Number(n) => Payload::Number(n),
        Value::Array(items) => Payload::Array(items.into_iter().map(decode).collect()),
        Value::Object(map) => {
            Payload::Object(map.into_iter().map(|(k, v)| (k, decode(v))).collect())
        }
    }
}
