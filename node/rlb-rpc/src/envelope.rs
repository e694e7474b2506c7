// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub caller: String,
    pub payload: Value,
}

/// Wire response envelope.
///
/// `payload` carries the handler's result; `error`, when present, marks a
/// handler failure via an explicit field rather than a sentinel payload
/// value, keeping a successful `null` payload unambiguous from a handler
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: String, payload: Value) -> Self {
        Self {
            id,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: String, error: impl Into<String>) -> Self {
        Self {
            id,
            payload: None,
            error: Some(error.into()),
        }
    }
}
