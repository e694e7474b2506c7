// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use serde_json::Value;

/// The local handler invoked when a request arrives on this node's request
/// channel.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<Value, String>;
}

#[async_trait]
impl<F, Fut> RpcHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, String>> + Send,
{
    async fn handle(&self, payload: Value) -> Result<Value, String> {
        (self)(payload).await
    }
}
