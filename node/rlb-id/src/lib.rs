// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Short, opaque, collision-safe identifiers for nodes, RPC correlation
//! ids and reservations.
//!
//! Generation draws from a 62-character alphabet (`0-9A-Za-z`) using the
//! thread-local RNG, the same source this workspace's node-selection code
//! uses elsewhere (`rand::thread_rng()`); there is no process-wide counter
//! to serialize on, so concurrent callers never contend with each other.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Default length for RPC correlation ids and job names.
pub const DEFAULT_LEN: usize = 10;
/// Default length for node ids (short, because they appear in datastore
/// keys and channel names).
pub const NODE_ID_LEN: usize = 5;

/// Generates an opaque identifier of the given length.
pub fn generate(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// Generates an identifier of [`DEFAULT_LEN`], for correlation ids and job names.
pub fn generate_id() -> String {
    generate(DEFAULT_LEN)
}

/// Generates a short identifier of [`NODE_ID_LEN`], for node ids.
pub fn generate_node_id() -> String {
    generate(NODE_ID_LEN)
}
