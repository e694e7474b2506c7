// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Load registry error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Datastore(#[from] rlb_datastore::Error),
}
