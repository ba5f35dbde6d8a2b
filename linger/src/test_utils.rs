// Copyright 2026 linger Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Utilities for testing.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::{Error, ErrorKind, Result},
    handle::Credential,
};

/// A ledger that records every credential release, in order.
///
/// Cloning is shallow; clones observe the same releases.
#[derive(Debug, Clone, Default)]
pub struct ReleaseLedger {
    released: Arc<Mutex<Vec<u64>>>,
}

impl ReleaseLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids released so far, in release order.
    pub fn released(&self) -> Vec<u64> {
        self.released.lock().clone()
    }

    /// Number of times the credential identified by `id` has been released.
    pub fn count(&self, id: u64) -> usize {
        self.released.lock().iter().filter(|&&v| v == id).count()
    }

    /// Total number of releases observed.
    pub fn len(&self) -> usize {
        self.released.lock().len()
    }

    /// Whether no release has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.released.lock().is_empty()
    }

    fn record(&self, id: u64) {
        self.released.lock().push(id);
    }
}

/// A credential that records its release in a [`ReleaseLedger`].
#[derive(Debug)]
pub struct TestCredential {
    id: u64,
    ledger: ReleaseLedger,
}

impl TestCredential {
    /// Create a credential identified by `id`, reporting to `ledger`.
    pub fn new(id: u64, ledger: &ReleaseLedger) -> Self {
        Self {
            id,
            ledger: ledger.clone(),
        }
    }
}

impl Credential for TestCredential {
    fn release(self) -> Result<()> {
        self.ledger.record(self.id);
        Ok(())
    }
}

/// A credential whose release records itself, then fails with the given
/// error kind.
#[derive(Debug)]
pub struct FaultyCredential {
    id: u64,
    kind: ErrorKind,
    ledger: ReleaseLedger,
}

impl FaultyCredential {
    /// Create a failing credential identified by `id`, reporting to `ledger`.
    pub fn new(id: u64, kind: ErrorKind, ledger: &ReleaseLedger) -> Self {
        Self {
            id,
            kind,
            ledger: ledger.clone(),
        }
    }
}

impl Credential for FaultyCredential {
    fn release(self) -> Result<()> {
        self.ledger.record(self.id);
        Err(Error::new(self.kind, "injected release failure"))
    }
}
