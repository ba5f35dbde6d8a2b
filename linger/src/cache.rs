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

//! Fixed-capacity delayed release of retired credential handles.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicUsize, Ordering},
};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::{
    bits,
    error::Result,
    handle::{Credential, CredentialHandle, CredentialRef, RawCredential},
};

/// Default slot count of a [`HandleCache`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Configuration for [`HandleCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleCacheConfig {
    /// Slot count. Must be a nonzero power of two.
    pub capacity: usize,
}

impl Default for HandleCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Builder for [`HandleCache`].
#[derive(Debug, Clone, Default)]
pub struct HandleCacheBuilder {
    config: HandleCacheConfig,
}

impl HandleCacheBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the slot count of the cache.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Build the cache.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity is not a nonzero power of two.
    pub fn build<C>(self) -> HandleCache<C>
    where
        C: Credential,
    {
        HandleCache::new(self.config)
    }
}

impl From<HandleCacheConfig> for HandleCacheBuilder {
    fn from(config: HandleCacheConfig) -> Self {
        Self { config }
    }
}

/// A fixed-capacity, lock-free cache that delays the release of retired
/// credential handles.
///
/// [`retire`] parks one extra reference to the handle in a slot selected by a
/// monotonically increasing counter and disposes whatever reference occupied
/// that slot before. A retired handle therefore stays referenced until at
/// least `capacity` further retirements have overwritten its slot, and the
/// number of references held by the cache never exceeds `capacity`.
///
/// Construct one instance for the process (or one per credential domain) and
/// share it at the call sites that retire handles.
///
/// [`retire`]: HandleCache::retire
pub struct HandleCache<C>
where
    C: Credential,
{
    slots: Box<[ArcSwapOption<RawCredential<C>>]>,
    counter: AtomicUsize,
}

impl<C> Debug for HandleCache<C>
where
    C: Credential,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCache")
            .field("capacity", &self.capacity())
            .field("occupancy", &self.occupancy())
            .finish()
    }
}

impl<C> Default for HandleCache<C>
where
    C: Credential,
{
    fn default() -> Self {
        Self::new(HandleCacheConfig::default())
    }
}

impl<C> HandleCache<C>
where
    C: Credential,
{
    /// Create a cache with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity is not a nonzero power of two.
    pub fn new(config: HandleCacheConfig) -> Self {
        bits::assert_pow2(config.capacity);
        let slots: Box<[_]> = (0..config.capacity).map(|_| ArcSwapOption::empty()).collect();
        Self {
            slots,
            counter: AtomicUsize::new(0),
        }
    }

    /// Hand over a handle that leaves active use but may still be referenced
    /// by an operation completing on another thread.
    ///
    /// The cache takes one extra reference on the handle and parks it in the
    /// ring, disposing the reference evicted from the target slot. Retirement
    /// is best effort and never blocks: a terminal handle is skipped, and a
    /// recoverable failure while releasing the evicted credential is logged
    /// and suppressed. Only a fault that questions the integrity of the
    /// process is returned.
    pub fn retire(&self, handle: &CredentialHandle<C>) -> Result<()> {
        let Some(reference) = handle.create_reference() else {
            return Ok(());
        };

        // Every retirement consumes a unique counter value. Uniqueness is all
        // that matters here, so the increment can stay relaxed.
        let index = bits::mask(self.slots.len(), self.counter.fetch_add(1, Ordering::Relaxed));

        // The swap transfers sole ownership of the previous occupant to this
        // thread, which is then the one to dispose it.
        if let Some(evicted) = self.slots[index].swap(Some(reference.into_shared())) {
            if let Err(e) = CredentialRef::from_shared(evicted).dispose() {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::error!("[cache]: suppressed release failure on eviction: {e}");
            }
        }

        Ok(())
    }

    /// Slot count of the cache.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently holding a reference.
    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|slot| slot.load().is_some()).count()
    }
}

impl<C> Drop for HandleCache<C>
where
    C: Credential,
{
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            if let Some(evicted) = slot.swap(None) {
                if let Err(e) = CredentialRef::from_shared(evicted).dispose() {
                    tracing::error!("[cache]: suppressed release failure on drop: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    use itertools::Itertools;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        error::ErrorKind,
        test_utils::{FaultyCredential, ReleaseLedger, TestCredential},
    };

    fn cache(capacity: usize) -> HandleCache<TestCredential> {
        HandleCacheBuilder::new().with_capacity(capacity).build()
    }

    fn retire_and_close(cache: &HandleCache<TestCredential>, id: u64, ledger: &ReleaseLedger) {
        let handle = CredentialHandle::new(TestCredential::new(id, ledger));
        cache.retire(&handle).unwrap();
        handle.close().unwrap();
    }

    #[test]
    fn test_sequential_eviction_order() {
        let ledger = ReleaseLedger::new();
        let cache = cache(4);

        // a, b, c, d fill the four slots; nothing released yet
        for id in 0..4 {
            retire_and_close(&cache, id, &ledger);
        }
        assert!(ledger.is_empty());
        assert_eq!(cache.occupancy(), 4);

        // e overwrites a's slot, f overwrites b's
        retire_and_close(&cache, 4, &ledger);
        assert_eq!(ledger.released(), vec![0]);
        retire_and_close(&cache, 5, &ledger);
        assert_eq!(ledger.released(), vec![0, 1]);
        assert_eq!(cache.occupancy(), 4);
    }

    #[test]
    fn test_retire_terminal_handle_is_noop() {
        let ledger = ReleaseLedger::new();
        let cache = cache(4);

        let handle = CredentialHandle::new(TestCredential::new(1, &ledger));
        handle.close().unwrap();
        assert_eq!(ledger.released(), vec![1]);

        cache.retire(&handle).unwrap();
        assert_eq!(cache.occupancy(), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_bounded_occupancy_and_eventual_release() {
        const CAPACITY: usize = 8;
        const RETIREMENTS: u64 = 100;

        let ledger = ReleaseLedger::new();
        let cache = cache(CAPACITY);

        for id in 0..RETIREMENTS {
            retire_and_close(&cache, id, &ledger);
            assert!(cache.occupancy() <= CAPACITY);
        }

        // sequential allocation is collision-free, so exactly the newest
        // CAPACITY handles are still resident
        assert_eq!(cache.occupancy(), CAPACITY);
        assert_eq!(ledger.len() as u64, RETIREMENTS - CAPACITY as u64);
        assert_eq!(ledger.released(), (0..RETIREMENTS - CAPACITY as u64).collect_vec());

        drop(cache);
        assert_eq!(ledger.len() as u64, RETIREMENTS);
        for id in 0..RETIREMENTS {
            assert_eq!(ledger.count(id), 1);
        }
    }

    #[test]
    fn test_concurrent_retirement() {
        const THREADS: u64 = 100;
        const CAPACITY: usize = 32;

        let ledger = ReleaseLedger::new();
        let cache = Arc::new(cache(CAPACITY));
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let handles = (0..THREADS)
            .map(|id| {
                let ledger = ledger.clone();
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let handle = CredentialHandle::new(TestCredential::new(id, &ledger));
                    barrier.wait();
                    cache.retire(&handle).unwrap();
                    handle.close().unwrap();
                })
            })
            .collect_vec();
        for handle in handles {
            handle.join().unwrap();
        }

        // 100 occupants were installed over 32 slots, so exactly 68 were
        // evicted and released; which identities remain varies run to run
        assert_eq!(cache.occupancy(), CAPACITY);
        assert_eq!(ledger.len() as u64, THREADS - CAPACITY as u64);
        let released = ledger.released();
        assert_eq!(released.iter().unique().count(), released.len());

        // the resident references are exactly the not-yet-released handles
        drop(cache);
        assert_eq!(ledger.len() as u64, THREADS);
        for id in 0..THREADS {
            assert_eq!(ledger.count(id), 1, "handle {id} must be released exactly once");
        }
    }

    #[test]
    fn test_randomized_concurrent_churn() {
        const THREADS: u64 = 8;
        const OPS: u64 = 1000;

        let ledger = ReleaseLedger::new();
        let cache = Arc::new(cache(16));

        let handles = (0..THREADS)
            .map(|t| {
                let ledger = ledger.clone();
                let cache = cache.clone();
                thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(42 + t);
                    for i in 0..OPS {
                        let id = t * OPS + i;
                        let handle = CredentialHandle::new(TestCredential::new(id, &ledger));
                        match rng.random_range(0..3) {
                            // close before retiring, the no-op path
                            0 => {
                                handle.close().unwrap();
                                cache.retire(&handle).unwrap();
                            }
                            1 => {
                                cache.retire(&handle).unwrap();
                                handle.close().unwrap();
                            }
                            // two resident references to the same handle
                            2 => {
                                cache.retire(&handle).unwrap();
                                cache.retire(&handle).unwrap();
                                handle.close().unwrap();
                            }
                            _ => unreachable!(),
                        }
                    }
                })
            })
            .collect_vec();
        for handle in handles {
            handle.join().unwrap();
        }

        drop(cache);
        assert_eq!(ledger.len() as u64, THREADS * OPS);
        for id in 0..THREADS * OPS {
            assert_eq!(ledger.count(id), 1, "handle {id} must be released exactly once");
        }
    }

    #[test_log::test]
    fn test_nonfatal_release_fault_is_suppressed() {
        let ledger = ReleaseLedger::new();
        let cache: HandleCache<FaultyCredential> = HandleCacheBuilder::new().with_capacity(2).build();

        for id in 0..2 {
            let handle = CredentialHandle::new(FaultyCredential::new(id, ErrorKind::Native, &ledger));
            cache.retire(&handle).unwrap();
            handle.close().unwrap();
        }
        assert!(ledger.is_empty());

        // evicts handle 0, whose release fails recoverably
        let handle = CredentialHandle::new(FaultyCredential::new(2, ErrorKind::Native, &ledger));
        cache.retire(&handle).unwrap();
        handle.close().unwrap();
        assert_eq!(ledger.released(), vec![0]);
    }

    #[test]
    fn test_fatal_release_fault_propagates() {
        let ledger = ReleaseLedger::new();
        let cache: HandleCache<FaultyCredential> = HandleCacheBuilder::new().with_capacity(2).build();

        let poisoned = CredentialHandle::new(FaultyCredential::new(0, ErrorKind::Corruption, &ledger));
        cache.retire(&poisoned).unwrap();
        poisoned.close().unwrap();

        let filler = CredentialHandle::new(FaultyCredential::new(1, ErrorKind::Native, &ledger));
        cache.retire(&filler).unwrap();
        filler.close().unwrap();

        // evicts the poisoned handle; corruption must reach the caller
        let handle = CredentialHandle::new(FaultyCredential::new(2, ErrorKind::Native, &ledger));
        let e = cache.retire(&handle).unwrap_err();
        assert!(e.is_fatal());
        assert_eq!(e.kind(), ErrorKind::Corruption);
        handle.close().unwrap();
    }

    #[test]
    #[should_panic]
    fn test_non_pow2_capacity_panics() {
        let _: HandleCache<TestCredential> = HandleCacheBuilder::new().with_capacity(12).build();
    }

    #[test]
    fn test_config_roundtrip() {
        let config = HandleCacheConfig { capacity: 8 };
        let cache: HandleCache<TestCredential> = HandleCacheBuilder::from(config).build();
        assert_eq!(cache.capacity(), 8);
        assert_eq!(cache.occupancy(), 0);
    }
}
