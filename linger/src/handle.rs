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

//! Reference-counted ownership of native credential handles.

use std::{
    cell::UnsafeCell,
    fmt::Debug,
    sync::{
        atomic::{fence, AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{error::Result, strict_assert};

/// A disposable native credential resource.
///
/// The implementor wraps the opaque handle obtained from the native security
/// library. [`release`] hands the handle back to the library; it is invoked
/// exactly once, on whatever thread gives up the last outstanding reference.
///
/// [`release`]: Credential::release
pub trait Credential: Send + Sync + 'static {
    /// Release the underlying native resource.
    fn release(self) -> Result<()>;
}

// State word layout: reference count shifted left by one, CLOSED in bit 0.
// Packing both into one word makes "check terminal and adjust the count" a
// single CAS.
const CLOSED: usize = 1;
const UNIT: usize = 1 << 1;

pub(crate) struct RawCredential<C> {
    state: AtomicUsize,
    credential: UnsafeCell<Option<C>>,
}

// The credential cell is only touched by the single thread that drains the
// reference count to zero.
unsafe impl<C: Credential> Send for RawCredential<C> {}
unsafe impl<C: Credential> Sync for RawCredential<C> {}

impl<C> Debug for RawCredential<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load(Ordering::Relaxed);
        f.debug_struct("RawCredential")
            .field("refs", &(state >> 1))
            .field("closed", &(state & CLOSED != 0))
            .finish()
    }
}

impl<C> RawCredential<C>
where
    C: Credential,
{
    fn new(credential: C) -> Self {
        Self {
            state: AtomicUsize::new(UNIT),
            credential: UnsafeCell::new(Some(credential)),
        }
    }

    /// Add one reference unless the handle is already terminal.
    fn try_acquire(&self) -> bool {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & CLOSED != 0 {
                return false;
            }
            strict_assert!(state >> 1 >= 1);
            match self
                .state
                .compare_exchange_weak(state, state + UNIT, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    tracing::trace!(
                        "[credential]: acquire reference (handle: {:p}) refs: {} => {}",
                        self,
                        state >> 1,
                        (state >> 1) + 1
                    );
                    return true;
                }
                Err(s) => state = s,
            }
        }
    }

    /// Give up one reference, releasing the native credential if it was the
    /// last one.
    fn release_ref(&self) -> Result<()> {
        let state = self.state.fetch_sub(UNIT, Ordering::Release);
        strict_assert!(state >> 1 >= 1);
        tracing::trace!(
            "[credential]: release reference (handle: {:p}) refs: {} => {}",
            self,
            state >> 1,
            (state >> 1) - 1
        );
        if state >> 1 == 1 {
            // The count can only drain after the owner closed.
            strict_assert!(state & CLOSED != 0);
            fence(Ordering::Acquire);
            return self.release();
        }
        Ok(())
    }

    /// Mark the handle terminal and give up the owner's reference. No-op if
    /// already terminal.
    fn close(&self) -> Result<()> {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & CLOSED != 0 {
                return Ok(());
            }
            strict_assert!(state >> 1 >= 1);
            match self.state.compare_exchange_weak(
                state,
                (state - UNIT) | CLOSED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(s) => state = s,
            }
        }
        tracing::trace!(
            "[credential]: close (handle: {:p}) refs: {} => {}",
            self,
            state >> 1,
            (state >> 1) - 1
        );
        if state >> 1 == 1 {
            fence(Ordering::Acquire);
            return self.release();
        }
        Ok(())
    }

    fn release(&self) -> Result<()> {
        match unsafe { &mut *self.credential.get() }.take() {
            Some(credential) => credential.release(),
            None => Ok(()),
        }
    }

    fn refs(&self) -> usize {
        self.state.load(Ordering::Acquire) >> 1
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLOSED != 0
    }
}

/// Owning wrapper around a native credential.
///
/// The owner holds one reference of its own, so the native resource outlives
/// any single caller's usage window: [`create_reference`] hands out further
/// holders, and the handle only reaches its terminal state once the owner
/// [`close`]s it and every reference has been disposed.
///
/// [`create_reference`]: CredentialHandle::create_reference
/// [`close`]: CredentialHandle::close
pub struct CredentialHandle<C>
where
    C: Credential,
{
    shared: Arc<RawCredential<C>>,
}

impl<C> Debug for CredentialHandle<C>
where
    C: Credential,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle").field("shared", &self.shared).finish()
    }
}

impl<C> CredentialHandle<C>
where
    C: Credential,
{
    /// Wrap a freshly acquired native credential.
    pub fn new(credential: C) -> Self {
        Self {
            shared: Arc::new(RawCredential::new(credential)),
        }
    }

    /// Create an additional reference that keeps the credential alive until
    /// disposed.
    ///
    /// Returns `None` when the handle is already terminal; nothing is
    /// modified in that case. This is an expected outcome, not an error.
    pub fn create_reference(&self) -> Option<CredentialRef<C>> {
        self.shared.try_acquire().then(|| CredentialRef {
            shared: Some(self.shared.clone()),
        })
    }

    /// Mark the handle terminal and give up the owner's reference.
    ///
    /// The native release fires now if no other reference remains, or later
    /// on whichever thread disposes the last one. Closing an already closed
    /// handle is a no-op.
    pub fn close(&self) -> Result<()> {
        self.shared.close()
    }

    /// Number of outstanding references, the owner's included.
    pub fn refs(&self) -> usize {
        self.shared.refs()
    }

    /// Whether the handle reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl<C> Drop for CredentialHandle<C>
where
    C: Credential,
{
    fn drop(&mut self) {
        if let Err(e) = self.shared.close() {
            tracing::error!("[credential]: suppressed release failure in owner drop: {e}");
        }
    }
}

/// A lifetime-extending reference to a credential; one of possibly many
/// simultaneous holders.
///
/// A reference is single-owner: [`dispose`] consumes the value, so releasing
/// it twice is unrepresentable. References that go out of scope without an
/// explicit `dispose` are disposed by `Drop`, where a release failure can
/// only be logged.
///
/// [`dispose`]: CredentialRef::dispose
pub struct CredentialRef<C>
where
    C: Credential,
{
    shared: Option<Arc<RawCredential<C>>>,
}

impl<C> Debug for CredentialRef<C>
where
    C: Credential,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRef").field("shared", &self.shared).finish()
    }
}

impl<C> CredentialRef<C>
where
    C: Credential,
{
    /// Give up this reference, releasing the native credential if it was the
    /// last outstanding one.
    pub fn dispose(mut self) -> Result<()> {
        match self.shared.take() {
            Some(shared) => shared.release_ref(),
            None => Ok(()),
        }
    }

    /// Transfer the reference out as a raw shared core, skipping `Drop`.
    pub(crate) fn into_shared(mut self) -> Arc<RawCredential<C>> {
        self.shared.take().unwrap()
    }

    /// Adopt a raw shared core evicted from a slot.
    pub(crate) fn from_shared(shared: Arc<RawCredential<C>>) -> Self {
        Self { shared: Some(shared) }
    }
}

impl<C> Drop for CredentialRef<C>
where
    C: Credential,
{
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            if let Err(e) = shared.release_ref() {
                tracing::error!("[credential]: suppressed release failure in reference drop: {e}");
            }
        }
    }
}
