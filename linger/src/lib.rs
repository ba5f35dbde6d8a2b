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

//! Delayed release for reference-counted native credential handles.
//!
//! A credential handle that leaves active use may still be referenced by an
//! operation completing on another thread. Instead of releasing such a handle
//! directly, the owning layer hands it to a [`HandleCache`]: a fixed-capacity,
//! lock-free ring that parks one extra reference per retired handle and
//! disposes whatever reference previously occupied the slot it writes to. A
//! retired handle therefore stays alive until at least `capacity` further
//! retirements have overwritten its slot, which bounds both the release delay
//! and the number of outstanding handles.
//!
//! ```
//! use linger::{Credential, CredentialHandle, HandleCacheBuilder, Result};
//!
//! struct Token(u64);
//!
//! impl Credential for Token {
//!     fn release(self) -> Result<()> {
//!         // hand the native handle back to the security library here
//!         Ok(())
//!     }
//! }
//!
//! let cache = HandleCacheBuilder::new().with_capacity(4).build();
//!
//! let handle = CredentialHandle::new(Token(42));
//! // done with the handle, but another thread may still be using it
//! cache.retire(&handle)?;
//! handle.close()?;
//! # Ok::<(), linger::Error>(())
//! ```

mod assert;
pub mod bits;
mod cache;
mod error;
mod handle;
pub mod prelude;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use prelude::*;
