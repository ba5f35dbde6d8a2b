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

//! Bit utilities for power-of-two sized rings.

/// Check if the given value is a nonzero power of 2.
#[inline(always)]
pub fn is_pow2(v: usize) -> bool {
    v != 0 && v & (v - 1) == 0
}

/// Assert that the given value is a nonzero power of 2.
#[inline(always)]
pub fn assert_pow2(v: usize) {
    assert!(is_pow2(v), "v: {}", v);
}

/// Debug assert that the given value is a nonzero power of 2.
#[inline(always)]
pub fn debug_assert_pow2(v: usize) {
    debug_assert!(is_pow2(v), "v: {}", v);
}

/// Map `v` onto `0..size`.
///
/// Note: The given size must be a power of 2.
#[inline(always)]
pub fn mask(size: usize, v: usize) -> usize {
    debug_assert_pow2(size);
    v & (size - 1)
}
