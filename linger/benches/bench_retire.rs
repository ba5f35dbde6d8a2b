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

//! Microbenchmark for handle retirement throughput.

use criterion::{criterion_group, criterion_main, Criterion};
use linger::{Credential, CredentialHandle, HandleCache, HandleCacheBuilder, Result};

struct NoopCredential;

impl Credential for NoopCredential {
    fn release(self) -> Result<()> {
        Ok(())
    }
}

fn bench_retire(c: &mut Criterion) {
    let cache: HandleCache<NoopCredential> = HandleCacheBuilder::new().with_capacity(32).build();

    c.bench_function("retire_fresh_handle", |b| {
        b.iter(|| {
            let handle = CredentialHandle::new(NoopCredential);
            cache.retire(&handle).unwrap();
        })
    });

    let handle = CredentialHandle::new(NoopCredential);
    c.bench_function("retire_same_handle", |b| {
        b.iter(|| {
            cache.retire(&handle).unwrap();
        })
    });

    c.bench_function("create_reference", |b| {
        b.iter(|| {
            handle.create_reference().unwrap().dispose().unwrap();
        })
    });
}

criterion_group!(benches, bench_retire);
criterion_main!(benches);
