//! Benchmark: rule resolution cost.
//!
//! Every gated call resolves one `(caller, operation)` pair. Resolution is
//! at most four ordered-map lookups, so cost should grow with the log of the
//! book size and depend on the level the deciding rule sits at.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use veilgate_core::{Principal, Timestamp};
use veilgate_policy::{DataPrivacyFramework, PermissionRule, WILDCARD_OPERATION};

fn principal(n: u32) -> Principal {
    let mut bytes = [0x11u8; 20];
    bytes[..4].copy_from_slice(&n.to_be_bytes());
    Principal::from_bytes(bytes)
}

/// `callers` principals, each with an exact rule for `ops` operations.
fn book(callers: u32, ops: u32) -> DataPrivacyFramework {
    let mut dpf = DataPrivacyFramework::new();
    for c in 0..callers {
        for o in 0..ops {
            dpf.seed(PermissionRule::allow(principal(c), format!("op_{o}")))
                .expect("seeding a benchmark rule");
        }
    }
    dpf.seed(PermissionRule::deny(Principal::ALL, WILDCARD_OPERATION))
        .expect("seeding the global rule");
    dpf
}

fn bench_resolution(c: &mut Criterion) {
    let now = Timestamp::from_secs(1_700_000_000);
    let mut group = c.benchmark_group("resolve");

    for callers in [10u32, 100, 1_000] {
        let dpf = book(callers, 10);
        let known = principal(callers / 2);
        let unknown = principal(callers + 1);

        group.bench_with_input(BenchmarkId::new("exact", callers), &dpf, |b, dpf| {
            b.iter(|| black_box(dpf.is_operation_allowed(&known, "op_5", now)));
        });
        group.bench_with_input(BenchmarkId::new("global", callers), &dpf, |b, dpf| {
            b.iter(|| black_box(dpf.is_operation_allowed(&unknown, "op_5", now)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
