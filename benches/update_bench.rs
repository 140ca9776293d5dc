// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

// Typing, update encoding and merge throughput.

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use tandem::Doc;
use tandem::StateVector;

// =============================================================================
// Helpers
// =============================================================================

/// One transaction per character, appended at the end.
fn type_forward(doc: &mut Doc, content: &str) {
    let text = doc.get_or_insert_text("t");
    for (i, ch) in content.chars().enumerate() {
        let chunk = ch.to_string();
        doc.transact(|txn| text.insert(txn, i as u32, &chunk).unwrap());
    }
}

/// Random inserts and deletes, one transaction each.
fn random_edits(doc: &mut Doc, count: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let text = doc.get_or_insert_text("t");
    let mut updates = Vec::with_capacity(count);
    for _ in 0..count {
        let before = doc.state_vector();
        let len = text.len(&*doc);
        if len > 0 && rng.gen_bool(0.3) {
            let index = rng.gen_range(0..len);
            doc.transact(|txn| text.remove_range(txn, index, 1).unwrap());
        } else {
            let index = rng.gen_range(0..=len);
            doc.transact(|txn| text.insert(txn, index, "xy").unwrap());
        }
        updates.push(doc.encode_state_as_update_v1(&before));
    }
    return updates;
}

fn content(size: usize) -> String {
    return (0..size).map(|i| (b'a' + (i % 26) as u8) as char).collect();
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("typing");
    for size in [100, 1000, 10000] {
        let content = content(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("forward", size), &content, |b, content| {
            b.iter(|| {
                let mut doc = Doc::with_client_id(1);
                type_forward(&mut doc, content);
                black_box(doc.state_vector())
            });
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for size in [1000, 10000] {
        let mut doc = Doc::with_client_id(1);
        random_edits(&mut doc, size, 7);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("v1", size), &doc, |b, doc| {
            b.iter(|| black_box(doc.encode_state_as_update_v1(&StateVector::new())));
        });
        group.bench_with_input(BenchmarkId::new("v2", size), &doc, |b, doc| {
            b.iter(|| black_box(doc.encode_state_as_update_v2(&StateVector::new())));
        });
    }
    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    for size in [1000, 10000] {
        let mut doc = Doc::with_client_id(1);
        let updates = random_edits(&mut doc, size, 11);
        let full = doc.encode_state_as_update_v1(&StateVector::new());
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("full", size), &full, |b, full| {
            b.iter(|| {
                let mut peer = Doc::with_client_id(2);
                peer.apply_update_v1(full).unwrap();
                black_box(peer.state_vector())
            });
        });
        group.bench_with_input(BenchmarkId::new("incremental", size), &updates, |b, updates| {
            b.iter(|| {
                let mut peer = Doc::with_client_id(2);
                for update in updates {
                    peer.apply_update_v1(update).unwrap();
                }
                black_box(peer.state_vector())
            });
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for size in [100, 1000] {
        let mut doc = Doc::with_client_id(1);
        let updates = random_edits(&mut doc, size, 13);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("updates_v1", size), &updates, |b, updates| {
            let parts: Vec<&[u8]> = updates.iter().map(|u| u.as_slice()).collect();
            b.iter(|| black_box(tandem::merge_updates_v1(&parts).unwrap()));
        });
    }
    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(benches, bench_typing, bench_encode, bench_apply, bench_merge);

criterion_main!(benches);
