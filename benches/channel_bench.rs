use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use syncer::hash::HashAlgorithm;
use syncer::operation::Operation;
use syncer::watch::EventChannel;

/// `paths` distinct paths, each hit by `events_per_path` changes and a
/// trailing rename, the way an editor save storm looks to the watcher.
fn fill_channel(channel: &EventChannel, paths: usize, events_per_path: usize) {
    for i in 0..paths {
        let rel = format!("dir{}/file{}.txt", i % 16, i);
        let abs = format!("/watch/{}", rel);
        channel.submit(Operation::create(rel.clone(), abs.clone()));
        for _ in 0..events_per_path {
            channel.submit(Operation::change(rel.clone(), abs.clone()));
        }
        channel.submit(Operation::rename(
            rel.clone(),
            abs,
            format!("{}.bak", rel),
            format!("/watch/{}.bak", rel),
        ));
    }
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_channel_snapshot");

    for paths in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements((*paths * 7) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(paths), paths, |b, &paths| {
            let channel = EventChannel::new();
            b.iter(|| {
                fill_channel(&channel, paths, 5);
                let emitted = channel.snapshot().count();
                black_box(emitted)
            });
        });
    }
    group.finish();
}

fn bench_segment_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_digest");
    let segment = vec![0xA5u8; 4096];
    group.throughput(Throughput::Bytes(segment.len() as u64));

    for algo in [HashAlgorithm::Xxh3_128, HashAlgorithm::Blake3] {
        group.bench_function(algo.to_string(), |b| {
            b.iter(|| algo.digest(black_box(&segment)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_snapshot, bench_segment_digest);
criterion_main!(benches);
