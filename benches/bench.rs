use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;

use calamus::{BTrie, Event, FieldType, IndexInfo, PostingStore, Segment, SegmentWriter};

fn generate_terms(count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| format!("host-{:06}", rng.random::<u32>() % 100_000))
        .collect()
}

fn bench_trie_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("Trie Ingestion");
    group.sample_size(10);

    for count in [10_000usize, 50_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let terms = generate_terms(count);
            b.iter(|| {
                let mut store = PostingStore::new();
                let mut trie = BTrie::new();
                for (i, term) in terms.iter().enumerate() {
                    trie.add(term, i as u32, &mut store);
                }
                (trie.size(), store.len())
            })
        });
    }
    group.finish();
}

fn bench_segment_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segment Seal");
    group.sample_size(10);

    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    let info = IndexInfo::builder("bench_logs")
        .add_field("ts", FieldType::Timestamp, true)
        .add_field("message", FieldType::Text, true)
        .add_field("host", FieldType::Keyword, true)
        .build()
        .unwrap();
    let mut segment = Segment::new(info);
    let mut rng = rand::rng();
    for i in 0..count {
        segment
            .add(
                Event::new()
                    .add_timestamp("ts", 1_700_000_000_000 + i)
                    .add_text(
                        "message",
                        format!("request {} completed in {} ms", i, rng.random::<u32>() % 500),
                    )
                    .add_keyword("host", format!("web-{}", i % 32)),
            )
            .unwrap();
    }

    group.bench_function("seal_10k_events", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().unwrap();
            SegmentWriter::default().write(&segment, dir.path()).unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_trie_ingestion, bench_segment_seal);
criterion_main!(benches);
