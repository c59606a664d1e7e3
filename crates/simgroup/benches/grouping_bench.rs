use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use simgroup::search::rank;
use simgroup::shingle::shingle_set;
use simgroup::{Clusterer, Document, GroupingConfig, LshIndex, MinHasher, VectorRecord};

fn generate_record(i: usize) -> Value {
    json!({
        "id": i,
        "customer": format!("Customer {}", i % 50),
        "address": {"city": "Springfield", "street": format!("{} Main Street", i % 200)},
        "items": ["widget", format!("gadget model {}", i % 7)],
        "note": "Delivered to the front desk, signature required on arrival",
    })
}

fn generate_documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| Document::new("bench.json", generate_record(i)))
        .collect()
}

fn bench_minhash(c: &mut Criterion) {
    let mut group = c.benchmark_group("minhash");

    let hasher = MinHasher::new(128);
    let doc = generate_record(1);

    group.bench_function("signature_128", |b| {
        b.iter(|| hasher.signature_from_document(black_box(&doc)))
    });

    group.bench_function("shingle_set", |b| {
        b.iter(|| shingle_set(black_box(&doc), 2))
    });

    let sig1 = hasher.signature_from_document(&doc);
    let sig2 = hasher.signature_from_document(&generate_record(2));
    group.bench_function("similarity", |b| {
        b.iter(|| MinHasher::similarity(black_box(&sig1), black_box(&sig2)))
    });

    group.finish();
}

fn bench_lsh(c: &mut Criterion) {
    let mut group = c.benchmark_group("lsh");

    let hasher = MinHasher::new(128);
    let signatures: Vec<_> = (0..1000)
        .map(|i| hasher.signature_from_document(&generate_record(i)))
        .collect();

    group.bench_function("insert_1000", |b| {
        b.iter(|| {
            let mut lsh = LshIndex::with_threshold(128, 0.6);
            for (i, sig) in signatures.iter().enumerate() {
                let _ = lsh.insert(i, sig);
            }
            lsh
        })
    });

    let mut lsh = LshIndex::with_threshold(128, 0.6);
    for (i, sig) in signatures.iter().enumerate() {
        let _ = lsh.insert(i, sig);
    }
    group.bench_function("query_1000", |b| {
        b.iter(|| lsh.query(black_box(&signatures[500])))
    });

    group.finish();
}

fn bench_cluster(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster");
    group.sample_size(10);

    let clusterer = Clusterer::new(&GroupingConfig::default());
    for size in [100, 1000, 5000] {
        let docs = generate_documents(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &docs, |b, docs| {
            b.iter(|| clusterer.cluster(black_box(docs)))
        });
    }

    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");

    let hasher = MinHasher::new(128);
    let records: Vec<VectorRecord> = (0..1000)
        .map(|i| VectorRecord {
            id: i as i64,
            group_id: 1,
            signature: hasher.signature_from_document(&generate_record(i)).values,
            payload: String::new(),
            origin: String::new(),
        })
        .collect();
    let query = hasher.signature_from_document(&generate_record(3)).values;

    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("rank_1000", |b| {
        b.iter(|| rank(black_box(&query), &records))
    });

    group.finish();
}

criterion_group!(benches, bench_minhash, bench_lsh, bench_cluster, bench_rank);
criterion_main!(benches);
