use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mosaic_join::{normalize, JoinEngine, LocalStorage, ShardIndex};
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

const SHARDS: [&str; 4] = ["ab", "cd", "ef", "gh"];

fn postcode(shard: &str, i: usize) -> String {
    let upper = shard.to_ascii_uppercase();
    format!("{}{} {:02}XY", upper, i / 100, i % 100)
}

fn generate_reference(shard: &str, count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "\"{}\",10,{},{}\n",
                postcode(shard, i).replace(' ', ""),
                400_000 + i,
                100_000 + i
            )
        })
        .collect()
}

/// Primary rows sorted by shard, with roughly one in ten ineligible and one in
/// twenty repeated.
fn generate_extract(per_shard: usize) -> String {
    let mut out = String::new();
    for shard in SHARDS {
        for i in 0..per_shard {
            let group = if i % 10 == 0 { "E" } else { "F" };
            out.push_str(&format!("{},x,x,{},{}\n", postcode(shard, i), group, i % 60));
            if i % 20 == 0 {
                out.push_str(&format!("{},x,x,F,{}\n", postcode(shard, i), i % 60));
            }
        }
    }
    out
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    group.bench_function("two_letter_area", |b| {
        b.iter(|| normalize(black_box("AB10 1XY")))
    });
    group.bench_function("one_letter_area", |b| {
        b.iter(|| normalize(black_box("B1 1AA")))
    });

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for size in [1_000, 10_000, 50_000] {
        let reference = generate_reference("ab", size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("build", size), &reference, |b, reference| {
            b.iter(|| ShardIndex::from_reader(Cursor::new(black_box(reference.as_bytes()))))
        });
    }

    let index = ShardIndex::from_reader(Cursor::new(generate_reference("ab", 10_000))).unwrap();
    group.bench_function("lookup_hit", |b| {
        b.iter(|| index.lookup(black_box("AB501XY")))
    });
    group.bench_function("lookup_miss", |b| {
        b.iter(|| index.lookup(black_box("AB999ZZ")))
    });

    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");
    group.sample_size(10);

    let per_shard = 10_000;
    let temp = TempDir::new().unwrap();
    let ref_dir = temp.path().join("os-open");
    fs::create_dir_all(&ref_dir).unwrap();
    // Leave the last shard without a reference file so it is omitted.
    for shard in &SHARDS[..SHARDS.len() - 1] {
        fs::write(
            ref_dir.join(format!("{shard}.csv")),
            generate_reference(shard, per_shard * 3 / 4),
        )
        .unwrap();
    }
    let extract = generate_extract(per_shard);
    let rows = extract.lines().count();
    let store = LocalStorage::new(&ref_dir, temp.path().join("processed")).unwrap();

    group.throughput(Throughput::Elements(rows as u64));
    group.bench_function("40k_rows", |b| {
        b.iter(|| {
            let mut engine = JoinEngine::new(&store, "F");
            engine
                .process_stream(Cursor::new(black_box(extract.as_bytes())))
                .unwrap();
            engine.finish().unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_index, bench_join);
criterion_main!(benches);
