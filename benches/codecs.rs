//! Codec benchmark suite
//!
//! In-process encode/decode cost per format over generated datasets,
//! without the HTTP transfer the `format-bench` binary measures.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use format_bench::codec::CodecRegistry;
use format_bench::dataset::{generate_dataset, GenerateConfig};
use format_bench::Format;

/// Benchmark encoding the full dataset with each codec
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.sample_size(20);
    let registry = CodecRegistry::full();

    for count in [100u64, 1_000, 10_000] {
        let dataset = generate_dataset(&GenerateConfig { count, seed: 42 });
        group.throughput(Throughput::Elements(count));

        for format in Format::ALL {
            let codec = registry.get(format).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format.as_str(), count),
                &dataset,
                |bencher, dataset| bencher.iter(|| black_box(codec.encode(black_box(dataset)).unwrap())),
            );
        }
    }

    group.finish();
}

/// Benchmark decoding bytes produced by each codec
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.sample_size(20);
    let registry = CodecRegistry::full();

    for count in [100u64, 1_000, 10_000] {
        let dataset = generate_dataset(&GenerateConfig { count, seed: 42 });

        for format in Format::ALL {
            let codec = registry.get(format).unwrap();
            let bytes = codec.encode(&dataset).unwrap();
            group.throughput(Throughput::Bytes(bytes.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format.as_str(), count),
                &bytes,
                |bencher, bytes| bencher.iter(|| black_box(codec.decode(black_box(bytes)).unwrap())),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
