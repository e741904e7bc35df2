use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use corefmem::memory::mask::full_action_mask;
use corefmem::{DecodeMode, FixedMemory, MemoryConfig, Mention};
use criterion::BenchmarkId;
use criterion::Throughput;
use criterion::{criterion_group, criterion_main, Criterion};

fn build(num_cells: usize) -> (VarMap, FixedMemory) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = MemoryConfig {
        num_cells,
        hidden_size: 64,
        mlp_size: 32,
        ..MemoryConfig::default()
    };
    let memory = FixedMemory::new(config, vb).unwrap();
    (varmap, memory)
}

fn benchmark_masks(c: &mut Criterion) {
    let counter: Vec<u32> = (0..20).map(|i| i % 3).collect();

    c.bench_function("full action mask", |b| {
        b.iter(|| full_action_mask(&counter));
    });
}

fn benchmark_action_log_prob(c: &mut Criterion) {
    let (_varmap, memory) = build(10);
    let state = memory.initialize_memory().unwrap();
    let query = Tensor::randn(0f32, 1.0, 64, &Device::Cpu).unwrap();

    c.bench_function("action log prob", |b| {
        b.iter(|| memory.action_log_prob(&query, &state, 3).unwrap());
    });
}

fn benchmark_document_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_sizes");

    for size in [10, 50, 100].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_varmap, memory) = build(10);
            let embs = Tensor::randn(0f32, 1.0, (size, 64), &Device::Cpu).unwrap();
            let mentions: Vec<Mention> = (0..size).map(|i| Mention::new(i, i + 1)).collect();

            b.iter(|| {
                memory
                    .process_document(&embs, &mentions, None, DecodeMode::Greedy)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_masks,
    benchmark_action_log_prob,
    benchmark_document_sizes
);
criterion_main!(benches);
