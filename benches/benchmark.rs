use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use docchat::index::VectorIndex;
use docchat::search::SearchMethod;
use docchat::vector_entry::Chunk;
use rand::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

const NUM_ELEMENTS: usize = 5_000; // Number of chunks in the index
const NUM_QUERIES: usize = 10; // Number of queries per iteration
const DIMENSIONS: usize = 384;
const TOP_K: usize = 10;

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(20))
        .warm_up_time(std::time::Duration::from_secs(3))
        .configure_from_args()
}

fn random_vector(rng: &mut StdRng) -> Vec<f32> {
    (0..DIMENSIONS).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn build_index(method: SearchMethod, vectors: &[Vec<f32>]) -> VectorIndex {
    let mut index = VectorIndex::new(method, 8, 4);
    let document_id = Uuid::new_v4();
    let chunks = (0..vectors.len())
        .map(|i| Chunk::new(document_id, "bench.txt", i, i * 800, format!("chunk {i}")))
        .collect();
    index
        .insert_batch(vectors.to_vec(), chunks)
        .expect("failed to fill benchmark index");
    index
}

fn search_index(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let vectors: Vec<Vec<f32>> = (0..NUM_ELEMENTS).map(|_| random_vector(&mut rng)).collect();
    let queries: Vec<Vec<f32>> = (0..NUM_QUERIES).map(|_| random_vector(&mut rng)).collect();

    c.bench_function(&format!("insert {} chunks", NUM_ELEMENTS), |b| {
        b.iter(|| build_index(SearchMethod::Hybrid, &vectors))
    });

    let methods = [SearchMethod::Exact, SearchMethod::Ann, SearchMethod::Hybrid];
    let indexes: Vec<(SearchMethod, VectorIndex)> =
        methods.iter().map(|&m| (m, build_index(m, &vectors))).collect();

    let mut group = c.benchmark_group("search_index");
    for (method, index) in &indexes {
        group.bench_with_input(
            BenchmarkId::new(format!("search_{}_queries", NUM_QUERIES), method),
            index,
            |b, index| {
                b.iter(|| {
                    for query in &queries {
                        index.query(query, TOP_K).expect("search failed");
                    }
                })
            },
        );
    }
    group.finish();

    compare_results(&indexes, &queries);
}

fn top_positions(index: &VectorIndex, query: &[f32]) -> HashSet<usize> {
    index
        .query(query, TOP_K)
        .expect("search failed")
        .into_iter()
        .map(|result| result.position)
        .collect()
}

fn compare_results(indexes: &[(SearchMethod, VectorIndex)], queries: &[Vec<f32>]) {
    let Some((_, exact)) = indexes.iter().find(|(m, _)| *m == SearchMethod::Exact) else {
        return;
    };
    for (method, index) in indexes.iter().filter(|(m, _)| *m != SearchMethod::Exact) {
        let overlap: usize = queries
            .iter()
            .map(|query| {
                top_positions(exact, query)
                    .intersection(&top_positions(index, query))
                    .count()
            })
            .sum();
        let percentage = overlap as f64 / (queries.len() * TOP_K) as f64 * 100.0;
        println!("Overlap between exact and {} results: {:.2}%", method, percentage);
    }
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = search_index
}
criterion_main!(benches);
