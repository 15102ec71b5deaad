use rand::prelude::*;
use rand_distr::StandardNormal;
use std::collections::{HashMap, HashSet};

use crate::config::Number;

const SEED: u64 = 42;
const MIN_PROJECTIONS: usize = 2;
const MAX_PROJECTIONS: usize = 16;
const MIN_TABLES: usize = 1;
const MAX_TABLES: usize = 8;

/// Random-projection LSH over index positions.
///
/// Only produces candidates; callers rescore them exactly.
#[derive(Clone)]
pub struct RandomProjectionIndex {
    random_vectors: Vec<Vec<Number>>,
    hash_tables: Vec<HashMap<u64, Vec<usize>>>,
    num_tables: usize,
    num_projections: usize,
}

impl RandomProjectionIndex {
    pub fn new(dim: usize, num_projections: usize, num_tables: usize) -> Self {
        let num_projections = num_projections.clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = num_tables.clamp(MIN_TABLES, MAX_TABLES);
        tracing::debug!(num_projections, num_tables, dim, "building random projection index");

        let mut rng = StdRng::seed_from_u64(SEED);
        let random_vectors: Vec<Vec<Number>> = (0..num_tables * num_projections)
            .map(|_| (&mut rng).sample_iter(StandardNormal).take(dim).collect())
            .collect();

        RandomProjectionIndex {
            random_vectors,
            hash_tables: vec![HashMap::new(); num_tables],
            num_tables,
            num_projections,
        }
    }

    fn hash_vector(&self, vector: &[Number], table_index: usize) -> u64 {
        let start = table_index * self.num_projections;
        let end = start + self.num_projections;

        self.random_vectors[start..end]
            .iter()
            .map(|rv| {
                rv.iter()
                    .zip(vector.iter())
                    .map(|(&a, &b)| a * b)
                    .sum::<Number>()
            })
            .enumerate()
            .fold(0u64, |acc, (i, proj)| if proj >= 0.0 { acc | (1 << i) } else { acc })
    }

    pub fn add(&mut self, vector: &[Number], position: usize) {
        for i in 0..self.num_tables {
            let hash = self.hash_vector(vector, i);
            self.hash_tables[i].entry(hash).or_default().push(position);
        }
    }

    /// Positions sharing a bucket with `query`, probing every bucket one bit
    /// away as well.
    pub fn candidates(&self, query: &[Number]) -> HashSet<usize> {
        let mut candidates = HashSet::new();

        for i in 0..self.num_tables {
            let query_hash = self.hash_vector(query, i);

            if let Some(bucket) = self.hash_tables[i].get(&query_hash) {
                candidates.extend(bucket);
            }

            for j in 0..self.num_projections {
                let neighbor_hash = query_hash ^ (1 << j);
                if let Some(bucket) = self.hash_tables[i].get(&neighbor_hash) {
                    candidates.extend(bucket);
                }
            }
        }

        tracing::debug!(candidates = candidates.len(), "ann candidate set");
        candidates
    }
}
