use rand::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use std::collections::{BTreeSet, HashMap};

use crate::config::Number;
use crate::vector_ops::dot;

const SEED: u64 = 42;
const MIN_PROJECTIONS: usize = 2;
const MAX_PROJECTIONS: usize = 16;
const MIN_TABLES: usize = 1;
const MAX_TABLES: usize = 8;

/// Locality-sensitive hashing over random hyperplanes. Stores positions into
/// the owning index; candidates are re-ranked by the caller.
#[derive(Debug, Clone)]
pub struct RandomProjectionIndex {
    random_vectors: Vec<Vec<Number>>,
    hash_tables: Vec<HashMap<u64, Vec<usize>>>,
    num_tables: usize,
    num_projections: usize,
}

impl RandomProjectionIndex {
    /// `tables` / `projections` of `None` are derived from `data_size`.
    pub fn new(dim: usize, data_size: usize, tables: Option<usize>, projections: Option<usize>) -> Self {
        let (auto_projections, auto_tables) = Self::calculate_params(data_size);
        let num_projections = projections
            .unwrap_or(auto_projections)
            .clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = tables.unwrap_or(auto_tables).clamp(MIN_TABLES, MAX_TABLES);
        log::debug!(
            "random projection index: {} projections x {} tables over {} dims",
            num_projections,
            num_tables,
            dim
        );

        let mut rng = StdRng::seed_from_u64(SEED);
        let random_vectors: Vec<Vec<Number>> = (0..num_tables * num_projections)
            .map(|_| {
                StandardNormal
                    .sample_iter(&mut rng)
                    .take(dim)
                    .collect::<Vec<Number>>()
            })
            .collect();

        RandomProjectionIndex {
            random_vectors,
            hash_tables: vec![HashMap::new(); num_tables],
            num_tables,
            num_projections,
        }
    }

    fn calculate_params(data_size: usize) -> (usize, usize) {
        let log_size = (data_size.max(1) as f64).log2() as usize;
        let num_projections = (log_size + 2).clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = (log_size / 2 + 2).clamp(MIN_TABLES, MAX_TABLES);
        (num_projections, num_tables)
    }

    fn hash_vector(&self, vector: &[Number], table: usize) -> u64 {
        let start = table * self.num_projections;
        self.random_vectors[start..start + self.num_projections]
            .iter()
            .enumerate()
            .fold(0u64, |acc, (bit, plane)| {
                if dot(plane, vector) >= 0.0 {
                    acc | (1 << bit)
                } else {
                    acc
                }
            })
    }

    pub fn add(&mut self, vector: &[Number], position: usize) {
        for table in 0..self.num_tables {
            let hash = self.hash_vector(vector, table);
            self.hash_tables[table].entry(hash).or_default().push(position);
        }
    }

    /// Candidate positions from the query's bucket and every bucket one bit
    /// away, in ascending position order.
    pub fn candidates(&self, query: &[Number]) -> Vec<usize> {
        let mut found = BTreeSet::new();
        for table in 0..self.num_tables {
            let query_hash = self.hash_vector(query, table);
            let probes = std::iter::once(query_hash)
                .chain((0..self.num_projections).map(|bit| query_hash ^ (1 << bit)));
            for hash in probes {
                if let Some(bucket) = self.hash_tables[table].get(&hash) {
                    found.extend(bucket.iter().copied());
                }
            }
        }
        log::trace!("random projection probe returned {} candidates", found.len());
        found.into_iter().collect()
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    pub fn num_projections(&self) -> usize {
        self.num_projections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vector_is_candidate() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, -1.0, 0.0],
        ];
        let mut index = RandomProjectionIndex::new(4, vectors.len(), None, None);
        for (i, v) in vectors.iter().enumerate() {
            index.add(v, i);
        }
        for (i, v) in vectors.iter().enumerate() {
            assert!(index.candidates(v).contains(&i));
        }
    }

    #[test]
    fn test_params_are_clamped() {
        let index = RandomProjectionIndex::new(8, 0, Some(100), Some(1));
        assert_eq!(index.num_tables(), MAX_TABLES);
        assert_eq!(index.num_projections(), MIN_PROJECTIONS);
    }

    #[test]
    fn test_seeded_hashing_is_deterministic() {
        let a = RandomProjectionIndex::new(16, 100, None, None);
        let b = RandomProjectionIndex::new(16, 100, None, None);
        let v: Vec<Number> = (0..16).map(|i| (i as Number).sin()).collect();
        assert_eq!(a.hash_vector(&v, 0), b.hash_vector(&v, 0));
    }
}
