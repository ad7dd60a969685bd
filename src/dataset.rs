//! Dataset generation for the serialization benchmark.
//!
//! Produces a fixed-shape collection of [`Record`]s with pseudo-random
//! `price`/`quantity` and a generation-time timestamp. Every format the
//! server exposes encodes the same in-memory [`Dataset`].

use chrono::{SecondsFormat, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Number of records in the reference dataset.
pub const REFERENCE_COUNT: u64 = 100_000;

/// Number of distinct categories records cycle through.
pub const CATEGORY_COUNT: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub created: String,
    pub last_modified: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub quantity: u32,
    pub tags: Vec<String>,
    pub metadata: Metadata,
}

/// Immutable, ordered collection of records. Ids are dense `0..len`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl Deref for Dataset {
    type Target = [Record];

    fn deref(&self) -> &[Record] {
        &self.records
    }
}

/// Configuration for dataset generation.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Number of records to generate. Zero yields an empty dataset.
    pub count: u64,
    /// Seed for the per-record RNGs.
    pub seed: u64,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            count: REFERENCE_COUNT,
            seed: 0,
        }
    }
}

fn per_record_seed(master_seed: u64, index: u64) -> u64 {
    master_seed
        .wrapping_add(index)
        .wrapping_mul(0x517cc1b727220a95)
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-03-01T12:00:00.000Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn generate_record(index: u64, seed: u64, timestamp: &str) -> Record {
    let mut rng = ChaCha8Rng::seed_from_u64(per_record_seed(seed, index));
    Record {
        id: index,
        name: format!("Item {index}"),
        description: format!("This is a description for item {index}"),
        price: rng.gen_range(0.0..1000.0),
        quantity: rng.gen_range(0..100),
        tags: vec!["tag1".to_string(), "tag2".to_string(), "tag3".to_string()],
        metadata: Metadata {
            created: timestamp.to_string(),
            last_modified: timestamp.to_string(),
            category: format!("Category {}", index % CATEGORY_COUNT),
        },
    }
}

/// Generate a dataset of `config.count` records.
///
/// Records are generated in parallel; each draws from an RNG derived from
/// the master seed and its index, so output is independent of thread count.
pub fn generate_dataset(config: &GenerateConfig) -> Dataset {
    let timestamp = timestamp_now();
    let seed = config.seed;

    // Range is an IndexedParallelIterator; collect preserves order.
    let records = (0..config.count as usize)
        .into_par_iter()
        .map(|i| generate_record(i as u64, seed, &timestamp))
        .collect();

    Dataset { records }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(count: u64, seed: u64) -> Dataset {
        generate_dataset(&GenerateConfig { count, seed })
    }

    #[test]
    fn test_ids_are_dense() {
        let ds = small(137, 7);
        assert_eq!(ds.len(), 137);
        for (i, r) in ds.iter().enumerate() {
            assert_eq!(r.id, i as u64);
            assert_eq!(r.name, format!("Item {i}"));
        }
    }

    #[test]
    fn test_record_shape() {
        let ds = small(20, 1);
        for (i, r) in ds.iter().enumerate() {
            assert_eq!(r.metadata.category, format!("Category {}", i % 5));
            assert_eq!(r.tags, vec!["tag1", "tag2", "tag3"]);
            assert!((0.0..1000.0).contains(&r.price));
            assert!(r.quantity < 100);
            assert_eq!(r.metadata.created, r.metadata.last_modified);
            assert!(r.metadata.created.ends_with('Z'));
        }
    }

    #[test]
    fn test_zero_count_is_empty() {
        let ds = small(0, 42);
        assert!(ds.is_empty());
    }

    #[test]
    fn test_numeric_fields_deterministic_per_seed() {
        let a = small(50, 42);
        let b = small(50, 42);
        let c = small(50, 43);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.price, y.price);
            assert_eq!(x.quantity, y.quantity);
        }
        assert!(a.iter().zip(c.iter()).any(|(x, y)| x.price != y.price));
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let ds = small(1, 0);
        let v = serde_json::to_value(&ds[0]).unwrap();
        assert!(v["metadata"].get("lastModified").is_some());
        assert!(v["metadata"].get("last_modified").is_none());
    }
}
