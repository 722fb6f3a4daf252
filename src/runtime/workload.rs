//! Relation generator
//!
//! Produces deterministic `(key, payload)` relations with configurable key
//! distributions (uniform, zipfian, sequential) for benchmarks and tests.
//! The same config and seed always yield the same rows.

use serde::{Deserialize, Serialize};

use crate::categories::storage::{RelationHandle, StorageContext};
use crate::core::operator::{ExecError, ExecResult};
use crate::core::record::{Field, Schema, Value};

// ── Configuration types ─────────────────────────────────────────────────────

/// Shape of one generated relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Number of rows to generate.
    pub rows: usize,
    /// Keys are drawn from `[0, key_space)`.
    pub key_space: usize,
    pub distribution: Distribution,
    /// Fixed width of the payload string column.
    pub payload_width: usize,
    /// Random seed for reproducibility (0 picks a fixed default).
    pub seed: u64,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            rows: 1000,
            key_space: 100,
            distribution: Distribution::Uniform,
            payload_width: 16,
            seed: 0,
        }
    }
}

/// Key distribution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Each key equally likely.
    Uniform,
    /// Low keys far more frequent than high ones (models real-world skew).
    Zipfian,
    /// Row `i` gets key `i mod key_space`.
    Sequential,
}

// ── Simple deterministic PRNG (xorshift64) ──────────────────────────────────

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        // Avoid zero state.
        Self {
            state: if seed == 0 {
                0x853c_49e6_748f_ea9b
            } else {
                seed
            },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform random in [0, n).
    fn next_usize(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Uniform random in [0, 1].
    fn next_unit(&mut self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64)
    }
}

// ── Generator ───────────────────────────────────────────────────────────────

pub struct DataGenerator;

impl DataGenerator {
    /// `key` int column followed by a `payload` string column.
    pub fn schema(payload_width: usize) -> Schema {
        Schema::new(vec![Field::int("key"), Field::string("payload", payload_width)])
    }

    /// Generate the rows described by `config`.
    pub fn generate(config: &RelationConfig) -> ExecResult<Vec<Vec<Value>>> {
        if config.key_space == 0 {
            return Err(ExecError::Configuration("key_space must be at least 1".into()));
        }
        if config.payload_width == 0 {
            return Err(ExecError::Configuration("payload_width must be at least 1".into()));
        }
        if config.key_space > i32::MAX as usize {
            return Err(ExecError::Configuration(format!(
                "key_space {} does not fit an int column",
                config.key_space
            )));
        }

        let mut rng = Rng::new(config.seed);
        let rows = (0..config.rows)
            .map(|seq| {
                let key = Self::pick_key(&mut rng, seq, config);
                let mut payload = format!("row{}", seq);
                payload.truncate(config.payload_width);
                vec![Value::Int(key as i32), Value::String(payload)]
            })
            .collect();
        Ok(rows)
    }

    /// Create table `name` in `storage` and fill it with generated rows.
    pub fn load(storage: &StorageContext, name: &str, config: &RelationConfig) -> ExecResult<RelationHandle> {
        let rows = Self::generate(config)?;
        let table = storage.create_table(name, Self::schema(config.payload_width))?;
        for row in rows {
            storage.insert(&table, row)?;
        }
        tracing::debug!(table = name, rows = config.rows, distribution = ?config.distribution, "generated relation");
        Ok(table)
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn pick_key(rng: &mut Rng, seq: usize, config: &RelationConfig) -> usize {
        match config.distribution {
            Distribution::Uniform => rng.next_usize(config.key_space),
            Distribution::Zipfian => Self::zipfian_key(rng, config.key_space),
            Distribution::Sequential => seq % config.key_space,
        }
    }

    /// Zipfian: heavily skewed toward low keys.
    /// Approximation: `key_count * random^2`, so key 0 is most popular.
    fn zipfian_key(rng: &mut Rng, key_count: usize) -> usize {
        let u = rng.next_unit();
        let key = (u * u * key_count as f64) as usize;
        key.min(key_count - 1)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(rows: &[Vec<Value>]) -> Vec<i32> {
        rows.iter()
            .map(|row| match row[0] {
                Value::Int(k) => k,
                _ => panic!("key column is not an int"),
            })
            .collect()
    }

    #[test]
    fn test_deterministic_with_seed() {
        let config = RelationConfig {
            seed: 123,
            rows: 100,
            ..Default::default()
        };
        let a = DataGenerator::generate(&config).unwrap();
        let b = DataGenerator::generate(&config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sequential_keys_wrap() {
        let config = RelationConfig {
            rows: 7,
            key_space: 3,
            distribution: Distribution::Sequential,
            ..Default::default()
        };
        let rows = DataGenerator::generate(&config).unwrap();
        assert_eq!(keys(&rows), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_keys_within_space() {
        for distribution in [Distribution::Uniform, Distribution::Zipfian] {
            let config = RelationConfig {
                rows: 500,
                key_space: 10,
                distribution,
                seed: 7,
                ..Default::default()
            };
            let rows = DataGenerator::generate(&config).unwrap();
            assert!(keys(&rows).iter().all(|k| (0..10).contains(k)));
        }
    }

    #[test]
    fn test_zipfian_skews_low() {
        let config = RelationConfig {
            rows: 2000,
            key_space: 100,
            distribution: Distribution::Zipfian,
            seed: 42,
            ..Default::default()
        };
        let rows = DataGenerator::generate(&config).unwrap();
        let low = keys(&rows).iter().filter(|k| **k < 10).count();
        let high = keys(&rows).iter().filter(|k| **k >= 90).count();
        assert!(low > high * 2, "low={} high={}", low, high);
    }

    #[test]
    fn test_payload_fits_width() {
        let config = RelationConfig {
            rows: 2000,
            payload_width: 4,
            ..Default::default()
        };
        let rows = DataGenerator::generate(&config).unwrap();
        let schema = DataGenerator::schema(4);
        for row in rows {
            schema.verify(row).unwrap();
        }
    }

    #[test]
    fn test_zero_key_space_rejected() {
        let config = RelationConfig {
            key_space: 0,
            ..Default::default()
        };
        assert!(matches!(
            DataGenerator::generate(&config),
            Err(ExecError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_into_storage() {
        let storage = StorageContext::with_page_size(512);
        let config = RelationConfig {
            rows: 64,
            payload_width: 8,
            ..Default::default()
        };
        let table = DataGenerator::load(&storage, "gen", &config).unwrap();
        assert_eq!(storage.num_records(&table).unwrap(), 64);
    }
}
