//! Random test data

use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-worker random data source
pub struct DataGenerator {
    rng: StdRng,
}

impl DataGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform integer in `min..=max`; `min` when the range is empty
    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    /// Alphanumeric string of exactly `len` characters
    pub fn string(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// Price between 1.00 and 1000.00 with two decimals
    pub fn price(&mut self) -> f64 {
        self.int(100, 100_000) as f64 / 100.0
    }

    /// `prefix` followed by a number in `min..=max`
    pub fn user_id(&mut self, prefix: &str, min: i64, max: i64) -> String {
        format!("{}{}", prefix, self.int(min, max))
    }

    pub fn email(&mut self) -> String {
        format!("{}@{}.com", self.string(8).to_lowercase(), self.string(6).to_lowercase())
    }

    /// One element of `items`, `None` when it is empty
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.int(0, items.len() as i64 - 1) as usize)
    }

    /// Worker identity used to keep generated keys apart
    pub fn identity(&mut self) -> i64 {
        self.int(0, 999)
    }
}

impl Default for DataGenerator {
    fn default() -> Self {
        Self::new()
    }
}
