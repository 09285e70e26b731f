//! In-memory block store for deterministic testing.
//!
//! [`MemoryStore`] keeps the whole index file in a byte vector and can
//! inject read, write and sync failures at configurable rates. Faults are
//! drawn from a seeded RNG, so a failing run replays exactly from its seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{BlockStore, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
}

impl FaultConfig {
    /// No faults at all.
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Rare faults, for long randomized runs.
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
        }
    }

    /// Frequent faults, for exercising error paths.
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            read_error_rate: 0.05,
            write_error_rate: 0.05,
            sync_error_rate: 0.05,
        }
    }
}

/// Statistics about memory store operations.
#[derive(Debug, Default, Clone)]
pub struct MemoryStoreStats {
    /// Number of reads.
    pub reads: u64,
    /// Number of writes.
    pub writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected sync errors.
    pub injected_sync_errors: u64,
}

/// Byte-vector block store with fault injection.
///
/// The modification stamp is a counter bumped on every successful write or
/// length change; [`MemoryStore::touch`] bumps it without writing, which
/// mimics another process updating the file.
pub struct MemoryStore {
    bytes: Vec<u8>,
    generation: u64,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: MemoryStoreStats,
}

impl MemoryStore {
    /// Create an empty store with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create an empty store with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            bytes: Vec::new(),
            generation: 0,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: MemoryStoreStats::default(),
        }
    }

    /// Create a store holding a copy of an existing image.
    #[must_use]
    pub fn from_bytes(seed: u64, bytes: Vec<u8>) -> Self {
        let mut store = Self::new(seed);
        store.bytes = bytes;
        store
    }

    /// The stored image.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &MemoryStoreStats {
        &self.stats
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Advance the modification stamp as if another writer had touched
    /// the file.
    pub const fn touch(&mut self) {
        self.generation += 1;
    }

    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    fn injected(what: &str) -> std::io::Error {
        std::io::Error::other(format!("injected {what} fault"))
    }
}

impl BlockStore for MemoryStore {
    #[allow(clippy::cast_possible_truncation)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.stats.reads += 1;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::Read {
                offset,
                source: Self::injected("read"),
            });
        }

        let start = offset as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            return Err(StorageError::Read {
                offset,
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "read past end of store",
                ),
            });
        }
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.stats.writes += 1;

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::Write {
                offset,
                source: Self::injected("write"),
            });
        }

        let start = offset as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(buf);
        self.generation += 1;
        Ok(())
    }

    fn len(&mut self) -> Result<u64, StorageError> {
        Ok(self.bytes.len() as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_len(&mut self, len: u64) -> Result<(), StorageError> {
        self.bytes.resize(len as usize, 0);
        self.generation += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            return Err(StorageError::File(Self::injected("sync")));
        }
        Ok(())
    }

    fn modified(&mut self) -> Result<u64, StorageError> {
        Ok(self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut store = MemoryStore::new(1);
        store.write_at(512, b"abc").expect("write");
        assert_eq!(store.len().expect("len"), 515);

        let mut buf = [0u8; 3];
        store.read_at(512, &mut buf).expect("read");
        assert_eq!(&buf, b"abc");
        assert_eq!(store.stats().writes, 1);
        assert_eq!(store.stats().reads, 1);
    }

    #[test]
    fn test_modified_advances_on_write_and_touch() {
        let mut store = MemoryStore::new(1);
        let before = store.modified().expect("stamp");
        store.write_at(0, &[1]).expect("write");
        let after_write = store.modified().expect("stamp");
        store.touch();
        assert!(after_write > before);
        assert!(store.modified().expect("stamp") > after_write);
    }

    #[test]
    fn test_injected_faults_are_deterministic() {
        let run = |seed| {
            let mut store = MemoryStore::with_config(seed, FaultConfig::high_faults());
            (0..200)
                .map(|i| store.write_at(i * 4, &[0u8; 4]).is_err())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
        assert!(run(42).iter().any(|failed| *failed));
    }

    #[test]
    fn test_failed_write_leaves_bytes_unchanged() {
        let mut store = MemoryStore::new(7);
        store.write_at(0, &[1, 2, 3, 4]).expect("write");
        store.set_fault_config(FaultConfig {
            write_error_rate: 1.0,
            ..FaultConfig::default()
        });
        assert!(store.write_at(0, &[9, 9, 9, 9]).is_err());
        assert_eq!(store.bytes(), &[1, 2, 3, 4]);
        assert_eq!(store.stats().injected_write_errors, 1);
    }
}
