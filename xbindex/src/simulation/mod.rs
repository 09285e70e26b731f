//! Deterministic test doubles for the I/O boundary.
//!
//! - [`MemoryStore`]: an index file image in memory, with seeded read,
//!   write and sync fault injection
//! - [`FixedTimeSource`]: a calendar that only moves when told to
//!
//! Given the same seed, a run against these is identical every time.
//!
//! # Usage
//!
//! ```ignore
//! use xbindex::simulation::{FaultConfig, MemoryStore};
//!
//! let store = MemoryStore::with_config(12345, FaultConfig::low_faults());
//! let index = NdxIndex::create_in(store, "CUSTNO", &definition, &evaluator, &config)?;
//! ```

mod storage;
mod time;

pub use storage::{FaultConfig, MemoryStore, MemoryStoreStats};
pub use time::FixedTimeSource;
