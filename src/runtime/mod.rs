//! Engine runtime
//!
//! Configuration loading, the [`Session`] that owns storage and runs
//! operators, and a deterministic relation generator for benchmarks.

pub mod config;
pub mod engine;
pub mod timer;
pub mod workload;

pub use config::EngineConfig;
pub use engine::Session;
pub use timer::Timer;
pub use workload::{DataGenerator, Distribution, RelationConfig};
