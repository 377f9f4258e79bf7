//! Live tenant store: atomically swapped snapshots, configuration sources,
//! and the background reload worker.

pub mod configuration;
pub mod reload;
pub mod sources;

pub use configuration::ConfigurationStore;
pub use reload::{ReloadTask, ReloadWorker, ReloadWorkerError};
pub use sources::{EnvSource, FlatSource, InMemorySource, JsonFileSource, LayeredSource};
