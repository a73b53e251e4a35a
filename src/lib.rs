pub mod config;
pub mod error;
pub mod storage;

pub use config::{Config, ConfigLoader, StoreSettings};
pub use error::{ErrorKind, SchedulerError};
pub use storage::{ExecContext, Storage, StorageBackend};
