pub mod config;
pub mod directory;
pub mod error;
pub mod label;
pub mod reconcile;
pub mod roster;
pub mod sync;
pub mod test_utils;
pub mod types;

pub use config::{ConfigSource, FileConfigSource, StaticConfigSource, SyncConfig, Target};
pub use directory::{AccountDirectory, DirectoryConnector, RouterOsConnector};
pub use error::{ConfigError, DirectoryError, FetchError, SyncError};
pub use reconcile::{AccountFilter, Reconciler};
pub use roster::{HttpRosterFetcher, RosterFetcher};
pub use sync::{CycleReport, SyncLoop};
pub use types::{Account, NewAccount, Occupant, ReconciliationResult};
