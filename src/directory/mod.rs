//! Account directory: the hotspot device's user table.

pub mod protocol;
pub mod routeros;

use crate::config::Target;
use crate::error::DirectoryError;
use crate::reconcile::AccountFilter;
use crate::types::{Account, NewAccount};
use async_trait::async_trait;

pub use routeros::{RouterOsConnector, RouterOsSession};

/// An open session against one device.
#[async_trait]
pub trait AccountDirectory: Send {
    /// Active accounts admitted by the session's filter.
    async fn list_accounts(&mut self) -> Result<Vec<Account>, DirectoryError>;

    /// Remove an account by its device identifier.
    async fn remove_account(&mut self, id: &str) -> Result<(), DirectoryError>;

    async fn create_account(&mut self, account: &NewAccount) -> Result<(), DirectoryError>;

    /// End the session cleanly. Dropping a session also releases the connection.
    async fn close(&mut self) -> Result<(), DirectoryError>;
}

/// Opens directory sessions for targets.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(
        &self,
        target: &Target,
        filter: &AccountFilter,
    ) -> Result<Box<dyn AccountDirectory>, DirectoryError>;
}
