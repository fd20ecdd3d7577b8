//! In-memory roster and device doubles for exercising the sync loop without a network.

use crate::config::Target;
use crate::directory::{AccountDirectory, DirectoryConnector};
use crate::error::{DirectoryError, FetchError};
use crate::reconcile::AccountFilter;
use crate::roster::RosterFetcher;
use crate::types::{Account, NewAccount, Occupant};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A remote call observed by the doubles, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchRoster { target: String },
    Connect { target: String },
    List { target: String },
    Remove { target: String, id: String },
    Create { target: String, name: String },
    Close { target: String },
}

impl Call {
    pub fn target(&self) -> &str {
        match self {
            Call::FetchRoster { target }
            | Call::Connect { target }
            | Call::List { target }
            | Call::Remove { target, .. }
            | Call::Create { target, .. }
            | Call::Close { target } => target,
        }
    }

    /// Whether this call reached the account directory.
    pub fn is_directory_call(&self) -> bool {
        !matches!(self, Call::FetchRoster { .. })
    }
}

/// Shared, ordered record of calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn calls_for(&self, target: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.target() == target)
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Debug, Clone)]
enum RosterScript {
    Occupants(Vec<Occupant>),
    Unavailable(String),
}

/// Roster keyed by target display name.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoster {
    scripts: Arc<Mutex<HashMap<String, RosterScript>>>,
    delay: Option<Duration>,
    journal: Journal,
}

impl MemoryRoster {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Delay every fetch, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_occupants(&self, target: &str, occupants: Vec<Occupant>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), RosterScript::Occupants(occupants));
    }

    pub fn set_unavailable(&self, target: &str, reason: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), RosterScript::Unavailable(reason.to_string()));
    }
}

#[async_trait]
impl RosterFetcher for MemoryRoster {
    async fn fetch_roster(&self, target: &Target) -> Result<Vec<Occupant>, FetchError> {
        let name = target.display_name();
        self.journal.record(Call::FetchRoster {
            target: name.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.scripts.lock().unwrap().get(&name).cloned();
        match script {
            Some(RosterScript::Occupants(occupants)) => Ok(occupants),
            Some(RosterScript::Unavailable(body)) => Err(FetchError::Status { status: 503, body }),
            None => Ok(Vec::new()),
        }
    }
}

/// State of one simulated device.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub accounts: Vec<Account>,
    pub refuse_connections: bool,
    pub fail_list: bool,
    /// Device identifiers whose removal is rejected
    pub fail_remove: HashSet<String>,
    /// Account names whose creation is rejected
    pub fail_create: HashSet<String>,
    next_id: u32,
}

/// Devices keyed by target display name.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    devices: Arc<Mutex<HashMap<String, DeviceState>>>,
    journal: Journal,
}

impl MemoryConnector {
    pub fn new(journal: Journal) -> Self {
        Self {
            devices: Arc::default(),
            journal,
        }
    }

    pub fn set_accounts(&self, target: &str, accounts: Vec<Account>) {
        self.devices
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .accounts = accounts;
    }

    /// Change a device's state in place.
    pub fn update(&self, target: &str, change: impl FnOnce(&mut DeviceState)) {
        let mut devices = self.devices.lock().unwrap();
        change(devices.entry(target.to_string()).or_default());
    }

    pub fn accounts(&self, target: &str) -> Vec<Account> {
        self.devices
            .lock()
            .unwrap()
            .get(target)
            .map(|d| d.accounts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DirectoryConnector for MemoryConnector {
    async fn connect(
        &self,
        target: &Target,
        filter: &AccountFilter,
    ) -> Result<Box<dyn AccountDirectory>, DirectoryError> {
        let name = target.display_name();
        self.journal.record(Call::Connect {
            target: name.clone(),
        });

        let refused = self
            .devices
            .lock()
            .unwrap()
            .get(&name)
            .map(|d| d.refuse_connections)
            .unwrap_or(false);
        if refused {
            return Err(DirectoryError::Connect {
                address: target.device_address.clone(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        Ok(Box::new(MemoryDirectory {
            target: name,
            filter: filter.clone(),
            devices: self.devices.clone(),
            journal: self.journal.clone(),
        }))
    }
}

/// Session against a [`MemoryConnector`] device.
pub struct MemoryDirectory {
    target: String,
    filter: AccountFilter,
    devices: Arc<Mutex<HashMap<String, DeviceState>>>,
    journal: Journal,
}

impl MemoryDirectory {
    fn with_device<T>(&self, f: impl FnOnce(&mut DeviceState) -> T) -> T {
        let mut devices = self.devices.lock().unwrap();
        f(devices.entry(self.target.clone()).or_default())
    }
}

#[async_trait]
impl AccountDirectory for MemoryDirectory {
    async fn list_accounts(&mut self) -> Result<Vec<Account>, DirectoryError> {
        self.journal.record(Call::List {
            target: self.target.clone(),
        });

        let filter = self.filter.clone();
        self.with_device(|device| {
            if device.fail_list {
                return Err(DirectoryError::Fatal("not logged in".to_string()));
            }
            Ok(device
                .accounts
                .iter()
                .filter(|a| filter.admits(a))
                .cloned()
                .collect())
        })
    }

    async fn remove_account(&mut self, id: &str) -> Result<(), DirectoryError> {
        self.journal.record(Call::Remove {
            target: self.target.clone(),
            id: id.to_string(),
        });

        self.with_device(|device| {
            if device.fail_remove.contains(id) {
                return Err(DirectoryError::Rejected {
                    command: "remove".to_string(),
                    message: "no such item".to_string(),
                });
            }
            device.accounts.retain(|a| a.id != id);
            Ok(())
        })
    }

    async fn create_account(&mut self, account: &NewAccount) -> Result<(), DirectoryError> {
        self.journal.record(Call::Create {
            target: self.target.clone(),
            name: account.name.clone(),
        });

        self.with_device(|device| {
            if device.fail_create.contains(&account.name)
                || device.accounts.iter().any(|a| a.name == account.name)
            {
                return Err(DirectoryError::Rejected {
                    command: "add".to_string(),
                    message: "already have user with this name".to_string(),
                });
            }
            device.next_id += 1;
            device.accounts.push(Account {
                id: format!("*new{}", device.next_id),
                name: account.name.clone(),
                profile: account.profile.clone(),
                comment: Some(account.comment.clone()),
            });
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.journal.record(Call::Close {
            target: self.target.clone(),
        });
        Ok(())
    }
}
