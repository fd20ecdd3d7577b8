//! Shared data model for roster entries, device accounts and reconciliation output.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A guest currently expected to have network access, as reported by the
/// property-management service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    /// Unique roster identifier; becomes the device account name.
    pub id: String,
    /// Display name of the guest.
    pub name: String,
    /// Birth year, used to derive the initial account password.
    #[serde(default)]
    pub birth_year: i32,
    #[serde(rename = "check_in_date")]
    pub check_in: DateTime<FixedOffset>,
    #[serde(rename = "check_out_date")]
    pub check_out: DateTime<FixedOffset>,
    /// Supporting identity document reference, if the roster carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_card: Option<String>,
}

/// A user record as listed by the access-control device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Device-assigned identifier (e.g. `*1A`).
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            profile: None,
            comment: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Comment if the device has one, otherwise an empty string.
    pub fn label(&self) -> &str {
        self.comment.as_deref().unwrap_or("")
    }
}

/// An account that the device should create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub password: String,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Device accounts with no matching occupant.
    pub removals: Vec<Account>,
    /// Occupants with no matching device account.
    pub creations: Vec<NewAccount>,
    /// Number of accounts that already represent an occupant.
    pub matched: usize,
    /// Unmatched accounts kept because their name is protected.
    pub retained: Vec<Account>,
    /// Roster entries that repeat an identifier already seen earlier in the roster.
    pub duplicates: Vec<Occupant>,
    /// Roster entries whose identifier is the device's reserved account name.
    pub conflicts: Vec<Occupant>,
}

impl ReconciliationResult {
    /// True when the device already matches the roster.
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.creations.is_empty()
    }
}
