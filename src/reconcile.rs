//! Reconciliation of a roster snapshot against a device account snapshot.
//!
//! The roster identifier and the device account name are the only join key.
//! Occupants are indexed by identifier once, then every eligible account
//! either claims its occupant or is scheduled for removal. Occupants left
//! unclaimed become creations, in roster order.

use crate::label::{account_label, initial_password};
use crate::types::{Account, NewAccount, Occupant, ReconciliationResult};
use std::collections::{HashMap, HashSet};

/// Decides which device accounts take part in reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
    /// Built-in account that is never considered.
    pub reserved_name: String,
    /// When set, only accounts in this profile are considered.
    pub profile: Option<String>,
}

impl AccountFilter {
    pub fn new(reserved_name: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            reserved_name: reserved_name.into(),
            profile,
        }
    }

    pub fn admits(&self, account: &Account) -> bool {
        if account.name == self.reserved_name {
            return false;
        }
        match &self.profile {
            Some(profile) => account.profile.as_deref() == Some(profile.as_str()),
            None => true,
        }
    }
}

/// Computes the removal and creation sets for one target.
#[derive(Debug, Clone)]
pub struct Reconciler {
    filter: AccountFilter,
    protected: HashSet<String>,
    transliterate: bool,
}

impl Reconciler {
    pub fn new(filter: AccountFilter, protected: HashSet<String>, transliterate: bool) -> Self {
        Self {
            filter,
            protected,
            transliterate,
        }
    }

    /// Diff `occupants` against `accounts`. Pure; ineligible accounts are ignored.
    pub fn reconcile(&self, occupants: &[Occupant], accounts: &[Account]) -> ReconciliationResult {
        let mut result = ReconciliationResult::default();

        // First roster occurrence of an identifier wins; later ones are data errors.
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(occupants.len());
        for (position, occupant) in occupants.iter().enumerate() {
            if index.contains_key(occupant.id.as_str()) {
                result.duplicates.push(occupant.clone());
            } else {
                index.insert(occupant.id.as_str(), position);
            }
        }

        let mut claimed = vec![false; occupants.len()];
        for account in accounts.iter().filter(|a| self.filter.admits(a)) {
            match index.get(account.name.as_str()) {
                Some(&position) if !claimed[position] => {
                    claimed[position] = true;
                    result.matched += 1;
                }
                _ if self.protected.contains(&account.name) => {
                    result.retained.push(account.clone());
                }
                _ => result.removals.push(account.clone()),
            }
        }

        for (position, occupant) in occupants.iter().enumerate() {
            if claimed[position] || index.get(occupant.id.as_str()) != Some(&position) {
                continue;
            }
            // The device always refuses its reserved name
            if occupant.id == self.filter.reserved_name {
                result.conflicts.push(occupant.clone());
                continue;
            }
            result.creations.push(self.new_account(occupant));
        }

        result
    }

    fn new_account(&self, occupant: &Occupant) -> NewAccount {
        NewAccount {
            name: occupant.id.clone(),
            password: initial_password(occupant.birth_year),
            comment: account_label(occupant, self.transliterate),
            profile: self.filter.profile.clone(),
        }
    }
}
