//! Account credential storage

use crate::error::AuthError;
use crate::identity::AuthInfo;
use cairn_common::config::AccountConfig;
use parking_lot::RwLock;
use std::collections::HashMap;

/// One account with a signing secret
#[derive(Debug, Clone)]
pub struct Account {
    pub canonical_id: String,
    pub display_name: String,
    pub secret_key: String,
}

impl Account {
    /// Identity presented to handlers
    #[must_use]
    pub fn auth_info(&self, access_key: &str) -> AuthInfo {
        AuthInfo::new(
            self.canonical_id.clone(),
            self.display_name.clone(),
            format!("arn:aws:iam::{}:root", self.canonical_id),
        )
        .with_access_key(access_key)
    }
}

/// In-memory access key to account map
#[derive(Default)]
pub struct CredentialStore {
    /// Accounts indexed by access key id
    keys: RwLock<HashMap<String, Account>>,
}

impl CredentialStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from configured accounts
    #[must_use]
    pub fn from_accounts(accounts: &[AccountConfig]) -> Self {
        let store = Self::new();
        for account in accounts {
            store.insert(
                &account.access_key,
                Account {
                    canonical_id: account.canonical_id.clone(),
                    display_name: account.display_name.clone(),
                    secret_key: account.secret_key.clone(),
                },
            );
        }
        store
    }

    /// Register or replace an access key
    pub fn insert(&self, access_key: &str, account: Account) {
        self.keys.write().insert(access_key.to_string(), account);
    }

    /// Look up the account for an access key
    pub fn lookup(&self, access_key: &str) -> Result<Account, AuthError> {
        self.keys
            .read()
            .get(access_key)
            .cloned()
            .ok_or_else(|| AuthError::AccessKeyNotFound(access_key.to_string()))
    }

    /// Number of registered access keys
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether no access keys are registered
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}
