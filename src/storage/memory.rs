use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;

use super::{
    generate_salt, get_password_hash, Account, NewAccount, Storage, StorageError, StorageResult,
};

struct StoredAccount {
    account: Account,
    password: String,
    salt: String,
}

/// Keeps accounts in a process-local map. Content is lost when the process
/// exits, so this is meant for tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryStorage {
    accounts: Mutex<HashMap<String, StoredAccount>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_accounts<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut HashMap<String, StoredAccount>) -> StorageResult<T>,
    {
        let mut accounts = match self.accounts.lock() {
            Ok(accounts) => accounts,
            Err(e) => return Err(anyhow!("failed to lock accounts: {e:#}").into()),
        };
        f(&mut accounts)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(&self, account: NewAccount) -> StorageResult<Account> {
        self.with_accounts(|accounts| {
            if accounts.values().any(|s| s.account.email == account.email) {
                return Err(StorageError::Conflict(account.email));
            }
            if accounts.contains_key(&account.id) {
                return Err(anyhow!("duplicate account id '{}'", account.id).into());
            }

            let salt = generate_salt();
            let stored = StoredAccount {
                account: Account {
                    id: account.id.clone(),
                    email: account.email,
                    data: account.data,
                    create_time: account.create_time,
                },
                password: get_password_hash(&account.password, &salt),
                salt,
            };
            let result = stored.account.clone();
            accounts.insert(account.id, stored);
            Ok(result)
        })
    }

    async fn get(&self, id: &str) -> StorageResult<Account> {
        self.with_accounts(|accounts| match accounts.get(id) {
            Some(stored) => Ok(stored.account.clone()),
            None => Err(StorageError::NotFound),
        })
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.with_accounts(|accounts| {
            accounts.remove(id);
            Ok(())
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> StorageResult<Account> {
        self.with_accounts(|accounts| {
            let stored = accounts
                .values()
                .find(|s| s.account.email == email)
                .ok_or(StorageError::InvalidCredentials)?;
            if get_password_hash(password, &stored.salt) != stored.password {
                return Err(StorageError::InvalidCredentials);
            }
            Ok(stored.account.clone())
        })
    }
}
