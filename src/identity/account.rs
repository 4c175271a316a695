//! Credential store: username -> account record, last write wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::password::hash_password;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    #[serde(default)]
    pub biometric_reference_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account store io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("account store is corrupt at {path}: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, username: &str) -> Result<Option<Account>, StoreError>;
    /// Overwrites any existing record for `username`.
    async fn set(&self, username: &str, account: Account) -> Result<(), StoreError>;
}

pub type SharedAccountStore = Arc<dyn AccountStore>;

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().get(username).cloned())
    }

    async fn set(&self, username: &str, account: Account) -> Result<(), StoreError> {
        self.accounts.write().insert(username.to_string(), account);
        Ok(())
    }
}

/// Accounts persisted as one JSON document. Every `set` rewrites the file via a
/// temp file + rename; the mutex serializes writers within the process.
pub struct JsonFileAccountStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    async fn read_all(&self) -> Result<HashMap<String, Account>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StoreError::Corrupt { path: self.path.clone(), source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(source) => Err(StoreError::Io { path: self.path.clone(), source }),
        }
    }

    async fn write_all(&self, accounts: &HashMap<String, Account>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
            }
        }
        let body = serde_json::to_vec_pretty(accounts)
            .map_err(|source| StoreError::Corrupt { path: self.path.clone(), source })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for JsonFileAccountStore {
    async fn get(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(username))
    }

    async fn set(&self, username: &str, account: Account) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(username.to_string(), account);
        self.write_all(&all).await?;
        debug!(path = %self.path.display(), count = all.len(), "accounts.persisted");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("username and password are required")]
    MissingField,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates or replaces the account for `username`. The previous record,
/// including any biometric enrollment, is discarded.
pub async fn register_account(
    store: &dyn AccountStore,
    username: &str,
    password: &str,
) -> Result<Account, RegistrationError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(RegistrationError::MissingField);
    }
    let pw = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&pw))
        .await
        .map_err(|e| StoreError::Hash(e.to_string()))?
        .map_err(|e| StoreError::Hash(e.to_string()))?;
    let account = Account {
        username: username.to_string(),
        password_hash,
        biometric_reference_id: None,
    };
    store.set(username, account.clone()).await?;
    info!(account = username, "account.registered");
    Ok(account)
}
