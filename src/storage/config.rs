use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::config::{expandenv, CommonConfig, PathSet};

use super::{MemoryStorage, SqliteStorage, Storage};

/// Storage configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Storage type to use
    #[serde(rename = "type")]
    #[serde(default = "StorageConfig::default_type")]
    pub storage_type: StorageType,

    /// Name of the sqlite database file under the data directory, only valid
    /// when storage type is sqlite
    #[serde(default = "StorageConfig::default_sqlite_name")]
    pub sqlite_name: String,

    #[serde(skip)]
    sqlite_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    #[serde(rename = "sqlite")]
    Sqlite,

    /// Keep accounts in memory, lost on restart
    #[serde(rename = "memory")]
    Memory,
}

impl CommonConfig for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: Self::default_type(),
            sqlite_name: Self::default_sqlite_name(),
            sqlite_path: PathBuf::new(),
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        if self.storage_type != StorageType::Sqlite {
            return Ok(());
        }

        self.sqlite_name = expandenv("sqlite_name", &self.sqlite_name)?;
        if self.sqlite_name.is_empty() {
            bail!("sqlite_name cannot be empty");
        }
        self.sqlite_path = ps.data_path.join(&self.sqlite_name);

        Ok(())
    }
}

impl StorageConfig {
    pub fn build(&self) -> Result<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match self.storage_type {
            StorageType::Sqlite => Arc::new(SqliteStorage::open(&self.sqlite_path)?),
            StorageType::Memory => Arc::new(MemoryStorage::new()),
        };
        Ok(storage)
    }

    fn default_type() -> StorageType {
        StorageType::Sqlite
    }

    fn default_sqlite_name() -> String {
        String::from("accounts.db")
    }
}
