use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    generate_salt, get_password_hash, Account, NewAccount, Storage, StorageError, StorageResult,
};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    salt TEXT NOT NULL,
    data TEXT NOT NULL,
    create_time INTEGER NOT NULL
);
"#;

/// SQLite-backed account storage. Supports both file-based and in-memory
/// databases; the single connection is shared behind a mutex.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens a SQLite database file, creating it and the accounts table if
    /// they don't exist.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite database '{}'", path.display()))?;
        Self::init(conn)
    }

    /// Creates a new in-memory database. Content is lost when the program
    /// exits.
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE_SQL)
            .context("create accounts table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(e) => return Err(anyhow!("failed to lock connection: {e:#}").into()),
        };
        f(&conn)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create(&self, account: NewAccount) -> StorageResult<Account> {
        let salt = generate_salt();
        let password = get_password_hash(&account.password, &salt);
        let data = account.data.to_string();

        self.with_conn(|conn| {
            let sql = r#"
            INSERT INTO accounts (id, email, password, salt, data, create_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#;
            debug!("Database create_account: {}, {}", account.id, account.email);
            let result = conn.execute(
                sql,
                params![
                    account.id,
                    account.email,
                    password,
                    salt,
                    data,
                    account.create_time,
                ],
            );
            match result {
                Ok(_) => Ok(Account {
                    id: account.id,
                    email: account.email,
                    data: account.data,
                    create_time: account.create_time,
                }),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StorageError::Conflict(account.email))
                }
                Err(e) => Err(anyhow::Error::from(e).context("insert account").into()),
            }
        })
    }

    async fn get(&self, id: &str) -> StorageResult<Account> {
        self.with_conn(|conn| {
            let sql = "SELECT id, email, data, create_time FROM accounts WHERE id = ?";
            debug!("Database get_account: {sql}, {id}");
            let account = conn
                .query_row(sql, params![id], |row| AccountRow::read(row, 0))
                .optional()
                .context("query account")?;
            match account {
                Some(row) => Ok(row.into_account()?),
                None => Err(StorageError::NotFound),
            }
        })
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.with_conn(|conn| {
            let sql = "DELETE FROM accounts WHERE id = ?";
            debug!("Database delete_account: {sql}, {id}");
            conn.execute(sql, params![id]).context("delete account")?;
            Ok(())
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> StorageResult<Account> {
        self.with_conn(|conn| {
            let sql = r#"
            SELECT password, salt, id, email, data, create_time
            FROM accounts WHERE email = ?
            "#;
            debug!("Database get_account_password: {email}");
            let found = conn
                .query_row(sql, params![email], |row| {
                    let hash: String = row.get(0)?;
                    let salt: String = row.get(1)?;
                    Ok((hash, salt, AccountRow::read(row, 2)?))
                })
                .optional()
                .context("query account password")?;

            let (hash, salt, row) = found.ok_or(StorageError::InvalidCredentials)?;
            if get_password_hash(password, &salt) != hash {
                return Err(StorageError::InvalidCredentials);
            }
            Ok(row.into_account()?)
        })
    }
}

struct AccountRow {
    id: String,
    email: String,
    data: String,
    create_time: u64,
}

impl AccountRow {
    fn read(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            email: row.get(offset + 1)?,
            data: row.get(offset + 2)?,
            create_time: row.get(offset + 3)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        let data = serde_json::from_str(&self.data)
            .with_context(|| format!("decode data of account '{}'", self.id))?;
        Ok(Account {
            id: self.id,
            email: self.email,
            data,
            create_time: self.create_time,
        })
    }
}
