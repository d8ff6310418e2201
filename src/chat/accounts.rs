//! User profiles and transaction history read by the chatbot.

use crate::error::AccountError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        full_name TEXT,
        email TEXT,
        created_at TEXT
    );
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        txn_time TEXT NOT NULL,
        amount REAL NOT NULL,
        merchant TEXT,
        card_masked TEXT,
        location TEXT,
        is_fraud INTEGER DEFAULT 0,
        description TEXT,
        FOREIGN KEY(user_id) REFERENCES users(id)
    );
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountStats {
    pub transaction_count: u64,
    pub fraud_count: u64,
    /// Percentage, rounded to two decimals.
    pub fraud_rate: f64,
    pub total_amount: f64,
    pub avg_amount: f64,
    pub max_amount: f64,
    pub unique_merchants: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub created_at: Option<String>,
    pub stats: AccountStats,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub txn_time: String,
    pub amount: f64,
    pub merchant: Option<String>,
    pub location: Option<String>,
    /// Flag stored with the record; views recompute risk from the rules.
    pub is_fraud: bool,
    pub description: Option<String>,
}

/// Read-only view of the user and transaction store.
pub trait AccountDirectory: Send + Sync {
    /// Look a user up by username or numeric id.
    fn profile(&self, user: &str) -> Result<Option<UserProfile>, AccountError>;

    /// Newest first. Unknown users have no transactions.
    fn recent_transactions(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, AccountError>;
}

/// Directory for deployments without a user store: nobody is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccounts;

impl AccountDirectory for NoAccounts {
    fn profile(&self, _user: &str) -> Result<Option<UserProfile>, AccountError> {
        Ok(None)
    }

    fn recent_transactions(
        &self,
        _user: &str,
        _limit: usize,
    ) -> Result<Vec<TransactionRecord>, AccountError> {
        Ok(Vec::new())
    }
}

/// SQLite-backed directory over the `users` and `transactions` tables.
pub struct SqliteAccounts {
    conn: Mutex<Connection>,
}

impl SqliteAccounts {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AccountError> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> Result<Self, AccountError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AccountError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        full_name: Option<&str>,
        email: Option<&str>,
        created_at: &str,
    ) -> Result<i64, AccountError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (username, password_hash, full_name, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, password_hash, full_name, email, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_transaction(&self, user_id: i64, txn: &TransactionRecord) -> Result<i64, AccountError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO transactions (user_id, txn_time, amount, merchant, location, is_fraud, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                txn.txn_time,
                txn.amount,
                txn.merchant,
                txn.location,
                txn.is_fraud as i64,
                txn.description,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn user_id(conn: &Connection, user: &str) -> Result<Option<i64>, AccountError> {
        let id = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1 OR id = ?1",
                params![user],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

impl AccountDirectory for SqliteAccounts {
    fn profile(&self, user: &str) -> Result<Option<UserProfile>, AccountError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, username, full_name, email, created_at
                 FROM users WHERE username = ?1 OR id = ?1",
                params![user],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, username, full_name, email, created_at)) = row else {
            debug!(user, "No such user");
            return Ok(None);
        };

        let stats = conn.query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN is_fraud = 1 THEN 1 ELSE 0 END),
                    SUM(amount),
                    AVG(amount),
                    MAX(amount),
                    COUNT(DISTINCT merchant)
             FROM transactions WHERE user_id = ?1",
            params![id],
            |row| {
                let count: i64 = row.get(0)?;
                let fraud: Option<i64> = row.get(1)?;
                let fraud = fraud.unwrap_or(0);
                Ok(AccountStats {
                    transaction_count: count as u64,
                    fraud_count: fraud as u64,
                    fraud_rate: round2(fraud as f64 / count.max(1) as f64 * 100.0),
                    total_amount: round2(row.get::<_, Option<f64>>(2)?.unwrap_or(0.0)),
                    avg_amount: round2(row.get::<_, Option<f64>>(3)?.unwrap_or(0.0)),
                    max_amount: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    unique_merchants: row.get::<_, i64>(5)? as u64,
                })
            },
        )?;

        Ok(Some(UserProfile {
            id,
            username,
            full_name,
            email,
            created_at,
            stats,
        }))
    }

    fn recent_transactions(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, AccountError> {
        let conn = self.conn.lock();
        let Some(id) = Self::user_id(&conn, user)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT txn_time, amount, merchant, location, is_fraud, description
             FROM transactions WHERE user_id = ?1
             ORDER BY txn_time DESC LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![id, limit as i64], |row| {
                Ok(TransactionRecord {
                    txn_time: row.get(0)?,
                    amount: row.get(1)?,
                    merchant: row.get(2)?,
                    location: row.get(3)?,
                    is_fraud: row.get::<_, Option<i64>>(4)?.unwrap_or(0) == 1,
                    description: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
