//! SQLite-backed nonce store.
//!
//! NonceRecord and TransactionRecord are the only entities that survive a
//! process restart. The settlement claim is one conditional `UPDATE` guarded
//! by `transaction_signature IS NULL`, so SQLite's write serialization makes
//! the claim atomic without any caller-side locking discipline.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::store::{ClaimOutcome, IssueParams, MAX_CREATE_ATTEMPTS, NonceStore, StoreError};
use crate::timestamp::UnixTimestamp;
use crate::types::{
    Address, AttemptStatus, NonceRecord, NonceStatus, SettlementSignature, SplitPayment,
    StoreStats, TokenAmount, TransactionRecord,
};

/// Durable [`NonceStore`] over a single SQLite connection in WAL mode.
#[derive(Clone)]
pub struct SqliteNonceStore {
    conn: Arc<Mutex<Connection>>,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl SqliteNonceStore {
    /// Opens (or creates) the database at `path`. Use `":memory:"` for an
    /// ephemeral store in tests.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("database lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        // WAL keeps readers unblocked while settlement writes land
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS nonces (
                nonce TEXT PRIMARY KEY,
                amount TEXT NOT NULL,
                client_public_key TEXT,
                recipient TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                resource_url TEXT NOT NULL,
                expiry INTEGER NOT NULL,
                split_payment TEXT NOT NULL,
                transaction_signature TEXT,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nonces_expiry ON nonces(expiry)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS settlement_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nonce TEXT NOT NULL,
                transaction_signature TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                timestamp INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attempts_nonce ON settlement_attempts(nonce)",
            [],
        )?;

        // Issuance counter survives expiry sweeps
        conn.execute(
            "CREATE TABLE IF NOT EXISTS counters (name TEXT PRIMARY KEY, value INTEGER NOT NULL)",
            [],
        )?;

        Ok(())
    }

    /// Audit rows for one nonce, oldest first.
    pub fn attempts(&self, nonce: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT nonce, transaction_signature, status, error_message, timestamp
            FROM settlement_attempts
            WHERE nonce = ?1
            ORDER BY id ASC
            "#,
        )?;
        let attempts = stmt
            .query_map(params![nonce], row_to_attempt)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attempts)
    }
}

fn text_conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn row_to_record(row: &Row) -> rusqlite::Result<NonceRecord> {
    let amount_text: String = row.get(1)?;
    let amount = amount_text
        .parse::<u64>()
        .map_err(|e| text_conversion_error(1, e.to_string()))?;
    let client_public_key: Option<String> = row.get(2)?;
    let client_public_key = client_public_key
        .map(|s| Address::from_str(&s))
        .transpose()
        .map_err(|e| text_conversion_error(2, e))?;
    let recipient: String = row.get(3)?;
    let recipient = Address::from_str(&recipient).map_err(|e| text_conversion_error(3, e))?;
    let split_payment: String = row.get(7)?;
    let split_payment: SplitPayment = serde_json::from_str(&split_payment)
        .map_err(|e| text_conversion_error(7, e.to_string()))?;
    let transaction_signature: Option<String> = row.get(8)?;
    let status: String = row.get(9)?;
    let status = NonceStatus::from_str(&status).map_err(|e| text_conversion_error(9, e))?;
    Ok(NonceRecord {
        nonce: row.get(0)?,
        amount: TokenAmount::new(amount),
        client_public_key,
        recipient,
        resource_id: row.get(4)?,
        resource_url: row.get(5)?,
        expiry: UnixTimestamp::from_secs(row.get::<_, i64>(6)? as u64),
        split_payment,
        transaction_signature: transaction_signature.map(SettlementSignature::new),
        status,
        created_at: UnixTimestamp::from_secs(row.get::<_, i64>(10)? as u64),
    })
}

fn row_to_attempt(row: &Row) -> rusqlite::Result<TransactionRecord> {
    let transaction_signature: Option<String> = row.get(1)?;
    let status: String = row.get(2)?;
    let status = AttemptStatus::from_str(&status).map_err(|e| text_conversion_error(2, e))?;
    Ok(TransactionRecord {
        nonce: row.get(0)?,
        transaction_signature: transaction_signature.map(SettlementSignature::new),
        status,
        error_message: row.get(3)?,
        timestamp: UnixTimestamp::from_secs(row.get::<_, i64>(4)? as u64),
    })
}

impl NonceStore for SqliteNonceStore {
    fn create(&self, issue: IssueParams) -> Result<NonceRecord, StoreError> {
        let conn = self.lock()?;
        let split_json = serde_json::to_string(&issue.split_payment)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let nonce = super::generate_nonce();
            // INSERT OR IGNORE: zero rows affected means the nonce collided
            let inserted = conn.execute(
                r#"
                INSERT OR IGNORE INTO nonces
                    (nonce, amount, client_public_key, recipient, resource_id, resource_url,
                     expiry, split_payment, transaction_signature, status, created_at)
                VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, NULL, 'pending', ?8)
                "#,
                params![
                    nonce,
                    issue.amount.to_string(),
                    issue.recipient.to_string(),
                    issue.resource_id,
                    issue.resource_url,
                    issue.expiry.as_secs() as i64,
                    split_json,
                    issue.created_at.as_secs() as i64,
                ],
            )?;
            if inserted == 0 {
                continue;
            }
            conn.execute(
                r#"
                INSERT INTO counters (name, value) VALUES ('total_issued', 1)
                ON CONFLICT(name) DO UPDATE SET value = value + 1
                "#,
                [],
            )?;
            return Ok(NonceRecord {
                nonce,
                amount: issue.amount,
                client_public_key: None,
                recipient: issue.recipient,
                resource_id: issue.resource_id,
                resource_url: issue.resource_url,
                expiry: issue.expiry,
                split_payment: issue.split_payment,
                transaction_signature: None,
                status: NonceStatus::Pending,
                created_at: issue.created_at,
            });
        }
        Err(StoreError::NonceCollision(MAX_CREATE_ATTEMPTS))
    }

    fn get(&self, nonce: &str) -> Result<Option<NonceRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT nonce, amount, client_public_key, recipient, resource_id, resource_url,
                       expiry, split_payment, transaction_signature, status, created_at
                FROM nonces
                WHERE nonce = ?1
                "#,
                params![nonce],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn mark_verified(&self, nonce: &str, client_key: &Address) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            r#"
            UPDATE nonces SET status = 'verified', client_public_key = ?1
            WHERE nonce = ?2 AND transaction_signature IS NULL
              AND status IN ('pending', 'verified')
            "#,
            params![client_key.to_string(), nonce],
        )?;
        if updated == 0 {
            tracing::debug!(nonce = %nonce, "mark_verified matched no claimable record");
        }
        Ok(())
    }

    fn claim_settlement(
        &self,
        nonce: &str,
        signature: &SettlementSignature,
        now: UnixTimestamp,
    ) -> Result<ClaimOutcome, StoreError> {
        let conn = self.lock()?;
        let claimed = conn.execute(
            r#"
            UPDATE nonces SET transaction_signature = ?1, status = 'settled'
            WHERE nonce = ?2 AND transaction_signature IS NULL AND expiry >= ?3
            "#,
            params![signature.as_str(), nonce, now.as_secs() as i64],
        )?;
        if claimed == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        // The claim missed; classify why from the row as it stands now.
        let row = conn
            .query_row(
                "SELECT transaction_signature, expiry FROM nonces WHERE nonce = ?1",
                params![nonce],
                |row| {
                    let signature: Option<String> = row.get(0)?;
                    let expiry: i64 = row.get(1)?;
                    Ok((signature, UnixTimestamp::from_secs(expiry as u64)))
                },
            )
            .optional()?;
        Ok(match row {
            None => ClaimOutcome::NotFound,
            Some((Some(_), _)) => ClaimOutcome::AlreadySettled,
            Some((None, expiry)) if expiry.is_past(now) => ClaimOutcome::Expired,
            Some((None, _)) => ClaimOutcome::AlreadySettled,
        })
    }

    fn mark_failed(&self, nonce: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE nonces SET status = 'failed' WHERE nonce = ?1",
            params![nonce],
        )?;
        Ok(())
    }

    fn record_attempt(&self, attempt: &TransactionRecord) {
        let result = self.lock().and_then(|conn| {
            conn.execute(
                r#"
                INSERT INTO settlement_attempts
                    (nonce, transaction_signature, status, error_message, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    attempt.nonce,
                    attempt.transaction_signature.as_ref().map(|s| s.as_str()),
                    attempt.status.as_str(),
                    attempt.error_message,
                    attempt.timestamp.as_secs() as i64,
                ],
            )
            .map_err(StoreError::from)
        });
        if let Err(e) = result {
            // Audit persistence must not fail the settlement flow
            tracing::error!(nonce = %attempt.nonce, error = %e, "failed to persist settlement attempt");
        }
    }

    fn sweep_expired(&self, now: UnixTimestamp) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            r#"
            DELETE FROM nonces
            WHERE status IN ('pending', 'verified')
              AND transaction_signature IS NULL
              AND expiry < ?1
            "#,
            params![now.as_secs() as i64],
        )?;
        Ok(removed)
    }

    fn stats(&self, now: UnixTimestamp) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;
        let total_issued: i64 = conn
            .query_row(
                "SELECT value FROM counters WHERE name = 'total_issued'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let now_secs = now.as_secs() as i64;
        let (settled, failed, pending, expired) = conn.query_row(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'settled'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE status IN ('pending', 'verified') AND expiry >= ?1),
                COUNT(*) FILTER (WHERE status IN ('pending', 'verified') AND expiry < ?1)
            FROM nonces
            "#,
            params![now_secs],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;
        Ok(StoreStats {
            total_issued: total_issued as u64,
            settled: settled as u64,
            failed: failed as u64,
            pending: pending as u64,
            expired: expired as u64,
        })
    }
}
