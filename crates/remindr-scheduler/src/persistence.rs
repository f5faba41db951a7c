//! SQLite-backed storage: the host application's events/users tables (read
//! side) and the reminder ledger (owned here).
//!
//! Times are stored as epoch milliseconds so window comparisons and the
//! composite ledger key are exact integer matches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remindr_core::error::{RemindrError, Result};
use remindr_core::traits::{EventSource, ReminderLedger};
use remindr_core::types::{
    DeliveryOutcome, DeliveryStatus, LedgerEntry, LedgerWrite, ScheduledEvent, TriggerKey,
    WindowQuery,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

/// Reminder database: event reads plus the idempotency ledger.
pub struct ReminderDb {
    conn: Mutex<Connection>,
}

/// Owner row as written by the host application.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub notifications_enabled: bool,
}

/// Event row as written by the host application.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub is_archived: bool,
}

fn ms_to_dt(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn db_err(e: rusqlite::Error) -> RemindrError {
    RemindrError::Database(e.to_string())
}

impl ReminderDb {
    /// Open or create the reminder database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| RemindrError::Database(format!("DB open: {e}")))?;

        // WAL keeps host-side writers from blocking our reads
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// Private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RemindrError::Database(format!("Lock: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            -- Host application tables; created only when missing
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT,
                notifications_enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                location TEXT,
                start_at_ms INTEGER,
                end_at_ms INTEGER,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_at_ms);

            -- One row per (event, trigger instant)
            CREATE TABLE IF NOT EXISTS reminder_ledger (
                event_id TEXT NOT NULL,
                trigger_at_ms INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                destination TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('failed', 'sent')),
                error_message TEXT,
                attempts INTEGER NOT NULL DEFAULT 1,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                PRIMARY KEY (event_id, trigger_at_ms)
            );
            ",
        )
        .map_err(|e| RemindrError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    // ─── Host-side writes ─────────────────────────────────────

    pub fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, email, notifications_enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                notifications_enabled = excluded.notifications_enabled",
            params![user.id, user.email, user.notifications_enabled as i32],
        )
        .map_err(|e| RemindrError::Database(format!("Save user: {e}")))?;
        Ok(())
    }

    pub fn upsert_event(&self, event: &EventRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events
                (id, user_id, title, description, location, start_at_ms, end_at_ms, is_deleted, is_archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                start_at_ms = excluded.start_at_ms,
                end_at_ms = excluded.end_at_ms,
                is_deleted = excluded.is_deleted,
                is_archived = excluded.is_archived",
            params![
                event.id,
                event.owner_id,
                event.title,
                event.description,
                event.location,
                event.start_time.map(|t| t.timestamp_millis()),
                event.end_time.map(|t| t.timestamp_millis()),
                event.is_deleted as i32,
                event.is_archived as i32,
            ],
        )
        .map_err(|e| RemindrError::Database(format!("Save event: {e}")))?;
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
        let status: String = row.get(4)?;
        Ok(LedgerEntry {
            event_id: row.get(0)?,
            trigger_time: ms_to_dt(row.get(1)?),
            owner_id: row.get(2)?,
            destination: row.get(3)?,
            // CHECK constraint limits the column to known values
            status: status.parse().unwrap_or(DeliveryStatus::Failed),
            error_message: row.get(5)?,
            attempts: row.get(6)?,
            created_at: ms_to_dt(row.get(7)?),
            updated_at: ms_to_dt(row.get(8)?),
        })
    }
}

const LEDGER_COLUMNS: &str = "event_id, trigger_at_ms, user_id, destination, status, error_message, attempts, created_at_ms, updated_at_ms";

#[async_trait]
impl EventSource for ReminderDb {
    async fn events_in_window(&self, query: &WindowQuery) -> Result<Vec<ScheduledEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.user_id, e.title, e.description, e.location,
                        e.start_at_ms, e.end_at_ms, e.is_deleted, e.is_archived,
                        u.notifications_enabled, u.email
                 FROM events e
                 JOIN users u ON u.id = e.user_id
                 WHERE e.start_at_ms > ?1 AND e.start_at_ms <= ?2
                   AND e.is_deleted = 0 AND e.is_archived = 0
                   AND u.notifications_enabled = 1
                   AND u.email IS NOT NULL AND TRIM(u.email) <> ''
                   AND NOT EXISTS (
                       SELECT 1 FROM reminder_ledger l
                       WHERE l.event_id = e.id
                         AND l.trigger_at_ms = e.start_at_ms - ?3
                         AND l.status = 'sent'
                   )
                 ORDER BY e.start_at_ms ASC",
            )
            .map_err(|e| RemindrError::Selection(format!("Prepare: {e}")))?;

        let rows = stmt
            .query_map(
                params![
                    query.after.timestamp_millis(),
                    query.until.timestamp_millis(),
                    query.lead.num_milliseconds(),
                ],
                |row| {
                    Ok(ScheduledEvent {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                        location: row.get(4)?,
                        start_time: row.get::<_, Option<i64>>(5)?.map(ms_to_dt),
                        end_time: row.get::<_, Option<i64>>(6)?.map(ms_to_dt),
                        is_deleted: row.get::<_, i32>(7)? != 0,
                        is_archived: row.get::<_, i32>(8)? != 0,
                        notifications_enabled: row.get::<_, i32>(9)? != 0,
                        destination: row.get(10)?,
                    })
                },
            )
            .map_err(|e| RemindrError::Selection(format!("Query: {e}")))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RemindrError::Selection(format!("Row: {e}")))
    }
}

#[async_trait]
impl ReminderLedger for ReminderDb {
    async fn record_outcome(&self, outcome: &DeliveryOutcome) -> Result<LedgerWrite> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RemindrError::ledger(format!("Lock: {e}")))?;
        let now = Utc::now().timestamp_millis();
        // The WHERE on the update arm is what keeps `sent` terminal.
        let changed = conn
            .execute(
                "INSERT INTO reminder_ledger
                    (event_id, trigger_at_ms, user_id, destination, status, error_message,
                     attempts, created_at_ms, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
                 ON CONFLICT(event_id, trigger_at_ms) DO UPDATE SET
                    user_id = excluded.user_id,
                    destination = excluded.destination,
                    status = excluded.status,
                    error_message = excluded.error_message,
                    attempts = reminder_ledger.attempts + 1,
                    updated_at_ms = excluded.updated_at_ms
                 WHERE reminder_ledger.status <> 'sent'",
                params![
                    outcome.key.event_id,
                    outcome.key.trigger_time.timestamp_millis(),
                    outcome.owner_id,
                    outcome.destination,
                    outcome.status.as_str(),
                    outcome.error_message,
                    now,
                ],
            )
            .map_err(|e| RemindrError::Ledger(format!("Upsert {}: {e}", outcome.key)))?;

        Ok(if changed == 0 {
            LedgerWrite::IgnoredTerminal
        } else {
            LedgerWrite::Applied
        })
    }

    async fn entry(&self, key: &TriggerKey) -> Result<Option<LedgerEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {LEDGER_COLUMNS} FROM reminder_ledger WHERE event_id = ?1 AND trigger_at_ms = ?2"
            ),
            params![key.event_id, key.trigger_time.timestamp_millis()],
            Self::row_to_entry,
        )
        .optional()
        .map_err(db_err)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LEDGER_COLUMNS} FROM reminder_ledger
                 ORDER BY updated_at_ms DESC, trigger_at_ms DESC LIMIT ?1"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map([limit as i64], Self::row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM reminder_ledger WHERE trigger_at_ms < ?1",
            [cutoff.timestamp_millis()],
        )
        .map_err(|e| RemindrError::Database(format!("Prune ledger: {e}")))
    }
}
