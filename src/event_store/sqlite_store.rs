//! SQLite-backed event store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EventStore, EventStoreSettings, StoredEvent};

/// Fraction of the size cap the global eviction pass shrinks the database to.
const SIZE_CAP_TARGET: f64 = 0.8;

pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
    settings: EventStoreSettings,
}

impl SqliteEventStore {
    pub fn new<P: AsRef<Path>>(db_path: P, settings: EventStoreSettings) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open event database at {:?}", path))?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        // `seq` materialises insertion order per stream; `created_at` drives
        // the age-based retention passes.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                stream_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_stream_id ON events(stream_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)",
            [],
        )?;

        info!("Event store ready at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            settings,
        })
    }

    fn enforce_stream_cap(conn: &Connection, stream_id: &str, cap: usize) -> Result<()> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE stream_id = ?1",
            params![stream_id],
            |row| row.get(0),
        )?;
        let count = count as usize;
        if count > cap {
            let excess = (count - cap) as i64;
            let deleted = conn.execute(
                "DELETE FROM events WHERE seq IN (
                    SELECT seq FROM events WHERE stream_id = ?1 ORDER BY seq ASC LIMIT ?2
                )",
                params![stream_id, excess],
            )?;
            debug!(
                "Evicted {} oldest events from stream {} (cap {})",
                deleted, stream_id, cap
            );
        }
        Ok(())
    }

    fn size_bytes(conn: &Connection) -> Result<u64> {
        let page_count: i64 = conn.query_row("PRAGMA page_count;", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size;", [], |row| row.get(0))?;
        Ok((page_count * page_size) as u64)
    }

    fn delete_older_than_retention(conn: &Connection, max_age_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - ChronoDuration::days(max_age_days)).to_rfc3339();
        let deleted = conn.execute(
            "DELETE FROM events WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Shrink the database below the size cap after a store pushed it over.
    ///
    /// First pass deletes expired rows; if that freed nothing, a fraction of
    /// the globally oldest rows is dropped so the footprint lands at
    /// `SIZE_CAP_TARGET` of the cap. Affects all streams, which can break
    /// resumability for the evicted ones.
    fn enforce_size_cap(&self, conn: &Connection) -> Result<()> {
        let cap_bytes = self.settings.max_db_size_mb * 1024 * 1024;
        let current = Self::size_bytes(conn)?;
        if current <= cap_bytes {
            return Ok(());
        }

        warn!(
            "Event database size {} bytes exceeds cap {} bytes, cleaning up",
            current, cap_bytes
        );

        let mut deleted =
            Self::delete_older_than_retention(conn, self.settings.max_event_age_days)?;
        if deleted == 0 {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            let percent = 1.0 - (SIZE_CAP_TARGET * cap_bytes as f64 / current as f64);
            let to_delete = ((total as f64) * percent).ceil() as i64;
            if to_delete > 0 {
                deleted = conn.execute(
                    "DELETE FROM events WHERE seq IN (
                        SELECT seq FROM events ORDER BY seq ASC LIMIT ?1
                    )",
                    params![to_delete],
                )?;
            }
        }

        conn.execute_batch("VACUUM;")?;
        info!(
            "Size cleanup removed {} events, database now {} bytes",
            deleted,
            Self::size_bytes(conn)?
        );
        Ok(())
    }
}

impl EventStore for SqliteEventStore {
    fn store_event(&self, stream_id: &str, message: &str) -> Result<String> {
        let event_id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events (event_id, stream_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![event_id, stream_id, message, created_at],
        )
        .context("Failed to insert event")?;

        Self::enforce_stream_cap(&conn, stream_id, self.settings.max_events_per_stream)?;
        self.enforce_size_cap(&conn)?;

        Ok(event_id)
    }

    fn replay_events_after(
        &self,
        last_event_id: &str,
        emit: &mut dyn FnMut(StoredEvent),
    ) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();

        let anchor: Option<(String, i64)> = conn
            .query_row(
                "SELECT stream_id, seq FROM events WHERE event_id = ?1",
                params![last_event_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (stream_id, seq) = match anchor {
            Some(anchor) => anchor,
            None => {
                warn!("Cannot replay: unknown event id {}", last_event_id);
                return Ok(None);
            }
        };

        let mut stmt = conn.prepare(
            "SELECT event_id, message FROM events
             WHERE stream_id = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![stream_id, seq], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (event_id, message) = row?;
            emit(StoredEvent {
                event_id,
                stream_id: stream_id.clone(),
                message,
            });
        }

        Ok(Some(stream_id))
    }

    fn stream_event_count(&self, stream_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE stream_id = ?1",
            params![stream_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = Self::delete_older_than_retention(&conn, self.settings.max_event_age_days)?;
        if deleted > 0 {
            conn.execute_batch("VACUUM;")?;
        }
        Ok(deleted)
    }

    fn db_size_bytes(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        Self::size_bytes(&conn)
    }
}
