// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! SQLite-backed implementation of [`Repository`], file-backed at
//! `./data/monitor.db` by default.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::error::Result;
use crate::models::{Camera, CameraStatus, DowntimeEvent, Importance, LogType, NewCamera, Nvr};

use super::{Repository, DEFAULT_SETTINGS};

/// Disambiguates the shared-cache in-memory databases opened by
/// [`SqliteRepository::open_in_memory`] so concurrently-run tests don't
/// alias the same backing store.
static IN_MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct SqliteRepository {
    /// Cameras, downtime events, nvrs, and settings — the tables a tick's
    /// reconciliation transaction spans.
    conn: Mutex<Connection>,
    /// A second connection dedicated to the `logs` table, so `append_log`
    /// keeps committing independently of whatever transaction is open on
    /// `conn`.
    log_conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (creating if absent) the database at `path`, including its parent
    /// directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let log_conn = Connection::open(path)?;
        log_conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn), log_conn: Mutex::new(log_conn) })
    }

    /// In-memory database, used by tests. Both connections share one
    /// SQLite shared-cache identity so `log_conn` sees the schema `conn`
    /// creates in [`Repository::init`].
    pub fn open_in_memory() -> Result<Self> {
        let id = IN_MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:nvr_monitor_test_{id}?mode=memory&cache=shared");
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(&uri, flags)?;
        let log_conn = Connection::open_with_flags(&uri, flags)?;
        Ok(Self { conn: Mutex::new(conn), log_conn: Mutex::new(log_conn) })
    }

    fn row_to_camera(row: &rusqlite::Row<'_>) -> rusqlite::Result<Camera> {
        let status_str: String = row.get("status")?;
        let status = status_str.parse::<CameraStatus>().unwrap_or(CameraStatus::Unknown);
        let importance: i64 = row.get("importance")?;
        Ok(Camera {
            id: row.get("id")?,
            name: row.get("name")?,
            ip: row.get("ip")?,
            nvr_ip: row.get("nvr_ip")?,
            channel_id: row.get("channel_id")?,
            is_muted: row.get::<_, i64>("is_muted")? != 0,
            importance: Importance::from_i64(importance),
            last_online: row.get("last_online")?,
            status,
            mail_alert_count: row.get("mail_alert_count")?,
            mail_last_alert: row.get("mail_last_alert")?,
            telegram_alert_count: row.get("telegram_alert_count")?,
            telegram_last_alert: row.get("telegram_last_alert")?,
        })
    }
}

impl Repository for SqliteRepository {
    fn init(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nvrs (
                ip TEXT PRIMARY KEY,
                user TEXT NOT NULL,
                password TEXT,
                enabled INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS cameras (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                ip TEXT NOT NULL,
                nvr_ip TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                is_muted INTEGER NOT NULL DEFAULT 0,
                importance INTEGER NOT NULL DEFAULT 2,
                last_online TEXT,
                status TEXT NOT NULL DEFAULT 'Unknown',
                mail_alert_count INTEGER NOT NULL DEFAULT 0,
                mail_last_alert TEXT,
                telegram_alert_count INTEGER NOT NULL DEFAULT 0,
                telegram_last_alert TEXT,
                UNIQUE(nvr_ip, channel_id)
            );
            CREATE INDEX IF NOT EXISTS idx_cameras_nvr_ip ON cameras(nvr_ip);
            CREATE TABLE IF NOT EXISTS downtime_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                camera_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_downtime_camera ON downtime_events(camera_id);
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                log_type TEXT NOT NULL,
                state TEXT NOT NULL,
                details TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                description TEXT
            );",
        )?;

        for (key, value, description) in DEFAULT_SETTINGS {
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, value, description) VALUES (?1, ?2, ?3)",
                params![key, value, description],
            )?;
        }

        debug!("store schema ready, defaults seeded");
        Ok(())
    }

    fn begin_tick(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_tick(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_tick(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn list_enabled_nvrs(&self) -> Result<Vec<Nvr>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT ip, user, password, enabled FROM nvrs WHERE enabled = 1 ORDER BY ip",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Nvr {
                    ip: row.get(0)?,
                    user: row.get(1)?,
                    password: row.get(2)?,
                    enabled: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn get_camera_by_channel(&self, nvr_ip: &str, channel_id: &str) -> Result<Option<Camera>> {
        let conn = self.conn.lock();
        let camera = conn
            .query_row(
                "SELECT id, name, ip, nvr_ip, channel_id, is_muted, importance, last_online,
                        status, mail_alert_count, mail_last_alert, telegram_alert_count, telegram_last_alert
                 FROM cameras WHERE nvr_ip = ?1 AND channel_id = ?2",
                params![nvr_ip, channel_id],
                Self::row_to_camera,
            )
            .optional()?;
        Ok(camera)
    }

    fn insert_camera(&self, camera: NewCamera) -> Result<Camera> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cameras (name, ip, nvr_ip, channel_id, status, last_online)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                camera.name,
                camera.ip,
                camera.nvr_ip,
                camera.channel_id,
                camera.status.as_str(),
                camera.last_online,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, name, ip, nvr_ip, channel_id, is_muted, importance, last_online,
                    status, mail_alert_count, mail_last_alert, telegram_alert_count, telegram_last_alert
             FROM cameras WHERE id = ?1",
            params![id],
            Self::row_to_camera,
        )
        .map_err(Into::into)
    }

    fn update_camera(&self, camera: &Camera) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cameras SET name = ?1, ip = ?2, last_online = ?3, status = ?4,
                mail_alert_count = ?5, mail_last_alert = ?6,
                telegram_alert_count = ?7, telegram_last_alert = ?8
             WHERE id = ?9",
            params![
                camera.name,
                camera.ip,
                camera.last_online,
                camera.status.as_str(),
                camera.mail_alert_count,
                camera.mail_last_alert,
                camera.telegram_alert_count,
                camera.telegram_last_alert,
                camera.id,
            ],
        )?;
        Ok(())
    }

    fn open_downtime_event(&self, camera_id: i64, start_time: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO downtime_events (camera_id, start_time, end_time) VALUES (?1, ?2, NULL)",
            params![camera_id, start_time],
        )?;
        Ok(())
    }

    fn close_open_downtime_event(&self, camera_id: i64, end_time: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE downtime_events SET end_time = ?1
             WHERE camera_id = ?2 AND end_time IS NULL",
            params![end_time, camera_id],
        )?;
        Ok(())
    }

    fn append_log(&self, log_type: LogType, state: &str, details: &str) -> Result<()> {
        let conn = self.log_conn.lock();
        conn.execute(
            "INSERT INTO logs (timestamp, log_type, state, details) VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now(), log_type.as_str(), state, details],
        )?;
        Ok(())
    }

    fn get_settings(&self) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn downtime_overlap_minutes(
        &self,
        camera_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT start_time, end_time FROM downtime_events
             WHERE camera_id = ?1 AND start_time < ?2 AND (end_time IS NULL OR end_time > ?3)",
        )?;
        let now = Utc::now();
        let rows: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = stmt
            .query_map(params![camera_id, end, start], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut total_minutes: i64 = 0;
        for (event_start, event_end) in rows {
            let event_end = event_end.unwrap_or(now);
            let overlap_start = event_start.max(start);
            let overlap_end = event_end.min(end);
            if overlap_end > overlap_start {
                total_minutes += (overlap_end - overlap_start).num_minutes();
            }
        }
        Ok(total_minutes)
    }

    fn list_cameras(&self) -> Result<Vec<Camera>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, ip, nvr_ip, channel_id, is_muted, importance, last_online,
                    status, mail_alert_count, mail_last_alert, telegram_alert_count, telegram_last_alert
             FROM cameras ORDER BY nvr_ip, channel_id",
        )?;
        let rows = stmt.query_map([], Self::row_to_camera)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn list_open_downtime_events(&self) -> Result<Vec<DowntimeEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, camera_id, start_time, end_time FROM downtime_events WHERE end_time IS NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DowntimeEvent {
                    id: row.get(0)?,
                    camera_id: row.get(1)?,
                    start_time: row.get(2)?,
                    end_time: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_repo() -> SqliteRepository {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.init().unwrap();
        repo
    }

    #[test]
    fn seeds_defaults_once_and_preserves_edits() {
        let repo = new_repo();
        let settings = repo.get_settings().unwrap();
        assert_eq!(settings.get("MAIL_ENABLED").map(String::as_str), Some("false"));

        repo.put_setting("MAIL_ENABLED", "true").unwrap();
        repo.init().unwrap(); // re-seeding must not clobber the edit
        let settings = repo.get_settings().unwrap();
        assert_eq!(settings.get("MAIL_ENABLED").map(String::as_str), Some("true"));
    }

    #[test]
    fn insert_then_lookup_camera() {
        let repo = new_repo();
        let cam = repo
            .insert_camera(NewCamera {
                name: "Ch 1".into(),
                ip: "10.0.0.5".into(),
                nvr_ip: "10.0.0.1".into(),
                channel_id: "1".into(),
                status: CameraStatus::Online,
                last_online: Some(Utc::now()),
            })
            .unwrap();
        assert!(cam.id > 0);

        let found = repo.get_camera_by_channel("10.0.0.1", "1").unwrap().unwrap();
        assert_eq!(found.id, cam.id);
        assert_eq!(found.status, CameraStatus::Online);
        assert!(!found.is_muted);
        assert_eq!(found.importance, Importance::Normal);
    }

    #[test]
    fn downtime_event_lifecycle_and_overlap_query() {
        let repo = new_repo();
        let cam = repo
            .insert_camera(NewCamera {
                name: "Ch 1".into(),
                ip: "10.0.0.5".into(),
                nvr_ip: "10.0.0.1".into(),
                channel_id: "1".into(),
                status: CameraStatus::Offline,
                last_online: None,
            })
            .unwrap();

        let t0 = Utc::now() - Duration::hours(1);
        repo.open_downtime_event(cam.id, t0).unwrap();
        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 1);

        let t1 = t0 + Duration::minutes(20);
        repo.close_open_downtime_event(cam.id, t1).unwrap();
        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 0);

        let overlap = repo
            .downtime_overlap_minutes(cam.id, t0, t0 + Duration::minutes(60))
            .unwrap();
        assert_eq!(overlap, 20);
    }

    #[test]
    fn closing_with_no_open_event_is_a_no_op() {
        let repo = new_repo();
        // Closing an event for a camera with none open must not error.
        repo.close_open_downtime_event(42, Utc::now()).unwrap();
    }
}
