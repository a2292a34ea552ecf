// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Repository contract for the monitoring engine (spec C4/C5/C7's store dependency).

pub mod sqlite;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Camera, DowntimeEvent, LogType, NewCamera, Nvr};

/// The seeded default settings, `(key, value, description)`. Only inserted when
/// the key is absent — an operator-edited value is never overwritten.
pub const DEFAULT_SETTINGS: &[(&str, &str, &str)] = &[
    ("MAIL_ENABLED", "false", "Enable Email"),
    ("MAIL_SERVER", "smtp.gmail.com", "Server"),
    ("MAIL_PORT", "587", "Port"),
    ("MAIL_USER", "email@gmail.com", "User"),
    ("MAIL_PASS", "password", "Pass"),
    ("MAIL_RECIPIENTS", "admin@example.com", "Recipients"),
    ("MAIL_FIRST_ALERT_DELAY_MINUTES", "1", "Normal Delay"),
    ("MAIL_LOW_IMPORTANCE_DELAY_MINUTES", "30", "Low Imp. Delay"),
    ("MAIL_ALERT_FREQUENCY_MINUTES", "60", "Frequency"),
    ("MAIL_MUTE_AFTER_N_ALERTS", "3", "Mute After N"),
    ("TELEGRAM_ENABLED", "false", "Enable Telegram"),
    ("TELEGRAM_BOT_TOKEN", "", "Bot Token"),
    ("TELEGRAM_CHAT_IDS", "", "Chat IDs"),
    ("TELEGRAM_PROXY", "", "Proxy URL"),
    ("TELEGRAM_FIRST_ALERT_DELAY_MINUTES", "1", "Normal Delay"),
    ("TELEGRAM_LOW_IMPORTANCE_DELAY_MINUTES", "15", "Low Imp. Delay"),
    ("TELEGRAM_ALERT_FREQUENCY_MINUTES", "30", "Frequency"),
    ("TELEGRAM_MUTE_AFTER_N_ALERTS", "3", "Mute After N"),
];

/// Persistence contract consumed by the reconciler, scheduler, and periodic loop.
///
/// Implementations are accessed exclusively from the single long-lived engine
/// task; they need not support concurrent writers.
pub trait Repository: Send {
    /// Create the schema if absent and seed any missing default settings.
    fn init(&self) -> Result<()>;

    /// Open the transactional scope a tick's C4 (reconciler) and C5
    /// (scheduler) writes run inside, so a camera's identity/status fields
    /// and its DowntimeEvent rows commit together. `append_log` is
    /// unaffected by this scope — it always commits independently so the
    /// audit trail survives a later failure in the same tick.
    fn begin_tick(&self) -> Result<()>;

    /// Commit the scope opened by [`Repository::begin_tick`].
    fn commit_tick(&self) -> Result<()>;

    /// Roll back the scope opened by [`Repository::begin_tick`], discarding
    /// any camera/downtime-event writes made since.
    fn rollback_tick(&self) -> Result<()>;

    fn list_enabled_nvrs(&self) -> Result<Vec<Nvr>>;

    fn get_camera_by_channel(&self, nvr_ip: &str, channel_id: &str) -> Result<Option<Camera>>;

    /// Insert a newly observed camera and return it with its assigned id.
    fn insert_camera(&self, camera: NewCamera) -> Result<Camera>;

    /// Persist all mutable fields of an existing camera row.
    fn update_camera(&self, camera: &Camera) -> Result<()>;

    /// Open a new DowntimeEvent for `camera_id` starting at `start_time`.
    fn open_downtime_event(&self, camera_id: i64, start_time: DateTime<Utc>) -> Result<()>;

    /// Close the currently-open DowntimeEvent for `camera_id`, if any. A no-op
    /// (not an error) when no event is open.
    fn close_open_downtime_event(&self, camera_id: i64, end_time: DateTime<Utc>) -> Result<()>;

    /// Append an audit-trail row. Flushed independently of the surrounding
    /// reconciliation so it survives a later failure in the same tick.
    fn append_log(&self, log_type: LogType, state: &str, details: &str) -> Result<()>;

    /// Current settings as a flat `key -> value` map.
    fn get_settings(&self) -> Result<HashMap<String, String>>;

    fn put_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Sum, in whole minutes, of the overlap between `[start, end]` and every
    /// DowntimeEvent recorded for `camera_id`.
    fn downtime_overlap_minutes(
        &self,
        camera_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    /// All cameras, ordered by `(nvr_ip, channel_id)` — used by reporting and
    /// the hourly summary's "still offline" pass.
    fn list_cameras(&self) -> Result<Vec<Camera>>;

    fn list_open_downtime_events(&self) -> Result<Vec<DowntimeEvent>>;
}
