// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Domain entities shared by the store, reconciler, and scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A network video recorder fronting one or more cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nvr {
    pub ip: String,
    pub user: String,
    pub password: Option<String>,
    pub enabled: bool,
}

/// Reported liveness of a camera channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraStatus {
    Online,
    Offline,
    Unknown,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Online => "Online",
            CameraStatus::Offline => "Offline",
            CameraStatus::Unknown => "Unknown",
        }
    }

    pub fn from_bool(online: bool) -> Self {
        if online { CameraStatus::Online } else { CameraStatus::Offline }
    }
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CameraStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Online" => Ok(CameraStatus::Online),
            "Offline" => Ok(CameraStatus::Offline),
            "Unknown" => Ok(CameraStatus::Unknown),
            other => Err(format!("unrecognized camera status '{other}'")),
        }
    }
}

/// Per-camera severity class, controlling the scheduler's first-alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum Importance {
    Low = 1,
    Normal = 2,
    High = 3,
}

impl Importance {
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Importance::Low,
            3 => Importance::High,
            _ => Importance::Normal,
        }
    }
}

/// A monitored camera channel, identified by `(nvr_ip, channel_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub nvr_ip: String,
    pub channel_id: String,
    /// Reserved for the admin surface; never consulted by the scheduler or reconciler.
    pub is_muted: bool,
    pub importance: Importance,
    pub last_online: Option<DateTime<Utc>>,
    pub status: CameraStatus,
    pub mail_alert_count: i64,
    pub mail_last_alert: Option<DateTime<Utc>>,
    pub telegram_alert_count: i64,
    pub telegram_last_alert: Option<DateTime<Utc>>,
}

/// A newly observed camera, not yet assigned a surrogate id.
#[derive(Debug, Clone)]
pub struct NewCamera {
    pub name: String,
    pub ip: String,
    pub nvr_ip: String,
    pub channel_id: String,
    pub status: CameraStatus,
    pub last_online: Option<DateTime<Utc>>,
}

/// A contiguous interval during which a camera was reported Offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowntimeEvent {
    pub id: i64,
    pub camera_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    Camera,
    Mail,
    Telegram,
    Service,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Camera => "Camera",
            LogType::Mail => "Mail",
            LogType::Telegram => "Telegram",
            LogType::Service => "Service",
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub log_type: LogType,
    pub state: String,
    pub details: String,
}

/// A `key -> value` tunable, with an optional human-readable description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}
