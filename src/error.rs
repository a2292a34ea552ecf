// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("NVR '{ip}' poll failed: {reason}")]
    NvrPoll { ip: String, reason: String },

    #[error("Malformed NVR response from '{ip}': {reason}")]
    NvrResponse { ip: String, reason: String },

    #[error("Email dispatch failed: {0}")]
    Mail(String),

    #[error("Telegram dispatch failed: {0}")]
    Telegram(String),

    #[error("Camera '{nvr_ip}'/{channel_id} not found")]
    CameraNotFound { nvr_ip: String, channel_id: String },
}

pub type Result<T> = std::result::Result<T, MonitorError>;
