// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! State Reconciler (C4): upserts camera rows, detects status transitions,
//! and opens/closes downtime intervals.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;
use crate::models::{Camera, CameraStatus, LogType, NewCamera};
use crate::names::NameMap;
use crate::nvr_client::ChannelStatus;
use crate::store::Repository;

/// Reconcile one polled channel against the store, returning the camera's
/// post-reconciliation state.
pub fn reconcile_channel(
    repo: &dyn Repository,
    nvr_ip: &str,
    channel: &ChannelStatus,
    names: &NameMap,
    now: DateTime<Utc>,
) -> Result<Camera> {
    let new_status = CameraStatus::from_bool(channel.online);
    let final_name = names
        .get(&channel.camera_ip)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Ch {}", channel.channel_id));

    match repo.get_camera_by_channel(nvr_ip, &channel.channel_id)? {
        None => {
            let last_online = if channel.online { Some(now) } else { None };
            let camera = repo.insert_camera(NewCamera {
                name: final_name,
                ip: channel.camera_ip.clone(),
                nvr_ip: nvr_ip.to_string(),
                channel_id: channel.channel_id.clone(),
                status: new_status,
                last_online,
            })?;
            if new_status == CameraStatus::Offline {
                repo.open_downtime_event(camera.id, now)?;
            }
            Ok(camera)
        }
        Some(mut camera) => {
            let csv_provided = names.get(&channel.camera_ip).is_some();
            if csv_provided && camera.name != final_name {
                camera.name = final_name;
            }
            if camera.ip != channel.camera_ip {
                camera.ip = channel.camera_ip.clone();
            }

            if camera.status != new_status {
                repo.append_log(
                    LogType::Camera,
                    new_status.as_str(),
                    &format!("{} ({})", camera.name, camera.ip),
                )?;
                info!(camera = %camera.name, ip = %camera.ip, status = %new_status, "camera status transition");
                camera.status = new_status;
                match new_status {
                    CameraStatus::Offline => repo.open_downtime_event(camera.id, now)?,
                    CameraStatus::Online => repo.close_open_downtime_event(camera.id, now)?,
                    CameraStatus::Unknown => {}
                }
            }

            if channel.online {
                camera.last_online = Some(now);
            }

            repo.update_camera(&camera)?;
            Ok(camera)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteRepository;
    use std::collections::HashMap as Map;

    fn repo() -> SqliteRepository {
        let r = SqliteRepository::open_in_memory().unwrap();
        r.init().unwrap();
        r
    }

    #[test]
    fn first_sighting_offline_opens_downtime_event() {
        let repo = repo();
        let empty = crate::names::load_csv_names(std::path::Path::new("/nonexistent.csv"));
        let channel = ChannelStatus { channel_id: "1".into(), camera_ip: "10.0.0.5".into(), online: false };
        let now = Utc::now();

        let camera = reconcile_channel(&repo, "10.0.0.1", &channel, &empty, now).unwrap();
        assert_eq!(camera.status, CameraStatus::Offline);
        assert_eq!(camera.name, "Ch 1");
        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 1);
    }

    #[test]
    fn first_sighting_online_sets_last_online_no_event() {
        let repo = repo();
        let empty = crate::names::load_csv_names(std::path::Path::new("/nonexistent.csv"));
        let channel = ChannelStatus { channel_id: "1".into(), camera_ip: "10.0.0.5".into(), online: true };
        let now = Utc::now();

        let camera = reconcile_channel(&repo, "10.0.0.1", &channel, &empty, now).unwrap();
        assert_eq!(camera.status, CameraStatus::Online);
        assert_eq!(camera.last_online, Some(now));
        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 0);
    }

    #[test]
    fn transition_to_online_closes_open_event_and_resets_nothing_else() {
        let repo = repo();
        let empty = crate::names::load_csv_names(std::path::Path::new("/nonexistent.csv"));
        let t0 = Utc::now();
        let offline = ChannelStatus { channel_id: "1".into(), camera_ip: "10.0.0.5".into(), online: false };
        reconcile_channel(&repo, "10.0.0.1", &offline, &empty, t0).unwrap();
        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 1);

        let t1 = t0 + chrono::Duration::minutes(20);
        let online = ChannelStatus { channel_id: "1".into(), camera_ip: "10.0.0.5".into(), online: true };
        let camera = reconcile_channel(&repo, "10.0.0.1", &online, &empty, t1).unwrap();
        assert_eq!(camera.status, CameraStatus::Online);
        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 0);
    }

    #[test]
    fn repeated_identical_payload_is_idempotent() {
        let repo = repo();
        let empty = crate::names::load_csv_names(std::path::Path::new("/nonexistent.csv"));
        let channel = ChannelStatus { channel_id: "1".into(), camera_ip: "10.0.0.5".into(), online: false };
        let t0 = Utc::now();
        reconcile_channel(&repo, "10.0.0.1", &channel, &empty, t0).unwrap();
        let t1 = t0 + chrono::Duration::minutes(1);
        reconcile_channel(&repo, "10.0.0.1", &channel, &empty, t1).unwrap();

        assert_eq!(repo.list_open_downtime_events().unwrap().len(), 1);
        assert_eq!(repo.list_cameras().unwrap().len(), 1);
    }

    #[test]
    fn csv_rename_updates_name_without_status_log() {
        let repo = repo();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera_names.csv");
        std::fs::write(&path, "ip,name\n10.0.0.5,Ch 7\n").unwrap();
        let names_v1 = crate::names::load_csv_names(&path);

        let channel = ChannelStatus { channel_id: "7".into(), camera_ip: "10.0.0.5".into(), online: true };
        let t0 = Utc::now();
        let camera = reconcile_channel(&repo, "10.0.0.1", &channel, &names_v1, t0).unwrap();
        assert_eq!(camera.name, "Ch 7");

        std::fs::write(&path, "ip,name\n10.0.0.5,Lobby\n").unwrap();
        let names_v2 = crate::names::load_csv_names(&path);
        let t1 = t0 + chrono::Duration::minutes(1);
        let camera = reconcile_channel(&repo, "10.0.0.1", &channel, &names_v2, t1).unwrap();
        assert_eq!(camera.name, "Lobby");
    }
}
