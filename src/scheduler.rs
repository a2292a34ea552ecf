// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Alert Scheduler (C5): decides, per reconciled camera, whether an outage or
//! recovery notification is due on each sink, and advances the per-camera
//! counters accordingly.

use chrono::{DateTime, Utc};

use crate::models::{Camera, CameraStatus, Importance};
use crate::settings::SinkSettings;

/// Batched output of one scheduling pass, ready to hand to the dispatcher.
#[derive(Debug, Default)]
pub struct AlertBatches {
    pub telegram_alerts: Vec<String>,
    pub mail_alerts: Vec<String>,
    pub telegram_recoveries: Vec<String>,
    pub mail_recoveries: Vec<String>,
}

/// Evaluate the alert gate for every camera in `cameras`, mutating each
/// camera's counters in place and returning the batches to dispatch.
///
/// `cameras` must already reflect this tick's reconciliation (C4) output.
/// The caller is responsible for persisting the mutated counters via
/// [`crate::store::Repository::update_camera`].
pub fn schedule_alerts(
    cameras: &mut [Camera],
    mail: SinkSettings,
    telegram: SinkSettings,
    now: DateTime<Utc>,
) -> AlertBatches {
    let mut batches = AlertBatches::default();

    for camera in cameras.iter_mut() {
        match camera.status {
            CameraStatus::Online => {
                if camera.telegram_alert_count > 0 {
                    batches.telegram_recoveries.push(format!("✅ {} is back Online", camera.name));
                    camera.telegram_alert_count = 0;
                }
                if camera.mail_alert_count > 0 {
                    batches.mail_recoveries.push(format!("{} is back Online", camera.name));
                    camera.mail_alert_count = 0;
                }
            }
            CameraStatus::Offline => {
                let last_online = camera.last_online.unwrap_or(now);
                let downtime_min = (now - last_online).num_seconds() / 60;

                if let Some(line) = gate(
                    telegram,
                    camera.telegram_alert_count,
                    camera.telegram_last_alert,
                    camera.importance,
                    downtime_min,
                    now,
                    |downtime, muted| {
                        let marker = if muted { " 🔕(Muted)" } else { "" };
                        format!("🚨 {} ({}m){}", camera.name, downtime, marker)
                    },
                ) {
                    batches.telegram_alerts.push(line);
                    camera.telegram_alert_count += 1;
                    camera.telegram_last_alert = Some(now);
                }

                if let Some(line) = gate(
                    mail,
                    camera.mail_alert_count,
                    camera.mail_last_alert,
                    camera.importance,
                    downtime_min,
                    now,
                    |downtime, muted| {
                        let marker = if muted { " <b>(Alerts Muted)</b>" } else { "" };
                        format!("{} is offline for {} mins{}", camera.name, downtime, marker)
                    },
                ) {
                    batches.mail_alerts.push(line);
                    camera.mail_alert_count += 1;
                    camera.mail_last_alert = Some(now);
                }
            }
            CameraStatus::Unknown => {}
        }
    }

    batches
}

/// Shared gating logic for one sink: returns the message line to send, if
/// the send threshold is met, without mutating any state itself.
fn gate(
    sink: SinkSettings,
    count: i64,
    last_alert: Option<DateTime<Utc>>,
    importance: Importance,
    downtime_min: i64,
    now: DateTime<Utc>,
    render: impl FnOnce(i64, bool) -> String,
) -> Option<String> {
    if count >= sink.mute_after_n_alerts {
        return None;
    }

    let should_send = if count == 0 {
        let threshold = if importance == Importance::Low {
            sink.alert_frequency_minutes
        } else {
            sink.first_alert_delay_minutes
        };
        downtime_min >= threshold
    } else {
        let last = last_alert.unwrap_or(now);
        (now - last).num_seconds() / 60 >= sink.alert_frequency_minutes
    };

    if !should_send {
        return None;
    }

    let muted = count + 1 >= sink.mute_after_n_alerts;
    Some(render(downtime_min, muted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sink(delay: i64, freq: i64, mute: i64) -> SinkSettings {
        SinkSettings { enabled: true, first_alert_delay_minutes: delay, alert_frequency_minutes: freq, mute_after_n_alerts: mute }
    }

    fn offline_camera(importance: Importance, minutes_offline: i64, now: DateTime<Utc>) -> Camera {
        Camera {
            id: 1,
            name: "Lobby".into(),
            ip: "10.0.0.5".into(),
            nvr_ip: "10.0.0.1".into(),
            channel_id: "1".into(),
            is_muted: false,
            importance,
            last_online: Some(now - Duration::minutes(minutes_offline)),
            status: CameraStatus::Offline,
            mail_alert_count: 0,
            mail_last_alert: None,
            telegram_alert_count: 0,
            telegram_last_alert: None,
        }
    }

    #[test]
    fn scenario_1_outage_and_recovery_normal_importance() {
        let chat = sink(1, 5, 3);
        let mail = sink(1, 5, 3); // mail disabled by enablement elsewhere; gating math identical
        let now0 = Utc::now();

        // t=1: downtime 1m >= delay 1 -> first alert
        let mut cams = vec![offline_camera(Importance::Normal, 1, now0)];
        let batches = schedule_alerts(&mut cams, mail, chat, now0);
        assert_eq!(batches.telegram_alerts, vec!["🚨 Lobby (1m)"]);
        assert_eq!(cams[0].telegram_alert_count, 1);

        // t=6: 5 minutes since last alert (freq=5) -> second alert
        cams[0].last_online = Some(now0 - Duration::minutes(6));
        let now1 = now0 + Duration::minutes(5);
        let batches = schedule_alerts(&mut cams, mail, chat, now1);
        assert_eq!(batches.telegram_alerts, vec!["🚨 Lobby (6m)"]);
        assert_eq!(cams[0].telegram_alert_count, 2);

        // t=11: third alert reaches mute=3 -> muted marker, then capped
        cams[0].last_online = Some(now0 - Duration::minutes(11));
        let now2 = now0 + Duration::minutes(10);
        let batches = schedule_alerts(&mut cams, mail, chat, now2);
        assert_eq!(batches.telegram_alerts, vec!["🚨 Lobby (11m) 🔕(Muted)"]);
        assert_eq!(cams[0].telegram_alert_count, 3);

        // further ticks produce no more alerts
        cams[0].last_online = Some(now0 - Duration::minutes(16));
        let now3 = now0 + Duration::minutes(15);
        let batches = schedule_alerts(&mut cams, mail, chat, now3);
        assert!(batches.telegram_alerts.is_empty());

        // recovery resets the counter and emits a recovery line
        cams[0].status = CameraStatus::Online;
        let batches = schedule_alerts(&mut cams, mail, chat, now3);
        assert_eq!(batches.telegram_recoveries, vec!["✅ Lobby is back Online"]);
        assert_eq!(cams[0].telegram_alert_count, 0);
    }

    #[test]
    fn scenario_2_low_importance_skips_delay_waits_full_frequency() {
        let chat = sink(1, 5, 3);
        let now0 = Utc::now();

        let mut cams = vec![offline_camera(Importance::Low, 1, now0)];
        let batches = schedule_alerts(&mut cams, chat, chat, now0);
        assert!(batches.telegram_alerts.is_empty(), "low importance must not alert before freq minutes");

        cams[0].last_online = Some(now0 - Duration::minutes(5));
        let batches = schedule_alerts(&mut cams, chat, chat, now0);
        assert_eq!(batches.telegram_alerts, vec!["🚨 Lobby (5m)"]);
    }

    #[test]
    fn counter_never_exceeds_mute_cap() {
        let chat = sink(1, 1, 2);
        let now0 = Utc::now();
        let mut cams = vec![offline_camera(Importance::Normal, 100, now0)];

        for _ in 0..5 {
            let _ = schedule_alerts(&mut cams, chat, chat, now0);
            assert!(cams[0].telegram_alert_count <= chat.mute_after_n_alerts);
        }
        assert_eq!(cams[0].telegram_alert_count, 2);
    }

    #[test]
    fn null_last_online_treats_downtime_as_zero() {
        let chat = sink(1, 5, 3);
        let now0 = Utc::now();
        let mut cam = offline_camera(Importance::Normal, 0, now0);
        cam.last_online = None;
        let mut cams = vec![cam];
        let batches = schedule_alerts(&mut cams, chat, chat, now0);
        assert!(batches.telegram_alerts.is_empty());
    }
}
