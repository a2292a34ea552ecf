// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Periodic Loop (C7): drives the one-minute tick, sequences the settings
//! provider, name resolver, NVR client, state reconciler, alert scheduler and
//! notification dispatcher, and emits the top-of-hour downtime summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::dispatcher::{self, DispatchOutcome};
use crate::error::Result;
use crate::models::{Camera, CameraStatus, LogType, Nvr};
use crate::names::{self, NameMap};
use crate::nvr_client::{ChannelStatus, NvrClient, PollOutcome};
use crate::reconciler;
use crate::scheduler::{self, AlertBatches};
use crate::settings::EngineSettings;
use crate::store::Repository;

/// What the loop should do after a tick, independent of whether it succeeded.
enum TickOutcome {
    /// No enabled NVRs were configured; back off briefly.
    NoNvrs,
    /// The tick ran to completion (possibly with some NVRs failing).
    Completed,
}

/// The long-lived worker described in §4.6/§9: owns no process-wide state
/// beyond its repository handle, and is stopped cooperatively via a
/// [`CancellationToken`] rather than being killed from outside.
pub struct Engine {
    repo: Arc<dyn Repository>,
    nvr_client: NvrClient,
    names_path: PathBuf,
    config: EngineConfig,
}

impl Engine {
    pub fn new(repo: Arc<dyn Repository>, names_path: PathBuf, config: EngineConfig) -> Self {
        let nvr_client = NvrClient::new(Duration::from_secs(config.poll_timeout_secs));
        Self { repo, nvr_client, names_path, config }
    }

    /// Run ticks until `cancel` is triggered. Cancellation is cooperative: it
    /// takes effect at the next suspension point (the inter-tick sleep), and
    /// an in-flight tick is allowed to finish its reconciliation.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.repo.append_log(LogType::Service, "Started", "Monitor loop initialized") {
            warn!(error = %e, "failed to write startup log");
        }
        info!("nvr-monitor engine started");

        let mut last_summary_hour: Option<u32> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let sleep_for = match self.run_tick(&mut last_summary_hour).await {
                Ok(TickOutcome::NoNvrs) => Duration::from_secs(self.config.empty_sleep_secs),
                Ok(TickOutcome::Completed) => Duration::from_secs(self.config.tick_secs),
                Err(e) => {
                    error!(error = %e, "tick failed, backing off");
                    Duration::from_secs(self.config.error_sleep_secs)
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(sleep_for) => {}
            }
        }

        if let Err(e) = self.repo.append_log(LogType::Service, "Stopped", "Monitor loop cancelled") {
            warn!(error = %e, "failed to write shutdown log");
        }
        info!("nvr-monitor engine stopped");
    }

    /// Run a single tick once, useful for tests and a `--once` CLI mode.
    pub async fn run_once(&self) -> Result<()> {
        let mut last_summary_hour = None;
        self.run_tick(&mut last_summary_hour).await.map(|_| ())
    }

    async fn run_tick(&self, last_summary_hour: &mut Option<u32>) -> Result<TickOutcome> {
        let names = names::load_csv_names(&self.names_path);

        let nvrs = self.repo.list_enabled_nvrs()?;
        if nvrs.is_empty() {
            return Ok(TickOutcome::NoNvrs);
        }

        let mut polls = JoinSet::new();
        for nvr in nvrs {
            let client = self.nvr_client.clone();
            polls.spawn(async move {
                let outcome = client.poll(&nvr).await;
                (nvr, outcome)
            });
        }

        let now = Utc::now();
        let mut online_polls: Vec<(Nvr, Vec<ChannelStatus>)> = Vec::new();

        // Failed-poll logs are written as they're observed, independently of
        // the reconciliation transaction below: they record what the engine
        // saw, not a camera/downtime-event state change, so there's nothing
        // for them to roll back with.
        while let Some(joined) = polls.join_next().await {
            let (nvr, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "NVR poll task panicked");
                    continue;
                }
            };
            match outcome {
                PollOutcome::Fail(reason) => {
                    self.repo.append_log(
                        LogType::Camera,
                        "Error",
                        &format!("NVR {} Failed: {reason}", nvr.ip),
                    )?;
                }
                PollOutcome::Ok(channels) => online_polls.push((nvr, channels)),
            }
        }

        let settings = EngineSettings::parse(&self.repo.get_settings()?);
        let (reconciled, batches) = self.reconcile_and_schedule(&online_polls, &names, now, &settings)?;

        self.dispatch_batches(&settings, &batches).await?;
        self.maybe_send_hourly_summary(&settings, &reconciled, now, last_summary_hour).await?;

        Ok(TickOutcome::Completed)
    }

    /// C4 (reconciler) and C5 (scheduler persistence) run inside one
    /// `Repository::begin_tick`/`commit_tick` scope, so a camera's row and
    /// its DowntimeEvent rows land together or not at all. A failure partway
    /// through rolls everything in the scope back rather than leaving, say,
    /// a Camera marked Offline with no open DowntimeEvent to match it.
    fn reconcile_and_schedule(
        &self,
        polls: &[(Nvr, Vec<ChannelStatus>)],
        names: &NameMap,
        now: DateTime<Utc>,
        settings: &EngineSettings,
    ) -> Result<(Vec<Camera>, AlertBatches)> {
        self.repo.begin_tick()?;
        match self.reconcile_and_schedule_inner(polls, names, now, settings) {
            Ok(result) => {
                self.repo.commit_tick()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = self.repo.rollback_tick() {
                    error!(error = %rollback_err, "failed to roll back tick transaction");
                }
                Err(e)
            }
        }
    }

    fn reconcile_and_schedule_inner(
        &self,
        polls: &[(Nvr, Vec<ChannelStatus>)],
        names: &NameMap,
        now: DateTime<Utc>,
        settings: &EngineSettings,
    ) -> Result<(Vec<Camera>, AlertBatches)> {
        let mut reconciled: Vec<Camera> = Vec::new();
        for (nvr, channels) in polls {
            for channel in channels {
                let camera = reconciler::reconcile_channel(self.repo.as_ref(), &nvr.ip, channel, names, now)?;
                reconciled.push(camera);
            }
        }

        let batches = scheduler::schedule_alerts(&mut reconciled, settings.mail, settings.telegram, now);
        for camera in &reconciled {
            self.repo.update_camera(camera)?;
        }

        Ok((reconciled, batches))
    }

    async fn dispatch_batches(&self, settings: &EngineSettings, batches: &AlertBatches) -> Result<()> {
        let telegram_http = dispatcher::build_telegram_client(settings.telegram_proxy.as_deref());

        let telegram_timeout = Duration::from_secs(self.config.telegram_timeout_secs);

        if !batches.telegram_alerts.is_empty() {
            let outcome = dispatcher::send_telegram_batch(
                &telegram_http,
                settings,
                telegram_timeout,
                "⚠️ Cameras Offline",
                &batches.telegram_alerts,
            )
            .await;
            self.log_dispatch_outcome(LogType::Telegram, outcome, batches.telegram_alerts.len())?;
        }
        if !batches.telegram_recoveries.is_empty() {
            let outcome = dispatcher::send_telegram_batch(
                &telegram_http,
                settings,
                telegram_timeout,
                "✅ Cameras Recovered",
                &batches.telegram_recoveries,
            )
            .await;
            self.log_dispatch_outcome(LogType::Telegram, outcome, batches.telegram_recoveries.len())?;
        }

        if !batches.mail_alerts.is_empty() {
            let outcome = self.dispatch_mail_batch(settings, "⚠️ Cameras Offline Alert", &batches.mail_alerts).await;
            self.log_dispatch_outcome(LogType::Mail, outcome, batches.mail_alerts.len())?;
        }
        if !batches.mail_recoveries.is_empty() {
            let outcome = self.dispatch_mail_batch(settings, "✅ Cameras Recovered", &batches.mail_recoveries).await;
            self.log_dispatch_outcome(LogType::Mail, outcome, batches.mail_recoveries.len())?;
        }

        Ok(())
    }

    /// SMTP send is blocking (lettre's `SmtpTransport`); run it off the async
    /// worker thread so a slow mail server can't stall NVR polling ticks.
    async fn dispatch_mail_batch(&self, settings: &EngineSettings, subject: &str, lines: &[String]) -> DispatchOutcome {
        let settings = settings.clone();
        let subject = subject.to_string();
        let lines = lines.to_vec();
        tokio::task::spawn_blocking(move || dispatcher::send_mail_batch(&settings, &subject, &lines))
            .await
            .unwrap_or_else(|e| DispatchOutcome::Failed { reason: format!("mail task panicked: {e}") })
    }

    fn log_dispatch_outcome(&self, log_type: LogType, outcome: DispatchOutcome, count: usize) -> Result<()> {
        match outcome {
            DispatchOutcome::Sent { .. } => {
                self.repo.append_log(log_type, "Sent", &format!("Sent {count} alerts"))
            }
            DispatchOutcome::Failed { reason } => self.repo.append_log(log_type, "Failed", &reason),
            DispatchOutcome::Skipped => Ok(()),
        }
    }

    /// §4.6 step 5: at minute 0 of an hour not yet summarised, report every
    /// camera still Offline, with minutes counted from `max(hour_start,
    /// last_online)`.
    async fn maybe_send_hourly_summary(
        &self,
        settings: &EngineSettings,
        reconciled: &[Camera],
        now: DateTime<Utc>,
        last_summary_hour: &mut Option<u32>,
    ) -> Result<()> {
        if now.minute() != 0 || *last_summary_hour == Some(now.hour()) {
            return Ok(());
        }

        let hour_start = now
            .date_naive()
            .and_hms_opt(now.hour(), 0, 0)
            .expect("hour 0-23 is always a valid time-of-day")
            .and_utc();

        let mut lines = Vec::new();
        for camera in reconciled {
            if camera.status != CameraStatus::Offline {
                continue;
            }
            let offline_since = camera.last_online.unwrap_or(now);
            let overlap_start = hour_start.max(offline_since);
            let minutes_down = (now - overlap_start).num_seconds() / 60;
            if minutes_down > 0 {
                lines.push(format!("{}: {minutes_down}m", camera.name));
            }
        }

        if !lines.is_empty() {
            let header = format!("📊 Hourly Downtime Summary ({:02}:00)", now.hour());
            let telegram_http = dispatcher::build_telegram_client(settings.telegram_proxy.as_deref());
            let timeout = Duration::from_secs(self.config.telegram_timeout_secs);
            let _ = dispatcher::send_telegram_batch(&telegram_http, settings, timeout, &header, &lines).await;
            self.repo.append_log(LogType::Telegram, "Sent", "Hourly Summary")?;
        }

        *last_summary_hour = Some(now.hour());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CameraStatus, NewCamera};
    use crate::store::sqlite::SqliteRepository;
    use chrono::Duration as ChronoDuration;

    fn engine_with_repo(repo: Arc<dyn Repository>) -> Engine {
        Engine::new(repo, PathBuf::from("/nonexistent/camera_names.csv"), EngineConfig::default())
    }

    #[tokio::test]
    async fn empty_nvr_list_is_a_no_op() {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        repo.init().unwrap();
        let engine = engine_with_repo(repo);
        engine.run_once().await.unwrap();
    }

    #[tokio::test]
    async fn hourly_summary_reports_minutes_since_hour_start_or_last_online() {
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
        repo.init().unwrap();
        let engine = engine_with_repo(repo.clone());

        let now = Utc::now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let settings = EngineSettings::parse(&repo.get_settings().unwrap());

        let cam_a = repo
            .insert_camera(NewCamera {
                name: "A".into(),
                ip: "10.0.0.5".into(),
                nvr_ip: "10.0.0.1".into(),
                channel_id: "1".into(),
                status: CameraStatus::Offline,
                last_online: Some(now - ChronoDuration::minutes(13)),
            })
            .unwrap();

        let cam_b = repo
            .insert_camera(NewCamera {
                name: "B".into(),
                ip: "10.0.0.6".into(),
                nvr_ip: "10.0.0.1".into(),
                channel_id: "2".into(),
                status: CameraStatus::Offline,
                last_online: Some(now - ChronoDuration::minutes(45)),
            })
            .unwrap();

        let cams = vec![cam_a, cam_b];
        let mut last_summary_hour = None;
        engine
            .maybe_send_hourly_summary(&settings, &cams, now, &mut last_summary_hour)
            .await
            .unwrap();
        assert_eq!(last_summary_hour, Some(12));

        // A second call for the same minute-0 tick must be a no-op (guarded by the hour marker).
        engine
            .maybe_send_hourly_summary(&settings, &cams, now, &mut last_summary_hour)
            .await
            .unwrap();
        assert_eq!(last_summary_hour, Some(12));
    }
}
