//! Periodic full passes

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::sync::engine::SyncEngine;

/// Wait before retrying after a pass-level failure
pub const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(30);

/// When full passes run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Never,
    /// A pass right away, then one every interval
    Every(Duration),
    /// One pass a day at a local wall-clock time
    DailyAt(NaiveTime),
}

impl Schedule {
    /// Parse an interval such as `15min`, `2h`, `hourly`, `daily@02:00` or `never`
    pub fn parse(interval: &str) -> Result<Self> {
        let value = interval.trim().to_lowercase();

        if value.is_empty() || value == "never" {
            return Ok(Schedule::Never);
        }
        if value == "hourly" {
            return Ok(Schedule::Every(Duration::from_secs(3600)));
        }
        if let Some(time) = value.strip_prefix("daily@") {
            let time = NaiveTime::parse_from_str(time, "%H:%M")
                .with_context(|| format!("Invalid daily time in schedule: {}", interval))?;
            return Ok(Schedule::DailyAt(time));
        }

        let (amount, unit_secs) = if let Some(n) = value.strip_suffix("min") {
            (n, 60)
        } else if let Some(n) = value.strip_suffix('h') {
            (n, 3600)
        } else {
            bail!("Unrecognized schedule interval: {}", interval);
        };

        let amount: u64 = amount
            .trim()
            .parse()
            .with_context(|| format!("Unrecognized schedule interval: {}", interval))?;
        if amount == 0 {
            bail!("Schedule interval must be greater than zero: {}", interval);
        }

        Ok(Schedule::Every(Duration::from_secs(amount * unit_secs)))
    }

    /// How long to wait from `now` until the next pass, `None` if disabled
    pub fn next_delay(&self, now: NaiveDateTime) -> Option<Duration> {
        match self {
            Schedule::Never => None,
            Schedule::Every(interval) => Some(*interval),
            Schedule::DailyAt(time) => {
                let mut next = now.date().and_time(*time);
                if next <= now {
                    next += TimeDelta::days(1);
                }
                (next - now).to_std().ok()
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Never => write!(f, "never"),
            Schedule::Every(interval) => {
                let secs = interval.as_secs();
                if secs % 3600 == 0 {
                    write!(f, "every {}h", secs / 3600)
                } else {
                    write!(f, "every {}min", secs / 60)
                }
            }
            Schedule::DailyAt(time) => write!(f, "daily at {}", time.format("%H:%M")),
        }
    }
}

/// Run full passes on a schedule until the task is dropped
pub async fn run_scheduler(engine: Arc<SyncEngine>, config: SyncConfig, schedule: Schedule) {
    if schedule == Schedule::Never {
        info!("Scheduled sync disabled");
        return;
    }

    info!("Scheduled sync started ({})", schedule);
    let mut run_now = matches!(schedule, Schedule::Every(_));

    loop {
        if !run_now {
            let Some(delay) = schedule.next_delay(Local::now().naive_local()) else {
                return;
            };
            debug!("Next scheduled pass in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }

        match engine.run_full_pass(&config).await {
            Ok(report) => {
                info!(
                    "Scheduled sync complete: {} files written",
                    report.files_written()
                );
                for standing in report.standing_conflicts() {
                    warn!(
                        "Conflict still open: {}",
                        standing.conflict.playlist_name
                    );
                }
                run_now = false;
            }
            Err(e) => {
                error!("Scheduled sync failed: {}", e);
                tokio::time::sleep(RETRY_AFTER_FAILURE).await;
                run_now = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataLayout;
    use crate::conflict::ConflictResolver;
    use crate::device::{Device, DevicePair, Side};
    use crate::sync::state::SyncState;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_intervals() {
        assert_eq!(Schedule::parse("never").unwrap(), Schedule::Never);
        assert_eq!(Schedule::parse("").unwrap(), Schedule::Never);
        assert_eq!(
            Schedule::parse("15min").unwrap(),
            Schedule::Every(Duration::from_secs(900))
        );
        assert_eq!(
            Schedule::parse(" 30MIN ").unwrap(),
            Schedule::Every(Duration::from_secs(1800))
        );
        assert_eq!(
            Schedule::parse("hourly").unwrap(),
            Schedule::Every(Duration::from_secs(3600))
        );
        assert_eq!(
            Schedule::parse("6h").unwrap(),
            Schedule::Every(Duration::from_secs(6 * 3600))
        );
        assert_eq!(
            Schedule::parse("daily@02:00").unwrap(),
            Schedule::DailyAt(NaiveTime::from_hms_opt(2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Schedule::parse("sometimes").is_err());
        assert!(Schedule::parse("0min").is_err());
        assert!(Schedule::parse("daily@25:00").is_err());
        assert!(Schedule::parse("xmin").is_err());
    }

    #[test]
    fn test_next_delay_daily() {
        let schedule = Schedule::parse("daily@02:00").unwrap();
        assert_eq!(
            schedule.next_delay(at(1, 30)),
            Some(Duration::from_secs(30 * 60))
        );
        assert_eq!(
            schedule.next_delay(at(2, 0)),
            Some(Duration::from_secs(24 * 3600))
        );
        assert_eq!(
            schedule.next_delay(at(23, 0)),
            Some(Duration::from_secs(3 * 3600))
        );
        assert_eq!(Schedule::Never.next_delay(at(0, 0)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Schedule::parse("hourly").unwrap().to_string(), "every 1h");
        assert_eq!(Schedule::parse("15min").unwrap().to_string(), "every 15min");
        assert_eq!(
            Schedule::parse("daily@02:00").unwrap().to_string(),
            "daily at 02:00"
        );
    }

    #[tokio::test]
    async fn test_scheduler_runs_a_pass() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("pc");
        let b = dir.path().join("phone");
        tokio::fs::create_dir_all(&a).await.unwrap();
        tokio::fs::create_dir_all(&b).await.unwrap();
        tokio::fs::write(a.join("Rock.m3u"), "SongA.mp3\n").await.unwrap();
        let layout = DataLayout::under(&dir.path().join("data"));
        layout.ensure().await.unwrap();

        let engine = Arc::new(SyncEngine::new(
            DevicePair::new(
                Device::new(Side::A, "A", a, "A"),
                Device::new(Side::B, "B", b.clone(), "B"),
            ),
            layout,
            ConflictResolver::default(),
            Arc::new(SyncState::new()),
        ));

        let schedule = Schedule::Every(Duration::from_secs(3600));
        let _ = tokio::time::timeout(
            Duration::from_millis(500),
            run_scheduler(engine, SyncConfig::default(), schedule),
        )
        .await;

        assert!(b.join("Rock.m3u").exists());
    }
}
