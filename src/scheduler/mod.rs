//! Weekly trigger for unattended runs.
//!
//! `auto` mode arms a [`WeeklySchedule`] and sleeps until the next
//! occurrence, runs the job on a blocking thread, then re-arms. A failed
//! run is logged and the schedule keeps going.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Weekday};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// A weekday and local time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub weekday: Weekday,
    pub at: NaiveTime,
}

impl WeeklySchedule {
    /// Parse a weekday name ("Monday", "mon") and an `HH:MM` time.
    pub fn parse(weekday: &str, time: &str) -> Result<Self, String> {
        let weekday: Weekday = weekday
            .trim()
            .parse()
            .map_err(|_| format!("unknown weekday '{}'", weekday))?;
        let at = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|_| format!("time '{}' is not HH:MM", time))?;

        Ok(Self { weekday, at })
    }

    /// The first occurrence strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let local_now = now.naive_local();
        let today = local_now.date();

        let days_ahead = (7 + self.weekday.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            % 7;
        let mut candidate = (today + Duration::days(days_ahead)).and_time(self.at);
        if candidate <= local_now {
            candidate += Duration::days(7);
        }

        let tz = now.timezone();
        tz.from_local_datetime(&candidate)
            .earliest()
            // Skipped by a DST jump: run an hour later
            .or_else(|| tz.from_local_datetime(&(candidate + Duration::hours(1))).earliest())
            .unwrap_or_else(|| now.clone() + Duration::days(7))
    }
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self {
            weekday: Weekday::Mon,
            at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
        }
    }
}

impl fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {} at {}", self.weekday, self.at.format("%H:%M"))
    }
}

/// A blocking job run on every trigger.
pub type Job = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Run `job` on every occurrence of `schedule` until `shutdown` resolves.
///
/// Returns the number of runs that were started.
pub async fn run_weekly<S>(schedule: WeeklySchedule, job: Job, shutdown: S) -> Result<usize>
where
    S: Future<Output = ()>,
{
    let next_wait = move || {
        let now = chrono::Local::now();
        let next = schedule.next_after(&now);
        info!("Next analysis run: {}", next.format("%Y-%m-%d %H:%M %Z"));
        (next - now).to_std().unwrap_or_default()
    };

    run_loop(next_wait, job, shutdown).await
}

/// Sleep for whatever `next_wait` returns, run `job`, repeat.
async fn run_loop<W, S>(mut next_wait: W, job: Job, shutdown: S) -> Result<usize>
where
    W: FnMut() -> std::time::Duration,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut runs = 0;

    loop {
        let wait = next_wait();

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Scheduler stopped after {} run(s)", runs);
                return Ok(runs);
            }
            _ = tokio::time::sleep(wait) => {}
        }

        runs += 1;
        info!("Starting scheduled analysis run #{}", runs);

        let job = Arc::clone(&job);
        match tokio::task::spawn_blocking(move || job()).await {
            Ok(Ok(())) => info!("Scheduled run #{} finished", runs),
            Ok(Err(e)) => error!("Scheduled run #{} failed: {:#}", runs, e),
            Err(e) => error!("Scheduled run #{} panicked: {}", runs, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_parse() {
        let schedule = WeeklySchedule::parse("Monday", "08:00").unwrap();
        assert_eq!(schedule, WeeklySchedule::default());

        let schedule = WeeklySchedule::parse("fri", "17:30").unwrap();
        assert_eq!(schedule.weekday, Weekday::Fri);
        assert_eq!(schedule.at, NaiveTime::from_hms_opt(17, 30, 0).unwrap());

        assert!(WeeklySchedule::parse("Someday", "08:00").is_err());
        assert!(WeeklySchedule::parse("Mon", "8am").is_err());
    }

    #[test]
    fn test_next_after_later_in_week() {
        // 2024-01-03 is a Wednesday
        let next = WeeklySchedule::default().next_after(&at(2024, 1, 3, 12, 0));
        assert_eq!(next, at(2024, 1, 8, 8, 0));
    }

    #[test]
    fn test_next_after_same_day_before_time() {
        // 2024-01-08 is a Monday
        let next = WeeklySchedule::default().next_after(&at(2024, 1, 8, 7, 59));
        assert_eq!(next, at(2024, 1, 8, 8, 0));
    }

    #[test]
    fn test_next_after_exact_time_is_next_week() {
        let next = WeeklySchedule::default().next_after(&at(2024, 1, 8, 8, 0));
        assert_eq!(next, at(2024, 1, 15, 8, 0));
    }

    #[test]
    fn test_next_after_uses_local_time() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        // Monday 06:00 UTC is 09:00 at +03:00, already past 08:00 local
        let now = at(2024, 1, 8, 6, 0).with_timezone(&offset);
        let next = WeeklySchedule::default().next_after(&now);

        assert_eq!(next.naive_local().date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(next.naive_local().time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(WeeklySchedule::default().to_string(), "every Mon at 08:00");
    }

    #[test]
    fn test_shutdown_stops_before_first_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let job: Job = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let runs = tokio_test::block_on(run_weekly(
            WeeklySchedule::default(),
            job,
            std::future::ready(()),
        ))
        .unwrap();

        assert_eq!(runs, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_run_does_not_stop_the_schedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let job: Job = Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("input file missing");
            }
            Ok(())
        });

        let seen = Arc::clone(&calls);
        let shutdown = async move {
            while seen.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        };

        let runs = tokio_test::block_on(run_loop(
            || std::time::Duration::ZERO,
            job,
            shutdown,
        ))
        .unwrap();

        assert_eq!(runs, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
