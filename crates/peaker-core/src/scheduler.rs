//! Interval-aligned polling schedule
//!
//! Outside of dev mode the first run is delayed until the next wall-clock
//! multiple of the interval (counted from the Unix epoch), so that a 5 minute
//! interval fires at :00, :05, :10 and so on. After the first run the action
//! fires every interval on absolute deadlines, so slow runs never accumulate
//! drift.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::Config;

/// Smallest interval the scheduler runs with
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Largest interval the scheduler runs with
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Work run on every firing of the scheduler
#[async_trait]
pub trait Tick: Send {
    /// Run once for the firing at `at`. Returning `false` stops the scheduler
    /// for good.
    async fn tick(&mut self, at: DateTime<Utc>) -> bool;
}

#[async_trait]
impl<F> Tick for F
where
    F: FnMut(DateTime<Utc>) -> bool + Send,
{
    async fn tick(&mut self, at: DateTime<Utc>) -> bool {
        (self)(at)
    }
}

/// Why the scheduler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// The action returned `false`
    Requested,
    /// The shutdown future resolved
    Shutdown,
}

/// Drives a [`Tick`] action on a fixed interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    interval: Duration,
    dev: bool,
}

/// The first interval boundary strictly after `now`.
///
/// `now` itself is never returned, even when it lies exactly on a boundary.
pub fn next_boundary(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = i64::try_from(interval.clamp(MIN_INTERVAL, MAX_INTERVAL).as_millis())
        .unwrap_or(i64::MAX);
    let millis = now.timestamp_millis();
    let next = (millis - millis.rem_euclid(step)).saturating_add(step);

    DateTime::from_timestamp_millis(next).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Scheduler {
    /// Create a scheduler. The interval is clamped to at least one
    /// millisecond and at most [`MAX_INTERVAL`].
    pub fn new(interval: Duration, dev: bool) -> Self {
        Self {
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            dev,
        }
    }

    /// Create a scheduler from the configured interval and dev flag
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.interval, config.dev)
    }

    /// Interval between runs
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the first run happens if the scheduler starts at `now`
    pub fn first_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.dev {
            now
        } else {
            next_boundary(now, self.interval)
        }
    }

    /// Run `action` until it returns `false` or `shutdown` resolves.
    pub async fn run<T, S>(&self, action: &mut T, shutdown: S) -> Stop
    where
        T: Tick,
        S: Future<Output = ()>,
    {
        self.run_from(Utc::now(), action, shutdown).await
    }

    /// Like [`Scheduler::run`], treating `now` as the current wall-clock time.
    ///
    /// Timestamps handed to the action are `now` plus the monotonic time
    /// elapsed since the call, so they never go backwards.
    pub async fn run_from<T, S>(&self, now: DateTime<Utc>, action: &mut T, shutdown: S) -> Stop
    where
        T: Tick,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let origin = Instant::now();
        let wall_clock = |instant: Instant| {
            now + TimeDelta::from_std(instant.duration_since(origin)).unwrap_or(TimeDelta::zero())
        };

        if self.dev {
            info!("Dev mode is enabled => instant run");
        } else {
            let first = self.first_fire(now);
            info!("First run at {}", first);

            let wait = (first - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested before the first run");
                    return Stop::Shutdown;
                }
                _ = time::sleep_until(origin + wait) => {}
            }
        }

        let start = Instant::now();
        if !action.tick(wall_clock(start)).await {
            debug!("Action requested stop");
            return Stop::Requested;
        }

        let mut ticker = time::interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Stop::Shutdown;
                }
                _ = ticker.tick() => {}
            }

            if !action.tick(wall_clock(Instant::now())).await {
                debug!("Action requested stop");
                return Stop::Requested;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::future::pending;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, s).unwrap()
    }

    #[test]
    fn test_next_boundary() {
        let minute = Duration::from_secs(60);
        assert_eq!(next_boundary(at(12, 0, 5), minute), at(12, 1, 0));
        assert_eq!(next_boundary(at(12, 0, 59), minute), at(12, 1, 0));

        // Exactly on a boundary still waits a full interval
        assert_eq!(next_boundary(at(12, 1, 0), minute), at(12, 2, 0));

        let five = Duration::from_secs(300);
        assert_eq!(next_boundary(at(12, 3, 0), five), at(12, 5, 0));
        assert_eq!(next_boundary(at(23, 58, 1), five), at(0, 0, 0) + TimeDelta::days(1));
    }

    #[test]
    fn test_next_boundary_is_future_multiple() {
        let start = at(7, 13, 29) + TimeDelta::milliseconds(417);
        for secs in [1, 7, 60, 90, 300, 3600] {
            let interval = Duration::from_secs(secs);
            for offset in 0..50 {
                let now = start + TimeDelta::milliseconds(offset * 977);
                let next = next_boundary(now, interval);

                assert!(next > now);
                assert!(next - now <= TimeDelta::seconds(secs as i64));
                assert_eq!(next.timestamp_millis() % (secs as i64 * 1000), 0);
            }
        }
    }

    #[test]
    fn test_first_fire() {
        let minute = Duration::from_secs(60);
        assert_eq!(Scheduler::new(minute, true).first_fire(at(12, 0, 5)), at(12, 0, 5));
        assert_eq!(Scheduler::new(minute, false).first_fire(at(12, 0, 5)), at(12, 1, 0));
        assert_eq!(Scheduler::new(Duration::ZERO, true).interval(), MIN_INTERVAL);
        assert_eq!(
            Scheduler::new(Duration::from_secs(i64::MAX as u64), true).interval(),
            MAX_INTERVAL
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_runs() {
        let huge = Duration::from_secs(i64::MAX as u64);

        for dev in [true, false] {
            let mut count = 0;
            let mut action = |_: DateTime<Utc>| {
                count += 1;
                true
            };
            let stop = Scheduler::new(huge, dev)
                .run_from(at(12, 0, 0), &mut action, time::sleep(Duration::from_secs(1)))
                .await;

            assert_eq!(stop, Stop::Shutdown);
            assert_eq!(count, if dev { 1 } else { 0 });
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dev_mode_runs_immediately() {
        let scheduler = Scheduler::new(Duration::from_secs(300), true);
        let origin = Instant::now();
        let mut fired = Vec::new();

        let mut action = |t: DateTime<Utc>| {
            fired.push((t, Instant::now()));
            false
        };
        let stop = scheduler.run_from(at(12, 0, 5), &mut action, pending()).await;

        assert_eq!(stop, Stop::Requested);
        assert_eq!(fired, vec![(at(12, 0, 5), origin)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aligned_first_run() {
        let scheduler = Scheduler::new(Duration::from_secs(60), false);
        let origin = Instant::now();
        let mut fired = Vec::new();

        let mut action = |t: DateTime<Utc>| {
            fired.push((t, Instant::now()));
            fired.len() < 2
        };
        let stop = scheduler.run_from(at(12, 0, 5), &mut action, pending()).await;

        assert_eq!(stop, Stop::Requested);
        assert_eq!(
            fired,
            vec![
                (at(12, 1, 0), origin + Duration::from_secs(55)),
                (at(12, 2, 0), origin + Duration::from_secs(115)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let scheduler = Scheduler::new(Duration::from_secs(60), true);
        let mut count = 0;

        let mut action = |_: DateTime<Utc>| {
            count += 1;
            count < 3
        };
        let stop = scheduler.run_from(at(12, 0, 0), &mut action, pending()).await;
        assert_eq!(stop, Stop::Requested);

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(count, 3);
    }

    struct Busy {
        work: Duration,
        limit: usize,
        runs: Vec<(DateTime<Utc>, Instant, Instant)>,
    }

    #[async_trait]
    impl Tick for Busy {
        async fn tick(&mut self, at: DateTime<Utc>) -> bool {
            let started = Instant::now();
            time::sleep(self.work).await;
            self.runs.push((at, started, Instant::now()));
            self.runs.len() < self.limit
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_do_not_drift() {
        let scheduler = Scheduler::new(Duration::from_secs(60), true);
        let origin = Instant::now();
        let mut busy = Busy {
            work: Duration::from_secs(10),
            limit: 4,
            runs: Vec::new(),
        };

        scheduler.run_from(at(12, 0, 0), &mut busy, pending()).await;

        let starts: Vec<Duration> = busy
            .runs
            .iter()
            .map(|(_, started, _)| started.duration_since(origin))
            .collect();
        assert_eq!(
            starts,
            [0, 60, 120, 180].map(Duration::from_secs).to_vec()
        );
        assert_eq!(busy.runs[3].0, at(12, 3, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_never_overlap() {
        let scheduler = Scheduler::new(Duration::from_secs(60), true);
        let mut busy = Busy {
            work: Duration::from_secs(90),
            limit: 5,
            runs: Vec::new(),
        };

        scheduler.run_from(at(12, 0, 0), &mut busy, pending()).await;

        assert_eq!(busy.runs.len(), 5);
        for pair in busy.runs.windows(2) {
            let (prev_at, _, prev_end) = pair[0];
            let (next_at, next_start, _) = pair[1];
            assert!(next_start >= prev_end);
            assert!(next_at >= prev_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_alignment() {
        let scheduler = Scheduler::new(Duration::from_secs(60), false);
        let mut count = 0;

        let mut action = |_: DateTime<Utc>| {
            count += 1;
            true
        };
        let stop = scheduler
            .run_from(
                at(12, 0, 5),
                &mut action,
                time::sleep(Duration::from_secs(10)),
            )
            .await;

        assert_eq!(stop, Stop::Shutdown);
        assert_eq!(count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_running() {
        let scheduler = Scheduler::new(Duration::from_secs(60), true);
        let mut count = 0;

        let mut action = |_: DateTime<Utc>| {
            count += 1;
            true
        };
        let stop = scheduler
            .run_from(
                at(12, 0, 0),
                &mut action,
                time::sleep(Duration::from_secs(150)),
            )
            .await;

        assert_eq!(stop, Stop::Shutdown);
        assert_eq!(count, 3);
    }
}
