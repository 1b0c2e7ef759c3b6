// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The cooperative background scheduler.
//!
//! Every job runs on its own period until shutdown; a failing run is logged and the schedule
//! continues. Jobs report the number of dispatched emails, which ends up in the log.

use std::future::Future;

use tokio::time::{interval, Duration, MissedTickBehavior};

use rally_common::task::{ShutdownRx, Spawner};

/// Spawns a periodic job.
pub(crate) fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut shutdown: ShutdownRx, job: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<usize, rally_service::Error>> + Send,
{
    Spawner::spawn(
        async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = timer.tick() => match job().await {
                        Ok(dispatched) => {
                            if dispatched > 0 {
                                log::info!("`{}` dispatched {} email(s)", name, dispatched);
                            }
                        }
                        // Failures are isolated per run; the schedule continues.
                        Err(e) => log::warn!("`{}` failed: {}", name, e),
                    },
                }
            }
            log::info!("`{}` stopped", name);
        },
        name,
    );
}

/// Spawns a job that runs once a day at the given UTC hour.
pub(crate) fn spawn_daily<F, Fut>(name: &'static str, hour_utc: u8, mut shutdown: ShutdownRx, job: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<usize, rally_service::Error>> + Send,
{
    Spawner::spawn(
        async move {
            loop {
                let delay = seconds_until_hour(hour_utc);
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(Duration::from_secs(delay)) => match job().await {
                        Ok(dispatched) => log::info!("`{}` dispatched {} email(s)", name, dispatched),
                        Err(e) => log::warn!("`{}` failed: {}", name, e),
                    },
                }
            }
            log::info!("`{}` stopped", name);
        },
        name,
    );
}

/// Seconds from now until the next occurrence of `hour:00:00` UTC.
fn seconds_until_hour(hour_utc: u8) -> u64 {
    let now = rally_common::time::now_utc();
    let today_secs = now.hour() as i64 * 3600 + now.minute() as i64 * 60 + now.second() as i64;
    let target_secs = hour_utc as i64 * 3600;
    let mut delta = target_secs - today_secs;
    if delta <= 0 {
        delta += 24 * 3600;
    }
    delta as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_occurrence_is_within_a_day() {
        for hour in 0..24u8 {
            let delay = seconds_until_hour(hour);
            assert!(delay > 0);
            assert!(delay <= 24 * 3600);
        }
    }
}
