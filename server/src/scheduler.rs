//! Cron cadence loops.
//!
//! Each loop runs its task to completion before waiting for the next tick,
//! so a task never overlaps itself.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use cron::Schedule;
use tokio::time::sleep;

use crate::error::ScheduleError;

/// A tick firing later than this is logged as past due.
const PAST_DUE_AFTER_SECS: i64 = 60;

/// Parse a cron expression. Classic 5-field expressions get a leading
/// seconds field so `0 */3 * * *` means "every third hour, on the hour".
pub fn parse_schedule(expression: &str) -> Result<Schedule, ScheduleError> {
    let trimmed = expression.trim();
    let normalized = match trimmed.split_whitespace().count() {
        5 => format!("0 {}", trimmed),
        _ => trimmed.to_string(),
    };

    normalized
        .parse::<Schedule>()
        .map_err(|source| ScheduleError::InvalidExpression {
            expression: expression.to_string(),
            source,
        })
}

fn delay_until(next: DateTime<Local>, now: DateTime<Local>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

fn past_due(scheduled: DateTime<Local>, now: DateTime<Local>) -> Option<TimeDelta> {
    let late = now - scheduled;
    (late > TimeDelta::seconds(PAST_DUE_AFTER_SECS)).then_some(late)
}

/// Run `task` once at startup (if asked) and then on every tick of
/// `schedule`. Returns only when the schedule has no upcoming tick.
pub async fn run<F, Fut>(name: &str, schedule: &Schedule, run_on_startup: bool, mut task: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if run_on_startup {
        log::info!("Starting {} (startup run)", name);
        task().await;
    }

    loop {
        let Some(next) = schedule.upcoming(Local).next() else {
            log::warn!("Schedule for {} has no upcoming tick, stopping", name);
            return;
        };
        log::debug!("Next {} run at {}", name, next);
        sleep(delay_until(next, Local::now())).await;

        if let Some(late) = past_due(next, Local::now()) {
            log::warn!("The {} timer is past due by {}s", name, late.num_seconds());
        }

        log::info!("Starting {}", name);
        task().await;
    }
}
