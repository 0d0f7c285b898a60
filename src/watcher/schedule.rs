//! When a watcher runs its next cycle

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum Schedule {
    Interval(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a cron expression.
    ///
    /// Standard five-field expressions ("0 * * * *") get a leading seconds field;
    /// six and seven field expressions are passed through.
    pub fn cron(expression: &str) -> Result<Self, cron::error::Error> {
        let expression = expression.trim();
        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {}", expression)
        } else {
            expression.to_string()
        };
        let schedule = cron::Schedule::from_str(&normalized)?;
        Ok(Schedule::Cron(Box::new(schedule)))
    }

    /// Time to wait from `now` until the next trigger, None when a cron schedule is exhausted
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Schedule::Interval(interval) => Some(*interval),
            Schedule::Cron(schedule) => {
                let next = schedule.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}
