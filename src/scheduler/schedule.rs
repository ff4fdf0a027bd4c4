//! Recurrence rules for recurring tasks.

use crate::utils::time::combine_date_time;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// Every day at a business-local time, optionally skipping Saturday and Sunday.
    Daily { at: NaiveTime, weekdays_only: bool },
}

impl Schedule {
    /// First firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>, tz: FixedOffset) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Daily { at, weekdays_only } => {
                let mut date = after.with_timezone(&tz).date_naive();

                // at most two weekend days to skip plus today
                for _ in 0..8 {
                    let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
                    if !(*weekdays_only && weekend) {
                        let candidate = combine_date_time(date, *at, tz).ok()?;
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                    date = date.succ_opt()?;
                }

                None
            }
        }
    }
}
