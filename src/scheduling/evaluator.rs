//! Recurrence evaluation
//!
//! Pure: the result depends only on the policy, the state and `now`.
//! Interval arithmetic happens in the offset of `now`, so "+1 day" is a
//! calendar day rather than a fixed 86400 seconds.

use super::clock::Timestamp;
use super::state::ScheduleState;
use crate::models::{ScheduleKind, SchedulePolicy};
use chrono::{DateTime, Days, TimeDelta, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Period {
    Day,
    Hour,
    Minute,
}

/// Whether a binding with `policy` and `state` is eligible to run at `now`
pub fn should_run(policy: &SchedulePolicy, state: &ScheduleState, now: &Timestamp) -> bool {
    let Some(previous) = state.previous_invocation() else {
        if policy.invoke_immediately() {
            return true;
        }
        if policy.kind().is_pinned() {
            return time_matches(now, policy);
        }
        return false;
    };

    match policy.kind() {
        ScheduleKind::Daily => interval_passed(previous, Period::Day, now),
        ScheduleKind::DailyAt => {
            interval_passed(previous, Period::Day, now) && time_matches(now, policy)
        }
        ScheduleKind::Hourly => interval_passed(previous, Period::Hour, now),
        ScheduleKind::HourlyAt => {
            interval_passed(previous, Period::Hour, now) && time_matches(now, policy)
        }
        ScheduleKind::EveryMinute => interval_passed(previous, Period::Minute, now),
        ScheduleKind::EveryMinuteAt => {
            interval_passed(previous, Period::Minute, now) && time_matches(now, policy)
        }
        ScheduleKind::EverySecond => previous + 1 <= now.timestamp(),
    }
}

/// `previous + period <= now`
fn interval_passed(previous: i64, period: Period, now: &Timestamp) -> bool {
    let Some(start) = DateTime::from_timestamp(previous, 0) else {
        return false;
    };
    let start = start.with_timezone(now.offset());

    let next = match period {
        Period::Day => start.checked_add_days(Days::new(1)),
        Period::Hour => start.checked_add_signed(TimeDelta::hours(1)),
        Period::Minute => start.checked_add_signed(TimeDelta::minutes(1)),
    };

    next.is_some_and(|next| next <= *now)
}

/// Wall-clock match of `now` against the policy's `at_*` fields
///
/// `at_minute` only counts for `DailyAt` and `HourlyAt`; `at_hour` only for `DailyAt`.
fn time_matches(now: &Timestamp, policy: &SchedulePolicy) -> bool {
    let kind = policy.kind();

    if let Some(second) = policy.at_second() {
        if now.second() != second {
            return false;
        }
    }

    if matches!(kind, ScheduleKind::DailyAt | ScheduleKind::HourlyAt) {
        if let Some(minute) = policy.at_minute() {
            if now.minute() != minute {
                return false;
            }
        }
    }

    if kind == ScheduleKind::DailyAt {
        if let Some(hour) = policy.at_hour() {
            if now.hour() != hour {
                return false;
            }
        }
    }

    true
}
