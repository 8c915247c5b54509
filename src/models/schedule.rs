//! Recurrence policies for scheduled handlers

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleKind {
    Daily,
    DailyAt,
    Hourly,
    HourlyAt,
    EveryMinute,
    EveryMinuteAt,
    EverySecond,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Daily => "Daily",
            ScheduleKind::DailyAt => "DailyAt",
            ScheduleKind::Hourly => "Hourly",
            ScheduleKind::HourlyAt => "HourlyAt",
            ScheduleKind::EveryMinute => "EveryMinute",
            ScheduleKind::EveryMinuteAt => "EveryMinuteAt",
            ScheduleKind::EverySecond => "EverySecond",
        }
    }

    /// Kinds that fire at a wall-clock position rather than purely on elapsed time
    pub fn is_pinned(&self) -> bool {
        matches!(
            self,
            ScheduleKind::DailyAt | ScheduleKind::HourlyAt | ScheduleKind::EveryMinuteAt
        )
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind plus optional wall-clock fields
///
/// Construction enforces the required `at_*` fields per kind, so an existing
/// policy is always evaluable. Deserialization goes through the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSchedulePolicy")]
pub struct SchedulePolicy {
    kind: ScheduleKind,
    at_hour: Option<u32>,
    at_minute: Option<u32>,
    at_second: Option<u32>,
    invoke_immediately: bool,
}

#[derive(Deserialize)]
struct RawSchedulePolicy {
    kind: ScheduleKind,
    at_hour: Option<u32>,
    at_minute: Option<u32>,
    at_second: Option<u32>,
    #[serde(default)]
    invoke_immediately: bool,
}

impl TryFrom<RawSchedulePolicy> for SchedulePolicy {
    type Error = ConfigurationError;

    fn try_from(raw: RawSchedulePolicy) -> Result<Self, Self::Error> {
        Self::new(
            raw.kind,
            raw.at_hour,
            raw.at_minute,
            raw.at_second,
            raw.invoke_immediately,
        )
    }
}

impl SchedulePolicy {
    pub fn new(
        kind: ScheduleKind,
        at_hour: Option<u32>,
        at_minute: Option<u32>,
        at_second: Option<u32>,
        invoke_immediately: bool,
    ) -> Result<Self, ConfigurationError> {
        let required: &[(&'static str, Option<u32>)] = match kind {
            ScheduleKind::DailyAt => &[
                ("atHour", at_hour),
                ("atMinute", at_minute),
                ("atSecond", at_second),
            ],
            ScheduleKind::HourlyAt => &[("atMinute", at_minute), ("atSecond", at_second)],
            ScheduleKind::EveryMinuteAt => &[("atSecond", at_second)],
            _ => &[],
        };

        for (field, value) in required {
            if value.is_none() {
                return Err(ConfigurationError::MissingScheduleField {
                    kind: kind.as_str(),
                    field,
                });
            }
        }

        check_range("atHour", at_hour, 24)?;
        check_range("atMinute", at_minute, 60)?;
        check_range("atSecond", at_second, 60)?;

        Ok(Self {
            kind,
            at_hour,
            at_minute,
            at_second,
            invoke_immediately,
        })
    }

    pub fn daily() -> Self {
        Self::unpinned(ScheduleKind::Daily)
    }

    pub fn daily_at(hour: u32, minute: u32, second: u32) -> Result<Self, ConfigurationError> {
        Self::new(ScheduleKind::DailyAt, Some(hour), Some(minute), Some(second), false)
    }

    pub fn hourly() -> Self {
        Self::unpinned(ScheduleKind::Hourly)
    }

    pub fn hourly_at(minute: u32, second: u32) -> Result<Self, ConfigurationError> {
        Self::new(ScheduleKind::HourlyAt, None, Some(minute), Some(second), false)
    }

    pub fn every_minute() -> Self {
        Self::unpinned(ScheduleKind::EveryMinute)
    }

    pub fn every_minute_at(second: u32) -> Result<Self, ConfigurationError> {
        Self::new(ScheduleKind::EveryMinuteAt, None, None, Some(second), false)
    }

    pub fn every_second() -> Self {
        Self::unpinned(ScheduleKind::EverySecond)
    }

    /// Run on the first tick after registration instead of waiting a full period
    pub fn immediately(mut self) -> Self {
        self.invoke_immediately = true;
        self
    }

    fn unpinned(kind: ScheduleKind) -> Self {
        Self {
            kind,
            at_hour: None,
            at_minute: None,
            at_second: None,
            invoke_immediately: false,
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    pub fn at_hour(&self) -> Option<u32> {
        self.at_hour
    }

    pub fn at_minute(&self) -> Option<u32> {
        self.at_minute
    }

    pub fn at_second(&self) -> Option<u32> {
        self.at_second
    }

    pub fn invoke_immediately(&self) -> bool {
        self.invoke_immediately
    }
}

fn check_range(field: &'static str, value: Option<u32>, limit: u32) -> Result<(), ConfigurationError> {
    match value {
        Some(value) if value >= limit => Err(ConfigurationError::ScheduleFieldOutOfRange {
            field,
            value,
            limit,
        }),
        _ => Ok(()),
    }
}
