// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";
pub const DEFAULT_MAX_SPAN_DAYS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    InvalidDate(String),
    StartInFuture { start: Date, today: Date },
    EndInFuture { end: Date, today: Date },
    EndBeforeStart { start: Date, end: Date },
    SpanTooLong { days: i64, max_days: i64 },
}

impl std::fmt::Display for DateRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDate(raw) => {
                write!(f, "invalid date {raw:?}; expected {DATE_LAYOUT}")
            }
            Self::StartInFuture { start, today } => {
                write!(f, "start date {start} is after today ({today})")
            }
            Self::EndInFuture { end, today } => {
                write!(f, "end date {end} is after today ({today})")
            }
            Self::EndBeforeStart { start, end } => {
                write!(f, "end date {end} is before start date {start}")
            }
            Self::SpanTooLong { days, max_days } => {
                write!(
                    f,
                    "date range spans {days} days; the limit is {max_days} days"
                )
            }
        }
    }
}

impl std::error::Error for DateRangeError {}

/// Inclusive created-date window for an order query. Only constructible
/// through validation, so holding one means no bound lies in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(
        start: Date,
        end: Date,
        today: Date,
        max_span_days: i64,
    ) -> Result<Self, DateRangeError> {
        if start > today {
            return Err(DateRangeError::StartInFuture { start, today });
        }
        if end > today {
            return Err(DateRangeError::EndInFuture { end, today });
        }
        if end < start {
            return Err(DateRangeError::EndBeforeStart { start, end });
        }

        let days = (end - start).whole_days();
        if days > max_span_days {
            return Err(DateRangeError::SpanTooLong {
                days,
                max_days: max_span_days,
            });
        }

        Ok(Self { start, end })
    }

    /// The `days` days leading up to and including `today`.
    pub fn trailing(today: Date, days: i64, max_span_days: i64) -> Result<Self, DateRangeError> {
        let start = today
            .checked_sub(Duration::days(days))
            .ok_or(DateRangeError::SpanTooLong {
                days,
                max_days: max_span_days,
            })?;
        Self::new(start, today, today, max_span_days)
    }

    pub const fn start(self) -> Date {
        self.start
    }

    pub const fn end(self) -> Date {
        self.end
    }

    pub fn span_days(self) -> i64 {
        (self.end - self.start).whole_days()
    }

    pub fn contains(self, at: OffsetDateTime) -> bool {
        let day = at.date();
        day >= self.start && day <= self.end
    }
}

pub fn parse_date(raw: &str) -> Result<Date, DateRangeError> {
    Date::parse(raw.trim(), &format_description!("[year]-[month]-[day]"))
        .map_err(|_| DateRangeError::InvalidDate(raw.to_owned()))
}

pub fn format_date(value: Date) -> String {
    value
        .format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_owned())
}
