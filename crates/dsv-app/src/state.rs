// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::{Date, OffsetDateTime};

use crate::{DateRange, RowRecord};

/// One completed refresh. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub range: DateRange,
    pub fetched_at: OffsetDateTime,
    pub rows: Vec<RowRecord>,
    /// Operator-facing description of a fetch that ended early.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub sku: Option<String>,
    pub day: Option<Date>,
}

impl RowFilter {
    pub fn matches(&self, row: &RowRecord) -> bool {
        if let Some(needle) = &self.sku
            && !row
                .sku
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase())
        {
            return false;
        }
        if let Some(day) = self.day
            && row.order_date.date() != day
        {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.sku.is_none() && self.day.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    snapshot: Option<Snapshot>,
    filter: RowFilter,
    status_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    SetSkuFilter(Option<String>),
    SetDayFilter(Option<Date>),
    ClearFilters,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    SnapshotReplaced { rows: usize },
    FilterChanged,
    StatusUpdated(String),
    StatusCleared,
}

impl SessionState {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn filter(&self) -> &RowFilter {
        &self.filter
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    pub fn rows(&self) -> &[RowRecord] {
        self.snapshot
            .as_ref()
            .map_or(&[][..], |snapshot| snapshot.rows.as_slice())
    }

    pub fn visible_rows(&self) -> Vec<&RowRecord> {
        self.rows()
            .iter()
            .filter(|row| self.filter.matches(row))
            .collect()
    }

    pub fn replace_snapshot(&mut self, snapshot: Snapshot) -> Vec<AppEvent> {
        let rows = snapshot.rows.len();
        let status = match &snapshot.failure {
            Some(failure) => format!("refresh incomplete: {failure}"),
            None => format!("loaded {rows} rows"),
        };
        self.snapshot = Some(snapshot);
        vec![AppEvent::SnapshotReplaced { rows }, self.set_status(&status)]
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::SetSkuFilter(sku) => {
                self.filter.sku = sku
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty());
                vec![AppEvent::FilterChanged]
            }
            AppCommand::SetDayFilter(day) => {
                self.filter.day = day;
                vec![AppEvent::FilterChanged]
            }
            AppCommand::ClearFilters => {
                self.filter = RowFilter::default();
                vec![AppEvent::FilterChanged, self.set_status("filters cleared")]
            }
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}
