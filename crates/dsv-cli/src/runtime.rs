// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use dsv_api::{Client, Credentials};
use dsv_app::{
    AppEvent, DateRange, DateRangeError, SessionState, ShipNodeId, Snapshot, flatten_orders,
    parse_date,
};
use dsv_db::{Store, WriteSummary};
use time::{Date, Duration, OffsetDateTime};

/// Where a refresh gets its rows from.
pub trait OrderSource {
    fn load_snapshot(&mut self, range: DateRange) -> Result<Snapshot>;
}

/// Loads a snapshot from `source` and swaps it into the session.
pub fn refresh<S: OrderSource>(
    state: &mut SessionState,
    source: &mut S,
    range: DateRange,
) -> Result<Vec<AppEvent>> {
    let snapshot = source.load_snapshot(range)?;
    Ok(state.replace_snapshot(snapshot))
}

/// `--start`/`--end` win over `--days`; a missing end means today and a
/// missing start means `days` before the end.
pub fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    days: i64,
    today: Date,
    max_span_days: i64,
) -> Result<DateRange, DateRangeError> {
    if start.is_none() && end.is_none() {
        return DateRange::trailing(today, days, max_span_days);
    }

    let end = match end {
        Some(raw) => parse_date(raw)?,
        None => today,
    };
    let start = match start {
        Some(raw) => parse_date(raw)?,
        None => end
            .checked_sub(Duration::days(days))
            .ok_or(DateRangeError::SpanTooLong {
                days,
                max_days: max_span_days,
            })?,
    };
    DateRange::new(start, end, today, max_span_days)
}

/// Pulls orders from the API, flattens them, and writes them to the store
/// when one is attached.
pub struct ApiRuntime<'a> {
    client: &'a Client,
    credentials: &'a Credentials,
    ship_node: &'a ShipNodeId,
    store: Option<&'a Store>,
    last_write: Option<WriteSummary>,
}

impl<'a> ApiRuntime<'a> {
    pub fn new(client: &'a Client, credentials: &'a Credentials, ship_node: &'a ShipNodeId) -> Self {
        Self {
            client,
            credentials,
            ship_node,
            store: None,
            last_write: None,
        }
    }

    pub fn with_store(mut self, store: &'a Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn last_write(&self) -> Option<WriteSummary> {
        self.last_write
    }
}

impl OrderSource for ApiRuntime<'_> {
    fn load_snapshot(&mut self, range: DateRange) -> Result<Snapshot> {
        let token = self
            .client
            .fetch_token(self.credentials)
            .context("authenticate with the orders API")?;
        if let Some(expires_in) = token.expires_in() {
            tracing::debug!(
                expires_in_secs = expires_in.as_secs(),
                "token valid for this refresh"
            );
        }
        let report = self.client.fetch_orders(&token, self.ship_node, range);
        let rows = flatten_orders(&report.orders);
        tracing::info!(
            orders = report.orders.len(),
            rows = rows.len(),
            pages = report.pages,
            requests = report.requests,
            complete = report.is_complete(),
            "fetch finished"
        );

        self.last_write = match self.store {
            Some(store) if !rows.is_empty() => Some(store.write_rows(&rows)?),
            _ => None,
        };

        let failure = match (&report.failure, report.truncated) {
            (Some(error), _) => Some(error.to_string()),
            (None, true) => Some(format!(
                "stopped after {} pages; raise api.max_pages to fetch the rest",
                report.pages
            )),
            (None, false) => None,
        };

        Ok(Snapshot {
            range,
            fetched_at: OffsetDateTime::now_utc(),
            rows,
            failure,
        })
    }
}

/// Reads previously stored rows instead of calling the API.
pub struct CacheRuntime<'a> {
    store: &'a Store,
}

impl<'a> CacheRuntime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }
}

impl OrderSource for CacheRuntime<'_> {
    fn load_snapshot(&mut self, range: DateRange) -> Result<Snapshot> {
        let rows = self.store.list_rows(Some(range))?;
        Ok(Snapshot {
            range,
            fetched_at: OffsetDateTime::now_utc(),
            rows,
            failure: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiRuntime, CacheRuntime, OrderSource, refresh, resolve_range};
    use anyhow::Result;
    use dsv_api::{Client, ClientOptions, Credentials};
    use dsv_app::{AppEvent, DateRange, DateRangeError, SessionState, ShipNodeId};
    use dsv_db::Store;
    use dsv_testkit::{OrderFaker, Reply, ScriptedServer, nested_line, order_json, orders_page};
    use std::time::Duration;
    use time::macros::{date, datetime};

    fn options(base_url: &str) -> ClientOptions {
        ClientOptions {
            base_url: base_url.to_owned(),
            timeout: Duration::from_secs(2),
            page_delay: Duration::ZERO,
            ..ClientOptions::default()
        }
    }

    fn week() -> DateRange {
        let today = date!(2026 - 03 - 10);
        DateRange::new(date!(2026 - 03 - 03), today, today, 180).expect("valid range")
    }

    #[test]
    fn resolve_range_defaults_to_trailing_days() -> Result<()> {
        let range = resolve_range(None, None, 7, date!(2026 - 03 - 10), 180)?;
        assert_eq!(range.start(), date!(2026 - 03 - 03));
        assert_eq!(range.end(), date!(2026 - 03 - 10));
        Ok(())
    }

    #[test]
    fn resolve_range_uses_explicit_bounds() -> Result<()> {
        let today = date!(2026 - 03 - 10);
        let range = resolve_range(Some("2026-02-01"), Some("2026-02-15"), 7, today, 180)?;
        assert_eq!(range.start(), date!(2026 - 02 - 01));
        assert_eq!(range.end(), date!(2026 - 02 - 15));

        let open_start = resolve_range(None, Some("2026-02-15"), 3, today, 180)?;
        assert_eq!(open_start.start(), date!(2026 - 02 - 12));

        let open_end = resolve_range(Some("2026-03-01"), None, 3, today, 180)?;
        assert_eq!(open_end.end(), today);
        Ok(())
    }

    #[test]
    fn resolve_range_rejects_bad_input() {
        let today = date!(2026 - 03 - 10);
        assert!(matches!(
            resolve_range(Some("03/01/2026"), None, 7, today, 180),
            Err(DateRangeError::InvalidDate(_))
        ));
        assert!(matches!(
            resolve_range(Some("2026-03-05"), Some("2026-03-01"), 7, today, 180),
            Err(DateRangeError::EndBeforeStart { .. })
        ));
        assert!(matches!(
            resolve_range(None, Some("2026-03-11"), 7, today, 180),
            Err(DateRangeError::EndInFuture { .. })
        ));
        assert!(matches!(
            resolve_range(None, None, 400, today, 180),
            Err(DateRangeError::SpanTooLong { .. })
        ));
    }

    #[test]
    fn api_refresh_replaces_snapshot_and_stores_rows() -> Result<()> {
        let server = ScriptedServer::start(vec![
            Reply::ok(dsv_testkit::token_body("tok")),
            Reply::ok(orders_page(
                vec![
                    order_json(
                        "1",
                        datetime!(2026-03-04 09:00 UTC),
                        vec![nested_line("LAMP", "Lamp", 2.0, 10.0)],
                    ),
                    order_json(
                        "2",
                        datetime!(2026-03-05 09:00 UTC),
                        vec![nested_line("RUG", "Rug", 1.0, 40.0)],
                    ),
                ],
                None,
            )),
        ])?;
        let client = Client::new(options(server.base_url()))?;
        let credentials = Credentials::new("client", "secret")?;
        let ship_node = ShipNodeId::new("NODE-1");
        let store = Store::open_memory()?;
        store.bootstrap()?;

        let mut runtime = ApiRuntime::new(&client, &credentials, &ship_node).with_store(&store);
        let mut state = SessionState::default();
        let events = refresh(&mut state, &mut runtime, week())?;

        assert_eq!(events[0], AppEvent::SnapshotReplaced { rows: 2 });
        assert_eq!(state.status_line(), Some("loaded 2 rows"));
        assert_eq!(state.rows()[0].purchase_order_id.as_str(), "2");
        assert_eq!(runtime.last_write().map(|write| write.written), Some(2));
        assert_eq!(store.row_count()?, 2);

        let requests = server.finish()?;
        assert_eq!(requests.len(), 2);
        Ok(())
    }

    #[test]
    fn auth_failure_aborts_without_touching_state() -> Result<()> {
        let server = ScriptedServer::start(vec![Reply::json(401, r#"{"error_description":"nope"}"#)])?;
        let client = Client::new(options(server.base_url()))?;
        let credentials = Credentials::new("client", "wrong")?;
        let ship_node = ShipNodeId::new("NODE-1");

        let mut runtime = ApiRuntime::new(&client, &credentials, &ship_node);
        let mut state = SessionState::default();
        let error = refresh(&mut state, &mut runtime, week()).expect_err("401 should abort");

        assert!(format!("{error:#}").contains("HTTP 401"));
        assert!(state.snapshot().is_none());
        assert_eq!(server.finish()?.len(), 1);
        Ok(())
    }

    #[test]
    fn failed_fetch_surfaces_in_status_line() -> Result<()> {
        let server = ScriptedServer::start(vec![
            Reply::ok(dsv_testkit::token_body("tok")),
            Reply::json(500, "Internal Server Error"),
        ])?;
        let client = Client::new(options(server.base_url()))?;
        let credentials = Credentials::new("client", "secret")?;
        let ship_node = ShipNodeId::new("NODE-1");
        let store = Store::open_memory()?;
        store.bootstrap()?;

        let mut runtime = ApiRuntime::new(&client, &credentials, &ship_node).with_store(&store);
        let mut state = SessionState::default();
        refresh(&mut state, &mut runtime, week())?;

        assert!(state.rows().is_empty());
        assert!(
            state
                .status_line()
                .is_some_and(|status| status.starts_with("refresh incomplete") && status.contains("HTTP 500"))
        );
        assert_eq!(runtime.last_write(), None);
        assert_eq!(store.row_count()?, 0);
        server.finish()?;
        Ok(())
    }

    #[test]
    fn cache_runtime_reads_stored_rows_in_range() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let rows = OrderFaker::new(3).rows(40, datetime!(2026-03-10 23:00 UTC));
        store.write_rows(&rows)?;

        let range = week();
        let mut runtime = CacheRuntime::new(&store);
        let snapshot = runtime.load_snapshot(range)?;

        let expected = rows.iter().filter(|row| range.contains(row.order_date)).count();
        assert_eq!(snapshot.rows.len(), expected);
        assert!(snapshot.rows.iter().all(|row| range.contains(row.order_date)));
        assert!(snapshot.failure.is_none());
        Ok(())
    }
}
