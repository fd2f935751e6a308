// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use dsv_app::{RowRecord, SalesSummary, SessionState, daily_sales, format_date};
use dsv_db::WriteSummary;
use std::fmt::Write as _;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const COLUMNS: [&str; 7] = [
    "purchase_order_id",
    "sku",
    "item_name",
    "quantity",
    "unit_price",
    "line_total",
    "order_date",
];

/// Plain-text report: summary metrics, daily sales, then the filtered rows.
pub fn render_report(state: &SessionState, write: Option<WriteSummary>) -> String {
    let mut out = String::new();
    let Some(snapshot) = state.snapshot() else {
        out.push_str("no orders loaded\n");
        return out;
    };

    let _ = writeln!(
        out,
        "Orders {} .. {} (as of {})",
        format_date(snapshot.range.start()),
        format_date(snapshot.range.end()),
        format_timestamp(snapshot.fetched_at)
    );
    if let Some(status) = state.status_line() {
        let _ = writeln!(out, "Status: {status}");
    }
    if let Some(write) = write {
        let _ = writeln!(
            out,
            "Stored: {} new, {} updated, {} already present",
            write.written, write.updated, write.ignored
        );
    }
    let filter = state.filter();
    if !filter.is_empty() {
        let mut parts = Vec::new();
        if let Some(sku) = &filter.sku {
            parts.push(format!("sku contains {sku:?}"));
        }
        if let Some(day) = filter.day {
            parts.push(format!("day {}", format_date(day)));
        }
        let _ = writeln!(out, "Filter: {}", parts.join(", "));
    }

    let visible = state.visible_rows();
    let summary = SalesSummary::from_rows(visible.iter().copied());
    out.push('\n');
    let _ = writeln!(out, "Total sales:   {}", format_money(summary.total_sales));
    let _ = writeln!(out, "Distinct SKUs: {}", summary.distinct_skus);
    let _ = writeln!(out, "Orders:        {}", summary.order_count);
    let _ = writeln!(out, "Rows:          {}", summary.row_count);

    out.push_str("\nDaily sales\n");
    let days = daily_sales(visible.iter().copied());
    if days.is_empty() {
        out.push_str("(no sales)\n");
    }
    for day in days {
        let _ = writeln!(out, "{}  {}", format_date(day.day), format_money(day.total));
    }

    out.push('\n');
    out.push_str(&format_rows_table(&visible));
    out
}

fn format_rows_table(rows: &[&RowRecord]) -> String {
    if rows.is_empty() {
        return "(no rows)\n".to_owned();
    }

    let cells: Vec<[String; 7]> = rows
        .iter()
        .map(|row| {
            [
                row.purchase_order_id.to_string(),
                row.sku.clone(),
                row.item_name.clone(),
                format_quantity(row.quantity),
                format_money(row.unit_price),
                format_money(row.line_total()),
                format_timestamp(row.order_date),
            ]
        })
        .collect();

    let mut widths = COLUMNS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, COLUMNS.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    push_line(&mut out, rule.iter().map(String::as_str), &widths);
    for row in &cells {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a, I>(out: &mut String, cells: I, widths: &[usize])
where
    I: IntoIterator<Item = &'a str>,
{
    let line = cells
        .into_iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ");
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn format_money(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let (sign, cents) = if cents < 0 {
        ("-", cents.saturating_neg())
    } else {
        ("", cents)
    };
    format!("{sign}${}.{:02}", comma_format(cents / 100), cents % 100)
}

fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        format!("{quantity:.2}")
    }
}

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .to_offset(UtcOffset::UTC)
        .format(&format_description!("[year]-[month]-[day] [hour]:[minute]Z"))
        .unwrap_or_else(|_| value.to_string())
}

fn comma_format(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{format_money, format_quantity, render_report};
    use dsv_app::{AppCommand, DateRange, PurchaseOrderId, RowRecord, SessionState, Snapshot};
    use dsv_db::WriteSummary;
    use time::OffsetDateTime;
    use time::macros::{date, datetime};

    fn row(id: &str, sku: &str, quantity: f64, unit_price: f64, at: OffsetDateTime) -> RowRecord {
        RowRecord {
            purchase_order_id: PurchaseOrderId::new(id),
            sku: sku.to_owned(),
            item_name: format!("{sku} item"),
            quantity,
            unit_price,
            order_date: at,
        }
    }

    fn loaded_state() -> SessionState {
        let today = date!(2026 - 03 - 10);
        let mut state = SessionState::default();
        state.replace_snapshot(Snapshot {
            range: DateRange::new(date!(2026 - 03 - 01), today, today, 180).expect("valid range"),
            fetched_at: datetime!(2026-03-10 12:00 UTC),
            rows: vec![
                row("3", "RUG-5X7", 3.0, 3.0, datetime!(2026-03-03 10:00 UTC)),
                row("2", "LAMP-OAK", 1.0, 5.0, datetime!(2026-03-02 10:00 UTC)),
                row("1", "LAMP-OAK", 2.0, 5.0, datetime!(2026-03-01 10:00 UTC)),
            ],
            failure: None,
        });
        state
    }

    #[test]
    fn money_uses_commas_and_two_decimals() {
        assert_eq!(format_money(0.0), "$0.00");
        assert_eq!(format_money(9.99), "$9.99");
        assert_eq!(format_money(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_money(-12.5), "-$12.50");
    }

    #[test]
    fn quantity_drops_trailing_zeroes_for_whole_numbers() {
        assert_eq!(format_quantity(2.0), "2");
        assert_eq!(format_quantity(0.5), "0.50");
    }

    #[test]
    fn report_lists_metrics_then_days_then_rows() {
        let report = render_report(
            &loaded_state(),
            Some(WriteSummary {
                written: 2,
                updated: 0,
                ignored: 1,
            }),
        );

        assert!(report.starts_with("Orders 2026-03-01 .. 2026-03-10 (as of 2026-03-10 12:00Z)"));
        assert!(report.contains("Status: loaded 3 rows"));
        assert!(report.contains("Stored: 2 new, 0 updated, 1 already present"));
        assert!(report.contains("Total sales:   $24.00"));
        assert!(report.contains("Distinct SKUs: 2"));
        assert!(report.contains("Orders:        3"));

        let metrics = report.find("Total sales").unwrap_or(usize::MAX);
        let daily = report.find("Daily sales").unwrap_or(usize::MAX);
        let table = report.find("purchase_order_id").unwrap_or(usize::MAX);
        assert!(metrics < daily && daily < table);
        assert!(report.contains("2026-03-01  $10.00"));

        let first_row = report
            .lines()
            .find(|line| line.starts_with('3'))
            .unwrap_or_default();
        assert!(first_row.contains("RUG-5X7"));
        assert!(first_row.contains("$9.00"));
    }

    #[test]
    fn filters_apply_to_metrics_and_rows() {
        let mut state = loaded_state();
        state.dispatch(AppCommand::SetSkuFilter(Some("lamp".to_owned())));
        state.dispatch(AppCommand::SetDayFilter(Some(date!(2026 - 03 - 02))));

        let report = render_report(&state, None);
        assert!(report.contains("Filter: sku contains \"lamp\", day 2026-03-02"));
        assert!(report.contains("Total sales:   $5.00"));
        assert!(report.contains("Rows:          1"));
        assert!(!report.contains("RUG-5X7"));
        assert!(!report.contains("Stored:"));
    }

    #[test]
    fn empty_session_says_so() {
        assert_eq!(render_report(&SessionState::default(), None), "no orders loaded\n");
    }

    #[test]
    fn empty_snapshot_renders_placeholders() {
        let today = date!(2026 - 03 - 10);
        let mut state = SessionState::default();
        state.replace_snapshot(Snapshot {
            range: DateRange::new(today, today, today, 180).expect("valid range"),
            fetched_at: datetime!(2026-03-10 12:00 UTC),
            rows: Vec::new(),
            failure: Some("orders page 2: HTTP 500".to_owned()),
        });

        let report = render_report(&state, None);
        assert!(report.contains("Status: refresh incomplete: orders page 2: HTTP 500"));
        assert!(report.contains("(no sales)"));
        assert!(report.contains("(no rows)"));
    }
}
