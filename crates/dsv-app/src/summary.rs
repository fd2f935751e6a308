// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, HashSet};
use time::Date;

use crate::RowRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct SalesSummary {
    pub total_sales: f64,
    pub distinct_skus: usize,
    pub order_count: usize,
    pub row_count: usize,
}

impl SalesSummary {
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a RowRecord>,
    {
        let mut total_sales = 0.0;
        let mut skus = HashSet::new();
        let mut orders = HashSet::new();
        let mut row_count = 0usize;
        for row in rows {
            total_sales += row.line_total();
            skus.insert(row.sku.as_str());
            orders.insert(row.purchase_order_id.as_str());
            row_count += 1;
        }

        Self {
            total_sales,
            distinct_skus: skus.len(),
            order_count: orders.len(),
            row_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySales {
    pub day: Date,
    pub total: f64,
}

/// Sales per calendar day (UTC), oldest day first.
pub fn daily_sales<'a, I>(rows: I) -> Vec<DailySales>
where
    I: IntoIterator<Item = &'a RowRecord>,
{
    let mut by_day: BTreeMap<Date, f64> = BTreeMap::new();
    for row in rows {
        *by_day.entry(row.order_date.date()).or_default() += row.line_total();
    }
    by_day
        .into_iter()
        .map(|(day, total)| DailySales { day, total })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{SalesSummary, daily_sales};
    use crate::{PurchaseOrderId, RowRecord};
    use time::OffsetDateTime;
    use time::macros::{date, datetime};

    fn row(po: &str, sku: &str, quantity: f64, unit_price: f64, at: OffsetDateTime) -> RowRecord {
        RowRecord {
            purchase_order_id: PurchaseOrderId::new(po),
            sku: sku.to_owned(),
            item_name: "Item".to_owned(),
            quantity,
            unit_price,
            order_date: at,
        }
    }

    #[test]
    fn summary_counts_distinct_orders_and_skus() {
        let rows = vec![
            row("1", "A", 2.0, 5.0, datetime!(2026-02-01 09:00 UTC)),
            row("1", "B", 1.0, 3.5, datetime!(2026-02-01 09:00 UTC)),
            row("2", "A", 1.0, 5.0, datetime!(2026-02-02 12:00 UTC)),
        ];

        let summary = SalesSummary::from_rows(&rows);
        assert_eq!(summary.order_count, 2);
        assert_eq!(summary.distinct_skus, 2);
        assert_eq!(summary.row_count, 3);
        assert!((summary.total_sales - 18.5).abs() < 1e-9);
    }

    #[test]
    fn empty_rows_summarize_to_zero() {
        let summary = SalesSummary::from_rows(&Vec::<RowRecord>::new());
        assert_eq!(summary.total_sales, 0.0);
        assert_eq!(summary.order_count, 0);
    }

    #[test]
    fn daily_sales_groups_by_calendar_day() {
        let rows = vec![
            row("3", "A", 1.0, 4.0, datetime!(2026-02-02 23:00 UTC)),
            row("1", "A", 2.0, 5.0, datetime!(2026-02-01 09:00 UTC)),
            row("2", "B", 1.0, 6.0, datetime!(2026-02-02 01:00 UTC)),
        ];

        let series = daily_sales(&rows);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].day, date!(2026 - 02 - 01));
        assert_eq!(series[0].total, 10.0);
        assert_eq!(series[1].day, date!(2026 - 02 - 02));
        assert_eq!(series[1].total, 10.0);
    }
}
