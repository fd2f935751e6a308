// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;

use crate::ids::*;

/// Placeholder for a SKU or product name the upstream order omitted.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub item_name: String,
    pub quantity: f64,
    pub charge_total: f64,
}

impl LineItem {
    /// Applies the upstream defaults: missing names become `N/A` and a
    /// missing, non-positive or non-finite quantity becomes 1.
    pub fn new(
        sku: Option<&str>,
        item_name: Option<&str>,
        quantity: Option<f64>,
        charge_total: f64,
    ) -> Self {
        Self {
            sku: text_or_placeholder(sku),
            item_name: text_or_placeholder(item_name),
            quantity: normalize_quantity(quantity),
            charge_total,
        }
    }

    pub fn unit_price(&self) -> f64 {
        self.charge_total / self.quantity.max(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub purchase_order_id: PurchaseOrderId,
    pub order_date: OffsetDateTime,
    pub lines: Vec<LineItem>,
}

impl Order {
    pub fn rows(&self) -> Vec<RowRecord> {
        self.lines
            .iter()
            .map(|line| RowRecord {
                purchase_order_id: self.purchase_order_id.clone(),
                sku: line.sku.clone(),
                item_name: line.item_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price(),
                order_date: self.order_date,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub purchase_order_id: PurchaseOrderId,
    pub sku: String,
    pub item_name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub order_date: OffsetDateTime,
}

impl RowRecord {
    pub fn line_total(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WritePolicy {
    /// Keep the stored row; later copies of the same order are dropped.
    #[default]
    InsertOrIgnore,
    /// Replace the stored row with the latest copy.
    Upsert,
}

impl WritePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsertOrIgnore => "ignore",
            Self::Upsert => "upsert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ignore" => Some(Self::InsertOrIgnore),
            "upsert" => Some(Self::Upsert),
            _ => None,
        }
    }
}

/// What a fetch hands back when a page fails after earlier pages succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartialResults {
    #[default]
    Discard,
    Keep,
}

impl PartialResults {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discard => "discard",
            Self::Keep => "keep",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "discard" => Some(Self::Discard),
            "keep" => Some(Self::Keep),
            _ => None,
        }
    }
}

/// Drops repeated purchase orders (first copy wins) and sorts newest first.
/// Orders sharing a timestamp keep their fetch order.
pub fn dedupe_orders<I>(orders: I) -> Vec<Order>
where
    I: IntoIterator<Item = Order>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<Order> = orders
        .into_iter()
        .filter(|order| seen.insert(order.purchase_order_id.clone()))
        .collect();
    unique.sort_by(|left, right| right.order_date.cmp(&left.order_date));
    unique
}

pub fn flatten_orders(orders: &[Order]) -> Vec<RowRecord> {
    orders.iter().flat_map(Order::rows).collect()
}

pub fn normalize_quantity(raw: Option<f64>) -> f64 {
    match raw {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => 1.0,
    }
}

fn text_or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => NOT_AVAILABLE.to_owned(),
    }
}
