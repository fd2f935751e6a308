// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Decoding of order pages. The upstream envelope has shifted between API
//! versions, so everything is read from `serde_json::Value` and malformed
//! entries are skipped one order or one line at a time.

use dsv_app::{LineItem, Order, PurchaseOrderId};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeStats {
    pub skipped_orders: usize,
    pub skipped_lines: usize,
}

impl ShapeStats {
    pub fn absorb(&mut self, other: Self) {
        self.skipped_orders += other.skipped_orders;
        self.skipped_lines += other.skipped_lines;
    }

    pub fn is_clean(&self) -> bool {
        self.skipped_orders == 0 && self.skipped_lines == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub orders: Vec<Order>,
    pub next_cursor: Option<String>,
    pub shape: ShapeStats,
}

pub fn parse_page(body: &Value) -> ParsedPage {
    let mut shape = ShapeStats::default();
    let orders = order_entries(body)
        .iter()
        .filter_map(|entry| {
            let parsed = parse_order(entry, &mut shape);
            if parsed.is_none() {
                shape.skipped_orders += 1;
            }
            parsed
        })
        .collect();

    ParsedPage {
        orders,
        next_cursor: next_cursor(body),
        shape,
    }
}

/// Charges come either as `{"charge": [...]}` or as a bare list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedCharges<'a> {
    Nested(&'a [Value]),
    List(&'a [Value]),
    Absent,
}

impl<'a> ParsedCharges<'a> {
    pub fn parse(value: Option<&'a Value>) -> Self {
        match value {
            Some(Value::Object(map)) => match map.get("charge") {
                Some(Value::Array(items)) => Self::Nested(items),
                Some(single @ Value::Object(_)) => Self::Nested(std::slice::from_ref(single)),
                _ => Self::Absent,
            },
            Some(Value::Array(items)) => Self::List(items),
            _ => Self::Absent,
        }
    }

    pub fn entries(self) -> &'a [Value] {
        match self {
            Self::Nested(items) | Self::List(items) => items,
            Self::Absent => &[],
        }
    }

    pub fn total(self) -> f64 {
        self.entries().iter().filter_map(charge_amount).sum()
    }
}

fn order_entries(body: &Value) -> &[Value] {
    body.pointer("/list/elements/order")
        .or_else(|| body.get("orders"))
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

fn next_cursor(body: &Value) -> Option<String> {
    body.pointer("/list/meta/nextCursor")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_owned)
}

fn parse_order(entry: &Value, shape: &mut ShapeStats) -> Option<Order> {
    entry.as_object()?;
    let purchase_order_id = entry.get("purchaseOrderId").and_then(text_value)?;
    let order_date = entry
        .get("orderDate")
        .and_then(parse_timestamp)
        .or_else(|| entry.get("purchaseDate").and_then(parse_timestamp))?;

    let lines = entry
        .pointer("/orderLines/orderLine")
        .or_else(|| entry.get("orderLines"))
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_object() {
            items.push(parse_line(line));
        } else {
            shape.skipped_lines += 1;
        }
    }

    Some(Order {
        purchase_order_id: PurchaseOrderId::new(purchase_order_id),
        order_date,
        lines: items,
    })
}

fn parse_line(line: &Value) -> LineItem {
    let sku = line.pointer("/item/sku").and_then(Value::as_str);
    let name = line.pointer("/item/productName").and_then(Value::as_str);
    let quantity = line
        .pointer("/orderLineQuantity/amount")
        .or_else(|| line.get("quantity"))
        .and_then(number_value);
    let charge_total = ParsedCharges::parse(line.get("charges")).total();
    LineItem::new(sku, name, quantity, charge_total)
}

fn charge_amount(charge: &Value) -> Option<f64> {
    match charge.get("chargeAmount")? {
        Value::Object(amount) => amount.get("amount").and_then(number_value),
        bare => number_value(bare),
    }
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Epoch milliseconds (number or digit string), RFC 3339, or a bare date.
/// Fractional millisecond numbers are truncated.
pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Number(number) => {
            let millis = match number.as_i64() {
                Some(millis) => millis,
                None => {
                    let raw = number.as_f64().filter(|raw| raw.is_finite())?;
                    if raw.abs() > i64::MAX as f64 {
                        return None;
                    }
                    raw.trunc() as i64
                }
            };
            from_epoch_millis(millis)
        }
        Value::String(text) => {
            let text = text.trim();
            if !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit()) {
                return from_epoch_millis(text.parse().ok()?);
            }
            if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
                return Some(value);
            }
            time::Date::parse(text, &format_description!("[year]-[month]-[day]"))
                .ok()
                .map(|date| date.midnight().assume_utc())
        }
        _ => None,
    }
}

fn from_epoch_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
