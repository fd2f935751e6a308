// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use dsv_app::{LineItem, Order, PurchaseOrderId, RowRecord};
use serde_json::{Value, json};
use std::io::Read;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tiny_http::{Header, Response, Server};

const SKUS: [&str; 10] = [
    "LAMP-OAK-01",
    "LAMP-BRS-02",
    "RUG-5X7-GRY",
    "RUG-8X10-BLU",
    "MUG-SET-4",
    "KETTLE-STL",
    "TOWEL-BTH-6",
    "PILLOW-STD-2",
    "SHELF-WAL-3",
    "CLOCK-WAL-12",
];

const PRODUCT_NAMES: [&str; 10] = [
    "Oak Table Lamp",
    "Brass Floor Lamp",
    "Gray Area Rug 5x7",
    "Blue Area Rug 8x10",
    "Stoneware Mug Set",
    "Stainless Kettle",
    "Bath Towel 6-Pack",
    "Standard Pillow 2-Pack",
    "Floating Wall Shelf",
    "Wall Clock 12in",
];

/// How long a scripted server waits for a request before giving up.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn epoch_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// A line item using the `{"charges": {"charge": [...]}}` shape.
pub fn nested_line(sku: &str, name: &str, quantity: f64, charge: f64) -> Value {
    json!({
        "lineNumber": "1",
        "item": {"sku": sku, "productName": name},
        "orderLineQuantity": {"unitOfMeasurement": "EACH", "amount": quantity.to_string()},
        "charges": {"charge": [{
            "chargeType": "PRODUCT",
            "chargeName": "ItemPrice",
            "chargeAmount": {"currency": "USD", "amount": charge}
        }]}
    })
}

/// A line item using the bare `{"charges": [...]}` shape.
pub fn list_line(sku: &str, name: &str, quantity: f64, charge: f64) -> Value {
    json!({
        "item": {"sku": sku, "productName": name},
        "quantity": quantity,
        "charges": [{"chargeAmount": {"amount": charge}}]
    })
}

pub fn order_json(purchase_order_id: &str, at: OffsetDateTime, lines: Vec<Value>) -> Value {
    json!({
        "purchaseOrderId": purchase_order_id,
        "customerOrderId": format!("C-{purchase_order_id}"),
        "orderDate": epoch_millis(at),
        "shipNode": {"type": "3PLFulfilled"},
        "orderLines": {"orderLine": lines}
    })
}

pub fn orders_page(orders: Vec<Value>, next_cursor: Option<&str>) -> String {
    let mut meta = json!({"totalCount": orders.len(), "limit": 100});
    if let Some(cursor) = next_cursor {
        meta["nextCursor"] = json!(cursor);
    }
    json!({"list": {"meta": meta, "elements": {"order": orders}}}).to_string()
}

pub fn token_body(token: &str) -> String {
    json!({"access_token": token, "token_type": "Bearer", "expires_in": 900}).to_string()
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("dsv.db");
    Ok((dir, db_path))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::json(200, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }
}

/// Answers requests with a fixed list of replies, in order, and records
/// what it received. Stops after the last reply or after a quiet period.
pub struct ScriptedServer {
    base_url: String,
    handle: JoinHandle<Result<Vec<RecordedRequest>>>,
}

impl ScriptedServer {
    pub fn start(replies: Vec<Reply>) -> Result<Self> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let base_url = format!("http://{}", server.server_addr());

        let handle = thread::spawn(move || -> Result<Vec<RecordedRequest>> {
            let mut recorded = Vec::with_capacity(replies.len());
            for reply in replies {
                let Some(mut request) = server
                    .recv_timeout(RECV_TIMEOUT)
                    .context("receive mock request")?
                else {
                    break;
                };

                let mut body = String::new();
                request
                    .as_reader()
                    .read_to_string(&mut body)
                    .context("read mock request body")?;
                recorded.push(RecordedRequest {
                    method: request.method().to_string(),
                    url: request.url().to_owned(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|header| {
                            (
                                header.field.as_str().as_str().to_owned(),
                                header.value.as_str().to_owned(),
                            )
                        })
                        .collect(),
                    body,
                });

                let content_type = Header::from_bytes("Content-Type", "application/json")
                    .map_err(|()| anyhow!("invalid content type header"))?;
                let response = Response::from_string(reply.body)
                    .with_status_code(reply.status)
                    .with_header(content_type);
                request.respond(response).context("send mock response")?;
            }
            Ok(recorded)
        });

        Ok(Self { base_url, handle })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn finish(self) -> Result<Vec<RecordedRequest>> {
        self.handle
            .join()
            .map_err(|_| anyhow!("mock server thread panicked"))?
    }
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Deterministic orders placed at or before `now`, newest first.
#[derive(Debug, Clone)]
pub struct OrderFaker {
    rng: DeterministicRng,
    next_id: u64,
}

impl OrderFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 1_000_000 + normalized % 1000,
        }
    }

    pub fn line(&mut self) -> LineItem {
        let index = self.rng.int_n(SKUS.len());
        let quantity = 1 + self.rng.int_n(4);
        let unit_cents = 499 + self.rng.int_n(9_500);
        let total = (unit_cents * quantity) as f64 / 100.0;
        LineItem::new(
            Some(SKUS[index]),
            Some(PRODUCT_NAMES[index]),
            Some(quantity as f64),
            total,
        )
    }

    pub fn order_at(&mut self, at: OffsetDateTime) -> Order {
        let purchase_order_id = PurchaseOrderId::new(self.next_id.to_string());
        self.next_id += 1;
        let line_count = 1 + self.rng.int_n(3);
        Order {
            purchase_order_id,
            order_date: at,
            lines: (0..line_count).map(|_| self.line()).collect(),
        }
    }

    pub fn orders(&mut self, count: usize, now: OffsetDateTime) -> Vec<Order> {
        let mut at = now;
        (0..count)
            .map(|_| {
                let minutes = 5 + self.rng.int_n(600) as i64;
                at -= TimeDuration::minutes(minutes);
                self.order_at(at)
            })
            .collect()
    }

    /// First line of each order, which is what a store keyed by purchase
    /// order keeps.
    pub fn rows(&mut self, count: usize, now: OffsetDateTime) -> Vec<RowRecord> {
        self.orders(count, now)
            .iter()
            .filter_map(|order| order.rows().into_iter().next())
            .collect()
    }
}

pub fn skus() -> &'static [&'static str] {
    &SKUS
}
