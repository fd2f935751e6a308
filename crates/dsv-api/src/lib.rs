// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod error;
pub mod retry;
pub mod wire;

pub use error::{AuthError, FetchError};
pub use retry::RetryPolicy;
pub use wire::{ParsedCharges, ParsedPage, ShapeStats, parse_page};

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use dsv_app::{DateRange, Order, PartialResults, ShipNodeId, dedupe_orders, format_date};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://marketplace.walmartapis.com";
pub const DEFAULT_SERVICE_NAME: &str = "Walmart Marketplace";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: usize = 500;

const TOKEN_PATH: &str = "/v3/token";
const ORDERS_PATH: &str = "/v3/orders";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self> {
        if client_id.trim().is_empty() {
            bail!("api client id must not be empty -- set api.client_id or DSV_CLIENT_ID");
        }
        if client_secret.trim().is_empty() {
            bail!(
                "api client secret must not be empty -- set api.client_secret or DSV_CLIENT_SECRET"
            );
        }
        Ok(Self {
            client_id: client_id.trim().to_owned(),
            client_secret: client_secret.trim().to_owned(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn basic_authorization(&self) -> String {
        let pair = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", B64.encode(pair))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_in,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub base_url: String,
    pub service_name: String,
    pub timeout: Duration,
    pub page_size: u32,
    /// Pause before every page after the first.
    pub page_delay: Duration,
    pub max_pages: usize,
    pub retry: RetryPolicy,
    pub partial_results: PartialResults,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_secs(1),
            max_pages: DEFAULT_MAX_PAGES,
            retry: RetryPolicy::default(),
            partial_results: PartialResults::Discard,
        }
    }
}

/// Outcome of a paginated fetch. A failed page does not turn into an `Err`;
/// it is carried in `failure` next to whatever the partial-results policy
/// kept.
#[derive(Debug)]
pub struct FetchReport {
    pub orders: Vec<Order>,
    pub pages: usize,
    pub requests: usize,
    pub shape: ShapeStats,
    pub truncated: bool,
    pub failure: Option<FetchError>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.truncated
    }
}

enum PageOutcome {
    Body(Value),
    NotFound,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    options: ClientOptions,
    http: HttpClient,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let base_url = options.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        Url::parse(&base_url).with_context(|| format!("api.base_url {base_url:?} is not a URL"))?;
        if options.page_size == 0 {
            bail!("api.page_size must be positive");
        }
        if options.max_pages == 0 {
            bail!("api.max_pages must be positive");
        }
        if options.retry.max_attempts == 0 {
            bail!("fetch.retry.max_attempts must be at least 1");
        }

        let http = HttpClient::builder()
            .timeout(options.timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            options,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetch_token(&self, credentials: &Credentials) -> Result<AccessToken, AuthError> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);
        tracing::debug!(client_id = credentials.client_id(), "requesting access token");

        let response = self
            .with_service_headers(self.http.post(&url))
            .header("Authorization", credentials.basic_authorization())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(|source| AuthError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().map_err(|source| AuthError::Transport {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|_| AuthError::MissingToken)?;
        let token = parsed
            .access_token
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        tracing::info!(expires_in = ?parsed.expires_in, "access token acquired");
        Ok(AccessToken::new(
            token,
            parsed.expires_in.map(Duration::from_secs),
        ))
    }

    pub fn fetch_orders(
        &self,
        token: &AccessToken,
        ship_node: &ShipNodeId,
        range: DateRange,
    ) -> FetchReport {
        tracing::info!(
            ship_node = %ship_node,
            start = %range.start(),
            end = %range.end(),
            "fetching orders"
        );

        let mut collected = Vec::new();
        let mut shape = ShapeStats::default();
        let mut cursor: Option<String> = None;
        let mut page = 0usize;
        let mut pages = 0usize;
        let mut requests = 0usize;
        let mut truncated = false;
        let mut failure = None;

        loop {
            if page == self.options.max_pages {
                tracing::warn!(
                    max_pages = self.options.max_pages,
                    "stopping pagination at the page limit"
                );
                truncated = true;
                break;
            }
            page += 1;
            if page > 1 && !self.options.page_delay.is_zero() {
                thread::sleep(self.options.page_delay);
            }

            let url = match self.orders_url(ship_node, range, cursor.as_deref()) {
                Ok(url) => url,
                Err(source) => {
                    failure = Some(FetchError::Url { page, source });
                    break;
                }
            };

            match self.get_page(token, &url, page, &mut requests) {
                Ok(PageOutcome::NotFound) => {
                    tracing::debug!(page, "orders endpoint returned 404; no more pages");
                    break;
                }
                Ok(PageOutcome::Body(body)) => {
                    pages += 1;
                    let parsed = wire::parse_page(&body);
                    if !parsed.shape.is_clean() {
                        tracing::warn!(
                            page,
                            skipped_orders = parsed.shape.skipped_orders,
                            skipped_lines = parsed.shape.skipped_lines,
                            "skipped malformed entries"
                        );
                    }
                    tracing::debug!(page, orders = parsed.orders.len(), "page received");
                    shape.absorb(parsed.shape);
                    collected.extend(parsed.orders);
                    match parsed.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                Err(error) => {
                    tracing::warn!(page, %error, "order fetch aborted");
                    failure = Some(error);
                    break;
                }
            }
        }

        if failure.is_some() && self.options.partial_results == PartialResults::Discard {
            collected.clear();
        }

        FetchReport {
            orders: dedupe_orders(collected),
            pages,
            requests,
            shape,
            truncated,
            failure,
        }
    }

    fn orders_url(
        &self,
        ship_node: &ShipNodeId,
        range: DateRange,
        cursor: Option<&str>,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}{ORDERS_PATH}", self.base_url))?;
        match cursor {
            Some(query) if query.starts_with('?') => url.set_query(Some(&query[1..])),
            other => {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("shipNode", ship_node.as_str())
                    .append_pair("createdStartDate", &format_date(range.start()))
                    .append_pair("createdEndDate", &format_date(range.end()))
                    .append_pair("limit", &self.options.page_size.to_string());
                if let Some(cursor) = other {
                    pairs.append_pair("nextCursor", cursor);
                }
            }
        }
        Ok(url)
    }

    fn get_page(
        &self,
        token: &AccessToken,
        url: &Url,
        page: usize,
        requests: &mut usize,
    ) -> Result<PageOutcome, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            *requests += 1;

            let response = self
                .with_service_headers(self.http.get(url.clone()))
                .bearer_auth(token.as_str())
                .header("WM_SEC.ACCESS_TOKEN", token.as_str())
                .send()
                .map_err(|source| FetchError::Transport {
                    page,
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(PageOutcome::NotFound);
            }

            if status.is_success() {
                let body = response.text().map_err(|source| FetchError::Transport {
                    page,
                    url: url.to_string(),
                    source,
                })?;
                let value = serde_json::from_str(&body)
                    .map_err(|source| FetchError::Decode { page, source })?;
                return Ok(PageOutcome::Body(value));
            }

            let code = status.as_u16();
            if self.options.retry.is_retryable(code) {
                match self.options.retry.next_delay(code, attempt) {
                    Some(delay) => {
                        tracing::warn!(page, attempt, status = code, ?delay, "throttled; retrying");
                        thread::sleep(delay);
                        continue;
                    }
                    None => {
                        return Err(FetchError::RateLimited {
                            page,
                            attempts: attempt,
                        });
                    }
                }
            }

            let body = response.text().unwrap_or_default();
            return Err(FetchError::Status {
                page,
                status: code,
                detail: error_detail(&body),
            });
        }
    }

    fn with_service_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Accept", "application/json")
            .header("WM_SVC.NAME", self.options.service_name.as_str())
            .header("WM_QOS.CORRELATION_ID", uuid::Uuid::new_v4().to_string())
    }
}

/// Pulls a short description out of an error body, formatted as a suffix
/// (`": <text>"`) or empty when nothing useful is there.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let description = value
            .pointer("/errors/error/0/description")
            .or_else(|| value.pointer("/error/0/description"))
            .or_else(|| value.get("error_description"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty());
        if let Some(description) = description {
            return format!(": {description}");
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('{') {
        return format!(": {trimmed}");
    }
    String::new()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}
