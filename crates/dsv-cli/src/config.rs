// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use dsv_api::{ClientOptions, Credentials, DEFAULT_BASE_URL, DEFAULT_SERVICE_NAME, RetryPolicy};
use dsv_app::{DEFAULT_MAX_SPAN_DAYS, PartialResults, ShipNodeId, WritePolicy};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;

const CLIENT_ID_ENV: &str = "DSV_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "DSV_CLIENT_SECRET";
const SHIP_NODE_ENV: &str = "DSV_SHIP_NODE";
const BASE_URL_ENV: &str = "DSV_API_BASE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub storage: Storage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            fetch: Fetch::default(),
            storage: Storage::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub ship_node: Option<String>,
    pub service_name: Option<String>,
    pub page_size: Option<u32>,
    pub timeout: Option<String>,
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fetch {
    pub max_span_days: Option<i64>,
    pub page_delay: Option<String>,
    pub partial_results: Option<String>,
    #[serde(default)]
    pub retry: Retry,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Retry {
    pub max_attempts: Option<u32>,
    pub initial_backoff: Option<String>,
    pub max_backoff: Option<String>,
    pub multiplier: Option<u32>,
    pub statuses: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub enabled: Option<bool>,
    pub db_path: Option<String>,
    pub write_policy: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("DSV_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set DSV_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(dsv_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [api], [fetch], and [storage]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "config {} has version {}; expected 1",
                path.display(),
                self.version
            );
        }

        if let Some(base_url) = &self.api.base_url
            && base_url.trim().is_empty()
        {
            bail!("api.base_url in {} must not be empty", path.display());
        }

        if self.api.page_size == Some(0) {
            bail!("api.page_size in {} must be positive, got 0", path.display());
        }

        if self.api.max_pages == Some(0) {
            bail!("api.max_pages in {} must be positive, got 0", path.display());
        }

        if let Some(timeout) = &self.api.timeout
            && parse_duration(timeout)? <= Duration::ZERO
        {
            bail!(
                "api.timeout in {} must be positive, got {}",
                path.display(),
                timeout
            );
        }

        if let Some(days) = self.fetch.max_span_days
            && days <= 0
        {
            bail!(
                "fetch.max_span_days in {} must be positive, got {}",
                path.display(),
                days
            );
        }

        if let Some(delay) = &self.fetch.page_delay {
            parse_duration(delay)?;
        }
        if let Some(raw) = &self.fetch.partial_results
            && PartialResults::parse(raw).is_none()
        {
            bail!(
                "fetch.partial_results in {} must be \"discard\" or \"keep\", got {raw:?}",
                path.display()
            );
        }

        let retry = &self.fetch.retry;
        if retry.max_attempts == Some(0) {
            bail!(
                "fetch.retry.max_attempts in {} must be at least 1, got 0",
                path.display()
            );
        }
        if retry.multiplier == Some(0) {
            bail!(
                "fetch.retry.multiplier in {} must be at least 1, got 0",
                path.display()
            );
        }
        let policy = self.retry_policy()?;
        if policy.initial_backoff > policy.max_backoff {
            bail!(
                "fetch.retry.initial_backoff in {} must not exceed fetch.retry.max_backoff",
                path.display()
            );
        }

        if let Some(db_path) = &self.storage.db_path {
            dsv_db::validate_db_path(db_path)?;
        }
        if let Some(raw) = &self.storage.write_policy
            && WritePolicy::parse(raw).is_none()
        {
            bail!(
                "storage.write_policy in {} must be \"ignore\" or \"upsert\", got {raw:?}",
                path.display()
            );
        }

        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.api
            .base_url
            .clone()
            .or_else(|| env_value(BASE_URL_ENV))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
            .trim()
            .trim_end_matches('/')
            .to_owned()
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let client_id = self
            .api
            .client_id
            .clone()
            .or_else(|| env_value(CLIENT_ID_ENV))
            .unwrap_or_default();
        let client_secret = self
            .api
            .client_secret
            .clone()
            .or_else(|| env_value(CLIENT_SECRET_ENV))
            .unwrap_or_default();
        Credentials::new(&client_id, &client_secret)
    }

    pub fn ship_node(&self) -> Result<ShipNodeId> {
        self.api
            .ship_node
            .clone()
            .or_else(|| env_value(SHIP_NODE_ENV))
            .map(|node| node.trim().to_owned())
            .filter(|node| !node.is_empty())
            .map(ShipNodeId::new)
            .ok_or_else(|| {
                anyhow!("ship node is not configured -- set api.ship_node or {SHIP_NODE_ENV}")
            })
    }

    pub fn max_span_days(&self) -> i64 {
        self.fetch.max_span_days.unwrap_or(DEFAULT_MAX_SPAN_DAYS)
    }

    pub fn partial_results(&self) -> PartialResults {
        self.fetch
            .partial_results
            .as_deref()
            .and_then(PartialResults::parse)
            .unwrap_or_default()
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let defaults = RetryPolicy::default();
        let retry = &self.fetch.retry;
        Ok(RetryPolicy {
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: optional_duration(retry.initial_backoff.as_deref())?
                .unwrap_or(defaults.initial_backoff),
            multiplier: retry.multiplier.unwrap_or(defaults.multiplier),
            max_backoff: optional_duration(retry.max_backoff.as_deref())?
                .unwrap_or(defaults.max_backoff),
            retryable_statuses: retry
                .statuses
                .clone()
                .unwrap_or(defaults.retryable_statuses),
        })
    }

    pub fn client_options(&self) -> Result<ClientOptions> {
        let defaults = ClientOptions::default();
        Ok(ClientOptions {
            base_url: self.base_url(),
            service_name: self
                .api
                .service_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_owned()),
            timeout: optional_duration(self.api.timeout.as_deref())?.unwrap_or(defaults.timeout),
            page_size: self.api.page_size.unwrap_or(defaults.page_size),
            page_delay: optional_duration(self.fetch.page_delay.as_deref())?
                .unwrap_or(defaults.page_delay),
            max_pages: self.api.max_pages.unwrap_or(defaults.max_pages),
            retry: self.retry_policy()?,
            partial_results: self.partial_results(),
        })
    }

    pub fn storage_enabled(&self) -> bool {
        self.storage.enabled.unwrap_or(true)
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.storage
            .write_policy
            .as_deref()
            .and_then(WritePolicy::parse)
            .unwrap_or_default()
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => dsv_db::default_db_path(),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# dsv config\n# Place this file at: {}\n\nversion = 1\n\n[api]\n# Credentials are read from {CLIENT_ID_ENV} and {CLIENT_SECRET_ENV} when unset here.\n# client_id = \"\"\n# client_secret = \"\"\n# Ship node id; falls back to {SHIP_NODE_ENV}.\n# ship_node = \"\"\nbase_url = \"{}\"\nservice_name = \"{}\"\npage_size = {}\ntimeout = \"30s\"\nmax_pages = {}\n\n[fetch]\nmax_span_days = {}\npage_delay = \"1s\"\n# \"discard\" drops every page when a later page fails; \"keep\" returns what arrived.\npartial_results = \"discard\"\n\n[fetch.retry]\nmax_attempts = 4\ninitial_backoff = \"2s\"\nmax_backoff = \"30s\"\nmultiplier = 2\nstatuses = [429]\n\n[storage]\nenabled = true\n# Optional. Default is platform data dir (for example ~/.local/share/dsv/orders.db)\n# db_path = \"/absolute/path/to/orders.db\"\n# \"ignore\" keeps the first stored copy of an order; \"upsert\" keeps the latest.\nwrite_policy = \"ignore\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_SERVICE_NAME,
            dsv_api::DEFAULT_PAGE_SIZE,
            dsv_api::DEFAULT_MAX_PAGES,
            DEFAULT_MAX_SPAN_DAYS,
        )
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn optional_duration(raw: Option<&str>) -> Result<Option<Duration>> {
    raw.map(parse_duration).transpose()
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
