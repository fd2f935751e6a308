// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

/// Why a bearer token could not be obtained. Every variant aborts ingestion.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot reach token endpoint {url} -- check api.base_url and network access ({source})")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    #[error("token request rejected with HTTP {status}{detail} -- check the client id and secret")]
    Status { status: u16, detail: String },

    #[error("token response has no access_token")]
    MissingToken,
}

/// A page request that ended the fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("orders page {page}: cannot reach {url} ({source})")]
    Transport {
        page: usize,
        url: String,
        source: reqwest::Error,
    },

    #[error("orders page {page}: HTTP {status}{detail}")]
    Status {
        page: usize,
        status: u16,
        detail: String,
    },

    #[error("orders page {page}: still rate limited after {attempts} attempts")]
    RateLimited { page: usize, attempts: u32 },

    #[error("orders page {page}: response is not JSON ({source})")]
    Decode {
        page: usize,
        source: serde_json::Error,
    },

    #[error("orders page {page}: cannot build request URL ({source})")]
    Url {
        page: usize,
        source: url::ParseError,
    },
}

impl FetchError {
    pub fn page(&self) -> usize {
        match self {
            Self::Transport { page, .. }
            | Self::Status { page, .. }
            | Self::RateLimited { page, .. }
            | Self::Decode { page, .. }
            | Self::Url { page, .. } => *page,
        }
    }
}
