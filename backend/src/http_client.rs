//! Upstream HTTP boundary.
//!
//! Every provider client talks to the outside world through [`JsonFetcher`],
//! which turns a URL into parsed JSON or a soft failure. Some legacy endpoints
//! (blockchain.info `/q/*`) answer with a bare number instead of JSON, so a body
//! that fails JSON parsing is retried as a plain float before giving up.

use crate::error::{Result, SignalError};
use async_trait::async_trait;
use reqwest::{header, Client};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("btc-signal-backend/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// GET `url`, bounded by `timeout`
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Value>;
}

/// reqwest-backed fetcher shared by all provider clients
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Value> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SignalError::Timeout {
                        provider: host_of(url),
                    }
                } else {
                    SignalError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalError::provider(
                &host_of(url),
                format!("HTTP status {}", status),
            ));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                SignalError::Timeout {
                    provider: host_of(url),
                }
            } else {
                SignalError::Http(e)
            }
        })?;

        parse_body(&body)
    }
}

/// Parse a response body as JSON, falling back to a bare number
pub fn parse_body(body: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    body.trim()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| {
            let preview: String = body.chars().take(100).collect();
            SignalError::ParseError(format!("Unparseable body: {}", preview))
        })
}

/// Numeric field that may arrive as a JSON number or a numeric string
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Like [`as_number`] but keeps full precision for string-encoded prices
pub fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
pub mod testing {
    //! In-memory fetcher for provider tests

    use super::*;
    use std::sync::Mutex;

    enum Canned {
        Json(Value),
        Body(String),
        Fail(String),
    }

    /// Answers requests whose URL contains a registered fragment
    #[derive(Default)]
    pub struct StaticFetcher {
        routes: Vec<(String, Canned)>,
        calls: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn json(mut self, fragment: &str, value: Value) -> Self {
            self.routes.push((fragment.to_string(), Canned::Json(value)));
            self
        }

        /// Raw body, run through the same parsing as real responses
        pub fn body(mut self, fragment: &str, body: &str) -> Self {
            self.routes
                .push((fragment.to_string(), Canned::Body(body.to_string())));
            self
        }

        pub fn fail(mut self, fragment: &str, message: &str) -> Self {
            self.routes
                .push((fragment.to_string(), Canned::Fail(message.to_string())));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_matching(&self, fragment: &str) -> usize {
            self.calls().iter().filter(|u| u.contains(fragment)).count()
        }
    }

    #[async_trait]
    impl JsonFetcher for StaticFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Value> {
            self.calls.lock().unwrap().push(url.to_string());

            match self.routes.iter().find(|(fragment, _)| url.contains(fragment)) {
                Some((_, Canned::Json(value))) => Ok(value.clone()),
                Some((_, Canned::Body(body))) => parse_body(body),
                Some((_, Canned::Fail(message))) => Err(SignalError::provider(url, message.clone())),
                None => Err(SignalError::provider(url, "no route")),
            }
        }
    }
}
