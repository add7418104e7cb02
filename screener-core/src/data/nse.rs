//! NSE India data provider.
//!
//! Fetches daily equity history from the `historical/cm/equity` CSV endpoint and
//! the index constituent snapshot (last traded prices). Handles request pacing,
//! fixed-delay retries, the "looks like CSV" sanity check and periodic session
//! refresh.
//!
//! NSE has no public API contract. Non-CSV bodies (HTML block pages, JSON
//! errors) are treated as retryable failures.

use super::provider::{DataError, MarketDataProvider, RawTable};
use super::session::{RequestThrottle, SessionPolicy};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and politeness settings for the NSE endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NseConfig {
    pub historical_url: String,
    pub snapshot_url: String,
    /// Visited when a session is (re)built so the provider hands out cookies.
    pub home_url: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Fixed gap between consecutive requests on one client.
    pub request_delay_ms: u64,
    /// Fixed gap before each retry attempt.
    pub retry_delay_ms: u64,
    pub max_attempts: u32,
    /// Rebuild the session after this many requests (0 = never).
    pub session_refresh_after: u32,
}

impl Default for NseConfig {
    fn default() -> Self {
        Self {
            historical_url: "https://www.nseindia.com/api/historical/cm/equity".into(),
            snapshot_url: "https://www.nseindia.com/api/equity-stockIndices?csv=true&index=NIFTY%20TOTAL%20MARKET&selectValFormat=crores".into(),
            home_url: Some("https://www.nseindia.com/".into()),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".into(),
            timeout_secs: 15,
            request_delay_ms: 3_000,
            retry_delay_ms: 6_000,
            max_attempts: 3,
            session_refresh_after: 15,
        }
    }
}

/// NSE data provider. One instance per worker thread.
pub struct NseProvider {
    config: NseConfig,
    client: Client,
    throttle: RequestThrottle,
    session: SessionPolicy,
}

impl NseProvider {
    pub fn new(config: NseConfig) -> Result<Self, DataError> {
        let client = build_client(&config)?;
        Ok(Self {
            throttle: RequestThrottle::new(Duration::from_millis(config.request_delay_ms)),
            session: SessionPolicy::new(config.session_refresh_after),
            client,
            config,
        })
    }

    pub fn config(&self) -> &NseConfig {
        &self.config
    }

    /// Format a date the way the historical endpoint expects (DD-MM-YYYY).
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%d-%m-%Y").to_string()
    }

    /// Query parameters for one historical request.
    pub fn history_query(symbol: &str, from: NaiveDate, to: NaiveDate) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", symbol.to_string()),
            ("series", "[\"EQ\"]".to_string()),
            ("from", Self::format_date(from)),
            ("to", Self::format_date(to)),
            ("csv", "true".to_string()),
        ]
    }

    /// Build a fresh client and visit the home page to pick up session cookies.
    fn refresh_session(&mut self) -> Result<(), DataError> {
        tracing::info!("refreshing provider session");
        self.client = build_client(&self.config)?;
        if let Some(home) = self.config.home_url.clone() {
            self.throttle.wait();
            let result = self.client.get(&home).send().and_then(|resp| {
                let status = resp.status();
                resp.bytes().map(|_| status)
            });
            self.throttle.mark_done();
            match result {
                Ok(status) if status.is_success() => {}
                Ok(status) => tracing::warn!("session warm-up returned HTTP {status}"),
                Err(e) => tracing::warn!("session warm-up failed: {e}"),
            }
        }
        self.session.mark_refreshed();
        Ok(())
    }

    /// One paced GET returning the body text. Any non-2xx status is an error.
    fn get_text(
        &mut self,
        url: &str,
        query: &[(&'static str, String)],
        target: &str,
    ) -> Result<String, DataError> {
        if self.session.needs_refresh() {
            self.refresh_session()?;
        }

        self.throttle.wait();
        tracing::debug!("GET {url} for {target}");
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let result = request.send().and_then(|resp| {
            let status = resp.status();
            resp.text().map(|body| (status, body))
        });
        self.throttle.mark_done();
        self.session.record_use();

        let (status, body) = result.map_err(|e| DataError::NetworkFailure(e.to_string()))?;
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                target: target.to_string(),
            });
        }
        Ok(body)
    }

    /// Execute a request with the fixed-delay retry policy and the tabular body check.
    fn fetch_with_retry(
        &mut self,
        url: &str,
        query: &[(&'static str, String)],
        target: &str,
    ) -> Result<String, DataError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                std::thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
            }

            match self.get_text(url, query, target) {
                Ok(body) if looks_tabular(&body) => return Ok(body),
                Ok(body) => {
                    let preview: String = body.chars().take(100).collect();
                    tracing::warn!("non-CSV response for {target} (attempt {attempt}/{attempts}): {preview}");
                    last_error = Some(DataError::MalformedResponse(format!(
                        "non-CSV body for {target}: {preview}"
                    )));
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("request for {target} failed (attempt {attempt}/{attempts}): {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl MarketDataProvider for NseProvider {
    fn name(&self) -> &str {
        "nse_india"
    }

    fn fetch_history(
        &mut self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RawTable, DataError> {
        let url = self.config.historical_url.clone();
        let query = Self::history_query(symbol, from, to);
        let body = self.fetch_with_retry(&url, &query, symbol)?;
        RawTable::from_csv_text(&body)
    }

    fn fetch_snapshot(&mut self) -> Result<RawTable, DataError> {
        let url = self.config.snapshot_url.clone();
        let body = self.fetch_with_retry(&url, &[], "market snapshot")?;
        RawTable::from_csv_text(&body)
    }
}

fn build_client(config: &NseConfig) -> Result<Client, DataError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .cookie_store(true)
        .build()
        .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))
}

/// Sanity check for CSV bodies: a `Date,` header or at least one comma.
pub fn looks_tabular(body: &str) -> bool {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    !trimmed.is_empty() && (trimmed.starts_with("Date,") || trimmed.contains(','))
}
