//! HTTP client for the webinar provider API.
//!
//! Handles pagination (token- and page-number-style), per-page bounded
//! retries with exponential backoff, rate-limit waits driven by the
//! `Retry-After` header, and the inter-page delay that keeps the client
//! under the provider's request budget.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::provider::types::{
    ParticipantPage, ProviderError, ProviderErrorKind, RawAttendance, RawWebinar, WebinarPage,
};

const MAX_TRANSIENT_DELAY_MS: u64 = 30_000;

/// Where the next page of a listing comes from
enum PageCursor {
    Start,
    Token(String),
    Number(u32),
}

/// Client for the provider REST API
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
    page_delay: Duration,
    page_retry_attempts: u32,
    rate_limit_backoff_seconds: u64,
}

impl ProviderClient {
    /// Create a new client against `base_url` with the given sync tuning
    pub fn new(base_url: &str, sync: &SyncConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: sync.page_size,
            page_delay: Duration::from_millis(sync.page_delay_ms),
            page_retry_attempts: sync.page_retry_attempts,
            rate_limit_backoff_seconds: sync.rate_limit_backoff_seconds,
        }
    }

    /// List all webinars for the authorized account, walking every page.
    ///
    /// Token-style pagination is preferred when the provider returns a
    /// `next_page_token`; otherwise `page_number`/`page_count` drives the
    /// walk. A page that keeps failing after the retry budget is skipped
    /// when the walk can continue without it, and ends the listing with
    /// partial results when it cannot. A first page that never succeeds
    /// propagates the error instead, so a dead provider is not mistaken
    /// for an empty account.
    pub async fn list_webinars(&self, token: &str) -> Result<Vec<RawWebinar>, ProviderError> {
        let mut all = Vec::new();
        let mut cursor = PageCursor::Start;
        let mut pages_fetched = 0u32;

        loop {
            let url = self.webinar_list_url(&cursor)?;
            let current_number = match &cursor {
                PageCursor::Number(n) => *n,
                _ => pages_fetched + 1,
            };

            match self.get_with_retry::<WebinarPage>(token, url).await {
                Ok(page) => {
                    pages_fetched += 1;
                    debug!(
                        page = current_number,
                        records = page.webinars.len(),
                        total = ?page.total_records,
                        "Fetched webinar page"
                    );
                    all.extend(page.webinars);

                    match page.next_page_token.filter(|t| !t.is_empty()) {
                        Some(next) => cursor = PageCursor::Token(next),
                        None => {
                            let has_more = page
                                .page_count
                                .zip(page.page_number)
                                .is_some_and(|(count, number)| number < count);
                            if has_more {
                                cursor = PageCursor::Number(page.page_number.unwrap_or(1) + 1);
                            } else {
                                break;
                            }
                        }
                    }
                }
                Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => {
                    return Err(err);
                }
                Err(err) => {
                    // Partial results are only acceptable once something was
                    // fetched; a dead provider fails the listing outright.
                    if pages_fetched == 0 {
                        return Err(err);
                    }
                    warn!(page = current_number, error = %err, "Skipping webinar page after exhausted retries");
                    match cursor {
                        // Page-number pagination can step over a bad page.
                        PageCursor::Number(n) => {
                            cursor = PageCursor::Number(n + 1);
                            pages_fetched += 1;
                        }
                        // Without the next token the walk cannot continue.
                        _ => break,
                    }
                }
            }

            sleep(self.page_delay).await;
        }

        Ok(all)
    }

    /// Fetch the detail payload for a single webinar
    pub async fn get_webinar_detail(
        &self,
        token: &str,
        webinar_id: &str,
    ) -> Result<RawWebinar, ProviderError> {
        let url = self.parse_url(&format!("{}/webinars/{}", self.base_url, webinar_id))?;
        self.get_with_retry(token, url).await
    }

    /// Fetch attendance from the report endpoint, all pages. When
    /// `occurrence_id` is set the query is scoped to that occurrence.
    pub(crate) async fn report_participants(
        &self,
        token: &str,
        webinar_id: &str,
        occurrence_id: Option<&str>,
    ) -> Result<Vec<RawAttendance>, ProviderError> {
        let url = format!(
            "{}/report/webinars/{}/participants",
            self.base_url, webinar_id
        );
        self.collect_participant_pages(token, &url, occurrence_id)
            .await
    }

    /// Fetch attendance from the basic past-webinar endpoint, all pages
    pub(crate) async fn past_participants(
        &self,
        token: &str,
        webinar_id: &str,
    ) -> Result<Vec<RawAttendance>, ProviderError> {
        let url = format!("{}/past_webinars/{}/participants", self.base_url, webinar_id);
        self.collect_participant_pages(token, &url, None).await
    }

    async fn collect_participant_pages(
        &self,
        token: &str,
        endpoint: &str,
        occurrence_id: Option<&str>,
    ) -> Result<Vec<RawAttendance>, ProviderError> {
        let mut all = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut url = self.parse_url(endpoint)?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("page_size", &self.page_size.to_string());
                if let Some(occurrence) = occurrence_id {
                    pairs.append_pair("occurrence_id", occurrence);
                }
                if let Some(token_value) = &next_token {
                    pairs.append_pair("next_page_token", token_value);
                }
            }

            match self.get_with_retry::<ParticipantPage>(token, url).await {
                Ok(page) => {
                    all.extend(page.participants);
                    match page.next_page_token.filter(|t| !t.is_empty()) {
                        Some(next) => next_token = Some(next),
                        None => break,
                    }
                }
                Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => {
                    return Err(err);
                }
                Err(err) => {
                    if all.is_empty() {
                        return Err(err);
                    }
                    // Token pagination cannot step over a failed page.
                    warn!(error = %err, "Ending participant listing with partial results");
                    break;
                }
            }

            sleep(self.page_delay).await;
        }

        Ok(all)
    }

    fn webinar_list_url(&self, cursor: &PageCursor) -> Result<Url, ProviderError> {
        let mut url = self.parse_url(&format!("{}/users/me/webinars", self.base_url))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page_size", &self.page_size.to_string());
            match cursor {
                PageCursor::Start => {}
                PageCursor::Token(token) => {
                    pairs.append_pair("next_page_token", token);
                }
                PageCursor::Number(number) => {
                    pairs.append_pair("page_number", &number.to_string());
                }
            }
        }
        Ok(url)
    }

    fn parse_url(&self, raw: &str) -> Result<Url, ProviderError> {
        Url::parse(raw).map_err(|e| ProviderError::permanent(format!("Invalid URL {}: {}", raw, e)))
    }

    /// Perform a GET with rate-limit waits and bounded transient retries.
    ///
    /// Rate-limit responses honor `Retry-After` (configured default when the
    /// header is missing or unparsable) and do not consume the retry budget;
    /// transient errors back off exponentially with jitter until the budget
    /// runs out. Unauthorized and permanent errors surface immediately.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        token: &str,
        url: Url,
    ) -> Result<T, ProviderError> {
        let mut attempts = 0u32;
        let mut delay = Duration::from_millis(500);

        loop {
            match self.get_json::<T>(token, url.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => match err.kind {
                    ProviderErrorKind::RateLimited { retry_after_secs } => {
                        let wait = retry_after_secs.unwrap_or(self.rate_limit_backoff_seconds);
                        warn!(retry_after_secs = wait, "Provider rate limit, waiting before resume");
                        sleep(Duration::from_secs(wait)).await;
                    }
                    ProviderErrorKind::Transient => {
                        attempts += 1;
                        if attempts >= self.page_retry_attempts {
                            return Err(err);
                        }
                        warn!(
                            attempt = attempts,
                            error = %err,
                            "Transient provider error, retrying after {:?}",
                            delay
                        );
                        sleep(delay).await;
                        let doubled = (delay.as_millis() as u64 * 2).min(MAX_TRANSIENT_DELAY_MS);
                        // ±25% jitter keeps concurrent retries from aligning.
                        let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
                        delay = Duration::from_millis((doubled as f64 * jitter_factor) as u64);
                    }
                    _ => return Err(err),
                },
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        url: Url,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            warn!(retry_after = ?retry_after, "Rate limited by provider API");
            return Err(ProviderError::rate_limited(retry_after));
        }

        if status.as_u16() == 401 {
            error!("Provider API authentication failed: 401 Unauthorized");
            return Err(ProviderError::unauthorized(
                "Provider authentication failed - token may be expired",
            ));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            warn!("Provider API server error: {} - {}", status, body);
            return Err(ProviderError::transient(format!(
                "Provider server error: {}",
                status
            )));
        }

        Err(ProviderError::permanent(format!(
            "Provider request failed: {} - {}",
            status, body
        )))
    }
}
