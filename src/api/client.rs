use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::{ApiError, RaceSource};
use crate::logging::{self, obj, v_num, v_str, Domain, ProfileScope};
use crate::race::ApiResponse;

pub const DEFAULT_COUNT: u32 = 10;

/// HTTP client for the racing `nextraces` endpoint. One attempt per call;
/// the client-wide timeout aborts slow requests.
pub struct RacingApi {
    client: Client,
    base: String,
}

impl RacingApi {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base).map_err(|e| anyhow!("invalid racing API base {:?}: {}", base, e))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn next_races_url(&self, count: u32) -> String {
        format!("{}/?method=nextraces&count={}", self.base, count)
    }

    pub async fn get_next_races(&self, count: u32) -> Result<ApiResponse, ApiError> {
        let url = self.next_races_url(count);
        let scope = ProfileScope::with_context("next_races", &[("count", json!(count))]);

        let result = self.request(&url).await;
        match &result {
            Ok(resp) => logging::debug(
                Domain::Api,
                "next_races_ok",
                obj(&[
                    ("races", json!(resp.data.race_summaries.len())),
                    ("next_to_go", json!(resp.data.next_to_go_ids.len())),
                    ("elapsed_ms", v_num(scope.elapsed_ms())),
                ]),
            ),
            Err(e) => logging::warn(
                Domain::Api,
                "next_races_failed",
                obj(&[
                    ("msg", v_str(&e.to_string())),
                    ("kind", v_str(e.kind())),
                    ("url", v_str(&url)),
                    ("elapsed_ms", v_num(scope.elapsed_ms())),
                ]),
            ),
        }
        result
    }

    async fn request(&self, url: &str) -> Result<ApiResponse, ApiError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Http(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(|e| ApiError::from_transport(&e))?;
        parse_response(&body)
    }
}

#[async_trait]
impl RaceSource for RacingApi {
    async fn next_races(&self, count: u32) -> Result<ApiResponse, ApiError> {
        self.get_next_races(count).await
    }
}

/// Decode a response body, insisting on a non-null `data.race_summaries`.
pub fn parse_response(body: &[u8]) -> Result<ApiResponse, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ApiError::InvalidFormat)?;
    let has_summaries = value
        .get("data")
        .and_then(|d| d.get("race_summaries"))
        .map_or(false, |s| !s.is_null());
    if !has_summaries {
        return Err(ApiError::InvalidFormat);
    }
    let mut resp: ApiResponse =
        serde_json::from_value(value).map_err(|_| ApiError::InvalidFormat)?;
    for (key, race) in resp.data.race_summaries.iter_mut() {
        if race.race_id.is_empty() {
            race.race_id = key.clone();
        }
    }
    Ok(resp)
}
