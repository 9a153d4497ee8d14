// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Partner hub client: number inventory and channel lifecycle.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use wapipe_cloud::classify;
use wapipe_core::WapipeError;
use wapipe_core::types::{
    AccountStatus, AvailableNumber, NumberQuery, ProvisionRequest, ProvisionedNumber, UsagePeriod,
    UsageStats, VerificationMethod,
};

/// Client for `{hub_url}/partners/{partner_id}/...`.
#[derive(Clone)]
pub struct PartnerHub {
    client: reqwest::Client,
    base_url: String,
    partner_id: String,
}

#[derive(Debug, Deserialize)]
struct NumberList {
    #[serde(default)]
    numbers: Vec<AvailableNumber>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    phone_number: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    quality_rating: Option<String>,
    #[serde(default)]
    messaging_limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    sent: u64,
    #[serde(default)]
    delivered: u64,
    #[serde(default)]
    read: Option<u64>,
    #[serde(default)]
    failed: Option<u64>,
}

impl PartnerHub {
    pub fn new(hub_url: &str, partner_id: &str, partner_token: &str) -> Result<Self, WapipeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {partner_token}"))
                .map_err(|e| WapipeError::Config(format!("invalid partner token header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WapipeError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: hub_url.trim_end_matches('/').to_string(),
            partner_id: partner_id.to_string(),
        })
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/partners/{}/{path}", self.base_url, self.partner_id);
        self.client.request(method, url)
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response, WapipeError> {
        let response = request.send().await.map_err(|e| WapipeError::Provider {
            message: format!("partner hub {operation} failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(operation, status = %response.status(), "partner hub response");
        Ok(response)
    }

    async fn error(response: Response, operation: &str) -> WapipeError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (_, message) = classify::parse_error(status, &body);
        WapipeError::provider(format!("partner hub {operation} rejected: {message}"))
    }

    async fn json<T: for<'de> Deserialize<'de>>(
        response: Response,
        operation: &str,
    ) -> Result<T, WapipeError> {
        if !response.status().is_success() {
            return Err(Self::error(response, operation).await);
        }
        response.json().await.map_err(|e| WapipeError::Provider {
            message: format!("failed to parse partner hub {operation} response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    pub async fn available_numbers(
        &self,
        query: &NumberQuery,
    ) -> Result<Vec<AvailableNumber>, WapipeError> {
        let mut params = vec![("country_code", query.country_code.clone())];
        if let Some(area) = &query.area_code {
            params.push(("area_code", area.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let request = self
            .request(Method::GET, "numbers/available")
            .query(&params);
        let response = self.send(request, "available_numbers").await?;
        let list: NumberList = Self::json(response, "available_numbers").await?;
        Ok(list.numbers)
    }

    pub async fn create_channel(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedNumber, WapipeError> {
        let body = json!({
            "phone_number": request.phone_number,
            "display_name": request.display_name,
            "client_reference": request.tenant_id,
        });
        let response = self
            .send(self.request(Method::POST, "channels").json(&body), "provision_number")
            .await?;
        let channel: Channel = Self::json(response, "provision_number").await?;
        info!(
            channel_id = %channel.id,
            tenant_id = %request.tenant_id,
            "number provisioned"
        );
        Ok(ProvisionedNumber {
            number_id: channel.id,
            phone_number: channel.phone_number,
            status: channel.status.unwrap_or_else(|| "pending".into()),
        })
    }

    pub async fn delete_channel(&self, channel_id: &str) -> Result<(), WapipeError> {
        let response = self
            .send(
                self.request(Method::DELETE, &format!("channels/{channel_id}")),
                "release_number",
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::error(response, "release_number").await);
        }
        info!(channel_id, "number released");
        Ok(())
    }

    pub async fn request_code(
        &self,
        channel_id: &str,
        method: VerificationMethod,
    ) -> Result<(), WapipeError> {
        let request = self
            .request(Method::POST, &format!("channels/{channel_id}/request_code"))
            .json(&json!({ "code_method": method }));
        let response = self.send(request, "send_verification_code").await?;
        if !response.status().is_success() {
            return Err(Self::error(response, "send_verification_code").await);
        }
        Ok(())
    }

    /// `false` when the hub rejects the code; other failures are errors.
    pub async fn verify_code(&self, channel_id: &str, code: &str) -> Result<bool, WapipeError> {
        let request = self
            .request(Method::POST, &format!("channels/{channel_id}/verify_code"))
            .json(&json!({ "code": code }));
        let response = self.send(request, "verify_code").await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(channel_id, "verification code rejected");
                Ok(false)
            }
            _ => Err(Self::error(response, "verify_code").await),
        }
    }

    pub async fn channel_status(&self, channel_id: &str) -> Result<AccountStatus, WapipeError> {
        let response = self
            .send(
                self.request(Method::GET, &format!("channels/{channel_id}")),
                "account_status",
            )
            .await?;
        let channel: Channel = Self::json(response, "account_status").await?;
        Ok(AccountStatus {
            connected: channel
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("ready") || s.eq_ignore_ascii_case("live")),
            display_phone_number: Some(channel.phone_number),
            verified_name: channel.display_name,
            quality_rating: channel.quality_rating,
            messaging_limit: channel.messaging_limit,
            status: channel.status,
        })
    }

    pub async fn usage(
        &self,
        channel_id: &str,
        period: UsagePeriod,
    ) -> Result<UsageStats, WapipeError> {
        let request = self
            .request(Method::GET, &format!("channels/{channel_id}/usage"))
            .query(&[
                ("start", period.start.timestamp()),
                ("end", period.end.timestamp()),
            ]);
        let response = self.send(request, "usage_stats").await?;
        let usage: Usage = Self::json(response, "usage_stats").await?;
        Ok(UsageStats {
            period,
            sent: usage.sent,
            delivered: usage.delivered,
            read: usage.read,
            failed: usage.failed,
        })
    }
}

impl std::fmt::Debug for PartnerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartnerHub")
            .field("base_url", &self.base_url)
            .field("partner_id", &self.partner_id)
            .finish_non_exhaustive()
    }
}
