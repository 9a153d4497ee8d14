// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Number provisioning through the 360dialog partner hub.

use chrono::{TimeZone, Utc};
use serde_json::json;
use wapipe_config::Dialog360Settings;
use wapipe_core::types::{
    NumberQuery, ProvisionRequest, UsagePeriod, VerificationMethod,
};
use wapipe_core::{Capability, ProviderAdapter, WapipeError};
use wapipe_dialog360::Dialog360Provider;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn partner_settings(hub: &MockServer) -> Dialog360Settings {
    Dialog360Settings {
        api_key: "d360-key".into(),
        channel_id: Some("ch-42".into()),
        partner_id: Some("p-7".into()),
        partner_token: Some("partner-token".into()),
        webhook_secret: None,
        messaging_url: "http://unused".into(),
        hub_url: format!("{}/api/v2", hub.uri()),
    }
}

fn supported<T>(capability: Capability<T>) -> T {
    match capability {
        Capability::Supported(value) => value,
        Capability::Unsupported(op) => panic!("unexpectedly unsupported: {op}"),
    }
}

#[tokio::test]
async fn lists_available_numbers() {
    let hub = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/partners/p-7/numbers/available"))
        .and(header("authorization", "Bearer partner-token"))
        .and(query_param("country_code", "49"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "numbers": [
                { "phone_number": "4930111111", "country_code": "49", "monthly_cost": 4.5 },
                { "phone_number": "4930222222", "country_code": "49" }
            ]
        })))
        .expect(1)
        .mount(&hub)
        .await;

    let provider = Dialog360Provider::new(partner_settings(&hub)).unwrap();
    assert!(provider.supports_provisioning());
    let numbers = supported(
        provider
            .available_numbers(&NumberQuery {
                country_code: "49".into(),
                area_code: None,
                limit: Some(2),
            })
            .await
            .unwrap(),
    );
    assert_eq!(numbers.len(), 2);
    assert_eq!(numbers[0].monthly_cost, Some(4.5));
    assert_eq!(numbers[1].monthly_cost, None);
}

#[tokio::test]
async fn provisions_and_releases_a_channel() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/partners/p-7/channels"))
        .and(body_json(json!({
            "phone_number": "4930111111",
            "display_name": "Acme Support",
            "client_reference": "acme",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ch-99",
            "phone_number": "4930111111"
        })))
        .expect(1)
        .mount(&hub)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/partners/p-7/channels/ch-99"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&hub)
        .await;

    let provider = Dialog360Provider::new(partner_settings(&hub)).unwrap();
    let provisioned = supported(
        provider
            .provision_number(&ProvisionRequest {
                phone_number: "4930111111".into(),
                display_name: "Acme Support".into(),
                tenant_id: "acme".into(),
            })
            .await
            .unwrap(),
    );
    assert_eq!(provisioned.number_id, "ch-99");
    assert_eq!(provisioned.status, "pending");

    supported(provider.release_number("ch-99").await.unwrap());
}

#[tokio::test]
async fn verification_code_flow() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/partners/p-7/channels/ch-99/request_code"))
        .and(body_json(json!({ "code_method": "SMS" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&hub)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/partners/p-7/channels/ch-99/verify_code"))
        .and(body_json(json!({ "code": "123456" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&hub)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/partners/p-7/channels/ch-99/verify_code"))
        .and(body_json(json!({ "code": "000000" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "meta": { "http_code": 400, "developer_message": "Wrong code" }
        })))
        .mount(&hub)
        .await;

    let provider = Dialog360Provider::new(partner_settings(&hub)).unwrap();
    supported(
        provider
            .send_verification_code("ch-99", VerificationMethod::Sms)
            .await
            .unwrap(),
    );
    assert!(supported(provider.verify_code("ch-99", "123456").await.unwrap()));
    assert!(!supported(provider.verify_code("ch-99", "000000").await.unwrap()));
}

#[tokio::test]
async fn hub_outage_is_an_error_not_a_rejection() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "meta": { "http_code": 500, "developer_message": "Internal error" }
        })))
        .mount(&hub)
        .await;

    let provider = Dialog360Provider::new(partner_settings(&hub)).unwrap();
    let err = provider.verify_code("ch-99", "123456").await.unwrap_err();
    assert!(matches!(err, WapipeError::Provider { .. }));
    assert!(err.to_string().contains("Internal error"));
}

#[tokio::test]
async fn account_status_and_usage_use_the_configured_channel() {
    let hub = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/partners/p-7/channels/ch-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ch-42",
            "phone_number": "4930111111",
            "status": "ready",
            "display_name": "Acme Support",
            "quality_rating": "GREEN",
            "messaging_limit": "TIER_1K"
        })))
        .mount(&hub)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/partners/p-7/channels/ch-42/usage"))
        .and(query_param("start", "1767225600"))
        .and(query_param("end", "1767312000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sent": 120,
            "delivered": 117,
            "read": 90
        })))
        .mount(&hub)
        .await;

    let provider = Dialog360Provider::new(partner_settings(&hub)).unwrap();
    let status = supported(provider.account_status().await.unwrap());
    assert!(status.connected);
    assert_eq!(status.quality_rating.as_deref(), Some("GREEN"));

    let period = UsagePeriod {
        start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
    };
    let usage = supported(provider.usage_stats(period).await.unwrap());
    assert_eq!(usage.sent, 120);
    assert_eq!(usage.delivered, 117);
    assert_eq!(usage.read, Some(90));
    assert_eq!(usage.failed, None);
}
