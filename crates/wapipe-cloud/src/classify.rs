// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of send responses into [`SendOutcome`]s.

use serde::Deserialize;
use wapipe_core::{SendFailure, SendOutcome};

/// HTTP statuses worth retrying: request timeout, throttling and every
/// server error.
pub fn is_retryable_http(http_status: u16) -> bool {
    matches!(http_status, 408 | 429 | 500..=599)
}

/// Graph API error codes for transient conditions: unknown/service errors,
/// throttling, pair rate limits and temporary unavailability.
pub const RETRYABLE_GRAPH_CODES: [i64; 10] = [
    1, 2, 4, 80007, 130429, 131000, 131016, 131048, 131056, 133004,
];

pub fn is_retryable(http_status: u16, graph_code: Option<i64>) -> bool {
    is_retryable_http(http_status)
        || graph_code.is_some_and(|code| RETRYABLE_GRAPH_CODES.contains(&code))
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    details: Option<String>,
}

/// Error shape of 360dialog's own endpoints.
#[derive(Debug, Deserialize)]
struct MetaEnvelope {
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    developer_message: Option<String>,
    #[serde(default)]
    http_code: Option<u16>,
}

/// Provider error code and message extracted from an error body.
pub fn parse_error(http_status: u16, body: &str) -> (Option<i64>, String) {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let error = envelope.error;
        let message = match error.error_data.and_then(|d| d.details) {
            Some(details) if !details.is_empty() => format!("{}: {details}", error.message),
            _ => error.message,
        };
        return (error.code, message);
    }
    if let Ok(envelope) = serde_json::from_str::<MetaEnvelope>(body) {
        let meta = envelope.meta;
        let status = meta.http_code.unwrap_or(http_status);
        return (
            None,
            meta.developer_message
                .unwrap_or_else(|| format!("HTTP {status}")),
        );
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        (None, format!("HTTP {http_status}"))
    } else {
        (None, format!("HTTP {http_status}: {}", truncate(trimmed, 200)))
    }
}

/// Turns an HTTP response from `POST /messages` into a send outcome.
pub fn send_outcome(http_status: u16, body: &str) -> SendOutcome {
    if (200..300).contains(&http_status) {
        let id = serde_json::from_str::<SendResponse>(body)
            .ok()
            .and_then(|r| r.messages.into_iter().next())
            .map(|m| m.id)
            .filter(|id| !id.is_empty());
        return match id {
            Some(provider_message_id) => SendOutcome::Sent {
                provider_message_id,
            },
            // The provider accepted the request; retrying could duplicate it.
            None => SendOutcome::Failed(SendFailure {
                code: "malformed_response".into(),
                message: format!("accepted without a message id: {}", truncate(body, 200)),
                retryable: false,
            }),
        };
    }

    let (graph_code, message) = parse_error(http_status, body);
    SendOutcome::Failed(SendFailure {
        code: graph_code.map_or_else(|| format!("http_{http_status}"), |c| c.to_string()),
        message,
        retryable: is_retryable(http_status, graph_code),
    })
}

/// Failure for a request that never produced a response.
pub fn transport_failure(error: &reqwest::Error) -> SendFailure {
    if error.is_timeout() {
        SendFailure {
            code: "timeout".into(),
            message: error.to_string(),
            retryable: true,
        }
    } else if error.is_connect() {
        SendFailure {
            code: "connect".into(),
            message: error.to_string(),
            retryable: true,
        }
    } else {
        SendFailure {
            code: "transport".into(),
            message: error.to_string(),
            retryable: false,
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_captures_message_id() {
        let body = r#"{"messaging_product":"whatsapp","contacts":[{"input":"15550001111","wa_id":"15550001111"}],"messages":[{"id":"wamid.OUT"}]}"#;
        assert_eq!(
            send_outcome(200, body),
            SendOutcome::Sent {
                provider_message_id: "wamid.OUT".into()
            }
        );
    }

    #[test]
    fn success_without_id_is_not_retried() {
        match send_outcome(200, "{}") {
            SendOutcome::Failed(f) => {
                assert_eq!(f.code, "malformed_response");
                assert!(!f.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn throttling_code_is_retryable_even_on_400() {
        let body = r#"{"error":{"message":"(#131056) Pair rate limit hit","type":"OAuthException","code":131056,"fbtrace_id":"A"}}"#;
        match send_outcome(400, body) {
            SendOutcome::Failed(f) => {
                assert_eq!(f.code, "131056");
                assert!(f.retryable);
                assert!(f.message.contains("Pair rate limit"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validation_errors_are_terminal() {
        let body = r#"{"error":{"message":"(#100) Invalid parameter","type":"OAuthException","code":100,"error_data":{"messaging_product":"whatsapp","details":"Parameter 'to' is invalid"}}}"#;
        match send_outcome(400, body) {
            SendOutcome::Failed(f) => {
                assert_eq!(f.code, "100");
                assert!(!f.retryable);
                assert!(f.message.ends_with("Parameter 'to' is invalid"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unparseable_5xx_is_retryable() {
        match send_outcome(502, "<html>bad gateway</html>") {
            SendOutcome::Failed(f) => {
                assert_eq!(f.code, "http_502");
                assert!(f.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn meta_envelope_message_is_used() {
        let body = r#"{"meta":{"api_status":"stable","version":"2.0","success":false,"http_code":401,"developer_message":"Invalid api key"}}"#;
        let (code, message) = parse_error(401, body);
        assert_eq!(code, None);
        assert_eq!(message, "Invalid api key");
    }

    #[test]
    fn whitelist_matches_documented_codes() {
        for status in [408, 429, 500, 501, 502, 503, 504, 505, 599] {
            assert!(is_retryable(status, None));
        }
        for status in [400, 401, 403, 404, 422, 600] {
            assert!(!is_retryable(status, None));
        }
        assert!(is_retryable(400, Some(130429)));
        assert!(is_retryable(400, Some(4)));
        assert!(!is_retryable(400, Some(131026)));
    }
}
