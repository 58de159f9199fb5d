//! Provider-specific signature and timestamp verification.
//!
//! All secret comparisons go through `subtle::ConstantTimeEq` to prevent
//! timing attacks.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use super::WebhookRejection;

type HmacSha256 = Hmac<Sha256>;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    subtle::ConstantTimeEq::ct_eq(a, b).into()
}

/// Verifies a Zoom delivery: `x-zm-signature` must equal
/// `v0=` + hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}")), and the
/// timestamp must be within `tolerance_seconds` of now in either
/// direction regardless of signature validity.
pub fn verify_zoom(
    body: &[u8],
    headers: &HeaderMap,
    secret: &str,
    tolerance_seconds: u64,
) -> Result<(), WebhookRejection> {
    let signature_header = header_str(headers, "x-zm-signature");
    if signature_header.is_empty() {
        return Err(WebhookRejection::SignatureMissing {
            header: "x-zm-signature".to_string(),
        });
    }

    let timestamp_header = header_str(headers, "x-zm-request-timestamp");
    if timestamp_header.is_empty() {
        return Err(WebhookRejection::SignatureMissing {
            header: "x-zm-request-timestamp".to_string(),
        });
    }
    let timestamp: u64 =
        timestamp_header
            .parse()
            .map_err(|_| WebhookRejection::MalformedPayload {
                reason: "x-zm-request-timestamp is not a Unix timestamp".to_string(),
            })?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| WebhookRejection::SignatureInvalid)?
        .as_secs();
    let skew = now.abs_diff(timestamp);
    if skew > tolerance_seconds {
        return Err(WebhookRejection::TimestampSkew {
            skew_seconds: skew,
            max_seconds: tolerance_seconds,
        });
    }

    let expected_hex = signature_header
        .strip_prefix("v0=")
        .ok_or(WebhookRejection::SignatureInvalid)?;
    let provided = hex::decode(expected_hex).map_err(|_| WebhookRejection::SignatureInvalid)?;

    let base_string = format!("v0:{}:{}", timestamp, String::from_utf8_lossy(body));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookRejection::SignatureInvalid)?;
    mac.update(base_string.as_bytes());
    let computed = mac.finalize().into_bytes();

    debug!(body_size = body.len(), "Verified Zoom signature material");

    if ct_eq(computed.as_ref(), &provided) {
        Ok(())
    } else {
        Err(WebhookRejection::SignatureInvalid)
    }
}

/// Verifies a Google push notification by its channel token header.
pub fn verify_google(headers: &HeaderMap, expected_token: &str) -> Result<(), WebhookRejection> {
    let token = header_str(headers, "x-goog-channel-token");
    if token.is_empty() {
        return Err(WebhookRejection::SignatureMissing {
            header: "x-goog-channel-token".to_string(),
        });
    }

    if ct_eq(token.as_bytes(), expected_token.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookRejection::SignatureInvalid)
    }
}

/// Verifies a Microsoft Graph delivery: every notification in `value`
/// must carry the clientState chosen at subscription time.
pub fn verify_microsoft(body: &Value, expected_state: &str) -> Result<(), WebhookRejection> {
    let notifications = body
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| WebhookRejection::MalformedPayload {
            reason: "missing 'value' notification array".to_string(),
        })?;

    for notification in notifications {
        let client_state = notification
            .get("clientState")
            .and_then(Value::as_str)
            .ok_or_else(|| WebhookRejection::SignatureMissing {
                header: "clientState".to_string(),
            })?;
        if !ct_eq(client_state.as_bytes(), expected_state.as_bytes()) {
            return Err(WebhookRejection::SignatureInvalid);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zoom_headers(body: &[u8], secret: &str, timestamp: u64) -> HeaderMap {
        let base_string = format!("v0:{}:{}", timestamp, String::from_utf8_lossy(body));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(base_string.as_bytes());
        let signature = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

        let mut headers = HeaderMap::new();
        headers.insert("x-zm-signature", signature.parse().unwrap());
        headers.insert(
            "x-zm-request-timestamp",
            timestamp.to_string().parse().unwrap(),
        );
        headers
    }

    fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn test_zoom_valid_signature_accepted() {
        let body = br#"{"event":"meeting.started","payload":{}}"#;
        let headers = zoom_headers(body, "zoom-secret", unix_now());
        assert!(verify_zoom(body, &headers, "zoom-secret", 300).is_ok());
    }

    #[test]
    fn test_zoom_wrong_secret_rejected() {
        let body = br#"{"event":"meeting.started","payload":{}}"#;
        let headers = zoom_headers(body, "other-secret", unix_now());
        assert!(matches!(
            verify_zoom(body, &headers, "zoom-secret", 300),
            Err(WebhookRejection::SignatureInvalid)
        ));
    }

    #[test]
    fn test_zoom_tampered_body_rejected() {
        let body = br#"{"event":"meeting.started","payload":{}}"#;
        let headers = zoom_headers(body, "zoom-secret", unix_now());
        let tampered = br#"{"event":"meeting.ended","payload":{}}"#;
        assert!(verify_zoom(tampered, &headers, "zoom-secret", 300).is_err());
    }

    #[test]
    fn test_zoom_stale_timestamp_rejected_even_with_valid_signature() {
        let body = br#"{"event":"meeting.started","payload":{}}"#;
        let stale = unix_now() - 400;
        let headers = zoom_headers(body, "zoom-secret", stale);
        assert!(matches!(
            verify_zoom(body, &headers, "zoom-secret", 300),
            Err(WebhookRejection::TimestampSkew { .. })
        ));
    }

    #[test]
    fn test_zoom_future_timestamp_rejected() {
        let body = br#"{"event":"meeting.started","payload":{}}"#;
        let future = unix_now() + 400;
        let headers = zoom_headers(body, "zoom-secret", future);
        assert!(verify_zoom(body, &headers, "zoom-secret", 300).is_err());
    }

    #[test]
    fn test_zoom_missing_headers_rejected() {
        let body = b"{}";
        assert!(matches!(
            verify_zoom(body, &HeaderMap::new(), "zoom-secret", 300),
            Err(WebhookRejection::SignatureMissing { .. })
        ));
    }

    #[test]
    fn test_google_channel_token_match() {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-channel-token", "expected-token".parse().unwrap());
        assert!(verify_google(&headers, "expected-token").is_ok());
        assert!(verify_google(&headers, "different-token").is_err());
    }

    #[test]
    fn test_google_missing_token_rejected() {
        assert!(verify_google(&HeaderMap::new(), "expected-token").is_err());
    }

    #[test]
    fn test_microsoft_client_state_must_match_in_every_notification() {
        let good = json!({"value": [
            {"subscriptionId": "a", "clientState": "state-1"},
            {"subscriptionId": "b", "clientState": "state-1"},
        ]});
        assert!(verify_microsoft(&good, "state-1").is_ok());

        let mixed = json!({"value": [
            {"subscriptionId": "a", "clientState": "state-1"},
            {"subscriptionId": "b", "clientState": "spoofed"},
        ]});
        assert!(verify_microsoft(&mixed, "state-1").is_err());

        let missing = json!({"value": [{"subscriptionId": "a"}]});
        assert!(verify_microsoft(&missing, "state-1").is_err());
    }
}
