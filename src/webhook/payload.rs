//! Payload size, parse, depth, and per-provider shape checks.

use serde_json::Value;

use super::WebhookRejection;
use crate::config::WebhookConfig;
use crate::models::Provider;

/// Microsoft Graph batches at most this many notifications per delivery.
pub const MAX_MICROSOFT_NOTIFICATIONS: usize = 100;

/// Parses and structurally validates a raw webhook body.
///
/// Returns `Ok(None)` for Google's header-only push notifications, which
/// legitimately carry an empty body.
pub fn parse_and_check(
    provider: Provider,
    raw: &[u8],
    config: &WebhookConfig,
) -> Result<Option<Value>, WebhookRejection> {
    if raw.len() > config.max_body_bytes {
        return Err(WebhookRejection::BodyTooLarge {
            size: raw.len(),
            max: config.max_body_bytes,
        });
    }

    if raw.is_empty() {
        if provider == Provider::Google {
            return Ok(None);
        }
        return Err(WebhookRejection::MalformedPayload {
            reason: "empty body".to_string(),
        });
    }

    let body: Value = serde_json::from_slice(raw).map_err(|e| WebhookRejection::MalformedPayload {
        reason: format!("invalid JSON: {}", e),
    })?;

    let depth = json_depth(&body);
    if depth > config.max_json_depth {
        return Err(WebhookRejection::MalformedPayload {
            reason: format!("nesting depth {} exceeds {}", depth, config.max_json_depth),
        });
    }

    match provider {
        Provider::Microsoft => {
            let notifications = body
                .get("value")
                .and_then(Value::as_array)
                .ok_or_else(|| WebhookRejection::MalformedPayload {
                    reason: "missing 'value' notification array".to_string(),
                })?;
            if notifications.len() > MAX_MICROSOFT_NOTIFICATIONS {
                return Err(WebhookRejection::MalformedPayload {
                    reason: format!(
                        "{} notifications exceeds batch limit {}",
                        notifications.len(),
                        MAX_MICROSOFT_NOTIFICATIONS
                    ),
                });
            }
        }
        Provider::Zoom => {
            if body.get("event").and_then(Value::as_str).is_none()
                || body.get("payload").is_none()
            {
                return Err(WebhookRejection::MalformedPayload {
                    reason: "missing 'event' or 'payload' field".to_string(),
                });
            }
        }
        Provider::Google | Provider::Caldav => {}
    }

    Ok(Some(body))
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> WebhookConfig {
        WebhookConfig::default()
    }

    #[test]
    fn test_oversized_body_rejected() {
        let cfg = WebhookConfig {
            max_body_bytes: 16,
            ..WebhookConfig::default()
        };
        let raw = br#"{"event":"x","payload":{"k":"v"}}"#;
        assert!(matches!(
            parse_and_check(Provider::Zoom, raw, &cfg),
            Err(WebhookRejection::BodyTooLarge { .. })
        ));
    }

    #[test]
    fn test_google_empty_body_passes() {
        assert!(matches!(
            parse_and_check(Provider::Google, b"", &config()),
            Ok(None)
        ));
    }

    #[test]
    fn test_zoom_empty_body_rejected() {
        assert!(parse_and_check(Provider::Zoom, b"", &config()).is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(parse_and_check(Provider::Zoom, b"{not json", &config()).is_err());
    }

    #[test]
    fn test_depth_limit_enforced() {
        let mut body = json!("leaf");
        for _ in 0..12 {
            body = json!({ "nested": body });
        }
        let raw = serde_json::to_vec(&body).unwrap();
        assert!(matches!(
            parse_and_check(Provider::Google, &raw, &config()),
            Err(WebhookRejection::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_zoom_requires_event_and_payload() {
        let missing_payload = serde_json::to_vec(&json!({"event": "meeting.started"})).unwrap();
        assert!(parse_and_check(Provider::Zoom, &missing_payload, &config()).is_err());

        let complete =
            serde_json::to_vec(&json!({"event": "meeting.started", "payload": {}})).unwrap();
        assert!(parse_and_check(Provider::Zoom, &complete, &config()).is_ok());
    }

    #[test]
    fn test_microsoft_batch_limit() {
        let notifications: Vec<Value> = (0..MAX_MICROSOFT_NOTIFICATIONS + 1)
            .map(|i| json!({"subscriptionId": i.to_string()}))
            .collect();
        let raw = serde_json::to_vec(&json!({ "value": notifications })).unwrap();
        assert!(parse_and_check(Provider::Microsoft, &raw, &config()).is_err());

        let raw = serde_json::to_vec(&json!({"value": [{"subscriptionId": "a"}]})).unwrap();
        assert!(parse_and_check(Provider::Microsoft, &raw, &config()).is_ok());
    }

    #[test]
    fn test_microsoft_requires_value_array() {
        let raw = serde_json::to_vec(&json!({"notAValue": []})).unwrap();
        assert!(parse_and_check(Provider::Microsoft, &raw, &config()).is_err());
    }
}
