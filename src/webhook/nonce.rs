//! Replay protection via a TTL'd nonce cache.
//!
//! Keys are provider-specific idempotency identifiers. The cache is
//! process-local; replays across instances are not detected.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use serde_json::Value;

use crate::models::Provider;

pub struct NonceCache {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl NonceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Records `key` and reports whether it was fresh. A false return
    /// means the same delivery was already seen within the TTL.
    pub fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }

    fn check_and_record_at(&self, key: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock().expect("nonce cache lock poisoned");
        // Lazy prune keeps the map bounded without a background task.
        seen.retain(|_, recorded| now.duration_since(*recorded) < self.ttl);

        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }
}

/// Extracts the idempotency keys for one delivery.
///
/// Returns an empty vec when the provider supplies no usable identifier;
/// such deliveries skip replay detection rather than being rejected.
pub fn replay_keys(provider: Provider, headers: &HeaderMap, body: Option<&Value>) -> Vec<String> {
    let header = |name: &str| -> Option<&str> {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .filter(|v| !v.is_empty())
    };

    match provider {
        Provider::Zoom => header("x-zm-trackingid")
            .map(|id| vec![format!("zoom:{}", id)])
            .unwrap_or_default(),
        Provider::Google => {
            match (header("x-goog-channel-id"), header("x-goog-message-number")) {
                (Some(channel), Some(number)) => vec![format!("google:{}:{}", channel, number)],
                _ => Vec::new(),
            }
        }
        Provider::Microsoft => body
            .and_then(|b| b.get("value"))
            .and_then(Value::as_array)
            .map(|notifications| {
                notifications
                    .iter()
                    .filter_map(|n| {
                        let subscription = n.get("subscriptionId").and_then(Value::as_str)?;
                        let change = n.get("changeType").and_then(Value::as_str).unwrap_or("");
                        let resource = n.get("resource").and_then(Value::as_str).unwrap_or("");
                        Some(format!("microsoft:{}:{}:{}", subscription, change, resource))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        Provider::Caldav => Vec::new(),
    }
}
