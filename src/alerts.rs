//! Alert sink — generic outbound alerting with per-level cooldowns.
//!
//! Outbound chat/email transports are an external collaborator; this posts
//! to any webhook URL via the same `reqwest` client the Aggregator Client
//! uses, keyed and cooled down by `(level, title, data-hash)` rather than
//! hard-coding a payload shape for one chat provider.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertLevel {
    Critical,
    Error,
    Warning,
    Info,
    Success,
}

impl AlertLevel {
    fn cooldown(&self) -> Duration {
        match self {
            AlertLevel::Critical => Duration::from_secs(60),
            AlertLevel::Error => Duration::from_secs(300),
            AlertLevel::Warning => Duration::from_secs(900),
            AlertLevel::Info => Duration::from_secs(1800),
            AlertLevel::Success => Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    level: &'static str,
    title: &'a str,
    message: &'a str,
    data: serde_json::Value,
}

pub struct AlertSink {
    webhook_url: Option<String>,
    http: reqwest::Client,
    last_sent: DashMap<(AlertLevel, String, u64), std::time::Instant>,
}

impl AlertSink {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
            last_sent: DashMap::new(),
        }
    }

    fn data_hash(data: &serde_json::Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        data.to_string().hash(&mut hasher);
        hasher.finish()
    }

    fn is_on_cooldown(&self, level: AlertLevel, title: &str, data_hash: u64) -> bool {
        let key = (level, title.to_string(), data_hash);
        if let Some(last) = self.last_sent.get(&key) {
            if last.elapsed() < level.cooldown() {
                return true;
            }
        }
        false
    }

    /// Send an alert unless an identical `(level, title, data)` tuple was
    /// already sent within that level's cooldown window.
    pub async fn send_alert(
        &self,
        level: AlertLevel,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) {
        let data_hash = Self::data_hash(&data);
        if self.is_on_cooldown(level, title, data_hash) {
            return;
        }
        self.last_sent
            .insert((level, title.to_string(), data_hash), std::time::Instant::now());

        match level {
            AlertLevel::Critical | AlertLevel::Error => error!(title, message, "alert"),
            AlertLevel::Warning => warn!(title, message, "alert"),
            AlertLevel::Info | AlertLevel::Success => info!(title, message, "alert"),
        }

        let Some(url) = &self.webhook_url else { return };
        let payload = AlertPayload {
            level: match level {
                AlertLevel::Critical => "critical",
                AlertLevel::Error => "error",
                AlertLevel::Warning => "warning",
                AlertLevel::Info => "info",
                AlertLevel::Success => "success",
            },
            title,
            message,
            data,
        };
        if let Err(e) = self.http.post(url).json(&payload).send().await {
            warn!(error = %e, "failed to deliver alert webhook");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_alert_within_cooldown_is_suppressed() {
        let sink = AlertSink::new(None);
        sink.send_alert(AlertLevel::Critical, "rpc down", "all endpoints unhealthy", serde_json::json!({})).await;
        assert!(sink.is_on_cooldown(AlertLevel::Critical, "rpc down", AlertSink::data_hash(&serde_json::json!({}))));
    }

    #[tokio::test]
    async fn distinct_data_is_not_deduplicated() {
        let sink = AlertSink::new(None);
        sink.send_alert(AlertLevel::Info, "opportunity", "found one", serde_json::json!({"id": 1})).await;
        assert!(!sink.is_on_cooldown(
            AlertLevel::Info,
            "opportunity",
            AlertSink::data_hash(&serde_json::json!({"id": 2}))
        ));
    }
}
