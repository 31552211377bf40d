//! Outbound notification events.
//!
//! The dispatcher behind `NOTIFY_EVENTS_URL` renders and sends email; this
//! side only posts structured events. Delivery is strictly fire-and-forget:
//! a dead sink must never fail the request that triggered the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::NotifyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Attendee registered, payment still pending.
    RegistrationConfirmed,
    /// Payment verified, registration settled.
    RegistrationCompleted,
    /// Exit survey captured.
    FeedbackReceived,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RegistrationConfirmed => "registration.confirmed",
            EventType::RegistrationCompleted => "registration.completed",
            EventType::FeedbackReceived => "feedback.received",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    event_id: String,
    event_type: &'static str,
    occurred_at: DateTime<Utc>,
    data: Value,
}

/// Client for the notification sink. Cheap to clone; an unset sink URL
/// disables dispatch entirely.
#[derive(Clone)]
pub struct Notifier {
    events_url: Option<String>,
    http_client: reqwest::Client,
}

impl Notifier {
    pub fn from_config(notify: &NotifyConfig) -> Self {
        Self {
            events_url: notify.events_url.clone(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Queues one event for delivery and returns immediately.
    pub fn emit(&self, event_type: EventType, data: Value) {
        let url = match &self.events_url {
            Some(u) => u.clone(),
            None => {
                debug!(
                    "Notification sink disabled, dropping {}",
                    event_type.as_str()
                );
                return;
            }
        };

        let event = Event {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.as_str(),
            occurred_at: Utc::now(),
            data,
        };

        let client = self.http_client.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(
                        "Notification {} delivered ({})",
                        event.event_id, event.event_type
                    );
                }
                Ok(resp) => {
                    warn!(
                        "Notification sink replied {} for {} ({})",
                        resp.status(),
                        event.event_id,
                        event.event_type
                    );
                }
                Err(e) => {
                    warn!("Notification {} failed: {}", event.event_id, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        // The dispatcher routes templates on these strings.
        assert_eq!(
            EventType::RegistrationConfirmed.as_str(),
            "registration.confirmed"
        );
        assert_eq!(
            EventType::RegistrationCompleted.as_str(),
            "registration.completed"
        );
        assert_eq!(EventType::FeedbackReceived.as_str(), "feedback.received");
    }

    #[test]
    fn event_envelope_is_camel_case() {
        let event = Event {
            event_id: "id-1".to_string(),
            event_type: "registration.confirmed",
            occurred_at: Utc::now(),
            data: serde_json::json!({"attendeeId": 7}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json.get("eventType").is_some());
        assert!(json.get("occurredAt").is_some());
        assert_eq!(json["data"]["attendeeId"], 7);
    }
}
