//! Provider webhook shapes
//!
//! Each provider posts its own body layout. [`extract_webhook`] reduces a
//! verified delivery to a [`WebhookEvent`]: the category it classifies to,
//! the payload forwarded to the node, a sanitized summary for the audit
//! trail, and the metadata attached to the routing record.

use hyper::HeaderMap;
use serde_json::{Map, Value};

use crate::auth::header_value;
use crate::mesh::WebhookProvider;
use crate::signal::{classify_declared_type, classify_github_event, SignalCategory};

/// GitHub event name header
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";

/// GitHub delivery id header
pub const GITHUB_DELIVERY_HEADER: &str = "x-github-delivery";

/// Longest subject kept in audit metadata
pub const SUBJECT_LIMIT: usize = 50;

/// A classified webhook delivery
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub category: SignalCategory,
    pub source: String,
    /// Forwarded to the node
    pub payload: Map<String, Value>,
    /// Sanitized `{type, action, id}` for `WEBHOOK_RECEIVED`
    pub summary: Map<String, Value>,
    /// Extra fields on the routing record
    pub routing: Map<String, Value>,
    /// Fields echoed back to the caller
    pub details: Map<String, Value>,
}

/// Reduce a provider body to a classified event. Never fails.
pub fn extract_webhook(
    provider: WebhookProvider,
    headers: &HeaderMap,
    body: &Value,
    request_id: &str,
) -> WebhookEvent {
    let text = |key: &str| body.get(key).and_then(Value::as_str);

    match provider {
        WebhookProvider::Github => {
            let event = header_value(headers, GITHUB_EVENT_HEADER);
            let delivery = header_value(headers, GITHUB_DELIVERY_HEADER);
            let action = text("action");

            let mut payload = Map::new();
            put(&mut payload, "event", event);
            put(&mut payload, "action", action);
            put(
                &mut payload,
                "repository",
                body.pointer("/repository/full_name").and_then(Value::as_str),
            );
            put(
                &mut payload,
                "sender",
                body.pointer("/sender/login").and_then(Value::as_str),
            );
            put(&mut payload, "delivery", delivery);

            let mut routing = Map::new();
            put(&mut routing, "event", event);
            put(&mut routing, "action", action);
            put(&mut routing, "delivery", delivery);

            let mut details = Map::new();
            put(&mut details, "event", event);
            put(&mut details, "delivery", delivery);

            WebhookEvent {
                category: classify_github_event(event.unwrap_or_default()),
                source: "github".into(),
                payload,
                summary: summary(event.unwrap_or("unknown"), action, delivery.unwrap_or(request_id)),
                routing,
                details,
            }
        }

        WebhookProvider::Zapier => {
            let declared = text("type");
            let action = text("action");

            let mut payload = Map::new();
            put(&mut payload, "zapierType", declared);
            put(&mut payload, "action", action);
            if let Some(data) = body.get("data").filter(|d| !d.is_null()) {
                payload.insert("data".into(), data.clone());
            }

            let mut routing = Map::new();
            put(&mut routing, "zapierType", declared);
            put(&mut routing, "action", action);

            let mut details = Map::new();
            put(&mut details, "type", declared);

            WebhookEvent {
                category: classify_declared_type(declared),
                source: text("source").filter(|s| !s.is_empty()).unwrap_or("zapier").into(),
                payload,
                summary: summary(declared.unwrap_or("unknown"), action, request_id),
                routing,
                details,
            }
        }

        WebhookProvider::Discord => {
            let channel = text("channel_id");

            let mut payload = Map::new();
            put(&mut payload, "channel", channel);
            put(&mut payload, "content", text("content"));
            put(
                &mut payload,
                "author",
                body.pointer("/author/username").and_then(Value::as_str),
            );

            let mut routing = Map::new();
            put(&mut routing, "channel", channel);

            WebhookEvent {
                category: SignalCategory::Intelligence,
                source: "discord".into(),
                payload,
                summary: summary(text("type").unwrap_or("message"), None, request_id),
                routing,
                details: Map::new(),
            }
        }

        WebhookProvider::Snhu => {
            let subject = text("subject").map(truncate_subject);

            let mut payload = Map::new();
            put(&mut payload, "subject", text("subject"));
            put(&mut payload, "from", text("from"));
            put(&mut payload, "body", text("body"));
            put(&mut payload, "sentAt", text("timestamp"));

            let mut routing = Map::new();
            put(&mut routing, "subject", subject.as_deref());

            WebhookEvent {
                category: SignalCategory::Academic,
                source: "snhu-email".into(),
                payload,
                summary: summary("email", None, request_id),
                routing,
                details: Map::new(),
            }
        }

        WebhookProvider::Thread => {
            let kind = text("type");

            let mut payload = Map::new();
            put(&mut payload, "transactionType", kind);
            if let Some(amount) = body.get("amount").filter(|a| !a.is_null()) {
                payload.insert("amount".into(), amount.clone());
            }
            put(&mut payload, "description", text("description"));
            put(&mut payload, "sentAt", text("timestamp"));

            let mut routing = Map::new();
            put(&mut routing, "transactionType", kind);

            WebhookEvent {
                category: SignalCategory::Financial,
                source: "thread-bank".into(),
                payload,
                summary: summary(kind.unwrap_or("transaction"), None, request_id),
                routing,
                details: Map::new(),
            }
        }
    }
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::from(value));
    }
}

fn summary(kind: &str, action: Option<&str>, id: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("type".into(), Value::from(kind));
    put(&mut map, "action", action);
    map.insert("id".into(), Value::from(id));
    map
}

fn truncate_subject(subject: &str) -> String {
    subject.chars().take(SUBJECT_LIMIT).collect()
}
