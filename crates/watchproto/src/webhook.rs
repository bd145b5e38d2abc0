//! Subscriber registrations and the events delivered to them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::{Edge, Node};

fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_method() -> String {
    "POST".to_string()
}

/// An HTTP endpoint that receives graph events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    #[serde(default = "new_guid")]
    pub guid: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Webhook {
    /// A POST webhook with a fresh guid and no extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            guid: new_guid(),
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Discriminant of a [`WebhookEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    Nodes,
    Edges,
}

/// Body POSTed to subscribers: `{"event_type": "nodes"|"edges", "data": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum WebhookEvent {
    Nodes(Vec<Node>),
    Edges(Vec<Edge>),
}

impl WebhookEvent {
    pub fn event_type(&self) -> WebhookEventType {
        match self {
            WebhookEvent::Nodes(_) => WebhookEventType::Nodes,
            WebhookEvent::Edges(_) => WebhookEventType::Edges,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WebhookEvent::Nodes(n) => n.len(),
            WebhookEvent::Edges(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::APP_NODE_ID;
    use serde_json::json;

    #[test]
    fn webhook_defaults() {
        let hook: Webhook = serde_json::from_value(json!({"url": "http://localhost:9002/api/events"}))
            .unwrap();
        assert_eq!(hook.method, "POST");
        assert!(hook.headers.is_empty());
        assert!(!hook.guid.is_empty());
    }

    #[test]
    fn event_wire_shape() {
        let event = WebhookEvent::Nodes(vec![Node::app()]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], json!("nodes"));
        assert_eq!(value["data"][0]["node_id"], json!(APP_NODE_ID));

        let edges = WebhookEvent::Edges(vec![]);
        assert_eq!(
            serde_json::to_value(&edges).unwrap(),
            json!({"event_type": "edges", "data": []})
        );
        assert!(edges.is_empty());
        assert_eq!(edges.event_type(), WebhookEventType::Edges);
    }
}
