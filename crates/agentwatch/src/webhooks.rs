//! Fan-out of graph events to subscriber endpoints.
//!
//! `notify` delivers in two phases: every subscriber gets the nodes event,
//! and all of those deliveries finish (or fail), before any edges event is
//! sent. Consumers can therefore assume the nodes an edge references already
//! arrived. Within a phase deliveries run concurrently and a failing
//! subscriber only affects itself.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use watchproto::{GraphSnapshot, Webhook, WebhookEvent};

/// A single failed delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("subscriber answered {0}")]
    Status(reqwest::StatusCode),

    #[error("dispatcher closed")]
    Closed,
}

/// Outcome of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Outcome of one [`WebhookDispatcher::notify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub nodes: PhaseReport,
    pub edges: PhaseReport,
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    hooks: RwLock<HashMap<String, Webhook>>,
    cancel: CancellationToken,
}

impl WebhookDispatcher {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            hooks: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Add a subscriber. A webhook with the same guid is replaced.
    /// Returns false on replacement.
    pub fn register(&self, hook: Webhook) -> bool {
        info!("registering webhook {} -> {} {}", hook.guid, hook.method, hook.url);
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.insert(hook.guid.clone(), hook).is_none()
    }

    /// Remove a subscriber by guid. Unknown guids are a no-op.
    pub fn remove(&self, guid: &str) -> Option<Webhook> {
        let removed = self
            .hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(guid);
        match &removed {
            Some(hook) => info!("removed webhook {} ({})", guid, hook.url),
            None => debug!("no webhook {} to remove", guid),
        }
        removed
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Stop delivering. In-flight requests are abandoned.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send the nodes of `snapshot` to every subscriber, then its edges.
    pub async fn notify(&self, snapshot: &GraphSnapshot) -> NotifyReport {
        let hooks = self.webhooks();
        let mut report = NotifyReport::default();
        if hooks.is_empty() || self.is_closed() {
            return report;
        }

        if !snapshot.nodes.is_empty() {
            let event = WebhookEvent::Nodes(snapshot.nodes.clone());
            report.nodes = self.broadcast(&hooks, &event).await;
        }
        if !snapshot.edges.is_empty() {
            let event = WebhookEvent::Edges(snapshot.edges.clone());
            report.edges = self.broadcast(&hooks, &event).await;
        }
        report
    }

    async fn broadcast(&self, hooks: &[Webhook], event: &WebhookEvent) -> PhaseReport {
        let results = join_all(hooks.iter().map(|hook| async move {
            (hook, self.deliver(hook, event).await)
        }))
        .await;

        let mut report = PhaseReport::default();
        for (hook, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "delivery of {:?} event to webhook {} ({}) failed: {}",
                        event.event_type(),
                        hook.guid,
                        hook.url,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        debug!(
            "{:?} phase: {} delivered, {} failed",
            event.event_type(),
            report.delivered,
            report.failed
        );
        report
    }

    /// Deliver one event to one subscriber.
    pub async fn deliver(&self, hook: &Webhook, event: &WebhookEvent) -> Result<(), DeliveryError> {
        let method = reqwest::Method::from_bytes(hook.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| DeliveryError::InvalidMethod(hook.method.clone()))?;

        let mut request = self.client.request(method, &hook.url).json(event);
        for (name, value) in &hook.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DeliveryError::Closed),
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use watchproto::{Edge, Node, APP_NODE_ID};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot() -> GraphSnapshot {
        GraphSnapshot {
            nodes: vec![Node::app(), Node::llm("gpt-4o")],
            edges: vec![Edge::model_generate(APP_NODE_ID, "gpt-4o", "hi")],
        }
    }

    fn dispatcher() -> WebhookDispatcher {
        WebhookDispatcher::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn delivers_both_phases_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-token", "secret"))
            .and(body_partial_json(json!({"event_type": "nodes"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({"event_type": "edges"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher();
        dispatcher.register(
            Webhook::new(format!("{}/hook", server.uri())).with_header("X-Token", "secret"),
        );
        let report = dispatcher.notify(&snapshot()).await;

        assert_eq!(report.nodes, PhaseReport { delivered: 1, failed: 0 });
        assert_eq!(report.edges, PhaseReport { delivered: 1, failed: 0 });
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = dispatcher();
        let hook = Webhook::new(server.uri());
        let err = dispatcher
            .deliver(&hook, &WebhookEvent::Nodes(vec![Node::app()]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn custom_method_is_used() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let dispatcher = dispatcher();
        dispatcher.register(Webhook::new(server.uri()).with_method("put"));
        let report = dispatcher.notify(&snapshot()).await;
        assert_eq!(report.nodes.delivered + report.edges.delivered, 2);
    }

    #[tokio::test]
    async fn invalid_method_is_rejected_before_sending() {
        let dispatcher = dispatcher();
        let hook = Webhook::new("http://127.0.0.1:9/never").with_method("NOT A METHOD");
        let err = dispatcher
            .deliver(&hook, &WebhookEvent::Edges(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidMethod(_)));
    }

    #[tokio::test]
    async fn register_and_remove_are_keyed_by_guid() {
        let dispatcher = dispatcher();
        let hook = Webhook::new("http://localhost:1/a");
        assert!(dispatcher.register(hook.clone()));
        assert!(!dispatcher.register(hook.clone()));
        assert_eq!(dispatcher.webhooks().len(), 1);

        assert!(dispatcher.remove(&hook.guid).is_some());
        assert!(dispatcher.remove(&hook.guid).is_none());
        assert!(dispatcher.webhooks().is_empty());
    }

    #[tokio::test]
    async fn empty_phases_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"event_type": "nodes"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher();
        dispatcher.register(Webhook::new(server.uri()));
        let report = dispatcher
            .notify(&GraphSnapshot {
                nodes: vec![Node::app()],
                edges: vec![],
            })
            .await;
        assert_eq!(report.edges, PhaseReport::default());
    }

    #[tokio::test]
    async fn closed_dispatcher_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher = dispatcher();
        dispatcher.register(Webhook::new(server.uri()));
        dispatcher.close();
        assert_eq!(dispatcher.notify(&snapshot()).await, NotifyReport::default());
    }
}
