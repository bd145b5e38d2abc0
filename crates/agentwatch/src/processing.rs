//! Event processors turn one captured HTTP event into a graph delta.

use serde_json::Value;
use tracing::{debug, warn};
use watchproto::{
    GraphDelta, HttpEventKind, HttpPayload, HttpResponseData, NormalizedHttpEvent, APP_NODE_ID,
};

use crate::extract::ExtractorRegistry;
use crate::normalizer::NormalizerChain;

pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, kind: HttpEventKind) -> bool;

    /// `None` when the event carries nothing graph-worthy.
    fn process(&self, event: &NormalizedHttpEvent) -> Option<GraphDelta>;
}

/// Normalizes the body of requests and responses, then runs the extractor
/// registry over it.
pub struct HttpProcessor {
    normalizers: NormalizerChain,
    extractors: ExtractorRegistry,
}

impl HttpProcessor {
    pub fn new(normalizers: NormalizerChain, extractors: ExtractorRegistry) -> Self {
        Self {
            normalizers,
            extractors,
        }
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }
}

impl Default for HttpProcessor {
    fn default() -> Self {
        Self::new(NormalizerChain::default(), ExtractorRegistry::default())
    }
}

impl Processor for HttpProcessor {
    fn name(&self) -> &'static str {
        "http"
    }

    fn can_handle(&self, kind: HttpEventKind) -> bool {
        matches!(kind, HttpEventKind::Request | HttpEventKind::Response)
    }

    fn process(&self, event: &NormalizedHttpEvent) -> Option<GraphDelta> {
        let payload = match event.payload() {
            Ok(p) => p,
            Err(e) => {
                warn!("dropping {:?} event with malformed data: {}", event.event_type, e);
                return None;
            }
        };

        let body = match payload.body() {
            Some(b) if !b.trim().is_empty() => b,
            _ => {
                debug!("{:?} event has no body", event.event_type);
                return None;
            }
        };

        let normalized = self
            .normalizers
            .normalize(payload.header("content-type"), body);
        let mut delta = self.extractors.extract(&normalized)?;

        if let HttpPayload::Response(response) = &payload {
            if let Some(model) = requested_model(response) {
                anchor_to_model(&mut delta, &model);
            }
        }
        Some(delta)
    }
}

/// Model id the originating request asked for, when the response carries it.
///
/// Vendors may answer with a more specific id (`gpt-4o` becomes
/// `gpt-4o-2024-08-06`), but the graph only knows the requested one.
fn requested_model(response: &HttpResponseData) -> Option<String> {
    let body = response.request.as_ref()?.get("body")?.as_str()?;
    let request: Value = serde_json::from_str(body).ok()?;
    request.get("model")?.as_str().map(str::to_string)
}

/// Point every model-side edge endpoint at `model`. Response edges always
/// start at the model.
fn anchor_to_model(delta: &mut GraphDelta, model: &str) {
    for edge in &mut delta.edges {
        if edge.source_node_id != APP_NODE_ID && edge.source_node_id != model {
            debug!(
                "response model {} answered for requested {}",
                edge.source_node_id, model
            );
            edge.source_node_id = model.to_string();
        }
    }
}

/// Processors in registration order. The first that can handle an event's
/// kind is authoritative, whether or not it yields a delta.
pub struct ProcessorSet {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorSet {
    pub fn empty() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    pub fn register(&mut self, processor: Box<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn route(&self, event: &NormalizedHttpEvent) -> Option<GraphDelta> {
        let Some(processor) = self
            .processors
            .iter()
            .find(|p| p.can_handle(event.event_type))
        else {
            warn!("no processor handles {:?} events", event.event_type);
            return None;
        };
        debug!("routing {:?} event to {}", event.event_type, processor.name());
        processor.process(event)
    }
}

impl Default for ProcessorSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(Box::new(HttpProcessor::default()));
        set
    }
}
