//! Content normalizers strip transport framing from a body before schema
//! parsing.
//!
//! Streaming APIs wrap their JSON in server-sent events or newline-delimited
//! chunks. A normalizer turns such a body back into one JSON document. At most
//! one normalizer is applied per event: the first, in registration order,
//! whose declared content types match.

use serde_json::{Map, Value};
use tracing::debug;

/// Transforms a raw body of a given content type into plain JSON text.
pub trait ContentNormalizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Media types this normalizer handles, lowercase, without parameters.
    fn supported_content_types(&self) -> &[&'static str];

    fn normalize(&self, body: &str) -> String;
}

/// Media type of a Content-Type header value: parameters dropped, lowercased.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Server-sent events: keeps the payload of the first `data: ` line.
#[derive(Debug, Clone)]
pub struct EventStreamNormalizer {
    tag: &'static str,
}

impl EventStreamNormalizer {
    pub const TAG: &'static str = "data: ";

    pub fn new() -> Self {
        Self { tag: Self::TAG }
    }
}

impl Default for EventStreamNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentNormalizer for EventStreamNormalizer {
    fn name(&self) -> &'static str {
        "event-stream"
    }

    fn supported_content_types(&self) -> &[&'static str] {
        &["text/event-stream"]
    }

    fn normalize(&self, body: &str) -> String {
        body.lines()
            .find_map(|line| line.strip_prefix(self.tag))
            .map(|data| data.trim().to_string())
            .unwrap_or_else(|| body.to_string())
    }
}

/// Newline-delimited JSON streams, as sent by Ollama with `stream: true`.
///
/// Folds the chunks into the final object with the streamed text of every
/// chunk concatenated into `message.content` (chat) or `response` (generate).
#[derive(Debug, Clone, Default)]
pub struct NdjsonNormalizer;

impl NdjsonNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl ContentNormalizer for NdjsonNormalizer {
    fn name(&self) -> &'static str {
        "ndjson"
    }

    fn supported_content_types(&self) -> &[&'static str] {
        &["application/x-ndjson"]
    }

    fn normalize(&self, body: &str) -> String {
        let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            return body.to_string();
        }

        let mut chunks = Vec::with_capacity(lines.len());
        for line in lines {
            match serde_json::from_str::<Map<String, Value>>(line) {
                Ok(obj) => chunks.push(obj),
                Err(_) => return body.to_string(),
            }
        }

        let mut message_text = String::new();
        let mut response_text = String::new();
        for chunk in &chunks {
            if let Some(text) = chunk
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                message_text.push_str(text);
            }
            if let Some(text) = chunk.get("response").and_then(Value::as_str) {
                response_text.push_str(text);
            }
        }

        let Some(mut folded) = chunks.pop() else {
            return body.to_string();
        };
        if let Some(Value::Object(message)) = folded.get_mut("message") {
            message.insert("content".to_string(), Value::String(message_text));
        }
        if folded.contains_key("response") {
            folded.insert("response".to_string(), Value::String(response_text));
        }
        Value::Object(folded).to_string()
    }
}

/// Ordered set of normalizers.
pub struct NormalizerChain {
    normalizers: Vec<Box<dyn ContentNormalizer>>,
}

impl NormalizerChain {
    /// A chain with no normalizers; every body passes through.
    pub fn empty() -> Self {
        Self {
            normalizers: Vec::new(),
        }
    }

    pub fn register(&mut self, normalizer: Box<dyn ContentNormalizer>) {
        self.normalizers.push(normalizer);
    }

    /// Apply the first normalizer matching `content_type`, if any.
    pub fn normalize(&self, content_type: Option<&str>, body: &str) -> String {
        let Some(content_type) = content_type else {
            return body.to_string();
        };
        let media = media_type(content_type);
        match self
            .normalizers
            .iter()
            .find(|n| n.supported_content_types().iter().any(|t| *t == media))
        {
            Some(normalizer) => {
                debug!("normalizing {} body with {}", media, normalizer.name());
                normalizer.normalize(body)
            }
            None => body.to_string(),
        }
    }
}

impl Default for NormalizerChain {
    /// Event-stream first, then NDJSON.
    fn default() -> Self {
        let mut chain = Self::empty();
        chain.register(Box::new(EventStreamNormalizer::new()));
        chain.register(Box::new(NdjsonNormalizer::new()));
        chain
    }
}
