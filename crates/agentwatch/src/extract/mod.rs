//! Vendor schema registry.
//!
//! Each vendor wire format is a strictly typed serde model implementing
//! [`WireSchema`]. Resolution tries every registered schema in a fixed order
//! and the first one that deserializes wins. Content type cannot route the
//! decision because one content type carries many vendor schemas, and the
//! schemas do overlap (an OpenAI chat request without tools but with
//! `max_tokens` is also a valid Anthropic request), so the order is part of
//! the contract:
//!
//! 1. `anthropic.messages.request`
//! 2. `anthropic.messages.response`
//! 3. `ollama.chat.response`
//! 4. `ollama.generate.request`
//! 5. `ollama.generate.response`
//! 6. `openai.chat.request` (also Ollama chat requests)
//! 7. `openai.chat.response`

pub mod anthropic;
pub mod ollama;
pub mod openai;

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use watchproto::GraphDelta;

/// A vendor payload shape that can be turned into graph entities.
pub trait WireSchema: DeserializeOwned + Send + Sync + 'static {
    const SCHEMA_ID: &'static str;

    fn extract_graph_structure(&self) -> GraphDelta;
}

/// Object-safe view of a schema, as stored in the registry.
pub trait GraphExtractor: Send + Sync {
    fn schema_id(&self) -> &'static str;

    /// Validate `body` against the schema and extract its delta.
    /// `None` means the body does not match.
    fn try_extract(&self, body: &Value) -> Option<GraphDelta>;
}

/// [`GraphExtractor`] for any [`WireSchema`].
pub struct SchemaExtractor<T>(PhantomData<fn() -> T>);

impl<T> SchemaExtractor<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SchemaExtractor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireSchema> GraphExtractor for SchemaExtractor<T> {
    fn schema_id(&self) -> &'static str {
        T::SCHEMA_ID
    }

    fn try_extract(&self, body: &Value) -> Option<GraphDelta> {
        match T::deserialize(body) {
            Ok(parsed) => Some(parsed.extract_graph_structure()),
            Err(e) => {
                debug!("{} rejected body: {}", T::SCHEMA_ID, e);
                None
            }
        }
    }
}

/// Schemas in trial order.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn GraphExtractor>>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Add an extractor at the end of the trial order, or replace the one
    /// already registered under the same schema id in place.
    pub fn register(&mut self, extractor: Box<dyn GraphExtractor>) {
        let id = extractor.schema_id();
        match self.extractors.iter_mut().find(|e| e.schema_id() == id) {
            Some(slot) => *slot = extractor,
            None => self.extractors.push(extractor),
        }
    }

    pub fn register_schema<T: WireSchema>(&mut self) {
        self.register(Box::new(SchemaExtractor::<T>::new()));
    }

    /// Schema ids in trial order.
    pub fn schemas(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.schema_id()).collect()
    }

    /// First schema that accepts `body`, with its delta.
    pub fn resolve(&self, body: &Value) -> Option<(&'static str, GraphDelta)> {
        self.extractors
            .iter()
            .find_map(|e| e.try_extract(body).map(|delta| (e.schema_id(), delta)))
    }

    /// Parse a normalized body and extract its delta.
    ///
    /// Bodies that are not JSON or match no schema yield `None` and a warning.
    pub fn extract(&self, body: &str) -> Option<GraphDelta> {
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                warn!("unrecognized body ({} bytes): not JSON: {}", body.len(), e);
                return None;
            }
        };
        match self.resolve(&value) {
            Some((schema, delta)) => {
                debug!(
                    "{} matched: {} nodes, {} edges",
                    schema,
                    delta.nodes.len(),
                    delta.edges.len()
                );
                Some(delta)
            }
            None => {
                warn!(
                    "unrecognized body ({} bytes): no schema among {:?} matched",
                    body.len(),
                    self.schemas()
                );
                None
            }
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_schema::<anthropic::MessagesRequest>();
        registry.register_schema::<anthropic::MessagesResponse>();
        registry.register_schema::<ollama::ChatResponse>();
        registry.register_schema::<ollama::GenerateRequest>();
        registry.register_schema::<ollama::GenerateResponse>();
        registry.register_schema::<openai::ChatRequest>();
        registry.register_schema::<openai::ChatResponse>();
        registry
    }
}

/// Tool invocation arguments: a JSON object, or a string holding one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Object(Map<String, Value>),
    Encoded(String),
}

impl ToolArguments {
    /// Arguments as an object. Strings that do not hold a JSON object are
    /// kept verbatim under `"arguments"`.
    pub fn to_input(&self) -> Map<String, Value> {
        match self {
            ToolArguments::Object(map) => map.clone(),
            ToolArguments::Encoded(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    let mut map = Map::new();
                    map.insert("arguments".to_string(), Value::String(raw.clone()));
                    map
                }
            },
        }
    }
}
