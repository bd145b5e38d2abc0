//! Ollama native API. Chat requests share the OpenAI shape and are handled
//! by [`super::openai::ChatRequest`].

use serde::Deserialize;
use watchproto::{Edge, GraphDelta, Node, APP_NODE_ID};

use super::openai::ToolCall;
use super::WireSchema;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// `/api/chat` response, after any NDJSON stream has been folded.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub message: ChatResponseMessage,
    pub done: bool,
}

impl WireSchema for ChatResponse {
    const SCHEMA_ID: &'static str = "ollama.chat.response";

    fn extract_graph_structure(&self) -> GraphDelta {
        let mut edges = Vec::new();
        if !self.message.content.is_empty() {
            edges.push(Edge::model_generate(
                self.model.clone(),
                APP_NODE_ID,
                self.message.content.clone(),
            ));
        }
        edges.extend(self.message.tool_calls.iter().map(|c| c.to_edge(&self.model)));
        GraphDelta::new(Vec::new(), edges)
    }
}

/// `/api/generate` body.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
}

impl WireSchema for GenerateRequest {
    const SCHEMA_ID: &'static str = "ollama.generate.request";

    fn extract_graph_structure(&self) -> GraphDelta {
        GraphDelta::new(
            vec![Node::llm(self.model.clone())],
            vec![Edge::model_generate(
                APP_NODE_ID,
                self.model.clone(),
                self.prompt.clone(),
            )],
        )
    }
}

/// `/api/generate` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
    pub done: bool,
}

impl WireSchema for GenerateResponse {
    const SCHEMA_ID: &'static str = "ollama.generate.response";

    fn extract_graph_structure(&self) -> GraphDelta {
        let mut edges = Vec::new();
        if !self.response.is_empty() {
            edges.push(Edge::model_generate(
                self.model.clone(),
                APP_NODE_ID,
                self.response.clone(),
            ));
        }
        GraphDelta::new(Vec::new(), edges)
    }
}
