//! OpenAI Chat Completions, and the Ollama chat requests that share its shape.

use serde::Deserialize;
use serde_json::Value;
use watchproto::{Edge, GraphDelta, Node, APP_NODE_ID};

use super::{ToolArguments, WireSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Function,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: ToolArguments,
}

/// A tool invocation. OpenAI sends `arguments` as a JSON string, Ollama as an
/// object.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: FunctionCall,
}

impl ToolCall {
    pub(crate) fn to_edge(&self, model: &str) -> Edge {
        Edge::tool_call(
            model,
            self.function.name.clone(),
            self.function.arguments.to_input(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn text(&self) -> String {
        self.content.as_ref().map(MessageContent::text).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub function: FunctionDefinition,
}

/// `POST /v1/chat/completions` (and Ollama `POST /api/chat`) body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .map(ChatMessage::text)
            .find(|t| !t.is_empty())
            .unwrap_or_default()
    }
}

impl WireSchema for ChatRequest {
    const SCHEMA_ID: &'static str = "openai.chat.request";

    fn extract_graph_structure(&self) -> GraphDelta {
        let mut nodes = vec![Node::llm(self.model.clone())];
        nodes.extend(self.tools.iter().map(|t| {
            Node::tool(
                t.function.name.clone(),
                t.function.description.clone().unwrap_or_default(),
            )
        }));
        let edges = vec![Edge::model_generate(
            APP_NODE_ID,
            self.model.clone(),
            self.last_user_text(),
        )];
        GraphDelta::new(nodes, edges)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Non-streaming chat completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub model: String,
    pub choices: Vec<Choice>,
}

impl WireSchema for ChatResponse {
    const SCHEMA_ID: &'static str = "openai.chat.response";

    fn extract_graph_structure(&self) -> GraphDelta {
        let mut edges = Vec::new();
        for choice in &self.choices {
            let text = choice.message.text();
            if !text.is_empty() {
                edges.push(Edge::model_generate(self.model.clone(), APP_NODE_ID, text));
            }
            for call in choice.message.tool_calls.iter().flatten() {
                edges.push(call.to_edge(&self.model));
            }
        }
        GraphDelta::new(Vec::new(), edges)
    }
}
