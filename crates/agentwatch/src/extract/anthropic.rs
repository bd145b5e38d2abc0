//! Anthropic Messages API.

use serde::Deserialize;
use serde_json::{Map, Value};
use watchproto::{Edge, GraphDelta, Node, APP_NODE_ID};

use super::WireSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
    },
    /// Images, documents, thinking blocks and anything newer.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Text of the message, text blocks joined by newlines.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => join_text(blocks),
        }
    }
}

fn join_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// `POST /v1/messages` body.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u64,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub system: Option<Value>,
}

impl MessagesRequest {
    /// Text of the most recent user turn that carries any text.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.text())
            .find(|t| !t.is_empty())
            .unwrap_or_default()
    }
}

impl WireSchema for MessagesRequest {
    const SCHEMA_ID: &'static str = "anthropic.messages.request";

    fn extract_graph_structure(&self) -> GraphDelta {
        let mut nodes = vec![Node::llm(self.model.clone())];
        nodes.extend(self.tools.iter().map(|t| {
            Node::tool(t.name.clone(), t.description.clone().unwrap_or_default())
        }));
        let edges = vec![Edge::model_generate(
            APP_NODE_ID,
            self.model.clone(),
            self.last_user_text(),
        )];
        GraphDelta::new(nodes, edges)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseRole {
    Assistant,
}

/// Non-streaming `/v1/messages` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ResponseType,
    pub role: ResponseRole,
    pub model: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl WireSchema for MessagesResponse {
    const SCHEMA_ID: &'static str = "anthropic.messages.response";

    fn extract_graph_structure(&self) -> GraphDelta {
        let mut edges = Vec::new();
        let text = join_text(&self.content);
        if !text.is_empty() {
            edges.push(Edge::model_generate(self.model.clone(), APP_NODE_ID, text));
        }
        for block in &self.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                edges.push(Edge::tool_call(self.model.clone(), name.clone(), input.clone()));
            }
        }
        GraphDelta::new(Vec::new(), edges)
    }
}
