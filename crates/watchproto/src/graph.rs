//! Call-graph entities reconstructed from LLM traffic.
//!
//! Nodes are models, tools and the calling application. Edges are model
//! generations (prompt or reply text) and tool invocations. Entities are
//! created once by an extractor and never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::unix_timestamp;

/// Well-known id of the node representing the instrumented application.
pub const APP_NODE_ID: &str = "app";

/// Discriminant of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Llm,
    Tool,
    App,
}

/// Discriminant of an [`Edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    ModelGenerate,
    ToolCall,
}

/// Type-specific node payload, tagged by `node_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeKind {
    Llm,
    Tool { tool_description: String },
    App,
}

/// A graph vertex. `node_id` is unique within a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub created_at: f64,
}

impl Node {
    /// A model node keyed by the model id.
    pub fn llm(model: impl Into<String>) -> Self {
        Self {
            node_id: model.into(),
            kind: NodeKind::Llm,
            created_at: unix_timestamp(),
        }
    }

    /// A tool node keyed by the tool name.
    pub fn tool(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            node_id: name.into(),
            kind: NodeKind::Tool {
                tool_description: description.into(),
            },
            created_at: unix_timestamp(),
        }
    }

    /// The application root node.
    pub fn app() -> Self {
        Self {
            node_id: APP_NODE_ID.to_string(),
            kind: NodeKind::App,
            created_at: unix_timestamp(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Llm => NodeType::Llm,
            NodeKind::Tool { .. } => NodeType::Tool,
            NodeKind::App => NodeType::App,
        }
    }
}

/// Type-specific edge payload, tagged by `edge_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "edge_type", rename_all = "snake_case")]
pub enum EdgeKind {
    ModelGenerate { prompt: String },
    ToolCall { tool_input: Map<String, Value> },
}

/// A directed graph edge between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(flatten)]
    pub kind: EdgeKind,
    pub created_at: f64,
}

impl Edge {
    pub fn model_generate(
        source: impl Into<String>,
        target: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            kind: EdgeKind::ModelGenerate {
                prompt: prompt.into(),
            },
            created_at: unix_timestamp(),
        }
    }

    pub fn tool_call(
        source: impl Into<String>,
        target: impl Into<String>,
        tool_input: Map<String, Value>,
    ) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            kind: EdgeKind::ToolCall { tool_input },
            created_at: unix_timestamp(),
        }
    }

    pub fn edge_type(&self) -> EdgeType {
        match self.kind {
            EdgeKind::ModelGenerate { .. } => EdgeType::ModelGenerate,
            EdgeKind::ToolCall { .. } => EdgeType::ToolCall,
        }
    }

    /// Prompt or reply text of a model-generate edge.
    pub fn prompt(&self) -> Option<&str> {
        match &self.kind {
            EdgeKind::ModelGenerate { prompt } => Some(prompt),
            EdgeKind::ToolCall { .. } => None,
        }
    }

    /// Invocation input of a tool-call edge.
    pub fn tool_input(&self) -> Option<&Map<String, Value>> {
        match &self.kind {
            EdgeKind::ToolCall { tool_input } => Some(tool_input),
            EdgeKind::ModelGenerate { .. } => None,
        }
    }
}

/// Nodes and edges produced by one parse of one HTTP body.
///
/// A delta only ever adds to the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDelta {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphDelta {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Full accumulated graph at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_wire_shape() {
        let node = Node::tool("get_weather", "Look up the weather");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["node_id"], json!("get_weather"));
        assert_eq!(value["node_type"], json!("tool"));
        assert_eq!(value["tool_description"], json!("Look up the weather"));

        let decoded: Node = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn app_node_has_fixed_id() {
        let app = Node::app();
        assert_eq!(app.node_id, APP_NODE_ID);
        assert_eq!(app.node_type(), NodeType::App);
        assert_eq!(serde_json::to_value(&app).unwrap()["node_type"], json!("app"));
    }

    #[test]
    fn edge_wire_shape() {
        let mut input = Map::new();
        input.insert("city".to_string(), json!("Lisbon"));
        let edge = Edge::tool_call("claude-3", "get_weather", input.clone());
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["edge_type"], json!("tool_call"));
        assert_eq!(value["tool_input"], json!({"city": "Lisbon"}));
        assert_eq!(value["source_node_id"], json!("claude-3"));

        let decoded: Edge = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.tool_input(), Some(&input));
        assert_eq!(decoded.prompt(), None);
    }

    #[test]
    fn model_generate_edge_accessors() {
        let edge = Edge::model_generate(APP_NODE_ID, "gpt-4o", "hi");
        assert_eq!(edge.edge_type(), EdgeType::ModelGenerate);
        assert_eq!(edge.prompt(), Some("hi"));
        assert_eq!(
            serde_json::to_value(&edge).unwrap()["edge_type"],
            json!("model_generate")
        );
    }
}
