//! Running call graph.
//!
//! Nodes are keyed by id and the first insertion wins. Edges are append-only
//! and their order is the order deltas arrived in. A delta is applied under
//! one write lock, so a snapshot never observes half of it.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use watchproto::{Edge, GraphDelta, GraphSnapshot, Node};

/// What one [`GraphAccumulator::append_delta`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub nodes_added: usize,
    pub nodes_skipped: usize,
    pub edges_added: usize,
    /// Edges with an endpoint that is not a known node id.
    pub dangling_edges: usize,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: Vec<Node>,
    ids: HashSet<String>,
    edges: Vec<Edge>,
}

/// Shared, unbounded graph store. Cloning shares the same graph.
#[derive(Debug, Clone)]
pub struct GraphAccumulator {
    inner: Arc<RwLock<Graph>>,
}

impl GraphAccumulator {
    /// An accumulator holding only the application root node.
    pub fn new() -> Self {
        let app = Node::app();
        let mut graph = Graph::default();
        graph.ids.insert(app.node_id.clone());
        graph.nodes.push(app);
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Merge a delta: unseen nodes are inserted, edges always appended.
    pub fn append_delta(&self, delta: GraphDelta) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut graph = self.inner.write().unwrap_or_else(|e| e.into_inner());

        for node in delta.nodes {
            if graph.ids.contains(&node.node_id) {
                debug!("node {} already present, keeping first", node.node_id);
                summary.nodes_skipped += 1;
                continue;
            }
            graph.ids.insert(node.node_id.clone());
            graph.nodes.push(node);
            summary.nodes_added += 1;
        }

        for edge in delta.edges {
            for endpoint in [&edge.source_node_id, &edge.target_node_id] {
                if !graph.ids.contains(endpoint) {
                    warn!(
                        "{:?} edge {} -> {} references unknown node {}",
                        edge.edge_type(),
                        edge.source_node_id,
                        edge.target_node_id,
                        endpoint
                    );
                    summary.dangling_edges += 1;
                    break;
                }
            }
            graph.edges.push(edge);
            summary.edges_added += 1;
        }

        summary
    }

    /// Copy of the whole graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        let graph = self.inner.read().unwrap_or_else(|e| e.into_inner());
        GraphSnapshot {
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).edges.len()
    }
}

impl Default for GraphAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use watchproto::{NodeKind, APP_NODE_ID};

    #[test]
    fn starts_with_app_root() {
        let acc = GraphAccumulator::new();
        let snap = acc.snapshot();
        assert_eq!(snap.nodes.len(), 1);
        assert_eq!(snap.nodes[0].node_id, APP_NODE_ID);
        assert!(snap.edges.is_empty());
    }

    #[test]
    fn duplicate_node_first_write_wins() {
        let acc = GraphAccumulator::new();
        acc.append_delta(GraphDelta::new(vec![Node::tool("search", "first")], vec![]));
        let summary =
            acc.append_delta(GraphDelta::new(vec![Node::tool("search", "second")], vec![]));

        assert_eq!(summary.nodes_added, 0);
        assert_eq!(summary.nodes_skipped, 1);
        let snap = acc.snapshot();
        let matching: Vec<_> = snap.nodes.iter().filter(|n| n.node_id == "search").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(
            matching[0].kind,
            NodeKind::Tool {
                tool_description: "first".to_string()
            }
        );
    }

    #[test]
    fn edges_append_in_order() {
        let acc = GraphAccumulator::new();
        acc.append_delta(GraphDelta::new(
            vec![Node::llm("m")],
            vec![Edge::model_generate(APP_NODE_ID, "m", "one")],
        ));
        let summary = acc.append_delta(GraphDelta::new(
            vec![],
            vec![
                Edge::model_generate("m", APP_NODE_ID, "two"),
                Edge::model_generate(APP_NODE_ID, "m", "one"),
            ],
        ));
        assert_eq!(summary.edges_added, 2);
        assert_eq!(summary.dangling_edges, 0);

        let prompts: Vec<String> = acc
            .snapshot()
            .edges
            .iter()
            .filter_map(|e| e.prompt().map(String::from))
            .collect();
        assert_eq!(prompts, vec!["one", "two", "one"]);
    }

    #[test]
    fn dangling_edges_are_counted_but_kept() {
        let acc = GraphAccumulator::new();
        let summary = acc.append_delta(GraphDelta::new(
            vec![],
            vec![Edge::model_generate("ghost", APP_NODE_ID, "boo")],
        ));
        assert_eq!(summary.dangling_edges, 1);
        assert_eq!(acc.edge_count(), 1);
    }

    #[test]
    fn snapshots_never_see_partial_deltas() {
        let acc = GraphAccumulator::new();
        let writer = {
            let acc = acc.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let id = format!("model-{}", i);
                    acc.append_delta(GraphDelta::new(
                        vec![Node::llm(id.clone())],
                        vec![Edge::model_generate(APP_NODE_ID, id, "p")],
                    ));
                }
            })
        };
        for _ in 0..200 {
            let snap = acc.snapshot();
            // Every delta adds one node and one edge together.
            assert_eq!(snap.nodes.len(), snap.edges.len() + 1);
        }
        writer.join().unwrap();
        assert_eq!(acc.node_count(), 201);
    }
}
