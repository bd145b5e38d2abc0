//! Nodes are delivered to every subscriber before any edges are sent.

mod common;

use std::time::Duration;

use agentwatch::WebhookDispatcher;
use axum::http::StatusCode;
use common::{serve, Recorder};
use watchproto::{Edge, GraphSnapshot, Node, Webhook, APP_NODE_ID};

fn snapshot() -> GraphSnapshot {
    GraphSnapshot {
        nodes: vec![Node::app(), Node::llm("gpt-4o"), Node::tool("search", "")],
        edges: vec![
            Edge::model_generate(APP_NODE_ID, "gpt-4o", "find cats"),
            Edge::tool_call("gpt-4o", "search", Default::default()),
        ],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nodes_phase_completes_before_edges_phase() {
    let fast = Recorder::new(Duration::ZERO, StatusCode::OK);
    let slow = Recorder::new(Duration::from_millis(250), StatusCode::OK);
    let failing = Recorder::new(Duration::from_millis(100), StatusCode::INTERNAL_SERVER_ERROR);

    let dispatcher = WebhookDispatcher::new(Duration::from_secs(2)).unwrap();
    for recorder in [&fast, &slow, &failing] {
        dispatcher.register(Webhook::new(serve(recorder.clone()).await));
    }

    let report = dispatcher.notify(&snapshot()).await;
    assert_eq!(report.nodes.delivered, 2);
    assert_eq!(report.nodes.failed, 1);
    assert_eq!(report.edges.delivered, 2);
    assert_eq!(report.edges.failed, 1);

    let all = [&fast, &slow, &failing];
    let last_node_done = all
        .iter()
        .flat_map(|r| r.of_type("nodes"))
        .map(|d| d.finished)
        .max()
        .unwrap();
    let first_edge_seen = all
        .iter()
        .flat_map(|r| r.of_type("edges"))
        .map(|d| d.arrived)
        .min()
        .unwrap();
    assert!(last_node_done <= first_edge_seen);

    for recorder in all {
        assert_eq!(recorder.of_type("nodes").len(), 1);
        assert_eq!(recorder.of_type("edges").len(), 1);
    }
}

#[tokio::test]
async fn payload_carries_the_whole_snapshot() {
    let recorder = Recorder::new(Duration::ZERO, StatusCode::OK);
    let dispatcher = WebhookDispatcher::new(Duration::from_secs(2)).unwrap();
    dispatcher.register(Webhook::new(serve(recorder.clone()).await));

    dispatcher.notify(&snapshot()).await;

    let nodes = recorder.of_type("nodes");
    assert_eq!(nodes[0].body["data"].as_array().unwrap().len(), 3);
    let edges = recorder.of_type("edges");
    assert_eq!(edges[0].body["data"][1]["edge_type"], "tool_call");
}

#[tokio::test]
async fn unreachable_subscriber_does_not_block_others() {
    let recorder = Recorder::new(Duration::ZERO, StatusCode::OK);
    let dispatcher = WebhookDispatcher::new(Duration::from_millis(500)).unwrap();
    dispatcher.register(Webhook::new("http://127.0.0.1:1/nobody-home"));
    dispatcher.register(Webhook::new(serve(recorder.clone()).await));

    let report = dispatcher.notify(&snapshot()).await;
    assert_eq!(report.nodes.failed, 1);
    assert_eq!(report.edges.delivered, 1);
    assert_eq!(recorder.of_type("edges").len(), 1);
}
