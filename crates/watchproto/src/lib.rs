//! watchproto - Wire types for the agentwatch host/executor channel
//!
//! The instrumented application (the *host*) and the isolated graph executor
//! exchange JSON envelopes over a duplex byte stream:
//!
//! - host → executor: [`Command`]
//! - executor → host: [`CommandResponse`], either correlated to a command by
//!   `callback_id` or pushed out-of-band (no `callback_id`)
//!
//! ## Framing
//!
//! Every envelope is one frame: a 4-byte big-endian length followed by the
//! UTF-8 JSON body. The [`frame`] module reads and writes frames over blocking
//! `std::io` streams (host side). With the `peer` feature the [`channel`]
//! module provides the same framing over tokio streams (executor side).
//!
//! ## Payload Types
//!
//! - [`http`] - normalized HTTP request/response events produced by capture
//! - [`graph`] - nodes, edges and deltas reconstructed from LLM traffic
//! - [`webhook`] - subscriber registrations and the events delivered to them
//!
//! Optional fields are omitted from the wire when unset, never sent as `null`.

pub mod command;
pub mod error;
pub mod frame;
pub mod graph;
pub mod http;
pub mod webhook;

#[cfg(feature = "peer")]
pub mod channel;

pub use command::{
    Command, CommandAction, CommandResponse, OutOfBandStatus, STATUS_EXIT_READY,
    STATUS_INITIALIZED,
};
pub use error::ChannelError;
pub use frame::{read_frame, write_frame, MAX_FRAME_LEN};
pub use graph::{
    Edge, EdgeKind, EdgeType, GraphDelta, GraphSnapshot, Node, NodeKind, NodeType, APP_NODE_ID,
};
pub use http::{HttpEventKind, HttpPayload, HttpRequestData, HttpResponseData, NormalizedHttpEvent};
pub use webhook::{Webhook, WebhookEvent, WebhookEventType};

#[cfg(feature = "peer")]
pub use channel::{split_channel, ChannelReader, ChannelSender};

/// Seconds since the Unix epoch with microsecond precision.
///
/// All envelope and entity timestamps use this representation.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
