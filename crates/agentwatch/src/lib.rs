//! agentwatch - call graphs from LLM traffic
//!
//! The instrumented application embeds a [`Host`]. Captured HTTP requests
//! and responses are shipped as commands to an executor process, which
//! normalizes each body, classifies it against known vendor schemas, merges
//! the resulting nodes and edges into a running graph and fans the graph out
//! to webhook subscribers (the visualization backend among them).
//!
//! ```text
//! CapturingClient ─▶ Host ══ unix socket ══▶ EventProcessor
//!                                              │
//!                       NormalizerChain ─▶ ExtractorRegistry ─▶ GraphAccumulator
//!                                                                  │
//!                                                   WebhookDispatcher ─▶ subscribers
//! ```
//!
//! Nothing in the pipeline can fail the instrumented application: errors are
//! contained in the executor and at worst stop the graph from updating.

pub mod accumulator;
pub mod capture;
pub mod error;
pub mod executor;
pub mod extract;
pub mod host;
pub mod normalizer;
pub mod processing;
pub mod telemetry;
pub mod webhooks;

pub use accumulator::{GraphAccumulator, MergeSummary};
pub use capture::{CaptureSink, CapturedResponse, CapturingClient, InterceptRules};
pub use error::HostError;
pub use executor::{EventProcessor, ExecutorState};
pub use extract::{ExtractorRegistry, GraphExtractor, WireSchema};
pub use host::Host;
pub use normalizer::{ContentNormalizer, NormalizerChain};
pub use processing::{HttpProcessor, Processor, ProcessorSet};
pub use telemetry::{LogControl, VerbosityControl};
pub use webhooks::{DeliveryError, NotifyReport, WebhookDispatcher};
