//! Shared fixtures: an in-thread executor and recording webhook servers.

#![allow(dead_code)]

use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use agentwatch::{EventProcessor, Host};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use watchconf::AgentwatchConfig;

pub fn test_config() -> AgentwatchConfig {
    let mut config = AgentwatchConfig::default();
    config.webhooks.visualization = false;
    config.webhooks.timeout_ms = 2_000;
    config.host.command_timeout_ms = 3_000;
    config
}

/// A host attached to an executor running on its own thread.
pub struct Harness {
    pub host: Host,
    pub processor: Arc<EventProcessor>,
    pub executor: JoinHandle<()>,
}

pub fn start_executor(config: &AgentwatchConfig) -> Harness {
    let (host_end, executor_end) = UnixStream::pair().unwrap();
    executor_end.set_nonblocking(true).unwrap();

    let processor = Arc::new(EventProcessor::new(config, None).unwrap());
    let running = Arc::clone(&processor);
    let executor = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let stream = tokio::net::UnixStream::from_std(executor_end).unwrap();
            running.run(stream).await;
        });
    });

    let host = Host::attach(host_end, config).unwrap();
    Harness {
        host,
        processor,
        executor,
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub event_type: String,
    pub body: Value,
    pub arrived: Instant,
    pub finished: Instant,
}

/// Webhook endpoint that records every delivery.
#[derive(Clone)]
pub struct Recorder {
    pub deliveries: Arc<Mutex<Vec<Delivery>>>,
    delay: Duration,
    status: StatusCode,
}

impl Recorder {
    pub fn new(delay: Duration, status: StatusCode) -> Self {
        Self {
            deliveries: Arc::new(Mutex::new(Vec::new())),
            delay,
            status,
        }
    }

    pub fn of_type(&self, event_type: &str) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.event_type == event_type)
            .cloned()
            .collect()
    }
}

async fn record(State(recorder): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
    let arrived = Instant::now();
    tokio::time::sleep(recorder.delay).await;
    let event_type = body["event_type"].as_str().unwrap_or_default().to_string();
    recorder.deliveries.lock().unwrap().push(Delivery {
        event_type,
        body,
        arrived,
        finished: Instant::now(),
    });
    recorder.status
}

/// Serve `recorder` at `http://127.0.0.1:<port>/hook` on the current runtime.
pub async fn serve(recorder: Recorder) -> String {
    let app = Router::new()
        .route("/hook", post(record))
        .with_state(recorder);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/hook", addr)
}
