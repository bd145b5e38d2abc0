//! The executor: receives commands from the host and runs the pipeline.
//!
//! Lifecycle: `Created → Starting → Running → Draining → Stopped`.
//!
//! While running, a poller reads commands off the channel and queues them; a
//! fixed pool of workers takes them one at a time and dispatches on the
//! action. Everything runs as tasks on one event loop. Commands are handled
//! in receipt order only with a single worker.
//!
//! Draining starts on `SHUTDOWN` or when the host closes the channel. The
//! poller and workers are cancelled, pending webhook deliveries abandoned,
//! and an "exit ready" push tells the host it may reap the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use watchconf::AgentwatchConfig;
use watchproto::{
    split_channel, ChannelError, ChannelSender, Command, CommandAction, CommandResponse,
    NormalizedHttpEvent, OutOfBandStatus, Webhook,
};

use crate::accumulator::GraphAccumulator;
use crate::processing::ProcessorSet;
use crate::telemetry::VerbosityControl;
use crate::webhooks::WebhookDispatcher;

/// Guid of the automatically registered visualization subscriber.
pub const VISUALIZATION_WEBHOOK_GUID: &str = "visualization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Created,
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Deserialize)]
struct RemoveWebhookParams {
    guid: String,
}

type CommandQueue = Arc<Mutex<mpsc::UnboundedReceiver<Command>>>;

pub struct EventProcessor {
    workers: usize,
    processors: ProcessorSet,
    accumulator: GraphAccumulator,
    dispatcher: WebhookDispatcher,
    verbosity: Option<Arc<dyn VerbosityControl>>,
    state: watch::Sender<ExecutorState>,
    shutdown: CancellationToken,
}

impl EventProcessor {
    pub fn new(
        config: &AgentwatchConfig,
        verbosity: Option<Arc<dyn VerbosityControl>>,
    ) -> Result<Self> {
        let dispatcher = WebhookDispatcher::new(config.webhooks.timeout())
            .context("failed to build webhook client")?;
        if config.webhooks.visualization {
            let mut hook = Webhook::new(config.webhooks.visualization_url());
            hook.guid = VISUALIZATION_WEBHOOK_GUID.to_string();
            dispatcher.register(hook);
        }
        let (state, _) = watch::channel(ExecutorState::Created);

        Ok(Self {
            workers: config.executor.workers.max(1),
            processors: ProcessorSet::default(),
            accumulator: GraphAccumulator::new(),
            dispatcher,
            verbosity,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Replace the processor set.
    pub fn with_processors(mut self, processors: ProcessorSet) -> Self {
        self.processors = processors;
        self
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ExecutorState> {
        self.state.subscribe()
    }

    pub fn accumulator(&self) -> &GraphAccumulator {
        &self.accumulator
    }

    pub fn dispatcher(&self) -> &WebhookDispatcher {
        &self.dispatcher
    }

    /// Ask the executor to start draining.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    fn set_state(&self, next: ExecutorState) {
        let prev = self.state.send_replace(next);
        debug!("executor state {:?} -> {:?}", prev, next);
    }

    /// Serve one channel until shutdown, then drain.
    ///
    /// Channel failures end the run the same way a `SHUTDOWN` does; they are
    /// logged, never returned.
    pub async fn run<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.set_state(ExecutorState::Starting);
        let (mut reader, sender) = split_channel(stream);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue: CommandQueue = Arc::new(Mutex::new(queue_rx));

        let workers: Vec<_> = (0..self.workers)
            .map(|id| {
                tokio::spawn(Arc::clone(&self).worker(id, Arc::clone(&queue), sender.clone()))
            })
            .collect();

        if let Err(e) = sender
            .send(&CommandResponse::status_push(OutOfBandStatus::Initialized))
            .await
        {
            error!("failed to signal initialization: {}", e);
            self.shutdown.cancel();
        }
        self.set_state(ExecutorState::Running);
        info!("executor running with {} worker(s)", self.workers);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = reader.receive::<Command>() => match received {
                    Ok(cmd) => {
                        debug!("queued {}", cmd);
                        if queue_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.is_decode() => {
                        warn!("dropping undecodable command: {}", e);
                    }
                    Err(ChannelError::Closed) => {
                        info!("host closed the channel");
                        break;
                    }
                    Err(e) => {
                        error!("command channel failed: {}", e);
                        break;
                    }
                },
            }
        }

        self.set_state(ExecutorState::Draining);
        self.shutdown.cancel();
        drop(queue_tx);
        self.dispatcher.close();
        for handle in workers {
            if let Err(e) = handle.await {
                error!("worker task failed: {}", e);
            }
        }

        if let Err(e) = sender
            .send(&CommandResponse::status_push(OutOfBandStatus::ExitReady))
            .await
        {
            warn!("failed to signal exit: {}", e);
        }
        if let Err(e) = sender.close().await {
            debug!("closing channel: {}", e);
        }

        self.set_state(ExecutorState::Stopped);
        info!(
            "executor stopped with {} nodes and {} edges",
            self.accumulator.node_count(),
            self.accumulator.edge_count()
        );
    }

    async fn worker<W>(self: Arc<Self>, id: usize, queue: CommandQueue, sender: ChannelSender<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug!("worker {} started", id);
        loop {
            let cmd = {
                let mut rx = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break,
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => cmd,
                        None => break,
                    },
                }
            };

            let shutdown = cmd.action == CommandAction::Shutdown;
            if let Some(response) = self.handle_command(cmd).await {
                if let Err(e) = sender.send(&response).await {
                    warn!("worker {} failed to send response: {}", id, e);
                }
            }
            if shutdown {
                self.request_shutdown();
            }
        }
        debug!("worker {} stopped", id);
    }

    /// Dispatch one command. `None` means no reply is sent.
    ///
    /// `SHUTDOWN` only acknowledges here; the worker starts draining once
    /// the acknowledgement is written.
    pub async fn handle_command(&self, cmd: Command) -> Option<CommandResponse> {
        match cmd.action {
            CommandAction::Event => {
                let event: NormalizedHttpEvent = match cmd.params_as() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("dropping {}: malformed event params: {}", cmd, e);
                        return None;
                    }
                };
                if let Some(delta) = self.processors.route(&event) {
                    let summary = self.accumulator.append_delta(delta);
                    debug!("merged delta: {:?}", summary);
                    let snapshot = self.accumulator.snapshot();
                    let report = self.dispatcher.notify(&snapshot).await;
                    debug!("notified webhooks: {:?}", report);
                }
                Some(cmd.reply(true))
            }
            CommandAction::AddWebhook => match cmd.params_as::<Webhook>() {
                Ok(hook) => {
                    self.dispatcher.register(hook);
                    Some(cmd.reply(true))
                }
                Err(e) => {
                    warn!("dropping {}: malformed webhook: {}", cmd, e);
                    None
                }
            },
            CommandAction::RemoveWebhook => match cmd.params_as::<RemoveWebhookParams>() {
                Ok(params) => {
                    self.dispatcher.remove(&params.guid);
                    Some(cmd.reply(true))
                }
                Err(e) => {
                    warn!("dropping {}: malformed params: {}", cmd, e);
                    None
                }
            },
            CommandAction::Shutdown => {
                info!("shutdown requested");
                Some(cmd.reply(true))
            }
            CommandAction::Ping => Some(cmd.reply(true)),
            CommandAction::Verbose => {
                match &self.verbosity {
                    Some(control) => control.raise_verbosity(),
                    None => debug!("no verbosity control installed"),
                }
                Some(cmd.reply(true))
            }
            CommandAction::Snapshot => match serde_json::to_value(self.accumulator.snapshot()) {
                Ok(data) => Some(cmd.reply(true).with_data(data)),
                Err(e) => {
                    error!("failed to serialize snapshot: {}", e);
                    None
                }
            },
            CommandAction::Unknown => {
                warn!("dropping {}: unknown action", cmd);
                None
            }
        }
    }
}

/// Wait until `processor` reaches `target`, up to `timeout`.
pub async fn wait_for_state(
    processor: &EventProcessor,
    target: ExecutorState,
    timeout: Duration,
) -> bool {
    let mut rx = processor.subscribe_state();
    tokio::time::timeout(timeout, rx.wait_for(|s| *s == target))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}
