//! Host side of the executor channel.
//!
//! The host lives inside the instrumented application and is fully
//! synchronous: the application may not run an async runtime. A reader
//! thread decodes everything the executor sends. Lifecycle pushes flip
//! signals; correlated responses are handed to whichever caller is blocked
//! in [`Host::send_command_wait`].
//!
//! Construct one host at startup and share it as `Arc<Host>`.

use std::io::ErrorKind;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};
use watchconf::{AgentwatchConfig, HostConfig};
use watchproto::frame::{recv_message, send_message};
use watchproto::{
    ChannelError, Command, CommandAction, CommandResponse, GraphSnapshot, NormalizedHttpEvent,
    OutOfBandStatus, Webhook,
};

use crate::error::HostError;

const CONNECT_POLL: Duration = Duration::from_millis(10);
const LIVENESS_POLL: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct SignalState {
    initialized: bool,
    exit_ready: bool,
    disconnected: bool,
}

/// Lifecycle flags set by the reader thread.
#[derive(Debug, Default)]
struct Signals {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl Signals {
    fn update(&self, f: impl FnOnce(&mut SignalState)) {
        f(&mut lock(&self.state));
        self.changed.notify_all();
    }

    /// Block until `done` holds or `timeout` passes. Returns whether it holds.
    fn wait(&self, timeout: Duration, done: impl Fn(&SignalState) -> bool) -> bool {
        let guard = lock(&self.state);
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| !done(s))
            .unwrap_or_else(|e| e.into_inner());
        done(&guard)
    }

    fn get(&self, f: impl Fn(&SignalState) -> bool) -> bool {
        f(&lock(&self.state))
    }
}

/// Handle to a running executor.
pub struct Host {
    execution_id: String,
    config: HostConfig,
    writer: Mutex<Option<UnixStream>>,
    responses: Mutex<Receiver<CommandResponse>>,
    waiting: Arc<AtomicBool>,
    signals: Arc<Signals>,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Host {
    /// Spawn the executor process and connect to it.
    ///
    /// Waits (bounded) for the executor to report it is initialized; a late
    /// executor is logged and used anyway.
    pub fn spawn(config: &AgentwatchConfig) -> Result<Self, HostError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let socket_dir = &config.executor.socket_dir;
        std::fs::create_dir_all(socket_dir).map_err(|e| HostError::Socket {
            path: socket_dir.clone(),
            source: e,
        })?;

        let socket_path = socket_dir.join(format!("agentwatch-{}.sock", execution_id));
        let config_path = socket_dir.join(format!("agentwatch-{}.toml", execution_id));
        let cleanup = || {
            let _ = std::fs::remove_file(&socket_path);
            let _ = std::fs::remove_file(&config_path);
        };

        // The executor loads exactly what this process resolved.
        config.write_to(&config_path)?;
        let listener = bind_listener(&socket_path).inspect_err(|_| cleanup())?;

        let program = resolve_program(&config.executor.program);
        info!("spawning executor {} ({})", program.display(), execution_id);
        let mut child = ProcessCommand::new(&program)
            .arg("--socket")
            .arg(&socket_path)
            .arg("--workers")
            .arg(config.executor.workers.to_string())
            .arg("--config")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                cleanup();
                HostError::Spawn {
                    program: program.clone(),
                    source: e,
                }
            })?;

        // The executor reads its config before it connects.
        let accepted = accept_one(&listener, &socket_path, &mut child, config.host.connect_timeout());
        cleanup();
        let stream = match accepted {
            Ok(stream) => stream,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        Self::start(execution_id, stream, config.host.clone(), Some(child))
    }

    /// Connect to an executor that is already running elsewhere.
    pub fn attach(stream: UnixStream, config: &AgentwatchConfig) -> Result<Self, HostError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        Self::start(execution_id, stream, config.host.clone(), None)
    }

    fn start(
        execution_id: String,
        stream: UnixStream,
        config: HostConfig,
        child: Option<Child>,
    ) -> Result<Self, HostError> {
        let read_half = stream.try_clone().map_err(ChannelError::from)?;
        let (tx, rx) = mpsc::channel();
        let signals = Arc::new(Signals::default());
        let waiting = Arc::new(AtomicBool::new(false));

        let reader = {
            let signals = Arc::clone(&signals);
            let waiting = Arc::clone(&waiting);
            std::thread::Builder::new()
                .name("agentwatch-host-reader".to_string())
                .spawn(move || read_responses(read_half, tx, waiting, signals))
                .map_err(ChannelError::from)?
        };

        let host = Self {
            execution_id,
            config,
            writer: Mutex::new(Some(stream)),
            responses: Mutex::new(rx),
            waiting,
            signals,
            child: Mutex::new(child),
            reader: Mutex::new(Some(reader)),
            running: AtomicBool::new(true),
        };

        if host
            .signals
            .wait(host.config.init_timeout(), |s| s.initialized || s.disconnected)
        {
            debug!("executor {} initialized", host.execution_id);
        } else {
            warn!(
                "executor {} not initialized after {:?}, continuing",
                host.execution_id,
                host.config.init_timeout()
            );
        }
        Ok(host)
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.signals.get(|s| s.disconnected)
    }

    pub fn is_initialized(&self) -> bool {
        self.signals.get(|s| s.initialized)
    }

    fn write(&self, cmd: &Command) -> Result<(), ChannelError> {
        let mut writer = lock(&self.writer);
        let stream = writer.as_mut().ok_or(ChannelError::Closed)?;
        send_message(stream, cmd)
    }

    /// Send a command without waiting for its response.
    ///
    /// Returns the callback id. Write failures are logged and the command
    /// dropped.
    pub fn send_command(
        &self,
        action: CommandAction,
        params: Option<Map<String, Value>>,
    ) -> Result<String, HostError> {
        if !self.is_running() {
            return Err(HostError::NotRunning);
        }
        let cmd = Command::new(self.execution_id.as_str(), action, params);
        if let Err(e) = self.write(&cmd) {
            warn!("dropping {}: {}", cmd, e);
        }
        Ok(cmd.callback_id)
    }

    /// Send a command and block until its response arrives.
    ///
    /// Responses to other commands are discarded while waiting. `timeout`
    /// defaults to the configured command timeout.
    pub fn send_command_wait(
        &self,
        action: CommandAction,
        params: Option<Map<String, Value>>,
        timeout: Option<Duration>,
    ) -> Result<CommandResponse, HostError> {
        if !self.is_running() {
            return Err(HostError::NotRunning);
        }
        let timeout = timeout.unwrap_or_else(|| self.config.command_timeout());
        let poll = self.config.response_poll();

        // One waiter at a time, so nobody discards somebody else's response.
        let responses = lock(&self.responses);
        while responses.try_recv().is_ok() {}
        self.waiting.store(true, Ordering::SeqCst);
        let result = self.wait_for(&responses, action, params, timeout, poll);
        self.waiting.store(false, Ordering::SeqCst);
        result
    }

    fn wait_for(
        &self,
        responses: &Receiver<CommandResponse>,
        action: CommandAction,
        params: Option<Map<String, Value>>,
        timeout: Duration,
        poll: Duration,
    ) -> Result<CommandResponse, HostError> {
        let cmd = Command::new(self.execution_id.as_str(), action, params);
        self.write(&cmd)?;

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(HostError::Timeout {
                    action,
                    callback_id: cmd.callback_id,
                    waited: started.elapsed(),
                });
            }
            match responses.recv_timeout(poll.min(deadline - now)) {
                Ok(resp) if resp.callback_id.as_deref() == Some(cmd.callback_id.as_str()) => {
                    return Ok(resp);
                }
                Ok(resp) => {
                    debug!(
                        "discarding response {:?} while waiting for {}",
                        resp.callback_id, cmd.callback_id
                    );
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(HostError::Transport(ChannelError::Closed));
                }
            }
        }
    }

    /// Send a command whose params are a serializable payload.
    pub fn send_payload<T: Serialize>(
        &self,
        action: CommandAction,
        payload: &T,
    ) -> Result<String, HostError> {
        let params = to_params(payload)?;
        self.send_command(action, Some(params))
    }

    /// Hand a captured HTTP event to the executor.
    pub fn send_event(&self, event: &NormalizedHttpEvent) -> Result<String, HostError> {
        self.send_payload(CommandAction::Event, event)
    }

    pub fn add_webhook(&self, hook: &Webhook) -> Result<CommandResponse, HostError> {
        self.send_command_wait(CommandAction::AddWebhook, Some(to_params(hook)?), None)
    }

    pub fn remove_webhook(&self, guid: &str) -> Result<CommandResponse, HostError> {
        let mut params = Map::new();
        params.insert("guid".to_string(), Value::String(guid.to_string()));
        self.send_command_wait(CommandAction::RemoveWebhook, Some(params), None)
    }

    /// Liveness probe.
    pub fn ping(&self) -> Result<bool, HostError> {
        Ok(self
            .send_command_wait(CommandAction::Ping, None, None)?
            .success)
    }

    /// Raise log verbosity inside the executor.
    pub fn set_verbose(&self) -> Result<String, HostError> {
        self.send_command(CommandAction::Verbose, None)
    }

    /// Fetch the executor's accumulated graph.
    pub fn snapshot(&self) -> Result<GraphSnapshot, HostError> {
        let resp = self.send_command_wait(CommandAction::Snapshot, None, None)?;
        serde_json::from_value(resp.data.unwrap_or(Value::Null)).map_err(HostError::Params)
    }

    /// Stop the executor.
    ///
    /// Sends `SHUTDOWN` and waits for "exit ready". A spawned process that is
    /// still alive after the grace window gets SIGTERM, then SIGKILL. Safe to
    /// call more than once.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("shutting down executor {}", self.execution_id);

        let cmd = Command::new(self.execution_id.as_str(), CommandAction::Shutdown, None);
        match self.write(&cmd) {
            Ok(()) => {
                if !self
                    .signals
                    .wait(self.config.exit_timeout(), |s| s.exit_ready || s.disconnected)
                {
                    warn!(
                        "executor {} did not signal exit within {:?}",
                        self.execution_id,
                        self.config.exit_timeout()
                    );
                }
            }
            Err(e) => warn!("failed to send shutdown: {}", e),
        }

        if let Some(child) = lock(&self.child).take() {
            reap(child, &self.config);
        }

        if let Some(stream) = lock(&self.writer).take() {
            if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                trace!("socket shutdown: {}", e);
            }
        }
        if let Some(reader) = lock(&self.reader).take() {
            if reader.join().is_err() {
                warn!("host reader thread panicked");
            }
        }
        info!("executor {} stopped", self.execution_id);
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn to_params<T: Serialize>(payload: &T) -> Result<Map<String, Value>, HostError> {
    match serde_json::to_value(payload).map_err(HostError::Params)? {
        Value::Object(map) => Ok(map),
        _ => Err(HostError::Params(serde::ser::Error::custom(
            "command params must be a JSON object",
        ))),
    }
}

/// Reader thread body: runs until the executor closes the channel.
fn read_responses(
    mut stream: UnixStream,
    tx: Sender<CommandResponse>,
    waiting: Arc<AtomicBool>,
    signals: Arc<Signals>,
) {
    loop {
        match recv_message::<_, CommandResponse>(&mut stream) {
            Ok(resp) => match resp.out_of_band_status() {
                Some(OutOfBandStatus::Initialized) => signals.update(|s| s.initialized = true),
                Some(OutOfBandStatus::ExitReady) => signals.update(|s| s.exit_ready = true),
                None if resp.is_out_of_band() => {
                    debug!("ignoring out-of-band push: {:?}", resp.data);
                }
                None if waiting.load(Ordering::SeqCst) => {
                    if tx.send(resp).is_err() {
                        break;
                    }
                }
                None => trace!("no waiter for response {:?}", resp.callback_id),
            },
            Err(e) if e.is_decode() => warn!("dropping undecodable response: {}", e),
            Err(ChannelError::Closed) => {
                debug!("executor closed the channel");
                break;
            }
            Err(e) => {
                debug!("executor channel failed: {}", e);
                break;
            }
        }
    }
    signals.update(|s| s.disconnected = true);
}

fn bind_listener(path: &Path) -> Result<UnixListener, HostError> {
    let socket_err = |e| HostError::Socket {
        path: path.to_path_buf(),
        source: e,
    };
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed stale socket {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(socket_err(e)),
    }
    let listener = UnixListener::bind(path).map_err(socket_err)?;
    listener.set_nonblocking(true).map_err(socket_err)?;
    Ok(listener)
}

/// Accept the executor's connection, giving up if it exits or the timeout
/// passes.
fn accept_one(
    listener: &UnixListener,
    path: &Path,
    child: &mut Child,
    timeout: Duration,
) -> Result<UnixStream, HostError> {
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).map_err(|e| HostError::Socket {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                return Ok(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                return Err(HostError::Socket {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
        if let Ok(Some(status)) = child.try_wait() {
            warn!("executor exited before connecting: {}", status);
            return Err(HostError::ConnectTimeout(timeout));
        }
        if Instant::now() >= deadline {
            return Err(HostError::ConnectTimeout(timeout));
        }
        std::thread::sleep(CONNECT_POLL);
    }
}

/// Bare program names resolve next to the current executable first, then
/// through PATH.
fn resolve_program(program: &str) -> PathBuf {
    let path = PathBuf::from(program);
    if path.components().count() > 1 {
        return path;
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(program)))
        .filter(|sibling| sibling.is_file())
        .unwrap_or(path)
}

fn wait_exit(child: &mut Child, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("executor exited: {}", status);
                return true;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("failed to poll executor: {}", e);
                return false;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(LIVENESS_POLL.min(window));
    }
}

/// Grace window, then SIGTERM, then SIGKILL.
fn reap(mut child: Child, config: &HostConfig) {
    if wait_exit(&mut child, config.exit_grace()) {
        return;
    }

    warn!("executor {} still running, sending SIGTERM", child.id());
    // SAFETY: kill(2) with a pid we spawned and have not yet reaped.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!("SIGTERM failed: {}", std::io::Error::last_os_error());
    }
    if wait_exit(&mut child, config.terminate_wait()) {
        return;
    }

    warn!("executor {} ignored SIGTERM, killing", child.id());
    if let Err(e) = child.kill() {
        warn!("failed to kill executor: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap executor: {}", e);
    }
}
