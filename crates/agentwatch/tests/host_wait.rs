//! Correlated waits against a scripted executor.

use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use agentwatch::{Host, HostError};
use watchconf::AgentwatchConfig;
use watchproto::frame::{recv_message, send_message};
use watchproto::{Command, CommandAction, CommandResponse, OutOfBandStatus};

fn config() -> AgentwatchConfig {
    let mut config = AgentwatchConfig::default();
    config.host.init_timeout_ms = 500;
    config.host.exit_timeout_ms = 100;
    config
}

/// Replies to every command with the given callback id transform.
fn scripted_executor(
    mut stream: UnixStream,
    reply_id: impl Fn(&Command) -> Option<String> + Send + 'static,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        send_message(
            &mut stream,
            &CommandResponse::status_push(OutOfBandStatus::Initialized),
        )
        .unwrap();
        while let Ok(cmd) = recv_message::<_, Command>(&mut stream) {
            if cmd.action == CommandAction::Shutdown {
                let _ = send_message(
                    &mut stream,
                    &CommandResponse::status_push(OutOfBandStatus::ExitReady),
                );
                break;
            }
            let mut resp = cmd.reply(true);
            resp.callback_id = reply_id(&cmd);
            if send_message(&mut stream, &resp).is_err() {
                break;
            }
        }
    })
}

#[test]
fn mismatched_responses_are_discarded_until_timeout() {
    let (host_end, executor_end) = UnixStream::pair().unwrap();
    let executor = scripted_executor(executor_end, |_| Some("someone-else".to_string()));
    let host = Host::attach(host_end, &config()).unwrap();
    assert!(host.is_initialized());

    let timeout = Duration::from_millis(300);
    let started = Instant::now();
    let err = host
        .send_command_wait(CommandAction::Ping, None, Some(timeout))
        .unwrap_err();

    assert!(started.elapsed() >= timeout);
    match err {
        HostError::Timeout { action, .. } => assert_eq!(action, CommandAction::Ping),
        other => panic!("expected timeout, got {other}"),
    }

    host.shutdown();
    executor.join().unwrap();
}

#[test]
fn matching_response_is_returned() {
    let (host_end, executor_end) = UnixStream::pair().unwrap();
    let executor = scripted_executor(executor_end, |cmd| Some(cmd.callback_id.clone()));
    let host = Host::attach(host_end, &config()).unwrap();

    let resp = host
        .send_command_wait(CommandAction::Ping, None, Some(Duration::from_secs(2)))
        .unwrap();
    assert!(resp.success);

    host.shutdown();
    executor.join().unwrap();
}

#[test]
fn stale_responses_from_fire_and_forget_are_not_returned() {
    let (host_end, executor_end) = UnixStream::pair().unwrap();
    let executor = scripted_executor(executor_end, |cmd| Some(cmd.callback_id.clone()));
    let host = Host::attach(host_end, &config()).unwrap();

    let fired = host.send_command(CommandAction::Ping, None).unwrap();
    let resp = host
        .send_command_wait(CommandAction::Ping, None, Some(Duration::from_secs(2)))
        .unwrap();
    assert_ne!(resp.callback_id.as_deref(), Some(fired.as_str()));

    host.shutdown();
    executor.join().unwrap();
}

#[test]
fn executor_hangup_fails_the_wait() {
    let (host_end, executor_end) = UnixStream::pair().unwrap();
    let host = Host::attach(host_end, &config()).unwrap();
    drop(executor_end);

    let err = host
        .send_command_wait(CommandAction::Ping, None, Some(Duration::from_secs(2)))
        .unwrap_err();
    assert!(matches!(err, HostError::NotRunning | HostError::Transport(_)));
}
