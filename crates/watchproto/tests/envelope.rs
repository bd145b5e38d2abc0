//! Envelope behavior across the blocking and async framings.

use std::io::Cursor;

use serde_json::{json, Map, Value};
use watchproto::frame::{recv_message, send_message};
use watchproto::{
    split_channel, ChannelError, Command, CommandAction, CommandResponse, HttpRequestData,
    NormalizedHttpEvent, OutOfBandStatus, Webhook,
};

fn sample_commands() -> Vec<Command> {
    let request = HttpRequestData {
        method: "POST".to_string(),
        url: "https://api.openai.com/v1/chat/completions".to_string(),
        headers: [("content-type".to_string(), "application/json".to_string())].into(),
        body: Some(r#"{"model":"gpt-4o","messages":[]}"#.to_string()),
    };
    let event = NormalizedHttpEvent::request(&request).unwrap();
    let mut guid = Map::new();
    guid.insert("guid".to_string(), json!("abc"));

    vec![
        Command::new("exec", CommandAction::Ping, None),
        Command::new("exec", CommandAction::Shutdown, None),
        Command::new("exec", CommandAction::RemoveWebhook, Some(guid)),
        Command::with_payload("exec", CommandAction::Event, &event).unwrap(),
        Command::with_payload(
            "exec",
            CommandAction::AddWebhook,
            &Webhook::new("http://localhost:9002/api/events").with_header("X-Trace", "1"),
        )
        .unwrap(),
    ]
}

#[test]
fn every_command_survives_a_blocking_roundtrip() {
    let mut buf = Vec::new();
    let commands = sample_commands();
    for cmd in &commands {
        send_message(&mut buf, cmd).unwrap();
    }

    let mut cursor = Cursor::new(buf);
    for cmd in &commands {
        let decoded: Command = recv_message(&mut cursor).unwrap();
        assert_eq!(&decoded, cmd);
    }
    let end = recv_message::<_, Command>(&mut cursor).unwrap_err();
    assert!(end.is_closed());
}

#[test]
fn event_params_decode_back_to_the_event() {
    let cmd = &sample_commands()[3];
    let event: NormalizedHttpEvent = cmd.params_as().unwrap();
    let payload = event.payload().unwrap();
    assert_eq!(payload.header("Content-Type"), Some("application/json"));
}

#[tokio::test]
async fn async_peers_exchange_commands_and_responses() {
    let (host, executor) = tokio::net::UnixStream::pair().unwrap();
    let (mut host_rx, host_tx) = split_channel(host);
    let (mut exec_rx, exec_tx) = split_channel(executor);

    exec_tx
        .send(&CommandResponse::status_push(OutOfBandStatus::Initialized))
        .await
        .unwrap();
    let push: CommandResponse = host_rx.receive().await.unwrap();
    assert_eq!(push.out_of_band_status(), Some(OutOfBandStatus::Initialized));

    for cmd in sample_commands() {
        host_tx.send(&cmd).await.unwrap();
        let received: Command = exec_rx.receive().await.unwrap();
        exec_tx
            .send(&received.reply(true).with_data(Value::Null))
            .await
            .unwrap();
        let resp: CommandResponse = host_rx.receive().await.unwrap();
        assert_eq!(resp.callback_id.as_deref(), Some(cmd.callback_id.as_str()));
    }

    host_tx.close().await.unwrap();
    let err = exec_rx.receive::<Command>().await.unwrap_err();
    assert!(matches!(err, ChannelError::Closed));
}
