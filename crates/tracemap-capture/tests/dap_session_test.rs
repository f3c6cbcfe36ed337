use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{BufReader, DuplexStream};
use tracemap_capture::dap::{read_message, write_message};
use tracemap_capture::*;

/// Minimal adapter: answers a handful of commands and emits one event
async fn fake_adapter(stream: DuplexStream) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut seq = 1000;

    while let Ok(Some(request)) = read_message(&mut reader).await {
        let command = request["command"].as_str().unwrap_or_default().to_string();
        let (success, body, message): (bool, Value, Option<&str>) = match command.as_str() {
            "initialize" => (true, json!({"supportsConfigurationDoneRequest": true}), None),
            "threads" => {
                seq += 1;
                let event = json!({
                    "seq": seq, "type": "event", "event": "stopped",
                    "body": {"reason": "breakpoint", "threadId": 1}
                });
                write_message(&mut write_half, &event).await.unwrap();
                (true, json!({"threads": [{"id": 1, "name": "MainThread"}, {"id": 2}]}), None)
            }
            "stackTrace" => {
                let levels = request["arguments"]["levels"].as_u64().unwrap_or(0);
                assert_eq!(levels, 30);
                (
                    true,
                    json!({"stackFrames": [
                        {"id": 1, "name": "handle", "source": {"path": "/proj/app.py"}, "line": 12},
                        {"id": 2, "name": "<module>", "source": {"path": "/proj/app.py"}, "line": 1}
                    ], "totalFrames": 2}),
                    None,
                )
            }
            "evaluate" => (true, json!({"result": "no frames here"}), None),
            "attach" => (false, Value::Null, Some("attach not supported")),
            "hang" => continue,
            _ => (true, Value::Null, None),
        };

        seq += 1;
        let mut response = json!({
            "seq": seq,
            "type": "response",
            "request_seq": request["seq"],
            "command": command,
            "success": success,
            "body": body,
        });
        if let Some(message) = message {
            response["message"] = json!(message);
        }
        write_message(&mut write_half, &response).await.unwrap();
    }
}

fn connect() -> DapSession {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(fake_adapter(server));
    DapSession::from_stream(
        client,
        "fake-adapter",
        DapConfig {
            request_timeout: Duration::from_millis(500),
            ..DapConfig::default()
        },
    )
}

#[tokio::test]
async fn test_initialize_records_capabilities() {
    let session = connect();
    session.initialize().await.unwrap();
    assert_eq!(
        session.capabilities()["supportsConfigurationDoneRequest"],
        true
    );
    assert_eq!(session.name(), "fake-adapter");
}

#[tokio::test]
async fn test_threads_and_stack_frames_are_typed() {
    let session = connect();

    let threads = session.list_threads().await.unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].name, "MainThread");
    assert_eq!(threads[1].name, "");

    let frames = session.stack_trace(1, 30).await.unwrap();
    assert_eq!(frames[0].name, "handle");
    assert_eq!(frames[0].source_path(), "/proj/app.py");
    assert_eq!(frames[1].name, "<module>");
}

#[tokio::test]
async fn test_events_are_broadcast() {
    let session = connect();
    let mut events = session.subscribe().unwrap();

    session.list_threads().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        DebugEvent::Stopped {
            reason: "breakpoint".into(),
            thread_id: Some(1)
        }
    );
}

#[tokio::test]
async fn test_failed_response_and_missing_body_field() {
    let session = connect();

    let err = session.attach(json!({"port": 5678})).await.unwrap_err();
    assert!(
        matches!(err, SessionError::RequestFailed { ref message, .. } if message == "attach not supported")
    );

    let body = session.request("evaluate", json!({"expression": "1"})).await.unwrap();
    assert_eq!(body["result"], "no frames here");
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let session = connect();
    let err = session.request("hang", json!({})).await.unwrap_err();
    assert!(matches!(err, SessionError::Timeout(ref c) if c == "hang"));

    // The connection stays usable afterwards
    assert_eq!(session.list_threads().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_closed_adapter_fails_pending_and_future_requests() {
    let (client, server) = tokio::io::duplex(1024);
    let session = DapSession::from_stream(client, "closing", DapConfig::default());
    drop(server);

    let err = session.list_threads().await.unwrap_err();
    assert!(matches!(err, SessionError::Closed | SessionError::Io(_)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(session.is_closed());
    assert!(matches!(
        session.list_threads().await.unwrap_err(),
        SessionError::Closed
    ));
}
