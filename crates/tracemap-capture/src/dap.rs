// ABOUTME: Debug Adapter Protocol client speaking Content-Length framed JSON
// ABOUTME: Routes responses by request_seq and fans events out over a broadcast channel

use crate::session::{
    DebugEvent, DebugSession, SessionError, SessionResult, StackFrame, ThreadDescriptor,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 256;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone)]
pub struct DapConfig {
    pub client_id: String,
    pub adapter_id: String,
    pub request_timeout: Duration,
}

impl Default for DapConfig {
    fn default() -> Self {
        Self {
            client_id: "tracemap".to_string(),
            adapter_id: "tracemap".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

struct DapInner {
    writer: tokio::sync::Mutex<Writer>,
    next_seq: AtomicI64,
    pending: Mutex<HashMap<i64, oneshot::Sender<Value>>>,
    events: broadcast::Sender<DebugEvent>,
    closed: AtomicBool,
    config: DapConfig,
}

/// A debug adapter connection.
pub struct DapSession {
    inner: Arc<DapInner>,
    capabilities: Mutex<Value>,
    reader_task: JoinHandle<()>,
    name: String,
}

impl DapSession {
    /// Connect over TCP and run the `initialize` handshake
    pub async fn connect<A: ToSocketAddrs + std::fmt::Display>(
        addr: A,
        config: DapConfig,
    ) -> SessionResult<Self> {
        let name = format!("dap://{}", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to debug adapter at {}", name);

        let session = Self::from_stream(stream, name, config);
        session.initialize().await?;
        Ok(session)
    }

    /// Wrap an already connected stream. No handshake is performed.
    pub fn from_stream<S>(stream: S, name: impl Into<String>, config: DapConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(DapInner {
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            next_seq: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            events,
            closed: AtomicBool::new(false),
            config,
        });

        let reader_task = tokio::spawn(read_loop(BufReader::new(read_half), Arc::clone(&inner)));

        Self {
            inner,
            capabilities: Mutex::new(Value::Null),
            reader_task,
            name: name.into(),
        }
    }

    pub async fn initialize(&self) -> SessionResult<Value> {
        let args = json!({
            "clientID": self.inner.config.client_id,
            "adapterID": self.inner.config.adapter_id,
            "linesStartAt1": true,
            "columnsStartAt1": true,
            "pathFormat": "path",
            "supportsRunInTerminalRequest": false,
        });
        let capabilities = self.request("initialize", args).await?;
        *self.capabilities.lock() = capabilities.clone();
        Ok(capabilities)
    }

    pub async fn attach(&self, args: Value) -> SessionResult<Value> {
        self.request("attach", args).await
    }

    pub async fn configuration_done(&self) -> SessionResult<Value> {
        self.request("configurationDone", json!({})).await
    }

    pub async fn disconnect(&self) -> SessionResult<()> {
        self.request("disconnect", json!({ "terminateDebuggee": false }))
            .await
            .map(|_| ())
    }

    pub fn capabilities(&self) -> Value {
        self.capabilities.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response body
    pub async fn request(&self, command: &str, arguments: Value) -> SessionResult<Value> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(seq, tx);

        let message = json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        });
        trace!("DAP -> {}", message);

        let write_result = {
            let mut writer = self.inner.writer.lock().await;
            write_message(&mut *writer, &message).await
        };
        if let Err(e) = write_result {
            self.inner.pending.lock().remove(&seq);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(SessionError::Closed),
            Err(_) => {
                self.inner.pending.lock().remove(&seq);
                return Err(SessionError::Timeout(command.to_string()));
            }
        };

        if response.get("success").and_then(Value::as_bool) != Some(true) {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(SessionError::RequestFailed {
                command: command.to_string(),
                message,
            });
        }

        Ok(response.get("body").cloned().unwrap_or(Value::Null))
    }
}

impl Drop for DapSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl DebugSession for DapSession {
    async fn list_threads(&self) -> SessionResult<Vec<ThreadDescriptor>> {
        let body = self.request("threads", json!({})).await?;
        let threads = body
            .get("threads")
            .cloned()
            .ok_or_else(|| SessionError::Protocol("threads response without 'threads'".into()))?;
        serde_json::from_value(threads)
            .map_err(|e| SessionError::Protocol(format!("invalid thread list: {}", e)))
    }

    async fn stack_trace(
        &self,
        thread_id: i64,
        max_frames: usize,
    ) -> SessionResult<Vec<StackFrame>> {
        let body = self
            .request(
                "stackTrace",
                json!({ "threadId": thread_id, "startFrame": 0, "levels": max_frames }),
            )
            .await?;
        let frames = body.get("stackFrames").cloned().ok_or_else(|| {
            SessionError::Protocol("stackTrace response without 'stackFrames'".into())
        })?;
        serde_json::from_value(frames)
            .map_err(|e| SessionError::Protocol(format!("invalid stack frames: {}", e)))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<DebugEvent>> {
        Some(self.inner.events.subscribe())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: BufReader<R>, inner: Arc<DapInner>) {
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => dispatch(&inner, message),
            Ok(None) => {
                debug!("Debug adapter closed the connection");
                break;
            }
            Err(e) => {
                warn!("Debug adapter stream failed: {}", e);
                break;
            }
        }
    }

    inner.closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with Closed
    inner.pending.lock().clear();
    let _ = inner.events.send(DebugEvent::Terminated);
}

fn dispatch(inner: &DapInner, message: Value) {
    trace!("DAP <- {}", message);
    match message.get("type").and_then(Value::as_str) {
        Some("response") => {
            let Some(request_seq) = message.get("request_seq").and_then(Value::as_i64) else {
                warn!("DAP response without request_seq");
                return;
            };
            match inner.pending.lock().remove(&request_seq) {
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => debug!("Dropping response for unknown request {}", request_seq),
            }
        }
        Some("event") => {
            let event = message
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let body = message.get("body").cloned().unwrap_or(Value::Null);
            // No subscribers is fine
            let _ = inner.events.send(DebugEvent::from_protocol(event, body));
        }
        other => debug!("Ignoring DAP message of type {:?}", other),
    }
}

/// Read one framed message. `Ok(None)` on a clean EOF between messages.
pub async fn read_message<R>(reader: &mut BufReader<R>) -> SessionResult<Option<Value>>
where
    R: AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut header_bytes = 0usize;
    let mut saw_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if header_bytes == 0 {
                return Ok(None);
            }
            return Err(SessionError::Protocol("EOF while reading header".into()));
        }
        header_bytes += n;
        if header_bytes > MAX_HEADER_BYTES {
            return Err(SessionError::Protocol("header too large".into()));
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            if content_length.is_some() {
                break;
            }
            if saw_header {
                return Err(SessionError::Protocol("missing Content-Length".into()));
            }
            continue;
        }
        saw_header = true;
        if let Some((key, value)) = trimmed.split_once(':') {
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let parsed = value.trim().parse().map_err(|e| {
                    SessionError::Protocol(format!("bad Content-Length: {}", e))
                })?;
                content_length = Some(parsed);
            }
        }
    }

    let length = content_length.unwrap_or_default();
    if length > MAX_BODY_BYTES {
        return Err(SessionError::Protocol(format!(
            "body too large ({} bytes)",
            length
        )));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| SessionError::Protocol(format!("invalid JSON body: {}", e)))
}

pub async fn write_message<W>(writer: &mut W, message: &Value) -> SessionResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| SessionError::Protocol(format!("failed to encode message: {}", e)))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_framing_roundtrip_multiple_messages() {
        let (mut client, server) = tokio::io::duplex(1024);
        write_message(&mut client, &json!({"seq": 1, "type": "event", "event": "a"}))
            .await
            .unwrap();
        write_message(&mut client, &json!({"seq": 2, "type": "event", "event": "b"}))
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let first = read_message(&mut reader).await.unwrap().unwrap();
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(first["event"], "a");
        assert_eq!(second["seq"], 2);
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_content_length_is_protocol_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"Content-Length: abc\r\n\r\n{}")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_before_allocating() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"Content-Length: 18446744073709551615\r\n\r\n{}")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ref m) if m.contains("body too large")));
    }

    #[tokio::test]
    async fn test_header_without_content_length_is_rejected() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"Content-Type: application/json\r\n\r\n{}")
            .await
            .unwrap();
        drop(client);

        let mut reader = BufReader::new(server);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ref m) if m.contains("Content-Length")));
    }
}
