//! The container RPC session — connect, heartbeat, metadata, predict.
//!
//! The serve loop runs as a single `tokio` task per session instead of
//! a dedicated OS thread, over a length-prefixed `TcpStream` instead of
//! a ZeroMQ `DEALER` socket (see `wire.rs`).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{CoreError, Result};
use crate::types::{Input, InputParser, InputType};

use super::events::{EventHistory, RpcEvent};
use super::model::Model;
use super::wire::{self, HeartbeatType, MessageType, RequestType};

/// `Disconnected → Connecting → Unconfirmed → Active → Disconnected`.
/// `Connecting` and `Disconnected` are not held as
/// distinct loop states here: `Connecting` is the body of the outer
/// reconnect loop up to the initial heartbeat send, and `Disconnected`
/// is simply "outer loop about to run again" — both transient enough
/// that giving them their own enum variant would add no observable
/// behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfirmed,
    Active,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub poll_tick: Duration,
    pub activity_timeout: Duration,
    pub event_history_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_tick: Duration::from_secs(5),
            activity_timeout: Duration::from_secs(30),
            event_history_capacity: super::events::DEFAULT_EVENT_HISTORY_CAPACITY,
        }
    }
}

/// A worker-side RPC session. `start`/`stop` are the only public
/// lifecycle operations; everything else is internal to
/// the serving loop.
pub struct Session {
    config: SessionConfig,
    started: AtomicBool,
    stop: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
    events: Arc<Mutex<EventHistory>>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            events: Arc::new(Mutex::new(EventHistory::new(config.event_history_capacity))),
            config,
            started: AtomicBool::new(false),
            stop: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Starts the session's serving task. Idempotent guard: a second
    /// call while already started returns `CoreError::AlreadyStarted`
    /// without disturbing the running session.
    pub fn start<M, P>(&self, model: M, parser: P, server_addr: SocketAddr) -> Result<()>
    where
        M: Model,
        P: InputParser + 'static,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(CoreError::AlreadyStarted);
        }
        let config = self.config;
        let stop = self.stop.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            serve_loop(model, parser, move || TcpStream::connect(server_addr), config, stop, events).await;
        });
        *self.handle.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Signals the serving task to stop and joins it. A no-op if the
    /// session was never started.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop.notify_waiters();
        let task = self.handle.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn event_history(&self) -> Vec<RpcEvent> {
        self.events.lock().unwrap().iter().copied().collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// The serving loop, generic over the transport connector so it can be
/// driven against an in-memory duplex stream in tests (see
/// `mod tests`) instead of a real `TcpStream`.
async fn serve_loop<M, P, T, C, Fut>(
    mut model: M,
    mut parser: P,
    mut connect: C,
    config: SessionConfig,
    stop: Arc<Notify>,
    events: Arc<Mutex<EventHistory>>,
) where
    M: Model,
    P: InputParser,
    T: AsyncRead + AsyncWrite + Unpin + Send,
    C: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    let mut input_header_buf: Vec<u8> = Vec::new();
    let mut output_buf: Vec<u8> = Vec::new();

    'reconnect: loop {
        let mut stream = tokio::select! {
            _ = stop.notified() => return,
            res = connect() => match res {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(error = %err, "connect failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue 'reconnect;
                }
            },
        };

        if let Err(err) = send_heartbeat(&mut stream, &events).await {
            tracing::warn!(error = %err, "failed to send initial heartbeat, reconnecting");
            continue 'reconnect;
        }

        let mut state = SessionState::Unconfirmed;
        let mut last_activity: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = stop.notified() => return,
                outcome = tokio::time::timeout(config.poll_tick, wire::read_frame(&mut stream)) => {
                    match outcome {
                        Err(_elapsed) => {
                            if state == SessionState::Active {
                                let idle = last_activity.expect("Active implies an observed activity time").elapsed();
                                if idle >= config.activity_timeout {
                                    let err = CoreError::ActivityTimeout(idle);
                                    tracing::info!(error = %err, "reconnecting");
                                    metrics::counter!(crate::telemetry::RPC_RECONNECTS_TOTAL).increment(1);
                                    continue 'reconnect;
                                }
                            }
                            if let Err(err) = send_heartbeat(&mut stream, &events).await {
                                tracing::warn!(error = %err, "failed to send keep-alive heartbeat, reconnecting");
                                continue 'reconnect;
                            }
                        }
                        Ok(Err(err)) => {
                            tracing::warn!(error = %err, "transport failure, reconnecting");
                            continue 'reconnect;
                        }
                        Ok(Ok(delimiter)) => {
                            if !delimiter.is_empty() {
                                tracing::warn!("expected an empty delimiter frame, reconnecting");
                                continue 'reconnect;
                            }
                            last_activity = Some(Instant::now());
                            state = SessionState::Active;
                            if let Err(err) = service_message(
                                &mut stream,
                                &mut model,
                                &mut parser,
                                &mut input_header_buf,
                                &mut output_buf,
                                &events,
                            )
                            .await
                            {
                                tracing::warn!(error = %err, "transport failure servicing a message, reconnecting");
                                continue 'reconnect;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn send_heartbeat<T: AsyncWrite + Unpin>(stream: &mut T, events: &Mutex<EventHistory>) -> Result<()> {
    wire::write_frame(stream, b"").await?;
    wire::write_i32(stream, MessageType::Heartbeat.tag()).await?;
    wire::write_i32(stream, HeartbeatType::KeepAlive as i32).await?;
    events.lock().unwrap().push(RpcEvent::SentHeartbeat);
    metrics::counter!(crate::telemetry::RPC_HEARTBEATS_SENT_TOTAL).increment(1);
    Ok(())
}

async fn send_container_metadata<T: AsyncWrite + Unpin, M: Model>(
    stream: &mut T,
    model: &M,
    events: &Mutex<EventHistory>,
) -> Result<()> {
    wire::write_frame(stream, b"").await?;
    wire::write_i32(stream, MessageType::NewContainer.tag()).await?;
    wire::write_frame(stream, model.name().as_bytes()).await?;
    wire::write_frame(stream, model.version().to_string().as_bytes()).await?;
    wire::write_frame(stream, model.input_type().to_string().as_bytes()).await?;
    events.lock().unwrap().push(RpcEvent::SentContainerMetadata);
    Ok(())
}

/// Dispatches on the already-consumed delimiter frame's following type
/// frame. Reads and drains exactly the frames the message type
/// requires, so protocol sync is preserved even on a type mismatch.
async fn service_message<T, M, P>(
    stream: &mut T,
    model: &M,
    parser: &mut P,
    input_header_buf: &mut Vec<u8>,
    output_buf: &mut Vec<u8>,
    events: &Mutex<EventHistory>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    M: Model,
    P: InputParser,
{
    let message_type = wire::read_i32(stream).await?;
    let message_type = MessageType::from_tag(message_type)
        .ok_or_else(|| CoreError::TransportFailure(format!("unknown message type tag {message_type}")))?;

    match message_type {
        MessageType::Heartbeat => {
            events.lock().unwrap().push(RpcEvent::ReceivedHeartbeat);
            let heartbeat_type = wire::read_i32(stream).await?;
            if HeartbeatType::from_tag(heartbeat_type) == Some(HeartbeatType::RequestContainerMetadata) {
                send_container_metadata(stream, model, events).await?;
            }
            Ok(())
        }
        MessageType::ContainerContent => {
            events.lock().unwrap().push(RpcEvent::ReceivedContainerContent);
            let request_id = wire::read_i32(stream).await?;
            let request_type = wire::read_i32(stream).await?;
            match RequestType::from_tag(request_type) {
                Some(RequestType::PredictRequest) => {
                    handle_predict_request(stream, model, parser, input_header_buf, output_buf, request_id, events)
                        .await
                }
                Some(RequestType::FeedbackRequest) | None => Ok(()),
            }
        }
        MessageType::NewContainer => {
            events.lock().unwrap().push(RpcEvent::ReceivedContainerMetadata);
            tracing::error!("received a NewContainer message, which is illegal at the worker; ignoring");
            Ok(())
        }
    }
}

fn grow_to_at_least(buf: &mut Vec<u8>, required: usize) {
    if buf.len() < required {
        buf.resize(required.max(2 * required), 0);
    }
}

async fn handle_predict_request<T, M, P>(
    stream: &mut T,
    model: &M,
    parser: &mut P,
    input_header_buf: &mut Vec<u8>,
    output_buf: &mut Vec<u8>,
    request_id: i32,
    events: &Mutex<EventHistory>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    M: Model,
    P: InputParser,
{
    let input_header_size_bytes = wire::read_i64(stream).await? as usize;
    let header_bytes = wire::read_frame(stream).await?;
    grow_to_at_least(input_header_buf, header_bytes.len());
    input_header_buf[..header_bytes.len()].copy_from_slice(&header_bytes);
    let _ = input_header_size_bytes; // frame length already gives us the byte count; the declared size is a redundant wire field, validated implicitly by read_frame.

    let header = wire::decode_i64_seq(&input_header_buf[..header_bytes.len()]);
    let declared_tag = *header.first().unwrap_or(&-1);

    let content_size_bytes = wire::read_i64(stream).await? as usize;
    let content_bytes = wire::read_frame(stream).await?;
    let scratch = parser.get_data_buffer(content_size_bytes);
    let copy_len = content_size_bytes.min(content_bytes.len()).min(scratch.len());
    scratch[..copy_len].copy_from_slice(&content_bytes[..copy_len]);

    match InputType::from_tag(declared_tag) {
        Some(declared) if declared != model.input_type() => {
            let err = CoreError::InputTypeMismatch { declared, expected: model.input_type() };
            tracing::warn!(error = %err, "request dropped, session remains active");
            metrics::counter!(crate::telemetry::RPC_PREDICT_REQUESTS_TOTAL, "outcome" => "type_mismatch")
                .increment(1);
            return Ok(());
        }
        Some(_) => {}
        None => {
            tracing::warn!(tag = declared_tag, "received an unrecognized input type tag; request dropped");
            metrics::counter!(crate::telemetry::RPC_PREDICT_REQUESTS_TOTAL, "outcome" => "type_mismatch")
                .increment(1);
            return Ok(());
        }
    }

    let inputs: Vec<Box<dyn Input>> = parser.get_inputs(&header[1..], &content_bytes[..content_size_bytes.min(content_bytes.len())]);

    let outputs = match model.predict(inputs) {
        Ok(outputs) => {
            metrics::counter!(crate::telemetry::RPC_PREDICT_REQUESTS_TOTAL, "outcome" => "ok").increment(1);
            outputs
        }
        Err(err) => {
            tracing::warn!(error = %err, "model invocation failed, returning a zero-output response");
            metrics::counter!(crate::telemetry::RPC_PREDICT_REQUESTS_TOTAL, "outcome" => "model_error")
                .increment(1);
            Vec::new()
        }
    };

    send_predict_response(stream, output_buf, request_id, &outputs, events).await
}

/// Encodes and writes the `i32 num_outputs | i32 out_len[...] | u8
/// out_bytes[...]` body.
async fn send_predict_response<T: AsyncWrite + Unpin>(
    stream: &mut T,
    output_buf: &mut Vec<u8>,
    request_id: i32,
    outputs: &[String],
    events: &Mutex<EventHistory>,
) -> Result<()> {
    let num_outputs = outputs.len();
    let response_size = 4 + 4 * num_outputs + outputs.iter().map(|s| s.len()).sum::<usize>();
    grow_to_at_least(output_buf, response_size);

    let body = &mut output_buf[..response_size];
    body[0..4].copy_from_slice(&(num_outputs as i32).to_le_bytes());
    let mut content_offset = 4 + 4 * num_outputs;
    for (i, out) in outputs.iter().enumerate() {
        let len_offset = 4 + 4 * i;
        body[len_offset..len_offset + 4].copy_from_slice(&(out.len() as i32).to_le_bytes());
        body[content_offset..content_offset + out.len()].copy_from_slice(out.as_bytes());
        content_offset += out.len();
    }

    wire::write_frame(stream, b"").await?;
    wire::write_i32(stream, MessageType::ContainerContent.tag()).await?;
    wire::write_i32(stream, request_id).await?;
    wire::write_frame(stream, &output_buf[..response_size]).await?;
    events.lock().unwrap().push(RpcEvent::SentContainerContent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    struct EchoLengthModel {
        input_type: InputType,
    }

    impl Model for EchoLengthModel {
        fn name(&self) -> &str {
            "echo-length"
        }
        fn version(&self) -> u32 {
            1
        }
        fn input_type(&self) -> InputType {
            self.input_type
        }
        fn predict(&self, inputs: Vec<Box<dyn Input>>) -> std::result::Result<Vec<String>, String> {
            Ok(inputs.iter().map(|i| i.hash().to_string()).collect())
        }
    }

    struct FailingModel;

    impl Model for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }
        fn version(&self) -> u32 {
            1
        }
        fn input_type(&self) -> InputType {
            InputType::Bytes
        }
        fn predict(&self, _inputs: Vec<Box<dyn Input>>) -> std::result::Result<Vec<String>, String> {
            Err("boom".to_string())
        }
    }

    async fn write_predict_request<T: AsyncWrite + Unpin>(
        stream: &mut T,
        request_id: i32,
        input_type_tag: i64,
        content: &[u8],
    ) {
        wire::write_frame(stream, b"").await.unwrap();
        wire::write_i32(stream, MessageType::ContainerContent.tag()).await.unwrap();
        wire::write_i32(stream, request_id).await.unwrap();
        wire::write_i32(stream, RequestType::PredictRequest as i32).await.unwrap();

        let header = vec![input_type_tag, content.len() as i64];
        let header_bytes: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
        wire::write_i64(stream, header_bytes.len() as i64).await.unwrap();
        wire::write_frame(stream, &header_bytes).await.unwrap();
        wire::write_i64(stream, content.len() as i64).await.unwrap();
        wire::write_frame(stream, content).await.unwrap();
    }

    async fn write_keepalive_heartbeat<T: AsyncWrite + Unpin>(stream: &mut T) {
        wire::write_frame(stream, b"").await.unwrap();
        wire::write_i32(stream, MessageType::Heartbeat.tag()).await.unwrap();
        wire::write_i32(stream, HeartbeatType::KeepAlive as i32).await.unwrap();
    }

    #[tokio::test]
    async fn s4_predict_round_trip_encodes_outputs_per_the_wire_layout() {
        let (mut client, server) = duplex(4096);
        let model = EchoLengthModel { input_type: InputType::Floats };
        let mut parser = super::super::parser::BytesInputParser::new();
        let mut input_header_buf = Vec::new();
        let mut output_buf = Vec::new();
        let events = Mutex::new(EventHistory::default());

        write_predict_request(&mut client, 42, InputType::Floats.tag(), b"abcdefgh").await;

        let mut server = server;
        // Consume the delimiter the way serve_loop would before dispatching.
        let delimiter = wire::read_frame(&mut server).await.unwrap();
        assert!(delimiter.is_empty());
        service_message(&mut server, &model, &mut parser, &mut input_header_buf, &mut output_buf, &events)
            .await
            .unwrap();

        assert!(wire::read_frame(&mut client).await.unwrap().is_empty());
        assert_eq!(wire::read_i32(&mut client).await.unwrap(), MessageType::ContainerContent.tag());
        assert_eq!(wire::read_i32(&mut client).await.unwrap(), 42);
        let body = wire::read_frame(&mut client).await.unwrap();
        assert_eq!(i32::from_le_bytes(body[0..4].try_into().unwrap()), 1);
    }

    #[tokio::test]
    async fn s5_type_mismatch_is_logged_and_session_keeps_servicing() {
        let (mut client, server) = duplex(4096);
        let model = EchoLengthModel { input_type: InputType::Floats };
        let mut parser = super::super::parser::BytesInputParser::new();
        let mut input_header_buf = Vec::new();
        let mut output_buf = Vec::new();
        let events = Mutex::new(EventHistory::default());

        write_predict_request(&mut client, 7, InputType::Ints.tag(), b"abcd").await;

        let mut server = server;
        let _ = wire::read_frame(&mut server).await.unwrap();
        let result = service_message(&mut server, &model, &mut parser, &mut input_header_buf, &mut output_buf, &events).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn model_invocation_failure_yields_a_zero_output_response() {
        let (mut client, server) = duplex(4096);
        let model = FailingModel;
        let mut parser = super::super::parser::BytesInputParser::new();
        let mut input_header_buf = Vec::new();
        let mut output_buf = Vec::new();
        let events = Mutex::new(EventHistory::default());

        write_predict_request(&mut client, 1, InputType::Bytes.tag(), b"xy").await;

        let mut server = server;
        let _ = wire::read_frame(&mut server).await.unwrap();
        service_message(&mut server, &model, &mut parser, &mut input_header_buf, &mut output_buf, &events)
            .await
            .unwrap();

        let _ = wire::read_frame(&mut client).await.unwrap();
        let _ = wire::read_i32(&mut client).await.unwrap();
        let _ = wire::read_i32(&mut client).await.unwrap();
        let body = wire::read_frame(&mut client).await.unwrap();
        assert_eq!(i32::from_le_bytes(body[0..4].try_into().unwrap()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn s6_activity_timeout_reconnects_and_emits_a_fresh_heartbeat() {
        let (mut far_end_a, near_end_a) = duplex(4096);
        let (mut far_end_b, near_end_b) = duplex(4096);

        // Pre-buffer one inbound KeepAlive so the session's very first
        // select iteration observes activity and transitions to Active,
        // without needing to race the write against the spawned task.
        write_keepalive_heartbeat(&mut far_end_a).await;

        let mut ends: std::collections::VecDeque<tokio::io::DuplexStream> = [near_end_a, near_end_b].into();

        let config = SessionConfig {
            poll_tick: Duration::from_millis(50),
            activity_timeout: Duration::from_millis(200),
            event_history_capacity: 10,
        };
        let stop = Arc::new(Notify::new());
        let events = Arc::new(Mutex::new(EventHistory::default()));

        let model = EchoLengthModel { input_type: InputType::Bytes };
        let parser = super::super::parser::BytesInputParser::new();

        let stop_for_task = stop.clone();
        let events_for_task = events.clone();
        let task = tokio::spawn(async move {
            serve_loop(
                model,
                parser,
                move || {
                    let next = ends.pop_front();
                    async move {
                        match next {
                            Some(stream) => Ok(stream),
                            None => std::future::pending::<std::io::Result<tokio::io::DuplexStream>>().await,
                        }
                    }
                },
                config,
                stop_for_task,
                events_for_task,
            )
            .await;
        });

        // Drain the first connection's initial heartbeat (delimiter, type, subtype).
        let _ = wire::read_frame(&mut far_end_a).await.unwrap();
        let _ = wire::read_i32(&mut far_end_a).await.unwrap();
        let _ = wire::read_i32(&mut far_end_a).await.unwrap();

        // Nothing else ever arrives on this connection; advance past the
        // activity timeout so the session reconnects.
        tokio::time::advance(config.activity_timeout + config.poll_tick * 2).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // The second connection's fresh initial heartbeat proves a reconnect happened.
        let delimiter = wire::read_frame(&mut far_end_b).await.unwrap();
        assert!(delimiter.is_empty());
        assert_eq!(wire::read_i32(&mut far_end_b).await.unwrap(), MessageType::Heartbeat.tag());

        stop.notify_waiters();
        let _ = task.await;
    }
}
