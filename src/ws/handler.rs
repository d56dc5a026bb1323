//! WebSocket upgrade handler

use std::fmt::Display;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::relay::{RelayEvent, RelayHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Buffer for messages addressed to a single connection
const DIRECT_CHANNEL_CAPACITY: usize = 32;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, relay: RelayHandle) {
    let (ws_sink, ws_stream) = socket.split();
    serve_connection(ws_sink, ws_stream, relay).await;
}

/// Drive one connection from open to close: announce it, pump frames both
/// ways, then report the disconnect to the relay
async fn serve_connection<S, R>(ws_sink: S, ws_stream: R, relay: RelayHandle)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    // Subscribe before announcing so no broadcast after the initial state is missed
    let updates_rx = relay.subscribe();
    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);

    let connected = RelayEvent::Connected {
        conn_id,
        direct_tx: direct_tx.clone(),
    };
    if relay.send(connected).await.is_err() {
        error!(conn_id = %conn_id, "Relay unavailable, dropping connection");
        return;
    }

    run_session(conn_id, ws_sink, ws_stream, &relay, direct_tx, direct_rx, updates_rx).await;

    // Cleanup on disconnect
    if relay.send(RelayEvent::Disconnected { conn_id }).await.is_err() {
        debug!(conn_id = %conn_id, "Relay gone before disconnect");
    }

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Outcome of one inbound text frame
#[derive(Debug)]
enum Inbound {
    /// Hand to the relay
    Forward(RelayEvent),
    /// Answer this connection directly
    Reply(ServerMsg),
}

/// Rate-limit, parse and route a text frame
fn screen_text(conn_id: Uuid, text: &str, rate_limiter: &ConnectionRateLimiter) -> Inbound {
    if !rate_limiter.check_input() {
        warn!(conn_id = %conn_id, "Rate limited input message");
        return Inbound::Reply(ServerMsg::error("rate_limited", "Too many messages"));
    }

    match ClientMsg::from_text(text) {
        Ok(ClientMsg::RegisterClient(role)) => {
            Inbound::Forward(RelayEvent::Register { conn_id, role })
        }
        Ok(ClientMsg::ControlInput(command)) => {
            Inbound::Forward(RelayEvent::Control { conn_id, command })
        }
        Ok(ClientMsg::Ping(ping)) => Inbound::Reply(ServerMsg::Pong {
            t: ping.and_then(|p| p.t),
        }),
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
            Inbound::Reply(ServerMsg::error("bad_message", e.to_string()))
        }
    }
}

/// Run the WebSocket session with read/write split
async fn run_session<S, R>(
    conn_id: Uuid,
    mut ws_sink: S,
    mut ws_stream: R,
    relay: &RelayHandle,
    direct_tx: mpsc::Sender<ServerMsg>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
    mut updates_rx: broadcast::Receiver<ServerMsg>,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: direct messages and broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            // Direct first so the initial state precedes later broadcasts
            let msg = tokio::select! {
                biased;
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                update = updates_rx.recv() => match update {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipping {} updates", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(conn_id = %conn_id, "Broadcast channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> relay
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match screen_text(conn_id, &text, &rate_limiter) {
                Inbound::Forward(event) => {
                    if relay.send(event).await.is_err() {
                        debug!(conn_id = %conn_id, "Relay channel closed");
                        break;
                    }
                }
                Inbound::Reply(msg) => reply(&direct_tx, msg),
            },
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(conn_id = %conn_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(conn_id = %conn_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Queue a message for this connection only, dropping it if the writer is behind
fn reply(direct_tx: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
    if direct_tx.try_send(msg).is_err() {
        debug!("Direct reply dropped");
    }
}

/// Send a message over WebSocket
async fn send_msg<S>(sink: &mut S, msg: &ServerMsg) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use serde_json::Value;

    use crate::relay::Relay;

    type Inbox = UnboundedSender<Result<Message, axum::Error>>;
    type Outbox = UnboundedReceiver<Message>;

    /// Start a relay and a session wired to in-memory channels instead of a socket
    fn open_session() -> (RelayHandle, Inbox, Outbox, tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let (relay, handle) = Relay::new();
        let relay_task = tokio::spawn(relay.run());

        let (in_tx, in_rx) = unbounded::<Result<Message, axum::Error>>();
        let (out_tx, out_rx) = unbounded::<Message>();
        let session = tokio::spawn(serve_connection(out_tx, in_rx, handle.clone()));

        (handle, in_tx, out_rx, session, relay_task)
    }

    fn send_text(inbox: &Inbox, text: &str) {
        inbox
            .unbounded_send(Ok(Message::Text(text.to_string())))
            .expect("session inbox closed");
    }

    async fn next_frame(outbox: &mut Outbox) -> Value {
        match tokio::time::timeout(Duration::from_secs(2), outbox.next()).await {
            Ok(Some(Message::Text(text))) => serde_json::from_str(&text).expect("frame is JSON"),
            Ok(other) => panic!("unexpected frame: {:?}", other),
            Err(_) => panic!("no frame within timeout"),
        }
    }

    /// Skip physics-tick updates until a frame matches
    async fn next_matching(outbox: &mut Outbox, pred: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..200 {
            let frame = next_frame(outbox).await;
            if pred(&frame) {
                return frame;
            }
        }
        panic!("expected frame never arrived");
    }

    #[test]
    fn register_and_control_frames_go_to_relay() {
        let limiter = ConnectionRateLimiter::new();
        let conn_id = Uuid::new_v4();

        match screen_text(conn_id, r#"{"event":"register-client","data":"web"}"#, &limiter) {
            Inbound::Forward(RelayEvent::Register { conn_id: id, role }) => {
                assert_eq!(id, conn_id);
                assert_eq!(role, "web");
            }
            other => panic!("expected register, got {:?}", other),
        }

        let frame = r#"{"event":"control-input","data":{"type":"brake","value":0.3}}"#;
        match screen_text(conn_id, frame, &limiter) {
            Inbound::Forward(RelayEvent::Control { command, .. }) => {
                assert_eq!(command.kind, "brake");
                assert_eq!(command.value, serde_json::json!(0.3));
            }
            other => panic!("expected control, got {:?}", other),
        }
    }

    #[test]
    fn bare_ping_gets_pong() {
        let limiter = ConnectionRateLimiter::new();
        match screen_text(Uuid::new_v4(), r#"{"event":"ping"}"#, &limiter) {
            Inbound::Reply(msg) => assert_eq!(msg, ServerMsg::Pong { t: None }),
            other => panic!("expected pong, got {:?}", other),
        }
        match screen_text(Uuid::new_v4(), r#"{"event":"ping","data":{"t":42}}"#, &limiter) {
            Inbound::Reply(msg) => assert_eq!(msg, ServerMsg::Pong { t: Some(42) }),
            other => panic!("expected pong, got {:?}", other),
        }
    }

    #[test]
    fn malformed_frame_gets_bad_message() {
        let limiter = ConnectionRateLimiter::new();
        for text in ["not json", r#"{"event":"report-crime","data":{}}"#, r#"{"event":"register-client"}"#] {
            match screen_text(Uuid::new_v4(), text, &limiter) {
                Inbound::Reply(ServerMsg::Error { code, .. }) => assert_eq!(code, "bad_message"),
                other => panic!("expected bad_message for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn over_limit_frame_gets_rate_limited() {
        let limiter = ConnectionRateLimiter::with_limit(1);
        let conn_id = Uuid::new_v4();
        let frame = r#"{"event":"register-client","data":"mobile"}"#;

        assert!(matches!(screen_text(conn_id, frame, &limiter), Inbound::Forward(_)));
        match screen_text(conn_id, frame, &limiter) {
            Inbound::Reply(ServerMsg::Error { code, .. }) => assert_eq!(code, "rate_limited"),
            other => panic!("expected rate_limited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn session_lifecycle_over_channels() {
        let (handle, inbox, mut outbox, session, relay_task) = open_session();

        let first = next_frame(&mut outbox).await;
        assert_eq!(first["event"], "vehicle-update");

        send_text(&inbox, r#"{"event":"register-client","data":"mobile"}"#);
        next_matching(&mut outbox, |f| {
            f["event"] == "connection-stats" && f["data"]["mobile"] == 1
        })
        .await;

        send_text(&inbox, "{oops");
        let error = next_matching(&mut outbox, |f| f["event"] == "error").await;
        assert_eq!(error["data"]["code"], "bad_message");

        send_text(&inbox, r#"{"event":"ping"}"#);
        next_matching(&mut outbox, |f| f["event"] == "pong").await;

        inbox
            .unbounded_send(Ok(Message::Close(None)))
            .expect("session inbox closed");
        tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session did not finish")
            .expect("session panicked");

        // Disconnect was queued before this query, so it is already applied
        let snapshot = handle.snapshot().await.expect("relay stopped");
        assert_eq!(snapshot.connections.mobile, 0);
        assert_eq!(snapshot.live_connections, 0);

        relay_task.abort();
    }

    #[tokio::test]
    async fn dropped_stream_still_disconnects() {
        let (handle, inbox, mut outbox, session, relay_task) = open_session();

        next_frame(&mut outbox).await;
        send_text(&inbox, r#"{"event":"register-client","data":"tablet"}"#);
        next_matching(&mut outbox, |f| {
            f["event"] == "connection-stats" && f["data"]["tablet"] == 1
        })
        .await;

        drop(inbox);
        tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session did not finish")
            .expect("session panicked");

        let snapshot = handle.snapshot().await.expect("relay stopped");
        assert_eq!(snapshot.connections.tablet, 0);

        relay_task.abort();
    }
}
