//! WebSocket upgrade handler and per-connection session

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::Event;
use crate::util::rate_limit::InputRateLimiter;
use crate::ws::protocol::{AmmaMoving, ClientMsg, Moving, Ping, PlayerId, ProtocolError};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    Malformed(ProtocolError),
    /// Text frames are not part of the protocol
    UnexpectedText,
    /// The server dropped the outbound queue (overflow or shutdown)
    ServerClosed,
    /// A frame write outlived the write timeout: the client stopped reading
    WriteTimeout,
    TransportError,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, state).await;
}

/// Admit one connection and run it to completion.
///
/// Returns `None` when the connection was refused at admission.
async fn serve_connection<S, R, E>(mut sink: S, stream: R, state: AppState) -> Option<SessionEnd>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let spawn = match state.admission.admit() {
        Ok(spawn) => spawn,
        Err(e) => {
            state.stats.counters().record_rejected();
            warn!(error = %e, "Connection refused");
            let write_timeout = state.config.write_timeout();
            close(&mut sink, close_code::AGAIN, e.to_string(), write_timeout).await;
            return None;
        }
    };

    let id = spawn.id;
    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(state.config.outbound_buffer);
    state.events.push(Event::Joined {
        spawn,
        outbound: outbound_tx,
    });

    info!(
        player_id = id,
        population = state.admission.population(),
        "New WebSocket connection"
    );

    let end = run_session(id, sink, stream, outbound_rx, &state).await;

    // Exactly one leave per admitted connection, whatever ended it
    state.admission.release();
    state.events.push(Event::Left { id });

    info!(player_id = id, reason = ?end, "WebSocket connection closed");
    Some(end)
}

/// Pump frames both ways until either side gives up
async fn run_session<S, R, E>(
    id: PlayerId,
    mut sink: S,
    mut stream: R,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    state: &AppState,
) -> SessionEnd
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let ping_limiter = InputRateLimiter::new(state.config.input_rate_limit);
    let write_timeout = state.config.write_timeout();
    let mut moving = Moving::NONE;

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => match outgoing {
                Some(frame) => {
                    let frame = Message::Binary(frame.to_vec());
                    match timeout(write_timeout, sink.send(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(player_id = id, error = %e, "WebSocket send failed");
                            return SessionEnd::TransportError;
                        }
                        Err(_) => {
                            warn!(player_id = id, "Client stopped reading");
                            return SessionEnd::WriteTimeout;
                        }
                    }
                }
                None => {
                    close(
                        &mut sink,
                        close_code::AWAY,
                        "disconnected by server",
                        write_timeout,
                    )
                    .await;
                    return SessionEnd::ServerClosed;
                }
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    state.stats.counters().record_received(data.len());

                    if let Err(e) = handle_frame(id, &data, &mut moving, &ping_limiter, state) {
                        state.stats.counters().record_malformed();
                        warn!(player_id = id, error = %e, "Malformed message, closing connection");
                        close(
                            &mut sink,
                            close_code::POLICY,
                            "malformed message",
                            write_timeout,
                        )
                        .await;
                        return SessionEnd::Malformed(e);
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    state.stats.counters().record_received(text.len());
                    state.stats.counters().record_malformed();
                    warn!(player_id = id, "Received text message, closing connection");
                    close(
                        &mut sink,
                        close_code::UNSUPPORTED,
                        "binary frames only",
                        write_timeout,
                    )
                    .await;
                    return SessionEnd::UnexpectedText;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::ClientClosed;
                }
                Some(Err(e)) => {
                    debug!(player_id = id, error = %e, "WebSocket error");
                    return SessionEnd::TransportError;
                }
            },
        }
    }
}

/// Decode one client frame and queue the matching event.
///
/// The session is the only writer of its player's intent, so it keeps the
/// mask locally and reports the full new value whenever it changes. Intent is
/// never rate limited; only pings are.
fn handle_frame(
    id: PlayerId,
    data: &[u8],
    moving: &mut Moving,
    ping_limiter: &InputRateLimiter,
    state: &AppState,
) -> Result<(), ProtocolError> {
    match ClientMsg::decode(data)? {
        ClientMsg::AmmaMoving(AmmaMoving { direction, start }) => {
            let next = moving.with(direction, start);
            if next != *moving {
                *moving = next;
                state.events.push(Event::Moving { id, moving: next });
            }
        }
        ClientMsg::Ping(Ping { timestamp }) => {
            if !ping_limiter.check_input() {
                debug!(player_id = id, "Rate limited ping");
                return Ok(());
            }
            state.events.push(Event::Ping { id, timestamp });
        }
    }
    Ok(())
}

async fn close<S>(sink: &mut S, code: u16, reason: impl Into<Cow<'static, str>>, limit: Duration)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    match timeout(limit, sink.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to send close frame"),
        Err(_) => debug!("Timed out sending close frame"),
    }
}
