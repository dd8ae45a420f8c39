//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Outbound, RoomCommand, RoomHandle};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The room a connection is currently attached to
struct RoomLink {
    handle: RoomHandle,
    events: broadcast::Receiver<Outbound>,
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "new WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "failed to send welcome");
        return;
    }

    run_connection(player_id, ws_sink, ws_stream, &state).await;

    // Cleanup on disconnect; mid-round departures force-end short rounds
    state.registry.leave(player_id).await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Translate wire messages into room commands and relay the room's
/// broadcast back out, until the client disconnects
async fn run_connection(
    player_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    state: &AppState,
) {
    let rate_limiter = PlayerRateLimiter::new();
    let mut room: Option<RoomLink> = None;

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(msg) => {
                                if handle_client_msg(
                                    player_id,
                                    msg,
                                    &mut room,
                                    &mut ws_sink,
                                    state,
                                    &rate_limiter,
                                )
                                .await
                                .is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(player_id = %player_id, error = %e, "unparseable client message");
                            }
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        warn!(player_id = %player_id, "binary message ignored");
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        info!(player_id = %player_id, "client initiated close");
                        break;
                    }
                    Err(e) => {
                        error!(player_id = %player_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            event = room_event(&mut room) => {
                match event {
                    Ok(out) => {
                        if out.recipient.includes(player_id)
                            && send_msg(&mut ws_sink, &out.msg).await.is_err()
                        {
                            debug!(player_id = %player_id, "WebSocket send failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Keep the connection; the next snapshot resyncs it
                        warn!(player_id = %player_id, lagged = n, "client lagged, skipping {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(player_id = %player_id, "room channel closed");
                        room = None;
                    }
                }
            }
        }
    }
}

/// Wait for the next event from the current room; a connection without a
/// room parks here until a join replaces it
async fn room_event(room: &mut Option<RoomLink>) -> Result<Outbound, broadcast::error::RecvError> {
    match room {
        Some(link) => link.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_client_msg(
    player_id: Uuid,
    msg: ClientMsg,
    room: &mut Option<RoomLink>,
    ws_sink: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    rate_limiter: &PlayerRateLimiter,
) -> Result<(), ()> {
    match msg {
        ClientMsg::JoinRoom { player_name, room_code } => {
            // Joining while in a room leaves the old one first
            if room.take().is_some() {
                state.registry.leave(player_id).await;
            }

            match state.registry.join(player_id, room_code) {
                Ok(handle) => {
                    // Subscribe before staging the join so the roster
                    // reply is not missed
                    let events = handle.subscribe();
                    let name = if player_name.trim().is_empty() {
                        format!("Player_{}", &player_id.to_string()[..8])
                    } else {
                        player_name
                    };
                    if handle
                        .send(RoomCommand::AddPlayer { player_id, name })
                        .await
                        .is_err()
                    {
                        send_error(ws_sink, "the room is no longer open").await?;
                        return Ok(());
                    }
                    *room = Some(RoomLink { handle, events });
                }
                Err(e) => {
                    error!(player_id = %player_id, error = %e, "join failed");
                    send_error(ws_sink, &e.to_string()).await?;
                }
            }
        }
        ClientMsg::LeaveRoom => {
            if room.take().is_some() {
                state.registry.leave(player_id).await;
            }
        }
        ClientMsg::StartGame => match room {
            Some(link) => {
                let _ = link.handle.send(RoomCommand::StartGame { player_id }).await;
            }
            None => send_error(ws_sink, "you are not in a room").await?,
        },
        ClientMsg::PlayerInput { direction } => {
            if !rate_limiter.check_input() {
                debug!(player_id = %player_id, "rate limited input message");
                return Ok(());
            }
            if let Some(link) = room {
                let _ = link
                    .handle
                    .send(RoomCommand::Input { player_id, direction })
                    .await;
            }
        }
        ClientMsg::UseAbility { ability } => {
            if let Some(link) = room {
                let _ = link
                    .handle
                    .send(RoomCommand::UseAbility { player_id, ability })
                    .await;
            }
        }
    }
    Ok(())
}

async fn send_error(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &str,
) -> Result<(), ()> {
    send_msg(sink, &ServerMsg::RoomError { message: message.to_string() })
        .await
        .map_err(|_| ())
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
