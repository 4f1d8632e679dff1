//! WebSocket connection state machine.
//!
//! Drives the read/write loop for a single WebSocket connection: an
//! authentication phase bounded by the configured grace period, then
//! command dispatch interleaved with event delivery and relayed
//! signaling frames. A malformed frame closes only this connection.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;

use super::messages::{ClientMessage, ServerMessage};
use crate::app_state::AppState;
use crate::domain::{CloseReason, ConnectionId, Transport};
use crate::error::GatewayError;
use crate::service::SessionService;
use crate::signaling::{PeerSignal, SignalKind};

/// Outcome of dispatching one inbound frame.
enum Dispatch {
    /// Send a frame back, keep going.
    Reply(ServerMessage),
    /// Nothing to send, keep going.
    Continue,
    /// Close the connection with this reason.
    Close(CloseReason),
}

/// Runs the full lifecycle of one WebSocket connection.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let service = state.service.clone();
    let mut handle = service.connect(Transport::WebSocket).await;
    let conn_id = handle.id;
    let mut bus_sub = service.event_bus().subscriber();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let grace = state.settings.borrow().auth_grace;
    match auth_phase(&mut ws_rx, &service, conn_id, grace).await {
        Ok(()) => {
            let ack = ServerMessage::AuthOk {
                connection_id: conn_id,
            };
            if send_frame(&mut ws_tx, &ack).await.is_err() {
                service.disconnect(conn_id, CloseReason::Normal).await;
                return;
            }
        }
        Err(reason) => {
            send_close(&mut ws_tx, reason).await;
            service.disconnect(conn_id, reason).await;
            return;
        }
    }

    let exit = loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match dispatch(&text, &service, conn_id).await {
                            Dispatch::Reply(frame) => {
                                if send_frame(&mut ws_tx, &frame).await.is_err() {
                                    break None;
                                }
                            }
                            Dispatch::Continue => {}
                            Dispatch::Close(reason) => break Some(reason),
                        }
                    }
                    Some(Ok(Message::Binary(_))) => break Some(CloseReason::ProtocolError),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break None,
                    Some(Ok(_)) => {}
                }
            }
            event = bus_sub.recv() => {
                let Some(event) = event else { break None };
                let wanted = service.event_bus().matches(conn_id, &event).await
                    && service.registry().is_member(conn_id, &event.channel).await;
                if wanted {
                    let frame = ServerMessage::Event {
                        name: event.name,
                        payload: event.payload,
                        emitted_at: event.emitted_at,
                        source_module: event.source_module,
                    };
                    if send_frame(&mut ws_tx, &frame).await.is_err() {
                        break None;
                    }
                }
            }
            signal = handle.signal_rx.recv() => {
                // The sender is dropped when the registry removes us.
                let Some(signal) = signal else { break None };
                if send_frame(&mut ws_tx, &signal_frame(signal)).await.is_err() {
                    break None;
                }
            }
            changed = handle.close_rx.changed() => {
                if changed.is_err() {
                    break None;
                }
                let reason = *handle.close_rx.borrow_and_update();
                if let Some(reason) = reason {
                    break Some(reason);
                }
            }
        }
    };

    let reason = exit.unwrap_or(CloseReason::Normal);
    if exit.is_some() {
        send_close(&mut ws_tx, reason).await;
    }
    service.disconnect(conn_id, reason).await;
}

/// Waits for the first frame, which must be a valid `auth` within the
/// grace period; idle unauthenticated sockets do not accumulate.
async fn auth_phase(
    ws_rx: &mut SplitStream<WebSocket>,
    service: &SessionService,
    conn_id: ConnectionId,
    grace: std::time::Duration,
) -> Result<(), CloseReason> {
    let deadline = timeout(grace, async {
        loop {
            match ws_rx.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                _ => return None,
            }
        }
    });

    let Ok(Some(text)) = deadline.await else {
        // Timed out, disconnected, or sent a non-text frame first.
        return Err(CloseReason::Unauthorized);
    };
    let Ok(ClientMessage::Auth { key }) = serde_json::from_str::<ClientMessage>(&text) else {
        return Err(CloseReason::ProtocolError);
    };
    service
        .authenticate(conn_id, &key)
        .await
        .map_err(|_| CloseReason::Unauthorized)
}

/// Dispatches one authenticated-phase frame.
async fn dispatch(text: &str, service: &SessionService, conn_id: ConnectionId) -> Dispatch {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        return Dispatch::Close(CloseReason::ProtocolError);
    };

    // Re-authentication is always allowed (needed after key rotation);
    // everything else requires the connection to currently hold auth.
    if let ClientMessage::Auth { key } = &msg {
        return match service.authenticate(conn_id, key).await {
            Ok(()) => Dispatch::Reply(ServerMessage::AuthOk {
                connection_id: conn_id,
            }),
            Err(_) => Dispatch::Close(CloseReason::Unauthorized),
        };
    }
    if !service.registry().is_authenticated(conn_id).await {
        return Dispatch::Reply(error_frame(&GatewayError::Unauthorized));
    }

    match msg {
        ClientMessage::Auth { .. } => Dispatch::Continue,
        ClientMessage::Subscribe { pattern } => {
            service.event_bus().subscribe(conn_id, &pattern).await;
            Dispatch::Reply(ServerMessage::Subscribed { pattern })
        }
        ClientMessage::Unsubscribe { pattern } => {
            service.event_bus().unsubscribe(conn_id, &pattern).await;
            Dispatch::Reply(ServerMessage::Unsubscribed { pattern })
        }
        ClientMessage::Join { channel } => match service.registry().join(conn_id, &channel).await {
            Ok(()) => Dispatch::Reply(ServerMessage::Joined { channel }),
            Err(err) => Dispatch::Reply(error_frame(&err)),
        },
        ClientMessage::Leave { channel } => match service.registry().leave(conn_id, &channel).await
        {
            Ok(()) => Dispatch::Reply(ServerMessage::Left { channel }),
            Err(err) => Dispatch::Reply(error_frame(&err)),
        },
        ClientMessage::Offer {
            to_connection_id,
            sdu,
        } => match service.broker().relay_offer(conn_id, to_connection_id, sdu).await {
            Ok(session_id) => Dispatch::Reply(ServerMessage::Offered { session_id }),
            Err(err) => Dispatch::Reply(error_frame(&err)),
        },
        ClientMessage::Answer { session_id, sdu } => {
            match service.broker().relay_answer(session_id, conn_id, sdu).await {
                Ok(()) => Dispatch::Continue,
                Err(err) => Dispatch::Reply(error_frame(&err)),
            }
        }
        ClientMessage::Ice { session_id, sdu } => {
            match service.broker().relay_ice(session_id, conn_id, sdu).await {
                Ok(()) => Dispatch::Continue,
                Err(err) => Dispatch::Reply(error_frame(&err)),
            }
        }
        ClientMessage::Connected { session_id } => {
            match service.broker().notify_connected(session_id, conn_id).await {
                Ok(()) => Dispatch::Continue,
                Err(err) => Dispatch::Reply(error_frame(&err)),
            }
        }
    }
}

fn error_frame(err: &GatewayError) -> ServerMessage {
    ServerMessage::Error {
        code: err.error_code(),
        message: err.to_string(),
    }
}

fn signal_frame(signal: PeerSignal) -> ServerMessage {
    match signal.kind {
        SignalKind::Offer => ServerMessage::Offer {
            session_id: signal.session_id,
            from_connection_id: signal.from,
            sdu: signal.sdu,
        },
        SignalKind::Answer => ServerMessage::Answer {
            session_id: signal.session_id,
            from_connection_id: signal.from,
            sdu: signal.sdu,
        },
        SignalKind::Ice => ServerMessage::Ice {
            session_id: signal.session_id,
            from_connection_id: signal.from,
            sdu: signal.sdu,
        },
        SignalKind::Closed => ServerMessage::SessionClosed {
            session_id: signal.session_id,
        },
    }
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    ws_tx.send(Message::text(json)).await
}

async fn send_close(ws_tx: &mut SplitSink<WebSocket, Message>, reason: CloseReason) {
    let frame = CloseFrame {
        code: reason.ws_code(),
        reason: reason.as_str().into(),
    };
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
}
