use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use axum::{
    Extension,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{self, CloseFrame, WebSocket, close_code},
    },
    response::IntoResponse,
};
use futures_util::SinkExt;
use tokio::{select, sync::mpsc::Receiver, time::timeout};
use tower_http::request_id::RequestId;
use tracing::{Instrument, info, info_span, warn};

use crate::{
    bitcoin_client::BitcoinRpc,
    dispatcher::SessionHandle,
    error::NotifyError,
    message::WsMsg,
    session::Session,
};

use super::Env;

const MAX_SEND_MILLIS: u64 = 1000;

async fn send(socket: &mut WebSocket, msg: &WsMsg) -> Result<()> {
    let text = serde_json::to_string(msg)?;
    timeout(
        Duration::from_millis(MAX_SEND_MILLIS),
        socket.send(ws::Message::Text(text.into())),
    )
    .await??;
    Ok(())
}

async fn flush(socket: &mut WebSocket, receiver: &mut Receiver<WsMsg>) -> Result<()> {
    while let Ok(msg) = receiver.try_recv() {
        send(socket, &msg).await?;
    }
    Ok(())
}

/// Reports `error` to the client, then closes with `code`.
async fn close_with_error(socket: &mut WebSocket, error: &NotifyError, code: u16) {
    let msg = WsMsg::Error {
        error: error.to_string(),
    };
    if send(socket, &msg).await.is_err() {
        warn!("Failed to send error: connection closed");
        return;
    }
    let frame = CloseFrame {
        code,
        reason: "".into(),
    };
    if timeout(
        Duration::from_millis(MAX_SEND_MILLIS),
        socket.send(ws::Message::Close(Some(frame))),
    )
    .await
    .is_err()
    {
        warn!("Failed to send close frame");
    }
}

pub async fn handle_socket<C: BitcoinRpc>(
    mut socket: WebSocket,
    env: Env<C>,
    addr: SocketAddr,
    request_id: String,
) {
    let SessionHandle {
        id,
        mut receiver,
        evicted,
    } = env.dispatcher.open().await;
    let span = info_span!("socket", id = %request_id, connection = %id, client_addr = %addr);
    let cancel_token = env.cancel_token.clone();
    let mut session = Session::new(id, env.registry.clone());

    async move {
        info!("New WebSocket connection");
        loop {
            select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("WebSocket connection cancelled");
                    break;
                },
                _ = evicted.cancelled() => {
                    close_with_error(
                        &mut socket,
                        &NotifyError::SlowConsumer(id),
                        close_code::POLICY,
                    )
                    .await;
                    break;
                },
                option_msg = receiver.recv() => match option_msg {
                    Some(msg) => {
                        if let Err(e) = send(&mut socket, &msg).await {
                            warn!("Failed to send message: {}", e);
                            break;
                        }
                    }
                    None => {
                        info!("Outbound queue closed");
                        break;
                    }
                },
                option_result_message = socket.recv() => match option_result_message {
                    Some(Ok(ws::Message::Text(text))) => {
                        match session.handle_text(text.as_str()).await {
                            Ok(Some(ack)) => {
                                // events sequenced before the registry change go out first
                                if let Err(e) = flush(&mut socket, &mut receiver).await {
                                    warn!("Failed to send message: {}", e);
                                    break;
                                }
                                if let Err(e) = send(&mut socket, &ack).await {
                                    warn!("Failed to send acknowledgement: {}", e);
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!("{}", e);
                                close_with_error(&mut socket, &e, close_code::PROTOCOL).await;
                                break;
                            }
                        }
                    }
                    Some(Ok(ws::Message::Binary(_))) => {
                        let e = NotifyError::MalformedControlMessage(
                            "binary frames are not supported".to_string(),
                        );
                        warn!("{}", e);
                        close_with_error(&mut socket, &e, close_code::PROTOCOL).await;
                        break;
                    }
                    Some(Ok(ws::Message::Ping(data))) => {
                        if timeout(
                            Duration::from_millis(MAX_SEND_MILLIS),
                            socket.send(ws::Message::Pong(data)),
                        )
                        .await
                        .is_err()
                        {
                            warn!("Failed to send pong: connection closed");
                            break;
                        }
                    }
                    Some(Ok(ws::Message::Pong(_))) => {}
                    Some(Ok(ws::Message::Close(_))) => {
                        info!("Received close message");
                        break;
                    }
                    Some(Err(err)) => {
                        info!("Error receiving message: {}", err);
                        break;
                    }
                    None => {
                        info!("Connection dropped");
                        break;
                    }
                }
            }
        }

        session.close(&env.dispatcher).await;
        let _ = socket.close().await;
        info!("WebSocket connection closed");
    }
    .instrument(span)
    .await;
}

pub async fn handler<C: BitcoinRpc>(
    ws: WebSocketUpgrade,
    State(env): State<Env<C>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(request_id): Extension<RequestId>,
) -> impl IntoResponse {
    let request_id = request_id
        .header_value()
        .to_str()
        .unwrap_or("unknown")
        .to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, env, addr, request_id))
}
