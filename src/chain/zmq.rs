use std::thread;

use anyhow::{Context, Result, anyhow};
use backon::Retryable;
use bitcoin::BlockHash;
use scopeguard::defer;
use tokio::{
    select,
    sync::mpsc::{self, Sender, UnboundedSender},
    task::{self, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zmq::Socket;

use crate::{
    bitcoin_client::BitcoinRpc,
    retry::{new_backoff_unlimited, notify},
};

use super::{
    ChainEvent, ChainEventKind,
    messages::{MONITORED_EVENTS, SEQUENCE, SequenceMessage, SocketEvent},
};

fn run_monitor_socket(
    socket: Socket,
    cancel_token: CancellationToken,
    tx: UnboundedSender<Result<SocketEvent>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            if cancel_token.is_cancelled() {
                info!("Cancelling monitor socket thread");
                break;
            }

            match socket.recv_multipart(0) {
                Ok(multipart) => {
                    if tx
                        .send(SocketEvent::from_zmq_message(multipart))
                        .is_err()
                    {
                        info!("Send channel is closed, exiting monitor socket thread");
                        break;
                    }
                }
                Err(zmq::Error::EAGAIN) => {
                    continue;
                }
                Err(e) => {
                    if tx.send(Err(e.into())).is_err() {
                        info!("Send channel is closed, exiting monitor socket thread");
                        break;
                    }
                }
            }
        }

        info!("Monitor socket thread exited");
    })
}

fn run_socket(
    socket: Socket,
    cancel_token: CancellationToken,
    tx: UnboundedSender<Result<(u32, SequenceMessage)>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            if cancel_token.is_cancelled() {
                info!("Cancelling socket thread");
                break;
            }

            match socket.recv_multipart(0) {
                Ok(zmq_message) => {
                    if tx
                        .send(SequenceMessage::from_zmq_message(zmq_message))
                        .is_err()
                    {
                        info!("Send channel is closed, exiting socket thread");
                        break;
                    }
                }
                Err(zmq::Error::EAGAIN) => {
                    continue;
                }
                Err(e) => {
                    if tx.send(Err(e.into())).is_err() {
                        info!("Send channel is closed, exiting socket thread");
                        break;
                    }
                }
            }
        }

        info!("Socket thread exited");
    })
}

/// Looks up the height and timestamp of a block the node just announced.
/// Headers stay queryable after a disconnect, so this only fails on
/// cancellation or when the node has never seen the hash.
pub async fn chain_event<C: BitcoinRpc>(
    kind: ChainEventKind,
    block_hash: BlockHash,
    cancel_token: CancellationToken,
    bitcoin: &C,
) -> Result<ChainEvent> {
    let header = (|| bitcoin.get_block_header_info(&block_hash))
        .retry(new_backoff_unlimited())
        .notify(notify("get block header"))
        .when(move |e| !e.is_not_found() && !cancel_token.is_cancelled())
        .await
        .with_context(|| format!("Failed to get header of block {}", block_hash))?;
    Ok(ChainEvent {
        kind,
        block_hash,
        height: header.height,
        timestamp: header.time,
    })
}

pub async fn process_sequence_message<C: BitcoinRpc>(
    message: SequenceMessage,
    cancel_token: CancellationToken,
    bitcoin: &C,
) -> Result<Option<ChainEvent>> {
    match message {
        SequenceMessage::BlockConnected(block_hash) => Ok(Some(
            chain_event(ChainEventKind::Connected, block_hash, cancel_token, bitcoin).await?,
        )),
        SequenceMessage::BlockDisconnected(block_hash) => Ok(Some(
            chain_event(
                ChainEventKind::Disconnected,
                block_hash,
                cancel_token,
                bitcoin,
            )
            .await?,
        )),
        SequenceMessage::TransactionAdded { .. } | SequenceMessage::TransactionRemoved { .. } => {
            Ok(None)
        }
    }
}

pub async fn run<C: BitcoinRpc>(
    addr: &str,
    cancel_token: CancellationToken,
    bitcoin: C,
    tx: Sender<ChainEvent>,
) -> Result<JoinHandle<Result<()>>> {
    let (socket_tx, mut socket_rx) = mpsc::unbounded_channel();
    let (monitor_tx, mut monitor_rx) = mpsc::unbounded_channel();
    let socket_cancel_token = CancellationToken::new();
    let ctx = zmq::Context::new();
    let socket = ctx
        .socket(zmq::SUB)
        .context("Failed to create ZMQ socket")?;
    socket.set_subscribe(SEQUENCE.as_bytes())?;
    socket.set_rcvhwm(0)?;
    socket.set_rcvtimeo(1000)?;

    let monitor_endpoint = format!("inproc://{}-monitor", SEQUENCE);
    socket
        .monitor(&monitor_endpoint, MONITORED_EVENTS)
        .context("Failed to set up socket monitor")?;
    let monitor_socket = ctx
        .socket(zmq::PAIR)
        .context("Failed to create monitor socket")?;
    monitor_socket
        .connect(&monitor_endpoint)
        .context("Failed to connect monitor socket")?;
    monitor_socket.set_rcvhwm(0)?;
    monitor_socket.set_rcvtimeo(1000)?;
    let monitor_socket_handle =
        run_monitor_socket(monitor_socket, socket_cancel_token.clone(), monitor_tx);

    socket
        .connect(addr)
        .context("Could not connect to ZMQ address")?;
    let socket_handle = run_socket(socket, socket_cancel_token.clone(), socket_tx);

    Ok(task::spawn(async move {
        defer! {
            socket_cancel_token.cancel();
            if socket_handle.join().is_err() {
                error!("Socket thread panicked on join");
            }
            if monitor_socket_handle.join().is_err() {
                error!("Monitor socket thread panicked on join");
            }

            info!("Exited");
        }

        let mut last_sequence_number: Option<u32> = None;
        loop {
            select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("Cancelled");
                    return Ok(())
                },
                option_monitor_event = monitor_rx.recv() => {
                    match option_monitor_event {
                        Some(Ok(SocketEvent::Handshake)) => info!("ZMQ connected"),
                        Some(Ok(SocketEvent::Lost(event))) => {
                            return Err(anyhow!("ZMQ connection lost, monitor event {:#06x}", event));
                        },
                        Some(Ok(SocketEvent::Other(event))) => debug!("Monitor event {:#06x}", event),
                        Some(Err(e)) => {
                            return Err(e.context("Received Err from monitor socket thread, exiting"));
                        },
                        None => {
                            warn!("Received None message from monitor socket thread, exiting");
                            return Ok(());
                        },
                    }
                },
                option_message = socket_rx.recv() => {
                    match option_message {
                        Some(Ok((sequence_number, message))) => {
                            if let Some(n) = last_sequence_number
                                && sequence_number != n.wrapping_add(1)
                            {
                                return Err(anyhow!(
                                    "Received out of sequence messages: {} {}",
                                    n, sequence_number
                                ));
                            }
                            last_sequence_number = Some(sequence_number);

                            match process_sequence_message(message, cancel_token.clone(), &bitcoin).await {
                                Ok(Some(event)) => {
                                    debug!("{:?} {} at height {}", event.kind, event.block_hash, event.height);
                                    if tx.send(event).await.is_err() {
                                        info!("Send channel is closed, exiting");
                                        return Ok(())
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    if cancel_token.is_cancelled() {
                                        return Ok(());
                                    }
                                    return Err(e);
                                }
                            }
                        },
                        Some(Err(e)) => {
                            error!("Socket thread error: {:?}", e);
                            return Err(e.context("Received Err from socket thread, exiting"));
                        },
                        None => {
                            warn!("Received None message from socket thread, exiting");
                            return Ok(());
                        },
                    }
                },
            }
        }
    }))
}
