//! Chain tip transitions as observed from the node.
//!
//! The node publishes every block connection and disconnection on its ZMQ
//! `sequence` topic in commit order. [`run`] turns that stream into
//! [`ChainEvent`]s on a bounded channel, restarting the listener when the
//! socket fails.

use std::time::Duration;

use anyhow::Result;
use bitcoin::BlockHash;
use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio::{select, sync::mpsc::Sender, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bitcoin_client::BitcoinRpc;

pub mod messages;
pub mod zmq;

const RESTART_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEventKind {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct ChainEvent {
    pub kind: ChainEventKind,
    pub block_hash: BlockHash,
    pub height: u64,
    /// Block header time, in seconds since the epoch
    pub timestamp: i64,
}

impl ChainEvent {
    pub fn is_disconnect(&self) -> bool {
        self.kind == ChainEventKind::Disconnected
    }
}

pub fn run<C: BitcoinRpc>(
    addr: String,
    cancel_token: CancellationToken,
    bitcoin: C,
    tx: Sender<ChainEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match zmq::run(&addr, cancel_token.clone(), bitcoin.clone(), tx.clone()).await {
                Ok(handle) => match handle.await {
                    Ok(Ok(_)) => break,
                    Ok(Err(e)) => {
                        error!(
                            "ZMQ listener failed, transitions may have been missed: {}",
                            e
                        );
                    }
                    Err(e) => {
                        error!("ZMQ listener panicked on join: {}", e);
                    }
                },
                Err(e) => {
                    error!("ZMQ listener failed to start: {}", e);
                }
            }

            if tx.is_closed() {
                warn!("Chain event channel closed");
                break;
            }

            select! {
                _ = sleep(RESTART_DELAY) => {}
                _ = cancel_token.cancelled() => break,
            }

            info!("Restarting ZMQ listener");
        }

        info!("Exited");
    })
}
