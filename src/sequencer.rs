//! The single path from chain events to subscribers.
//!
//! Events are handled one at a time in arrival order. For each one the
//! coinbase (disconnects only) is resolved first, with no lock held; then the
//! registry is locked, the subscriber set snapshotted and the message queued
//! to every subscriber before the lock is released. A subscribe or
//! unsubscribe therefore lands strictly between two events.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::{select, sync::mpsc::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    chain::{ChainEvent, ChainEventKind},
    coinbase::CoinbaseResolver,
    dispatcher::{Delivery, Dispatcher},
    error::NotifyError,
    message::{MsgBlock, WsMsg},
    registry::{Registry, Topic},
};

pub struct Sequencer<R: CoinbaseResolver> {
    resolver: Arc<R>,
    registry: Registry,
    dispatcher: Dispatcher,
    processed: Arc<AtomicU64>,
}

impl<R: CoinbaseResolver> Clone for Sequencer<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            processed: self.processed.clone(),
        }
    }
}

impl<R: CoinbaseResolver> Sequencer<R> {
    pub fn new(resolver: R, registry: Registry, dispatcher: Dispatcher) -> Self {
        Self {
            resolver: Arc::new(resolver),
            registry,
            dispatcher,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of events fully handed off so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub async fn build_message(&self, event: &ChainEvent) -> MsgBlock {
        match event.kind {
            ChainEventKind::Connected => MsgBlock::connected(event),
            ChainEventKind::Disconnected => {
                let coinbase_data = match self.resolver.resolve(&event.block_hash).await {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!(
                            "{}",
                            NotifyError::ResolverUnavailable {
                                block_hash: event.block_hash,
                                reason: e.to_string(),
                            }
                        );
                        None
                    }
                };
                MsgBlock::disconnected(event, coinbase_data)
            }
        }
    }

    pub async fn process(&self, event: ChainEvent) -> Delivery {
        let msg = WsMsg::Block(self.build_message(&event).await);
        let delivery = {
            let subscriptions = self.registry.lock().await;
            let ids = subscriptions.snapshot(Topic::Blocks);
            self.dispatcher.deliver(&msg, &ids).await
        };
        self.processed.fetch_add(1, Ordering::Release);
        info!(
            "{:?} {} at height {} -> {} subscriber(s)",
            event.kind, event.block_hash, event.height, delivery.delivered
        );
        delivery
    }

    pub fn run(&self, cancel_token: CancellationToken, mut rx: Receiver<ChainEvent>) -> JoinHandle<()> {
        let sequencer = self.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!("Cancelled");
                        break;
                    }
                    option_event = rx.recv() => match option_event {
                        Some(event) => {
                            sequencer.process(event).await;
                        }
                        None => {
                            info!("Chain event channel closed, exiting");
                            break;
                        }
                    }
                }
            }
            info!("Exited");
        })
    }
}
