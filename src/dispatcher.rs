use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{
    Mutex,
    mpsc::{self, Receiver, Sender, error::TrySendError},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{error::NotifyError, message::WsMsg, registry::ConnectionId};

/// The receiving half of a session's outbound queue. `evicted` fires when
/// the dispatcher gave up on the session because its queue filled up.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: ConnectionId,
    pub receiver: Receiver<WsMsg>,
    pub evicted: CancellationToken,
}

#[derive(Debug)]
struct Outbound {
    sender: Sender<WsMsg>,
    evicted: CancellationToken,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub slow_consumers: Vec<ConnectionId>,
    /// Targets that had already closed; sending to them is a no-op.
    pub stale: usize,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    sessions: Arc<Mutex<HashMap<ConnectionId, Outbound>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    pub async fn open(&self) -> SessionHandle {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.capacity);
        let evicted = CancellationToken::new();
        self.sessions.lock().await.insert(
            id,
            Outbound {
                sender,
                evicted: evicted.clone(),
            },
        );
        SessionHandle {
            id,
            receiver,
            evicted,
        }
    }

    pub async fn close(&self, id: ConnectionId) -> bool {
        self.sessions.lock().await.remove(&id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Queues `msg` for every listed connection without waiting on any of
    /// them. A full queue evicts its session rather than blocking the
    /// caller or dropping the message silently.
    pub async fn deliver(&self, msg: &WsMsg, ids: &[ConnectionId]) -> Delivery {
        let mut sessions = self.sessions.lock().await;
        let mut delivery = Delivery::default();
        let mut gone = vec![];
        for id in ids {
            let Some(outbound) = sessions.get(id) else {
                delivery.stale += 1;
                continue;
            };
            match outbound.sender.try_send(msg.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("{}", NotifyError::SlowConsumer(*id));
                    outbound.evicted.cancel();
                    delivery.slow_consumers.push(*id);
                    gone.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {} already closed", id);
                    delivery.stale += 1;
                    gone.push(*id);
                }
            }
        }
        for id in gone {
            sessions.remove(&id);
        }
        delivery
    }
}
