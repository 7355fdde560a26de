use std::collections::HashSet;

use tracing::{error, info};

use crate::{
    dispatcher::Dispatcher,
    error::NotifyError,
    message::{Request, WsMsg},
    registry::{ConnectionId, Registry, Topic},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Subscribed(HashSet<Topic>),
    Closed,
}

/// Control-plane state of one WebSocket connection. The outbound queue
/// lives in the [`Dispatcher`]; this type only tracks topics and lifecycle.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
    registry: Registry,
}

impl Session {
    pub fn new(id: ConnectionId, registry: Registry) -> Self {
        Self {
            id,
            state: SessionState::Open,
            registry,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Applies a control request and returns the acknowledgement. Requests
    /// after close are ignored.
    pub async fn handle_request(&mut self, request: Request) -> Option<WsMsg> {
        let mut topics = match &self.state {
            SessionState::Closed => return None,
            SessionState::Open => HashSet::new(),
            SessionState::Subscribed(topics) => topics.clone(),
        };
        let ack = match request {
            Request::Subscribe { topic } => {
                if self.registry.subscribe(self.id, topic).await {
                    info!("Subscribed to {}", topic);
                }
                topics.insert(topic);
                WsMsg::Subscribed { topic }
            }
            Request::Unsubscribe { topic } => {
                if self.registry.unsubscribe(self.id, topic).await {
                    info!("Unsubscribed from {}", topic);
                }
                topics.remove(&topic);
                WsMsg::Unsubscribed { topic }
            }
        };
        self.state = if topics.is_empty() {
            SessionState::Open
        } else {
            SessionState::Subscribed(topics)
        };
        Some(ack)
    }

    /// Parses a text frame into a request. Malformed input leaves the
    /// session untouched.
    pub fn parse_request(text: &str) -> Result<Request, NotifyError> {
        serde_json::from_str(text).map_err(|e| NotifyError::MalformedControlMessage(e.to_string()))
    }

    pub async fn handle_text(&mut self, text: &str) -> Result<Option<WsMsg>, NotifyError> {
        let request = Self::parse_request(text)?;
        Ok(self.handle_request(request).await)
    }

    /// Removes the connection from the registry first, then from the
    /// dispatcher, so no later event is sequenced for it. Idempotent.
    pub async fn close(&mut self, dispatcher: &Dispatcher) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Closed;
        if let Err(e) = self.registry.remove_connection(self.id).await {
            error!("{}", e);
        }
        dispatcher.close(self.id).await;
    }
}
