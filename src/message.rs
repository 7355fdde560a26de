//! JSON frames exchanged with WebSocket clients.

use bitcoin::BlockHash;
use serde::{Deserialize, Serialize};

use crate::{
    chain::{ChainEvent, ChainEventKind},
    coinbase::CoinbaseData,
    registry::Topic,
};

/// A block notification. Only disconnects carry coinbase data, and only
/// when the disconnected block could still be read from the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type")]
pub enum MsgBlock {
    #[serde(rename = "BLK_CONNECTED")]
    Connected {
        block_hash: BlockHash,
        block_height: u64,
        block_timestamp: i64,
    },
    #[serde(rename = "BLK_DISCONNECTED")]
    Disconnected {
        block_hash: BlockHash,
        block_height: u64,
        block_timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coinbase_data: Option<CoinbaseData>,
    },
}

impl MsgBlock {
    pub fn connected(event: &ChainEvent) -> Self {
        debug_assert_eq!(event.kind, ChainEventKind::Connected);
        MsgBlock::Connected {
            block_hash: event.block_hash,
            block_height: event.height,
            block_timestamp: event.timestamp,
        }
    }

    pub fn disconnected(event: &ChainEvent, coinbase_data: Option<CoinbaseData>) -> Self {
        debug_assert_eq!(event.kind, ChainEventKind::Disconnected);
        MsgBlock::Disconnected {
            block_hash: event.block_hash,
            block_height: event.height,
            block_timestamp: event.timestamp,
            coinbase_data,
        }
    }

    pub fn block_hash(&self) -> BlockHash {
        match self {
            MsgBlock::Connected { block_hash, .. } | MsgBlock::Disconnected { block_hash, .. } => {
                *block_hash
            }
        }
    }

    pub fn block_height(&self) -> u64 {
        match self {
            MsgBlock::Connected { block_height, .. }
            | MsgBlock::Disconnected { block_height, .. } => *block_height,
        }
    }

    pub fn coinbase_data(&self) -> Option<&CoinbaseData> {
        match self {
            MsgBlock::Connected { .. } => None,
            MsgBlock::Disconnected { coinbase_data, .. } => coinbase_data.as_ref(),
        }
    }
}

/// Everything the server writes to a socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMsg {
    Block(MsgBlock),
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Error { error: String },
}

impl WsMsg {
    pub fn topic(&self) -> Option<Topic> {
        match self {
            WsMsg::Block(_) => Some(Topic::Blocks),
            _ => None,
        }
    }
}

impl From<MsgBlock> for WsMsg {
    fn from(msg: MsgBlock) -> Self {
        WsMsg::Block(msg)
    }
}

/// Control frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
}

impl Request {
    pub fn topic(&self) -> Topic {
        match self {
            Request::Subscribe { topic } | Request::Unsubscribe { topic } => *topic,
        }
    }
}
