use anyhow::{Result, anyhow};
use bitcoin::{BlockHash, Txid, hashes::Hash};

const EVENT_HANDSHAKE_SUCCEEDED: u16 = 0x1000;
// connect retried, closed, close failed, disconnected, handshake failures
const EVENTS_LOST: u16 = 0x0004 | 0x0080 | 0x0100 | 0x0200 | 0x0800 | 0x2000 | 0x4000;

/// Event mask passed to `zmq::Socket::monitor`.
pub const MONITORED_EVENTS: i32 = (EVENT_HANDSHAKE_SUCCEEDED | EVENTS_LOST) as i32;

/// What a socket-monitor event means for the sequence subscription.
#[derive(Debug, PartialEq)]
pub enum SocketEvent {
    Handshake,
    Lost(u16),
    Other(u16),
}

impl SocketEvent {
    pub fn from_zmq_message(multipart: Vec<Vec<u8>>) -> Result<Self> {
        let Some(frame) = multipart.first().filter(|frame| frame.len() >= 2) else {
            return Err(anyhow!("Received invalid monitor message"));
        };
        let event = u16::from_le_bytes([frame[0], frame[1]]);
        Ok(if event == EVENT_HANDSHAKE_SUCCEEDED {
            SocketEvent::Handshake
        } else if event & EVENTS_LOST != 0 {
            SocketEvent::Lost(event)
        } else {
            SocketEvent::Other(event)
        })
    }
}

pub const SEQUENCE: &str = "sequence";

/// One notification from the node's `zmqpubsequence` publisher.
#[derive(Debug, PartialEq)]
pub enum SequenceMessage {
    BlockConnected(BlockHash),
    BlockDisconnected(BlockHash),
    TransactionAdded {
        txid: Txid,
        mempool_sequence_number: u64,
    },
    TransactionRemoved {
        txid: Txid,
        mempool_sequence_number: u64,
    },
}

impl SequenceMessage {
    /// Parses `[topic, hash || label [|| mempool seq], publisher seq]`.
    pub fn from_zmq_message(mut multipart: Vec<Vec<u8>>) -> Result<(u32, Self)> {
        if multipart.len() != 3 || multipart[0] != SEQUENCE.as_bytes() {
            return Err(anyhow!("Received invalid multipart message"));
        }

        let sequence_number = u32::from_le_bytes(multipart[2][..].try_into()?);

        let data = &mut multipart[1];
        let len = data.len();
        if len < 33 {
            return Err(anyhow!(
                "Received message of invalid length: {}",
                hex::encode(data.as_slice())
            ));
        }

        let flag = data[32];
        // hashes are published in display order
        data[..32].reverse();
        let hash_slice = &data[..32];
        match (flag, len) {
            (b'C', 33) => Ok((
                sequence_number,
                SequenceMessage::BlockConnected(BlockHash::from_slice(hash_slice)?),
            )),
            (b'D', 33) => Ok((
                sequence_number,
                SequenceMessage::BlockDisconnected(BlockHash::from_slice(hash_slice)?),
            )),
            (b'A', 41) => Ok((
                sequence_number,
                SequenceMessage::TransactionAdded {
                    txid: Txid::from_slice(hash_slice)?,
                    mempool_sequence_number: u64::from_le_bytes(data[33..41].try_into()?),
                },
            )),
            (b'R', 41) => Ok((
                sequence_number,
                SequenceMessage::TransactionRemoved {
                    txid: Txid::from_slice(hash_slice)?,
                    mempool_sequence_number: u64::from_le_bytes(data[33..41].try_into()?),
                },
            )),
            _ => Err(anyhow!(
                "Received message with unknown flag {:#04x} and length {}",
                flag,
                len
            )),
        }
    }
}
