use bitcoin::BlockHash;
use thiserror::Error as ThisError;

use crate::registry::ConnectionId;

/// Conditions the notification engine reports. None of them stop the event
/// stream; each is scoped to a single message or a single connection.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("coinbase data unavailable for block {block_hash}: {reason}")]
    ResolverUnavailable { block_hash: BlockHash, reason: String },
    #[error("connection {0} could not keep up and was closed")]
    SlowConsumer(ConnectionId),
    #[error("registry inconsistency: {0}")]
    RegistryRace(String),
    #[error("malformed control message: {0}")]
    MalformedControlMessage(String),
}
