use serde::Deserialize;
use thiserror::Error as ThisError;

// bitcoind RPC error codes
pub const RPC_MISC_ERROR: i32 = -1;
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;

#[derive(Deserialize, Debug)]
pub struct BitcoinRpcErrorResponse {
    pub code: i32,
    pub message: String,
}

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bitcoin RPC error (code {code}): {message}")]
    BitcoinRpc { code: i32, message: String },
    #[error("Deserialize hex error: {0}")]
    DeserializeHex(#[from] bitcoin::consensus::encode::FromHexError),
    #[error("Invalid header value error: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

impl Error {
    /// True when the node does not have (or no longer has) the requested
    /// block data, either because the hash is unknown or because the block
    /// was pruned.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::BitcoinRpc { code, message } => {
                *code == RPC_INVALID_ADDRESS_OR_KEY
                    || (*code == RPC_MISC_ERROR && message.contains("pruned"))
            }
            _ => false,
        }
    }
}
