use std::time::Duration;

use backon::Retryable;
use bitcoin::{BlockHash, Transaction};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use thiserror::Error as ThisError;
use tokio::time::timeout;

use crate::{
    bitcoin_client::{self, BitcoinRpc},
    retry::{new_backoff_limited, notify},
};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseOutput {
    /// Amount in satoshis
    pub value: u64,
    #[serde_as(as = "Hex")]
    pub output_script: Vec<u8>,
}

/// Script and outputs of a block's first transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseData {
    #[serde_as(as = "Hex")]
    pub coinbase_scriptsig: Vec<u8>,
    pub coinbase_outputs: Vec<CoinbaseOutput>,
}

impl CoinbaseData {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            coinbase_scriptsig: tx
                .input
                .first()
                .map(|input| input.script_sig.to_bytes())
                .unwrap_or_default(),
            coinbase_outputs: tx
                .output
                .iter()
                .map(|output| CoinbaseOutput {
                    value: output.value.to_sat(),
                    output_script: output.script_pubkey.to_bytes(),
                })
                .collect(),
        }
    }
}

#[derive(ThisError, Debug)]
pub enum ResolveError {
    #[error("block {0} is unknown or its data was pruned")]
    NotFound(BlockHash),
    #[error("block {0} has no transactions")]
    MissingCoinbase(BlockHash),
    #[error("timed out fetching block {0}")]
    Timeout(BlockHash),
    #[error("RPC failure: {0}")]
    Rpc(#[from] bitcoin_client::Error),
}

pub trait CoinbaseResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        block_hash: &BlockHash,
    ) -> impl Future<Output = Result<CoinbaseData, ResolveError>> + Send;
}

/// Reads the coinbase out of the full block fetched from the node. Retries
/// transient RPC failures, never a missing block, and gives up once
/// `timeout` has elapsed.
#[derive(Clone, Debug)]
pub struct RpcCoinbaseResolver<C: BitcoinRpc> {
    bitcoin: C,
    timeout: Duration,
}

impl<C: BitcoinRpc> RpcCoinbaseResolver<C> {
    pub fn new(bitcoin: C, timeout: Duration) -> Self {
        Self { bitcoin, timeout }
    }
}

impl<C: BitcoinRpc> CoinbaseResolver for RpcCoinbaseResolver<C> {
    async fn resolve(&self, block_hash: &BlockHash) -> Result<CoinbaseData, ResolveError> {
        let fetch = (|| self.bitcoin.get_block(block_hash))
            .retry(new_backoff_limited())
            .notify(notify("get block"))
            .when(|e| !e.is_not_found());
        let block = match timeout(self.timeout, fetch).await {
            Err(_) => return Err(ResolveError::Timeout(*block_hash)),
            Ok(Err(e)) if e.is_not_found() => return Err(ResolveError::NotFound(*block_hash)),
            Ok(result) => result?,
        };
        block
            .txdata
            .first()
            .map(CoinbaseData::from_transaction)
            .ok_or(ResolveError::MissingCoinbase(*block_hash))
    }
}
