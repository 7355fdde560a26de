use axum::{extract::State, http::Uri};
use bitcoin::{BlockHash, Network};
use serde::{Deserialize, Serialize};

use crate::{bitcoin_client::BitcoinRpc, registry::Topic};

use super::{
    Env,
    error::{Error, HttpError},
    result::Result,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Info {
    pub version: String,
    pub network: Network,
    pub connections: usize,
    pub block_subscribers: usize,
}

pub async fn get_index<C: BitcoinRpc>(State(env): State<Env<C>>) -> Result<Info> {
    Ok(Info {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: env.config.network,
        connections: env.dispatcher.session_count().await,
        block_subscribers: env.registry.subscriber_count(Topic::Blocks).await,
    }
    .into())
}

/// Best block as the node reports it right now, for clients that join
/// after the transitions they care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    pub hash: BlockHash,
    pub height: u64,
}

pub async fn current_tip<C: BitcoinRpc>(bitcoin: &C) -> anyhow::Result<Tip> {
    let info = bitcoin.get_blockchain_info().await?;
    if info.initial_block_download {
        return Err(HttpError::Unavailable("node is in initial block download".into()).into());
    }
    Ok(Tip {
        hash: info.best_block_hash,
        height: info.blocks,
    })
}

pub async fn get_tip<C: BitcoinRpc>(State(env): State<Env<C>>) -> Result<Tip> {
    Ok(current_tip(&env.bitcoin).await?.into())
}

pub async fn not_found(uri: Uri) -> Error {
    HttpError::NotFound(uri.path().to_string()).into()
}
