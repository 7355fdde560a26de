use std::time::Duration;

use anyhow::Result;
use bitcoin::{Block, BlockHash};
use blockfeed::{
    bitcoin_client::{
        BitcoinRpc, Error,
        types::{GetBlockHeaderResult, GetBlockchainInfoResult},
    },
    coinbase::{CoinbaseResolver, ResolveError, RpcCoinbaseResolver},
    test_utils::{BLOCK_SUBSIDY_SATS, MockChain, new_mock_block_hash},
};
use tokio::time::sleep;

#[derive(Clone)]
struct StalledChain(MockChain);

impl BitcoinRpc for StalledChain {
    async fn get_blockchain_info(&self) -> Result<GetBlockchainInfoResult, Error> {
        self.0.get_blockchain_info().await
    }

    async fn get_best_block_hash(&self) -> Result<BlockHash, Error> {
        self.0.get_best_block_hash().await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Block, Error> {
        sleep(Duration::from_secs(60)).await;
        self.0.get_block(hash).await
    }

    async fn get_block_header_info(&self, hash: &BlockHash) -> Result<GetBlockHeaderResult, Error> {
        self.0.get_block_header_info(hash).await
    }
}

#[tokio::test]
async fn test_resolve_disconnected_block() -> Result<()> {
    let chain = MockChain::new();
    let mined = chain.mine(1_700_000_000);
    chain.invalidate_tip();

    let resolver = RpcCoinbaseResolver::new(chain.clone(), Duration::from_secs(5));
    let data = resolver.resolve(&mined.block_hash).await?;
    let block = chain.block(&mined.block_hash).expect("block kept after invalidation");
    assert_eq!(
        data.coinbase_scriptsig,
        block.txdata[0].input[0].script_sig.to_bytes()
    );
    assert_eq!(data.coinbase_outputs[0].value, BLOCK_SUBSIDY_SATS);
    assert_eq!(
        data.coinbase_outputs.len(),
        block.txdata[0].output.len()
    );
    Ok(())
}

#[tokio::test]
async fn test_resolve_unknown_and_pruned_blocks() {
    let chain = MockChain::new();
    let resolver = RpcCoinbaseResolver::new(chain.clone(), Duration::from_secs(5));

    let unknown = new_mock_block_hash(42);
    assert!(matches!(
        resolver.resolve(&unknown).await,
        Err(ResolveError::NotFound(h)) if h == unknown
    ));

    let mined = chain.mine(1_700_000_000);
    chain.prune(&mined.block_hash);
    assert!(matches!(
        resolver.resolve(&mined.block_hash).await,
        Err(ResolveError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_resolve_is_bounded_by_timeout() {
    let chain = MockChain::new();
    let mined = chain.mine(1_700_000_000);
    let resolver = RpcCoinbaseResolver::new(StalledChain(chain), Duration::from_millis(100));
    assert!(matches!(
        resolver.resolve(&mined.block_hash).await,
        Err(ResolveError::Timeout(_))
    ));
}
