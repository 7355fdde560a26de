use anyhow::Result;
use blockfeed::{
    bitcoin_client::{
        Client, Error,
        error::{RPC_INVALID_ADDRESS_OR_KEY, RPC_MISC_ERROR},
    },
    config::{Config, RegtestConfig},
};

#[test]
fn test_not_found_classification() {
    let unknown = Error::BitcoinRpc {
        code: RPC_INVALID_ADDRESS_OR_KEY,
        message: "Block not found".to_string(),
    };
    assert!(unknown.is_not_found());

    let pruned = Error::BitcoinRpc {
        code: RPC_MISC_ERROR,
        message: "Block not available (pruned data)".to_string(),
    };
    assert!(pruned.is_not_found());

    let busy = Error::BitcoinRpc {
        code: RPC_MISC_ERROR,
        message: "Work queue depth exceeded".to_string(),
    };
    assert!(!busy.is_not_found());
    assert!(!Error::Unexpected("x".to_string()).is_not_found());
}

#[tokio::test]
#[ignore = "requires a local regtest node"]
async fn test_bitcoin_client() -> Result<()> {
    let regtest = RegtestConfig::default();
    let mut config = Config::new_na();
    config.bitcoin_rpc_url = regtest.bitcoin_rpc_url;
    config.bitcoin_rpc_user = regtest.bitcoin_rpc_user;
    config.bitcoin_rpc_password = regtest.bitcoin_rpc_password;
    let client = Client::new_from_config(&config)?;

    let info = client.get_blockchain_info().await?;
    let hash = client.get_best_block_hash().await?;
    assert_eq!(hash, info.best_block_hash);
    assert_eq!(client.get_block_count().await?, info.blocks);

    let block = client.get_block(&hash).await?;
    assert_eq!(block.block_hash(), hash);
    assert!(!block.txdata.is_empty(), "Expected a coinbase transaction");

    let header = client.get_block_header_info(&hash).await?;
    assert_eq!(header.height, info.blocks);
    assert_eq!(header.time, block.header.time as i64);
    assert!(header.is_active());
    Ok(())
}
