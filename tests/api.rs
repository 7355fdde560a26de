use anyhow::Result;
use axum::http::StatusCode;
use axum_test::TestServer;
use bitcoin::Network;
use blockfeed::{
    api::{
        Env,
        error::ErrorResponse,
        handlers::{Info, Tip},
        result::ResultResponse,
        router,
    },
    config::Config,
    dispatcher::Dispatcher,
    registry::{Registry, Topic},
    test_utils::MockChain,
};
use tokio_util::sync::CancellationToken;

fn new_env(chain: &MockChain) -> Env<MockChain> {
    Env {
        config: Config::new_na(),
        cancel_token: CancellationToken::new(),
        registry: Registry::new(),
        dispatcher: Dispatcher::new(8),
        bitcoin: chain.clone(),
    }
}

#[tokio::test]
async fn test_get_info() -> Result<()> {
    let chain = MockChain::new();
    let env = new_env(&chain);
    let handle = env.dispatcher.open().await;
    env.dispatcher.open().await;
    env.registry.subscribe(handle.id, Topic::Blocks).await;
    let server = TestServer::new(router::new(env))?;

    let response = server.get("/api").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let info = response.json::<ResultResponse<Info>>().result;
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(info.network, Network::Regtest);
    assert_eq!(info.connections, 2);
    assert_eq!(info.block_subscribers, 1);
    Ok(())
}

#[tokio::test]
async fn test_get_tip() -> Result<()> {
    let chain = MockChain::new();
    chain.mine(1_700_000_000);
    let mined = chain.mine(1_700_000_600);
    let server = TestServer::new(router::new(new_env(&chain)))?;

    let response = server.get("/api/tip").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let tip = response.json::<ResultResponse<Tip>>().result;
    assert_eq!(
        tip,
        Tip {
            hash: mined.block_hash,
            height: 2,
        }
    );

    chain.invalidate_tip();
    let tip = server.get("/api/tip").await.json::<ResultResponse<Tip>>().result;
    assert_eq!(tip.height, 1);
    assert_eq!(tip.hash, chain.tip());
    Ok(())
}

#[tokio::test]
async fn test_unknown_route() -> Result<()> {
    let chain = MockChain::new();
    let server = TestServer::new(router::new(new_env(&chain)))?;
    let response = server.get("/api/blocks/1").expect_failure().await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let error = response.json::<ErrorResponse>();
    assert!(error.error.contains("/api/blocks/1"));
    Ok(())
}
