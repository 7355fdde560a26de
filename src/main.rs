use anyhow::Result;
use blockfeed::{
    api::{self, Env},
    bitcoin_client,
    chain,
    coinbase::RpcCoinbaseResolver,
    config::Config,
    dispatcher::Dispatcher,
    logging,
    registry::Registry,
    sequencer::Sequencer,
    retry::{new_backoff_unlimited, retry},
    stopper,
};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::try_parse()?;
    logging::setup_with_format(config.log_format);
    info!("blockfeed");
    config.apply_local_regtest();
    info!("{:#?}", config);
    let bitcoin = bitcoin_client::Client::new_from_config(&config)?;
    let cancel_token = CancellationToken::new();
    let mut handles = vec![];
    handles.push(stopper::run(cancel_token.clone())?);

    let info = retry(
        || bitcoin.get_blockchain_info(),
        "get blockchain info",
        new_backoff_unlimited(),
        cancel_token.clone(),
    )
    .await?;
    info!(
        "Connected to {} node at height {} ({})",
        info.chain, info.blocks, info.best_block_hash
    );

    let registry = Registry::new();
    let dispatcher = Dispatcher::new(config.session_queue_capacity);
    let sequencer = Sequencer::new(
        RpcCoinbaseResolver::new(bitcoin.clone(), config.resolver_timeout()),
        registry.clone(),
        dispatcher.clone(),
    );
    let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);
    handles.push(sequencer.run(cancel_token.clone(), event_rx));
    handles.push(chain::run(
        config.zmq_address.clone(),
        cancel_token.clone(),
        bitcoin.clone(),
        event_tx,
    ));

    let (api_handle, _) = api::run(Env {
        config: config.clone(),
        cancel_token: cancel_token.clone(),
        registry,
        dispatcher,
        bitcoin,
    })
    .await?;
    handles.push(api_handle);

    for handle in handles {
        let _ = handle.await;
    }
    info!("Exited");
    Ok(())
}
