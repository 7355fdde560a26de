use tokio_util::sync::CancellationToken;

use crate::{
    bitcoin_client::{BitcoinRpc, Client},
    config::Config,
    dispatcher::Dispatcher,
    registry::Registry,
};

#[derive(Clone)]
pub struct Env<C: BitcoinRpc = Client> {
    pub config: Config,
    pub cancel_token: CancellationToken,
    pub registry: Registry,
    pub dispatcher: Dispatcher,
    pub bitcoin: C,
}
