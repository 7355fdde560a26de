pub mod api;
pub mod bitcoin_client;
pub mod chain;
pub mod coinbase;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod message;
pub mod registry;
pub mod retry;
pub mod sequencer;
pub mod session;
pub mod stopper;
pub mod test_utils;
