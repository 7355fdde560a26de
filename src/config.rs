use std::{net::IpAddr, path::PathBuf, time::Duration};

use bitcoin::Network;
use clap::{Parser, builder::TypedValueParser};
use serde::{Deserialize, Serialize};

use crate::logging;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[clap(
    author = "blockfeed developers",
    version = "0.1.0",
    about = "blockfeed",
    long_about = r#"blockfeed pushes block connect/disconnect notifications from a Bitcoin node to WebSocket subscribers"#
)]
pub struct Config {
    #[clap(
        long,
        env = "LOG_FORMAT",
        help = "Log format (plain, json)",
        default_value = "plain"
    )]
    pub log_format: logging::Format,

    #[clap(
        long,
        env = "BITCOIN_RPC_URL",
        help = "URL of the Bitcoin RPC server (e.g., http://localhost:8332)"
    )]
    pub bitcoin_rpc_url: String,

    #[clap(
        long,
        env = "BITCOIN_RPC_USER",
        help = "User for Bitcoin RPC authentication"
    )]
    pub bitcoin_rpc_user: String,

    #[clap(
        long,
        env = "BITCOIN_RPC_PASSWORD",
        help = "Password for Bitcoin RPC authentication"
    )]
    pub bitcoin_rpc_password: String,

    #[clap(
        long,
        env = "ZMQ_ADDRESS",
        help = "ZMQ address the node publishes `sequence` notifications on (e.g., tcp://localhost:28332)",
        default_value = "tcp://127.0.0.1:28332"
    )]
    pub zmq_address: String,

    #[clap(
        long,
        env = "API_HOST",
        help = "Interface the API server binds to",
        default_value = "127.0.0.1"
    )]
    pub api_host: IpAddr,

    #[clap(
        long,
        env = "API_PORT",
        help = "Port number for the API server (e.g., 8080)",
        default_value = "9333"
    )]
    pub api_port: u16,

    #[clap(
        long,
        env = "DATA_DIR",
        help = "Directory holding cert.pem and key.pem; TLS is enabled when both exist"
    )]
    pub data_dir: PathBuf,

    #[clap(
        long,
        env = "SESSION_QUEUE_CAPACITY",
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        help = "Outbound messages buffered per WebSocket connection before it is closed as a slow consumer",
        default_value = "256"
    )]
    pub session_queue_capacity: usize,

    #[clap(
        long,
        env = "EVENT_QUEUE_CAPACITY",
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        help = "Chain events buffered between the ZMQ listener and the sequencer",
        default_value = "64"
    )]
    pub event_queue_capacity: usize,

    #[clap(
        long,
        env = "RESOLVER_TIMEOUT_MS",
        help = "Upper bound on fetching the coinbase of a disconnected block",
        default_value = "5000"
    )]
    pub resolver_timeout_ms: u64,

    #[clap(
        long,
        env = "NETWORK",
        help = "Network of the Bitcoin node",
        default_value = "bitcoin"
    )]
    pub network: Network,

    #[clap(
        long,
        env = "USE_LOCAL_REGTEST",
        help = "Whether or not to use a local regtest",
        default_value = "false"
    )]
    pub use_local_regtest: bool,
}

impl Config {
    pub fn new_na() -> Self {
        let na = "n/a".to_string();
        Self {
            log_format: logging::Format::Plain,
            network: Network::Regtest,
            bitcoin_rpc_url: na.clone(),
            bitcoin_rpc_user: na.clone(),
            bitcoin_rpc_password: na.clone(),
            zmq_address: na,
            api_host: [127, 0, 0, 1].into(),
            api_port: 0,
            data_dir: "will be set".into(),
            session_queue_capacity: 256,
            event_queue_capacity: 64,
            resolver_timeout_ms: 5000,
            use_local_regtest: false,
        }
    }

    pub fn should_use_tls(&self) -> bool {
        let cert_path = self.data_dir.join("cert.pem");
        let key_path = self.data_dir.join("key.pem");
        cert_path.exists() && key_path.exists()
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    pub fn apply_local_regtest(&mut self) {
        if self.network == Network::Regtest && self.use_local_regtest {
            let regtest_config = RegtestConfig::default();
            self.bitcoin_rpc_url = regtest_config.bitcoin_rpc_url;
            self.bitcoin_rpc_user = regtest_config.bitcoin_rpc_user;
            self.bitcoin_rpc_password = regtest_config.bitcoin_rpc_password;
            self.zmq_address = regtest_config.zmq_address;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegtestConfig {
    pub bitcoin_rpc_url: String,
    pub bitcoin_rpc_user: String,
    pub bitcoin_rpc_password: String,
    pub zmq_address: String,
}

impl Default for RegtestConfig {
    fn default() -> Self {
        Self {
            bitcoin_rpc_url: "http://127.0.0.1:18443".into(),
            bitcoin_rpc_user: "rpc".into(),
            bitcoin_rpc_password: "rpc".into(),
            zmq_address: "tcp://127.0.0.1:28332".into(),
        }
    }
}
