use base64::prelude::*;
use bitcoin::{Block, BlockHash, consensus::encode};
use reqwest::{Client as HttpClient, ClientBuilder, header::HeaderMap};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;

use super::{
    error::{BitcoinRpcErrorResponse, Error},
    types::{GetBlockHeaderResult, GetBlockchainInfoResult, Request, Response},
};

#[derive(Clone, Debug)]
pub struct Client {
    client: HttpClient,
    url: String,
}

const JSONRPC: &str = "2.0";

impl Client {
    pub fn new(url: String, user: String, password: String) -> Result<Self, Error> {
        let client = ClientBuilder::new()
            .default_headers({
                let mut headers = HeaderMap::new();
                let auth_str = BASE64_STANDARD.encode(format!("{}:{}", user, password));
                headers.insert("Authorization", format!("Basic {}", auth_str).parse()?);
                headers.insert("Content-Type", "application/json".parse()?);
                headers.insert("Accept", "application/json".parse()?);
                headers
            })
            .build()?;

        Ok(Client { client, url })
    }

    pub fn new_from_config(config: &Config) -> Result<Self, Error> {
        Client::new(
            config.bitcoin_rpc_url.to_owned(),
            config.bitcoin_rpc_user.to_owned(),
            config.bitcoin_rpc_password.to_owned(),
        )
    }

    fn handle_response<T>(response: Response) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        match (response.result, response.error) {
            (Some(result), None) => Ok(serde_json::from_value(result)?),
            // void RPCs (invalidateblock, setmocktime) answer with a null result
            (None, None) => Ok(serde_json::from_value(Value::Null)?),
            (None, Some(error)) => {
                let detail: BitcoinRpcErrorResponse = serde_json::from_value(error)?;
                Err(Error::BitcoinRpc {
                    code: detail.code,
                    message: detail.message,
                })
            }
            (Some(_), Some(_)) => Err(Error::Unexpected(
                "Both result and error present in RPC response".to_string(),
            )),
        }
    }

    pub async fn call<T>(&self, method: &str, params: Vec<Value>) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = Request {
            jsonrpc: JSONRPC.to_owned(),
            id: "0".to_string(),
            method: method.to_string(),
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .json::<Response>()
            .await?;

        Self::handle_response(response)
    }

    pub async fn get_blockchain_info(&self) -> Result<GetBlockchainInfoResult, Error> {
        self.call("getblockchaininfo", vec![]).await
    }

    pub async fn get_best_block_hash(&self) -> Result<BlockHash, Error> {
        self.call("getbestblockhash", vec![]).await
    }

    pub async fn get_block_count(&self) -> Result<u64, Error> {
        self.call("getblockcount", vec![]).await
    }

    pub async fn get_block(&self, hash: &BlockHash) -> Result<Block, Error> {
        let hex: String = self
            .call("getblock", vec![serde_json::to_value(hash)?, 0.into()])
            .await?;
        Ok(encode::deserialize_hex(&hex)?)
    }

    pub async fn get_block_header_info(
        &self,
        hash: &BlockHash,
    ) -> Result<GetBlockHeaderResult, Error> {
        self.call(
            "getblockheader",
            vec![serde_json::to_value(hash)?, true.into()],
        )
        .await
    }
}

/// Node queries the notification engine depends on. Implemented by the RPC
/// [`Client`] and by in-memory chains in tests.
pub trait BitcoinRpc: Send + Sync + Clone + 'static {
    fn get_blockchain_info(
        &self,
    ) -> impl Future<Output = Result<GetBlockchainInfoResult, Error>> + Send;

    fn get_best_block_hash(&self) -> impl Future<Output = Result<BlockHash, Error>> + Send;

    fn get_block(&self, hash: &BlockHash) -> impl Future<Output = Result<Block, Error>> + Send;

    fn get_block_header_info(
        &self,
        hash: &BlockHash,
    ) -> impl Future<Output = Result<GetBlockHeaderResult, Error>> + Send;
}

impl BitcoinRpc for Client {
    async fn get_blockchain_info(&self) -> Result<GetBlockchainInfoResult, Error> {
        self.get_blockchain_info().await
    }
    async fn get_best_block_hash(&self) -> Result<BlockHash, Error> {
        self.get_best_block_hash().await
    }
    async fn get_block(&self, hash: &BlockHash) -> Result<Block, Error> {
        self.get_block(hash).await
    }
    async fn get_block_header_info(&self, hash: &BlockHash) -> Result<GetBlockHeaderResult, Error> {
        self.get_block_header_info(hash).await
    }
}

/// Chain mutations only a regtest harness performs.
pub trait RegtestRpc: Send + Sync + Clone + 'static {
    fn get_new_address(&self) -> impl Future<Output = Result<String, Error>>;

    fn generate_to_address(
        &self,
        blocks: u64,
        address: &str,
    ) -> impl Future<Output = Result<Vec<BlockHash>, Error>>;

    fn invalidate_block(&self, hash: &BlockHash) -> impl Future<Output = Result<(), Error>>;

    fn reconsider_block(&self, hash: &BlockHash) -> impl Future<Output = Result<(), Error>>;

    fn set_mock_time(&self, timestamp: i64) -> impl Future<Output = Result<(), Error>>;
}

impl RegtestRpc for Client {
    async fn get_new_address(&self) -> Result<String, Error> {
        self.call("getnewaddress", vec![]).await
    }

    async fn generate_to_address(
        &self,
        blocks: u64,
        address: &str,
    ) -> Result<Vec<BlockHash>, Error> {
        let params = vec![blocks.into(), address.into()];
        self.call("generatetoaddress", params).await
    }

    async fn invalidate_block(&self, hash: &BlockHash) -> Result<(), Error> {
        self.call("invalidateblock", vec![serde_json::to_value(hash)?])
            .await
    }

    async fn reconsider_block(&self, hash: &BlockHash) -> Result<(), Error> {
        self.call("reconsiderblock", vec![serde_json::to_value(hash)?])
            .await
    }

    async fn set_mock_time(&self, timestamp: i64) -> Result<(), Error> {
        self.call("setmocktime", vec![timestamp.into()]).await
    }
}
