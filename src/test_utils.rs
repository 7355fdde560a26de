use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Result, anyhow};
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxMerkleNode, TxOut, Witness, absolute,
    block::{Header, Version},
    hashes::Hash,
    script::Builder,
    transaction,
};
use tokio::time::timeout;

use crate::{
    bitcoin_client::{
        BitcoinRpc, Error,
        error::{RPC_INVALID_ADDRESS_OR_KEY, RPC_MISC_ERROR},
        types::{GetBlockHeaderResult, GetBlockchainInfoResult},
    },
    chain::{ChainEvent, ChainEventKind},
    coinbase::{CoinbaseData, CoinbaseResolver, ResolveError},
    dispatcher::SessionHandle,
    message::{MsgBlock, WsMsg},
};

pub const BLOCK_SUBSIDY_SATS: u64 = 50 * 100_000_000;

pub fn new_mock_block_hash(i: u32) -> BlockHash {
    let mut bytes = [0u8; 32];
    let i_bytes = i.to_le_bytes();
    for chunk in bytes.chunks_mut(4) {
        chunk.copy_from_slice(&i_bytes[..chunk.len()]);
    }
    BlockHash::from_byte_array(bytes)
}

/// A coinbase paying the subsidy to a script derived from `tag`, with the
/// BIP34 height push in its scriptSig.
pub fn new_coinbase_transaction(height: u64, tag: u32) -> Transaction {
    let mut output_script = vec![0x00, 0x14];
    output_script.extend(tag.to_le_bytes().repeat(5));
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: Builder::new()
                .push_int(height as i64)
                .push_slice(tag.to_le_bytes())
                .into_script(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![
            TxOut {
                value: Amount::from_sat(BLOCK_SUBSIDY_SATS),
                script_pubkey: ScriptBuf::from_bytes(output_script),
            },
            TxOut {
                value: Amount::ZERO,
                script_pubkey: ScriptBuf::from_bytes(vec![0x6a, 0x04, 0xaa, 0x21, 0xa9, 0xed]),
            },
        ],
    }
}

pub fn new_block(prev_blockhash: BlockHash, height: u64, time: u32, nonce: u32) -> Block {
    Block {
        header: Header {
            version: Version::TWO,
            prev_blockhash,
            merkle_root: TxMerkleNode::all_zeros(),
            time,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce,
        },
        txdata: vec![new_coinbase_transaction(height, nonce)],
    }
}

pub fn connected(height: u64, timestamp: i64, i: u32) -> ChainEvent {
    ChainEvent::builder()
        .kind(ChainEventKind::Connected)
        .block_hash(new_mock_block_hash(i))
        .height(height)
        .timestamp(timestamp)
        .build()
}

pub fn disconnected(height: u64, timestamp: i64, i: u32) -> ChainEvent {
    ChainEvent::builder()
        .kind(ChainEventKind::Disconnected)
        .block_hash(new_mock_block_hash(i))
        .height(height)
        .timestamp(timestamp)
        .build()
}

#[derive(Clone, Debug)]
struct Entry {
    block: Block,
    height: u64,
}

#[derive(Debug)]
struct State {
    entries: HashMap<BlockHash, Entry>,
    active: Vec<BlockHash>,
    pruned: HashSet<BlockHash>,
    nonce: u32,
}

/// In-memory node with a single active chain. Invalidated blocks stay
/// queryable by hash, like on a real node, until they are pruned.
#[derive(Clone, Debug)]
pub struct MockChain {
    state: Arc<Mutex<State>>,
}

impl MockChain {
    pub fn new() -> Self {
        let genesis = new_block(BlockHash::all_zeros(), 0, 1_296_688_602, 0);
        let hash = genesis.block_hash();
        Self {
            state: Arc::new(Mutex::new(State {
                entries: HashMap::from([(
                    hash,
                    Entry {
                        block: genesis,
                        height: 0,
                    },
                )]),
                active: vec![hash],
                pruned: HashSet::new(),
                nonce: 0,
            })),
        }
    }

    pub fn height(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.active.len() as u64 - 1
    }

    pub fn tip(&self) -> BlockHash {
        let state = self.state.lock().unwrap();
        *state.active.last().unwrap()
    }

    pub fn block(&self, hash: &BlockHash) -> Option<Block> {
        let state = self.state.lock().unwrap();
        state.entries.get(hash).map(|e| e.block.clone())
    }

    pub fn coinbase(&self, hash: &BlockHash) -> Option<CoinbaseData> {
        self.block(hash)
            .and_then(|b| b.txdata.first().map(CoinbaseData::from_transaction))
    }

    /// Extends the active chain by one block and returns its connect event.
    pub fn mine(&self, time: u32) -> ChainEvent {
        let mut state = self.state.lock().unwrap();
        state.nonce += 1;
        let prev = *state.active.last().unwrap();
        let height = state.active.len() as u64;
        let block = new_block(prev, height, time, state.nonce);
        let hash = block.block_hash();
        state.entries.insert(hash, Entry { block, height });
        state.active.push(hash);
        ChainEvent {
            kind: ChainEventKind::Connected,
            block_hash: hash,
            height,
            timestamp: time as i64,
        }
    }

    /// Disconnects the tip and returns its disconnect event.
    pub fn invalidate_tip(&self) -> ChainEvent {
        let mut state = self.state.lock().unwrap();
        assert!(state.active.len() > 1, "cannot invalidate genesis");
        let hash = state.active.pop().unwrap();
        let entry = &state.entries[&hash];
        ChainEvent {
            kind: ChainEventKind::Disconnected,
            block_hash: hash,
            height: entry.height,
            timestamp: entry.block.header.time as i64,
        }
    }

    pub fn prune(&self, hash: &BlockHash) {
        self.state.lock().unwrap().pruned.insert(*hash);
    }
}

fn unknown_block(hash: &BlockHash) -> Error {
    Error::BitcoinRpc {
        code: RPC_INVALID_ADDRESS_OR_KEY,
        message: format!("Block not found: {}", hash),
    }
}

impl BitcoinRpc for MockChain {
    async fn get_blockchain_info(&self) -> Result<GetBlockchainInfoResult, Error> {
        let state = self.state.lock().unwrap();
        let blocks = state.active.len() as u64 - 1;
        Ok(GetBlockchainInfoResult {
            chain: Network::Regtest,
            blocks,
            headers: blocks,
            best_block_hash: *state.active.last().unwrap(),
            initial_block_download: false,
            pruned: !state.pruned.is_empty(),
            prune_height: None,
        })
    }

    async fn get_best_block_hash(&self) -> Result<BlockHash, Error> {
        Ok(self.tip())
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Block, Error> {
        let state = self.state.lock().unwrap();
        if state.pruned.contains(hash) {
            return Err(Error::BitcoinRpc {
                code: RPC_MISC_ERROR,
                message: "Block not available (pruned data)".to_string(),
            });
        }
        state
            .entries
            .get(hash)
            .map(|e| e.block.clone())
            .ok_or_else(|| unknown_block(hash))
    }

    async fn get_block_header_info(&self, hash: &BlockHash) -> Result<GetBlockHeaderResult, Error> {
        let state = self.state.lock().unwrap();
        let entry = state.entries.get(hash).ok_or_else(|| unknown_block(hash))?;
        let position = state.active.iter().position(|h| h == hash);
        Ok(GetBlockHeaderResult {
            hash: *hash,
            confirmations: position.map_or(-1, |p| (state.active.len() - p) as i64),
            height: entry.height,
            time: entry.block.header.time as i64,
            median_time: None,
            n_tx: entry.block.txdata.len() as u64,
            previous_block_hash: (entry.height > 0).then_some(entry.block.header.prev_blockhash),
            next_block_hash: position.and_then(|p| state.active.get(p + 1).copied()),
        })
    }
}

/// Resolver that always fails, standing in for a node that cannot serve
/// disconnected blocks.
#[derive(Clone, Debug)]
pub struct UnavailableResolver;

impl CoinbaseResolver for UnavailableResolver {
    async fn resolve(&self, block_hash: &BlockHash) -> Result<CoinbaseData, ResolveError> {
        Err(ResolveError::NotFound(*block_hash))
    }
}

/// Resolver serving fixed coinbase data for known hashes.
#[derive(Clone, Debug, Default)]
pub struct MockResolver {
    coinbases: Arc<Mutex<HashMap<BlockHash, CoinbaseData>>>,
}

impl MockResolver {
    pub fn insert(&self, block_hash: BlockHash, data: CoinbaseData) {
        self.coinbases.lock().unwrap().insert(block_hash, data);
    }
}

impl CoinbaseResolver for MockResolver {
    async fn resolve(&self, block_hash: &BlockHash) -> Result<CoinbaseData, ResolveError> {
        self.coinbases
            .lock()
            .unwrap()
            .get(block_hash)
            .cloned()
            .ok_or(ResolveError::NotFound(*block_hash))
    }
}

/// Waits for the next block notification queued for a session.
pub async fn next_block(handle: &mut SessionHandle) -> Result<MsgBlock> {
    match timeout(Duration::from_secs(5), handle.receiver.recv()).await? {
        Some(WsMsg::Block(msg)) => Ok(msg),
        Some(other) => Err(anyhow!("Unexpected message: {:?}", other)),
        None => Err(anyhow!("Session queue closed")),
    }
}
