pub mod client;
pub mod error;
pub mod types;

pub use client::{BitcoinRpc, Client, RegtestRpc};
pub use error::Error;
