//! Proof-of-work giver auto-miner for the TON blockchain.
//!
//! Fetches challenge parameters from a giver contract, runs the external
//! `pow-miner` solver against them, and submits the mined result through a
//! wallet-v4 transfer, in a loop, forever.

pub mod artifact;
pub mod boc;
pub mod client;
pub mod config;
pub mod error;
pub mod miner;
pub mod solver;
pub mod submitter;
pub mod types;
pub mod utils;
pub mod wallet;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{AccountAddress, ChallengeParameter, ChallengeParameterSet, Network};

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
