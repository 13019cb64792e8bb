//! Configuration management for the giver miner
//!
//! Settings come from command line arguments, the deployment environment
//! variables, and an optional YAML/JSON configuration file. Secrets (the
//! wallet mnemonic and API credentials) never appear in serialized output.

use crate::types::{AccountAddress, Network};
use crate::{Error, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete configuration for the giver miner
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "ton-giver-miner",
    version = env!("CARGO_PKG_VERSION"),
    about = "TON giver proof-of-work miner",
    long_about = "Fetches proof-of-work parameters from a TON giver contract, runs an \
                  external solver against them, and submits the mined message in a signed \
                  wallet transfer, forever"
)]
pub struct Config {
    /// Print the parsed configuration (secrets redacted) and exit
    #[arg(long)]
    #[serde(default)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Operator wallet address credited by the giver
    #[arg(short = 'a', long, env = "MY_ADDRESS")]
    pub my_address: Option<String>,

    /// Mine against testnet instead of mainnet
    ///
    /// Deployments set IS_TESTNET=1/0, so the env value goes through a
    /// truthiness parser rather than the strict bool parser.
    #[arg(long, env = "IS_TESTNET", value_parser = clap::builder::FalseyValueParser::new())]
    #[serde(default)]
    pub testnet: bool,

    /// Wallet mnemonic, 24 space-separated words
    #[arg(long, env = "MNEMONIC", hide_env_values = true)]
    #[serde(default, skip_serializing)]
    pub mnemonic: Option<String>,

    /// Bearer token for the tonapi.io indexing API
    #[arg(long, env = "TONCONSOLE_BEARER", hide_env_values = true)]
    #[serde(default, skip_serializing)]
    pub tonapi_bearer: Option<String>,

    /// API key for the toncenter JSON-RPC endpoint
    #[arg(long, env = "TONCENTER_API_KEY", hide_env_values = true)]
    #[serde(default, skip_serializing)]
    pub rpc_api_key: Option<String>,

    /// Giver contract address (defaults to the built-in testnet giver)
    #[arg(short = 'g', long, env = "GIVER_ADDRESS")]
    pub giver_address: Option<String>,

    /// Path to the external proof-of-work solver binary
    #[arg(long, env = "POW_SOLVER_BIN", default_value = "bin/pow-miner-linux-amd64")]
    #[serde(default = "default_solver_bin")]
    pub solver_bin: PathBuf,

    /// Solver worker count (-w)
    #[arg(short = 'w', long, default_value = "30")]
    #[serde(default = "default_solver_workers")]
    pub solver_workers: u32,

    /// Solver thread count (-t)
    #[arg(short = 't', long, default_value = "500")]
    #[serde(default = "default_solver_threads")]
    pub solver_threads: u32,

    /// Solver wall-clock timeout in seconds
    #[arg(long, default_value = "1000")]
    #[serde(default = "default_solver_timeout")]
    pub solver_timeout: u64,

    /// Directory for per-cycle mined artifacts
    #[arg(short = 'o', long, default_value = ".")]
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// HTTP timeout in milliseconds
    #[arg(long, default_value = "30000")]
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Base delay between failed cycles in milliseconds
    #[arg(long, default_value = "1000")]
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Maximum delay between failed cycles in milliseconds
    #[arg(long, default_value = "60000")]
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,

    /// Consecutive failures before the circuit breaker cools down
    #[arg(long, default_value = "10")]
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Circuit breaker cooldown in seconds
    #[arg(long, default_value = "300")]
    #[serde(default = "default_failure_cooldown")]
    pub failure_cooldown: u64,
}

impl Config {
    /// Load configuration from CLI/environment, then the config file
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config (CLI and environment take precedence)
    fn merge_with_file(mut self, file_config: Self) -> Self {
        if self.my_address.is_none() {
            self.my_address = file_config.my_address;
        }
        if self.mnemonic.is_none() {
            self.mnemonic = file_config.mnemonic;
        }
        if self.tonapi_bearer.is_none() {
            self.tonapi_bearer = file_config.tonapi_bearer;
        }
        if self.rpc_api_key.is_none() {
            self.rpc_api_key = file_config.rpc_api_key;
        }
        if self.giver_address.is_none() {
            self.giver_address = file_config.giver_address;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.operator()?;
        self.giver()?;
        self.mnemonic_words()?;

        if self.solver_workers == 0 {
            return Err(Error::config("Solver worker count must be greater than 0"));
        }
        if self.solver_threads == 0 {
            return Err(Error::config("Solver thread count must be greater than 0"));
        }
        if self.solver_timeout == 0 {
            return Err(Error::config("Solver timeout must be greater than 0"));
        }
        if self.retry_delay == 0 || self.max_retry_delay < self.retry_delay {
            return Err(Error::config(
                "Retry delays must be positive and max must not be below the base delay",
            ));
        }

        Ok(())
    }

    /// Selected network
    pub fn network(&self) -> Network {
        if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    /// Operator wallet address
    pub fn operator(&self) -> Result<AccountAddress> {
        let raw = self
            .my_address
            .as_deref()
            .ok_or_else(|| Error::config("Operator address is required (MY_ADDRESS)"))?;
        AccountAddress::from_str(raw)
    }

    /// Target giver address, explicit or the network default
    pub fn giver(&self) -> Result<AccountAddress> {
        let raw = match &self.giver_address {
            Some(addr) => addr.as_str(),
            None => self.network().default_giver().ok_or_else(|| {
                Error::config("A giver address must be configured for mainnet (GIVER_ADDRESS)")
            })?,
        };
        AccountAddress::from_str(raw)
    }

    /// Mnemonic split into its 24 words
    pub fn mnemonic_words(&self) -> Result<Vec<String>> {
        let phrase = self
            .mnemonic
            .as_deref()
            .ok_or_else(|| Error::config("Wallet mnemonic is required (MNEMONIC)"))?;
        let words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
        if words.len() != 24 {
            return Err(Error::config(format!(
                "Mnemonic must have 24 words, got {}",
                words.len()
            )));
        }
        Ok(words)
    }

    /// Get HTTP timeout duration
    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    /// Get solver timeout duration
    pub fn solver_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.solver_timeout)
    }

    /// Get circuit breaker cooldown duration
    pub fn failure_cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown)
    }
}

// Default value functions for serde
fn default_solver_bin() -> PathBuf {
    PathBuf::from("bin/pow-miner-linux-amd64")
}
fn default_solver_workers() -> u32 {
    30
}
fn default_solver_threads() -> u32 {
    500
}
fn default_solver_timeout() -> u64 {
    1000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_http_timeout() -> u64 {
    30000
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_max_retry_delay() -> u64 {
    60000
}
fn default_max_consecutive_failures() -> u32 {
    10
}
fn default_failure_cooldown() -> u64 {
    300
}
