//! Transaction submission
//!
//! Builds and submits exactly one signed transfer per mining cycle. The
//! wallet sequence number is read from the network on every call rather
//! than cached, so out-of-band transactions never desynchronize the wallet.

use crate::boc::Cell;
use crate::client::ChainClient;
use crate::types::AccountAddress;
use crate::utils::current_timestamp_secs;
use crate::wallet::WalletV4;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed transfer value accompanying the mined message: 0.05 TON
pub const TRANSFER_VALUE_NANOTON: u64 = 50_000_000;

/// Transfer validity window in seconds
const TRANSFER_TTL_SECS: u64 = 60;

/// Signs and submits mined message bodies to the giver
pub struct TransactionSubmitter<C: ChainClient> {
    wallet: WalletV4,
    client: C,
    giver: AccountAddress,
}

impl<C: ChainClient> TransactionSubmitter<C> {
    /// Create a submitter bound to a wallet and RPC client
    pub fn new(wallet: WalletV4, client: C, giver: AccountAddress) -> Self {
        Self {
            wallet,
            client,
            giver,
        }
    }

    /// Address of the funding wallet
    pub fn wallet_address(&self) -> &AccountAddress {
        self.wallet.address()
    }

    /// Build, sign, and submit one transfer carrying `body` to the giver.
    ///
    /// "Submitted" means accepted by the RPC layer; on-chain finality is not
    /// awaited.
    pub async fn submit(&self, body: Arc<Cell>) -> Result<()> {
        let seqno = self.client.seqno(self.wallet.address()).await?;
        debug!(
            "Wallet {} at seqno {}",
            self.wallet.address().to_friendly(false, false),
            seqno
        );

        let valid_until = (current_timestamp_secs() + TRANSFER_TTL_SECS) as u32;
        let boc = self.wallet.create_transfer(
            seqno,
            valid_until,
            &self.giver,
            TRANSFER_VALUE_NANOTON,
            body,
        )?;

        self.client.send_boc(&boc).await?;
        info!(
            "Submitted transfer to {} (seqno {}, {} bytes)",
            self.giver, seqno, boc.len()
        );
        Ok(())
    }
}
