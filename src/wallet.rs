//! Deterministic wallet: mnemonic key derivation and wallet-v4 messages
//!
//! The key pair is derived once at startup from the 24-word TON mnemonic
//! (HMAC-SHA512 entropy, then PBKDF2-SHA512 over the "TON default seed"
//! salt). Transfers are wrapped in the standard wallet-v4 external message
//! layout and signed with ed25519.

use crate::boc::{deserialize_boc, serialize_boc, Cell, CellBuilder};
use crate::types::AccountAddress;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use once_cell::sync::OnceCell;
use sha2::Sha512;
use std::fmt;
use std::sync::Arc;

/// Default wallet-v4 subwallet id
pub const WALLET_ID: u32 = 698_983_191;

/// PBKDF2 rounds of the TON mnemonic scheme
const PBKDF2_ROUNDS: u32 = 100_000;
/// PBKDF2 salt of the TON mnemonic scheme
const PBKDF2_SALT: &[u8] = b"TON default seed";

/// Wallet-v4 r2 contract code, embedded as its serialized BOC
const WALLET_V4R2_CODE: &str = "te6ccgECFAEAAtQAART/APSkE/S88sgLAQIBIAIDAgFIBAUE+PKDCNcYINMf0x/THwL4I7vyZO1E0NMf0x/T//QE0VFDuvKhUVG68qIF+QFUEGT5EPKj+AAkpMjLH1JAyx9SMMv/UhD0AMntVPgPAdMHIcAAn2xRkyDXSpbTB9QC+wDoMOAhwAHjACHAAuMAAcADkTDjDQOkyMsfEssfy/8QERITAubQAdDTAyFxsJJfBOAi10nBIJJfBOAC0x8hghBwbHVnvSKCEGRzdHK9sJJfBeAD+kAwIPpEAcjKB8v/ydDtRNCBAUDXIfQEMFyBAQj0Cm+hMbOSXwfgBdM/yCWCEHBsdWe6kjgw4w0DghBkc3RyupJfBuMNBgcCASAICQB4AfoA9AQw+CdvIjBQCqEhvvLgUIIQcGx1Z4MesXCAGFAEywUmzxZY+gIZ9ADLaRfLH1Jgyz8gyYBA+wAGAIpQBIEBCPRZMO1E0IEBQNcgyAHPFvQAye1UAXKwjiOCEGRzdHKDHrFwgBhQBcsFUAPPFiP6AhPLassfyz/JgED7AJJfA+ICASAKCwBZvSQrb2omhAgKBrkPoCGEcNQICEekk30pkQzmkD6f+YN4EoAbeBAUiYcVnzGEAgFYDA0AEbjJftRNDXCx+AA9sp37UTQgQFA1yH0BDACyMoHy//J0AGBAQj0Cm+hMYAIBIA4PABmtznaiaEAga5Drhf/AABmvHfaiaEAQa5DrhY/AAG7SB/oA1NQi+QAFyMoHFcv/ydB3dIAYyMsFywIizxZQBfoCFMtrEszMyXP7AMhAFIEBCPRR8qcCAHCBAQjXGPoA0z/IVCBHgQEI9FHyp4IQbm90ZXB0gBjIywXLAlAGzxZQBPoCFMtqEssfyz/Jc/sAAgBsgQEI1xj6ANM/MFIkgQEI9Fnyp4IQZHN0cnB0gBjIywXLAlAFzxZQA/oCE8tqyx8Syz/Jc/sAAAr0AMntVA==";

static WALLET_CODE_CELL: OnceCell<Arc<Cell>> = OnceCell::new();

/// Decode the embedded wallet code cell (cached after the first call)
fn wallet_code() -> Result<Arc<Cell>> {
    WALLET_CODE_CELL
        .get_or_try_init(|| {
            let bytes = STANDARD
                .decode(WALLET_V4R2_CODE)
                .map_err(|e| Error::wallet(format!("invalid embedded wallet code: {}", e)))?;
            let roots = deserialize_boc(&bytes)?;
            roots
                .into_iter()
                .next()
                .ok_or_else(|| Error::wallet("embedded wallet code has no root cell"))
        })
        .cloned()
}

/// Ed25519 key pair derived from the wallet mnemonic
pub struct WalletKeyPair {
    signing: SigningKey,
}

impl WalletKeyPair {
    /// Derive the key pair from a 24-word mnemonic (TON derivation scheme)
    pub fn from_mnemonic(words: &[String]) -> Result<Self> {
        let phrase = words.join(" ");

        let mut mac = Hmac::<Sha512>::new_from_slice(phrase.as_bytes())
            .map_err(|e| Error::wallet(format!("entropy derivation failed: {}", e)))?;
        mac.update(b"");
        let entropy = mac.finalize().into_bytes();

        let mut seed = [0u8; 64];
        pbkdf2::pbkdf2_hmac::<Sha512>(&entropy, PBKDF2_SALT, PBKDF2_ROUNDS, &mut seed);

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&seed[..32]);
        Ok(Self {
            signing: SigningKey::from_bytes(&key_bytes),
        })
    }

    /// Public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Verifying half of the key pair
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Sign a message (in practice, a cell representation hash)
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

// The secret key must never reach logs.
impl fmt::Debug for WalletKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeyPair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// A wallet-v4 contract bound to a derived key pair
pub struct WalletV4 {
    keypair: WalletKeyPair,
    wallet_id: u32,
    state_init: Arc<Cell>,
    address: AccountAddress,
}

impl WalletV4 {
    /// Create the wallet for workchain 0 with the default subwallet id
    pub fn new(keypair: WalletKeyPair) -> Result<Self> {
        let data = Self::initial_data(&keypair)?;
        let state_init = Arc::new(Self::state_init(wallet_code()?, data)?);
        let address = AccountAddress::new(0, state_init.repr_hash());

        Ok(Self {
            keypair,
            wallet_id: WALLET_ID,
            state_init,
            address,
        })
    }

    /// Wallet account address
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    /// Initial wallet data: seqno 0, subwallet id, public key, no plugins
    fn initial_data(keypair: &WalletKeyPair) -> Result<Arc<Cell>> {
        let mut b = CellBuilder::new();
        b.store_uint(0, 32)?;
        b.store_uint(WALLET_ID as u64, 32)?;
        b.store_bytes(&keypair.public_key())?;
        b.store_bit(false)?;
        Ok(Arc::new(b.build()?))
    }

    /// StateInit: no split depth, no tick-tock, code and data references,
    /// empty library dictionary
    fn state_init(code: Arc<Cell>, data: Arc<Cell>) -> Result<Cell> {
        let mut b = CellBuilder::new();
        b.store_bit(false)?;
        b.store_bit(false)?;
        b.store_bit(true)?;
        b.store_ref(code)?;
        b.store_bit(true)?;
        b.store_ref(data)?;
        b.store_bit(false)?;
        b.build()
    }

    /// Internal transfer message: bounceable, fixed value, body as reference
    fn internal_message(
        dest: &AccountAddress,
        value_nanoton: u64,
        body: Arc<Cell>,
    ) -> Result<Arc<Cell>> {
        let mut b = CellBuilder::new();
        b.store_bit(false)?; // int_msg_info
        b.store_bit(true)?; // ihr_disabled
        b.store_bit(true)?; // bounce
        b.store_bit(false)?; // bounced
        b.store_uint(0, 2)?; // src: addr_none
        store_address(&mut b, dest)?;
        b.store_coins(value_nanoton)?;
        b.store_bit(false)?; // no extra currencies
        b.store_coins(0)?; // ihr_fee
        b.store_coins(0)?; // fwd_fee
        b.store_uint(0, 64)?; // created_lt
        b.store_uint(0, 32)?; // created_at
        b.store_bit(false)?; // no state init
        b.store_bit(true)?; // body in reference
        b.store_ref(body)?;
        Ok(Arc::new(b.build()?))
    }

    /// The unsigned wallet order the signature covers
    fn signing_message(
        &self,
        seqno: u32,
        valid_until: u32,
        message: Arc<Cell>,
    ) -> Result<Cell> {
        let mut b = CellBuilder::new();
        b.store_uint(self.wallet_id as u64, 32)?;
        b.store_uint(valid_until as u64, 32)?;
        b.store_uint(seqno as u64, 32)?;
        b.store_uint(0, 8)?; // op: simple transfer
        b.store_uint(3, 8)?; // send mode: pay fees separately, ignore errors
        b.store_ref(message)?;
        Ok(b.build()?)
    }

    /// Build and sign one external transfer carrying `body` to `dest`.
    ///
    /// Returns the serialized external message ready for submission. A
    /// wallet with sequence number zero is uninitialized, so the state init
    /// rides along with the first transfer.
    pub fn create_transfer(
        &self,
        seqno: u32,
        valid_until: u32,
        dest: &AccountAddress,
        value_nanoton: u64,
        body: Arc<Cell>,
    ) -> Result<Vec<u8>> {
        let internal = Self::internal_message(dest, value_nanoton, body)?;
        let order = self.signing_message(seqno, valid_until, internal)?;
        let signature = self.keypair.sign(&order.repr_hash());

        let mut signed = CellBuilder::new();
        signed.store_bytes(&signature)?;
        signed.store_cell(&order)?;
        let signed = Arc::new(signed.build()?);

        let mut ext = CellBuilder::new();
        ext.store_uint(0b10, 2)?; // ext_in_msg_info
        ext.store_uint(0, 2)?; // src: addr_none
        store_address(&mut ext, &self.address)?;
        ext.store_coins(0)?; // import_fee
        if seqno == 0 {
            ext.store_bit(true)?;
            ext.store_bit(true)?; // state init in reference
            ext.store_ref(Arc::clone(&self.state_init))?;
        } else {
            ext.store_bit(false)?;
        }
        ext.store_bit(true)?; // body in reference
        ext.store_ref(signed)?;

        serialize_boc(&Arc::new(ext.build()?))
    }
}

impl fmt::Debug for WalletV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletV4")
            .field("address", &self.address.to_raw())
            .field("wallet_id", &self.wallet_id)
            .finish_non_exhaustive()
    }
}

/// Write a standard internal address (`addr_std`, no anycast)
fn store_address(b: &mut CellBuilder, address: &AccountAddress) -> Result<()> {
    b.store_uint(0b10, 2)?;
    b.store_bit(false)?;
    b.store_uint(address.workchain() as u8 as u64, 8)?;
    b.store_bytes(address.hash())?;
    Ok(())
}
