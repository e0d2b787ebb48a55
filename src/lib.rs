#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::items_after_test_module
    )
)]

pub mod common;
pub mod crypto;
pub mod errors;
pub mod hd;
pub mod keystore;
pub mod mnemonic;
pub mod service;
pub mod session;
pub mod wallet;

#[cfg(feature = "server")]
pub mod server;

// 每个符号只从一处导出，避免歧义
pub use crate::common::{DEFAULT_BASE_PATH, ESN_COIN_TYPE};
pub use crate::crypto::{is_checksum_address, public_key_to_address, to_checksum_address};
pub use crate::errors::WalletError;
pub use crate::hd::{derive_addresses, derive_private_key, AddressEntry, HdPath, HdWallet};
pub use crate::keystore::{KdfKind, KeystoreFile};
pub use crate::mnemonic::{generate_mnemonic, is_valid_mnemonic};
pub use crate::wallet::Wallet;
