pub mod address;
pub mod codec;
pub mod types;

// ===== Reexports =====
pub use solana_sdk;
pub use solana_transaction_status;
pub use spl_associated_token_account;
pub use spl_token;

pub mod neon_instruction {
    pub mod tag {
        // Four byte (u32 LE) tags, kept from the system program layout.
        pub const CREATE_ACCOUNT: u32 = 0x02;
        pub const CREATE_ACCOUNT_WITH_SEED: u32 = 0x04;

        pub const CALL_FROM_RAW_ETHEREUM_TX: u8 = 0x05;
        pub const ON_RETURN: u8 = 0x06;
        pub const PARTIAL_CALL_FROM_RAW_ETHEREUM_TX: u8 = 0x09;
        pub const CONTINUE: u8 = 0x0a;
    }
}

/// Ethereum address length in bytes.
pub const ETHER_ADDRESS_LEN: usize = 20;
/// `r || s || v` signature length in bytes.
pub const ETH_SIGNATURE_LEN: usize = 65;

pub type EtherAddress = [u8; ETHER_ADDRESS_LEN];
