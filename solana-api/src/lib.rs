pub mod convert;
pub mod metrics;
pub mod solana_api;

pub use solana_client;
pub use solana_rpc_client;
pub use solana_rpc_client_api;
