pub mod client;
pub mod types;

pub use client::{TrueNasClient, TrueNasSession};
pub use types::RpcCall;
