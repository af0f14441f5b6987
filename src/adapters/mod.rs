//! Adapters Layer - Concrete implementations of the ports
//!
//! External surfaces: the DexScreener HTTP client and the CLI.

pub mod cli;
pub mod dexscreener;

pub use dexscreener::DexScreenerClient;
