// Thin re-export module: implementation lives under `blockchain/core/`
// (block types and hashing, the ledger store facade, balances, audits).

pub mod core;
pub use core::*;
