//! Dummycoin - a single-node, append-only ledger of signed transfers
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Block structure, hashing, the ledger store and audits
//! - [`transaction`] - Transaction lifecycle types and signature checks
//! - [`mempool`] - Pending transaction queue (submit / verify / clear)
//!
//! ## Mining
//! - [`miner`] - Proof-of-work search and block commit
//!
//! ## Cryptography
//! - [`crypto`] - RSA-PSS signatures, SHA-256, encrypted keystores
//!
//! ## State Management
//! - [`wallet`] - Identity store (owner keypairs)
//! - [`persistence`] - Database layer (SQLite)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`node`] - Wires the above into one handle

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod wallet;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod node;
