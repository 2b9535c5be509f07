//! Bot configuration store for a knowledge-base command-line client.
//! Connected-service credentials are encrypted at rest with a caller-supplied
//! secret and held as plaintext only in memory.

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod services;
