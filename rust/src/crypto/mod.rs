//! Cryptography for credentials held in a bot configuration. Only the field
//! cipher lives here; the store decides which fields go through it.

pub mod secrets;
