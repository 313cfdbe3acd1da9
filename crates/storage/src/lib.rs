//! Storage layer for the AT Protocol SDK
//!
//! This crate provides durable, checksummed persistence for small pieces of
//! client state such as session credentials.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod persistence;

pub use persistence::{PersistedState, PersistenceConfig, PersistenceError};
