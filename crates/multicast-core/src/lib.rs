//! multicast-core: shared types, errors and configuration for the
//! multicast workspace.

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use error::{MulticastError, Result};
pub use types::SubscriptionId;
