//! # Polyvox Common Library
//!
//! Shared code for the polyvox audio workspace:
//! - Error type shared by configuration and identity helpers
//! - TOML configuration loading with graceful fallback to defaults
//! - Event types and the broadcast `EventBus`
//! - Resource identity and media classification

pub mod config;
pub mod error;
pub mod events;
pub mod resource;

pub use error::{Error, Result};
pub use resource::{MediaKind, ResourceId};
