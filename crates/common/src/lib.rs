//! Storefront E2E Common Library
//!
//! Shared types and runtime configuration for the storefront end-to-end
//! support layer.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AdminKeys, AdminRetryConfig, IdentityMode, MailboxConfig, ProfileKind, ProvisioningConfig,
    ReadinessConfig, RuntimeConfig, TimeoutConfig,
};
pub use error::{Error, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
