//! Tenant connection management.
//!
//! [`TenantConnectionRegistry`] hands out one open tenant store per
//! connection descriptor, decrypting descriptors with [`DescriptorCipher`]
//! and logging them only in redacted form.

mod cipher;
mod config;
mod registry;

pub use cipher::{DescriptorCipher, DescriptorError};
pub use config::RegistryConfig;
pub use registry::{TenantConnectionRegistry, TenantContext};
