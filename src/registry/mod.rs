//! Registry providers for container image registries
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Resolver   │────▶│   Provider   │────▶│  Token cache │
//! │ (first match)│     │ (hub,ecr,..) │     │ (per provider│
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │  v2 client   │
//!                      │ (tags/list)  │
//!                      └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`provider`]: the `RegistryProvider` capability and provider identities
//! - [`providers`]: concrete providers and the fixed priority list
//! - [`credentials`]: shared login/token/auth credential schema
//! - [`token`]: per-provider bearer token cache with single-flight refresh
//! - [`v2`]: registry v2 HTTP plumbing shared by providers

pub mod credentials;
pub mod provider;
pub mod providers;
pub mod token;
pub mod v2;

pub use provider::{ProviderId, RegistryProvider};
