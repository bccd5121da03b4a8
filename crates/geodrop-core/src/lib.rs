//! # GeoDrop Core
//!
//! Core types, error handling, and configuration for the GeoDrop
//! collectible map.
//!
//! This crate provides the foundational building blocks shared by the
//! geometry, marker and client crates:
//!
//! - **Types**: `CollectibleId`, `Coordinate`, `Collectible`, `UserPosition`
//!   and the `NewCollectible` authoring draft.
//! - **Errors**: the `GeoDropError` taxonomy (input, permission, transient,
//!   concurrency, configuration, directory) with canonical user messages.
//! - **Configuration**: YAML files with `GEODROP__*` environment overrides
//!   and validation.
//! - **Clock**: an injectable monotonic clock for timer-driven logic.
//! - **Logging**: tracing subscriber setup from configuration.
//!
//! ## Example
//!
//! ```
//! use geodrop_core::types::{Collectible, Coordinate};
//! use geodrop_core::config::AppConfig;
//!
//! let drop = Collectible::builder()
//!     .id("drop-1")
//!     .anchor(Coordinate::new(52.52, 13.405))
//!     .radius_m(30)
//!     .build();
//!
//! let config = AppConfig::default();
//! assert!(config.validate().is_ok());
//! assert!(drop.anchor.is_in_range());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{GeoDropError, Result};
pub use types::{Collectible, CollectibleId, Coordinate, NewCollectible, Rarity, UserPosition};
