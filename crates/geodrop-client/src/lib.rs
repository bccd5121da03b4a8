//! # GeoDrop Client
//!
//! Async collaborators of the collectible map:
//!
//! - **Location**: the [`LocationProvider`] seam and [`locate`], which adds
//!   the request timeout and fix validation.
//! - **Watch**: a cancellable background [`LocationWatch`].
//! - **Directory**: the [`CollectibleDirectory`] seam and an in-process
//!   [`MemoryDirectory`].
//! - **Fetch**: [`NearbyFetcher`], a cooldown in front of nearby queries.
//!
//! ## Example
//!
//! ```no_run
//! use geodrop_client::{CollectibleDirectory, MemoryDirectory};
//! use geodrop_core::Coordinate;
//!
//! # async fn example() -> geodrop_core::Result<()> {
//! let directory = MemoryDirectory::new();
//! let nearby = directory.list_nearby(Coordinate::new(40.0, -74.0), 5_000).await?;
//! println!("{} collectibles nearby", nearby.len());
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod fetch;
pub mod location;
pub mod watch;

pub use directory::{CollectReceipt, CollectibleDirectory, MemoryDirectory};
pub use fetch::{FetchOutcome, NearbyFetcher};
pub use location::{locate, LocationError, LocationProvider, PositionOptions};
pub use watch::LocationWatch;
