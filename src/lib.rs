//! # GeoDrop
//!
//! Location-anchored collectibles on an interactive map.
//!
//! The workspace is split the same way the data flows:
//!
//! - [`geodrop_core`]: types, errors, configuration, logging, clock
//! - [`geodrop_geo`]: coordinate validation, geofences, clustering policy
//! - [`geodrop_map`]: marker state machine, lifecycle manager, draft pin
//! - [`geodrop_client`]: location provider, directory, fetch cooldown, watch
//!
//! This crate ties them together in [`CollectView`].
//!
//! ## Example
//!
//! ```no_run
//! use geodrop::{CollectView, PinDetails};
//! use geodrop_client::{LocationProvider, MemoryDirectory};
//! use geodrop_core::{AppConfig, SystemClock};
//! use geodrop_map::HeadlessSurface;
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn LocationProvider>) -> geodrop_core::Result<()> {
//! let config = AppConfig::from_file("geodrop.yaml")?;
//! geodrop_core::logging::init_logging(&config.logging)?;
//!
//! let directory = Arc::new(MemoryDirectory::new());
//! let mut view = CollectView::open(&config, HeadlessSurface::new(), SystemClock, provider, directory);
//!
//! if let Err(e) = view.refresh_location().await {
//!     eprintln!("{}", e.user_message().unwrap_or_default());
//! }
//! view.place_pin(52.52, 13.405)?;
//! let id = view.submit_pin(PinDetails::default()).await?;
//! println!("pinned {}", id);
//! view.close();
//! # Ok(())
//! # }
//! ```

pub mod view;

pub use geodrop_client;
pub use geodrop_core;
pub use geodrop_geo;
pub use geodrop_map;

pub use view::{CollectView, LocationUpdate, PinDetails};
