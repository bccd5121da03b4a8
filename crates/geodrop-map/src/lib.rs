//! # GeoDrop Map
//!
//! Marker lifecycle for the collectible map.
//!
//! - **State**: one `MarkerState` enum with an exhaustive transition table
//!   and per-state ownership.
//! - **Registry**: session-owned map from marker key to render handle.
//! - **Lifecycle**: diff-and-reconcile refresh with debounce, grace window,
//!   protection guard and bounded surface retries.
//! - **Pin**: the protected drag-and-drop authoring pin.
//! - **Session**: owns all of the above for one open map.
//!
//! Everything here is synchronous and takes its time from an injectable
//! clock; check-then-act sequences complete inside one call.
//!
//! ## Example
//!
//! ```
//! use geodrop_core::{AppConfig, Collectible, Coordinate, ManualClock};
//! use geodrop_map::{HeadlessSurface, MapSession};
//!
//! let clock = ManualClock::shared();
//! let mut session = MapSession::new(&AppConfig::default(), HeadlessSurface::new(), clock);
//!
//! let drop = Collectible::builder()
//!     .id("drop-1")
//!     .anchor(Coordinate::new(40.0, -74.0))
//!     .build();
//! assert!(session.set_nearby(vec![drop], false).is_applied());
//! assert_eq!(session.surface().marker_count(), 1);
//! ```

pub mod lifecycle;
pub mod metrics;
pub mod pin;
pub mod registry;
pub mod retry;
pub mod session;
pub mod state;
pub mod surface;

pub use lifecycle::{
    MarkerLifecycleManager, RefreshOutcome, RefreshReport, SkipReason, UpsertOutcome, Viewport,
};
pub use metrics::MarkerMetrics;
pub use pin::{AuthoringForm, CoordinateSource, FormSnapshot, PinPlacementController};
pub use registry::{Marker, MarkerRegistry};
pub use retry::RetryState;
pub use session::MapSession;
pub use state::{MarkerKey, MarkerState, Owner};
pub use surface::{ClickAction, HeadlessSurface, MarkerHandle, MarkerKind, MarkerSpec, RenderSurface};
