//! # GeoDrop Geo
//!
//! Pure geometry for the collectible map: coordinate validation with the
//! axis-swap heuristic, haversine geofences, and the zoom-dependent
//! clustering policy.
//!
//! ## Example
//!
//! ```
//! use geodrop_geo::validate::{validate_coordinate, ValidationReason};
//! use geodrop_geo::geofence::check;
//!
//! // Longitude written into the latitude slot
//! let v = validate_coordinate("-122.4", "37.7");
//! assert_eq!(v.reason, ValidationReason::SwapCorrected);
//!
//! let here = v.coordinate().unwrap();
//! assert!(check(&here, &here, 10).within_radius);
//! ```

pub mod cluster;
pub mod geofence;
pub mod validate;

pub use cluster::{CameraTarget, Cluster, ClusterKey, ClusterPolicy, RenderPlan};
pub use geofence::{check, haversine_distance_m, GeofenceCheck, GeofenceEngine, EARTH_RADIUS_M};
pub use validate::{
    normalize, parse_anchor, validate_coordinate, validate_position, RawAxis, ValidatedCoordinate,
    ValidationReason,
};
