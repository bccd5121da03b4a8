//! Error types for the GeoDrop collectible map.
//!
//! Errors follow the taxonomy of the marker pipeline: malformed input,
//! denied permissions, transient collaborator failures, rejected mutations
//! of protected markers and configuration problems. All errors are
//! serializable so a host UI can forward them unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using GeoDropError as the error type.
pub type Result<T> = std::result::Result<T, GeoDropError>;

/// Canonical message shown when no position can be obtained.
pub const MSG_LOCATION_UNAVAILABLE: &str = "location unavailable";

/// Canonical message shown when the nearby fetch fails.
pub const MSG_FETCH_FAILED: &str = "failed to fetch nearby collectibles";

/// Canonical message shown when a second draft pin is rejected.
pub const MSG_PIN_ALREADY_PLACED: &str = "pin already placed — remove it first";

/// Top-level error type for all GeoDrop operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum GeoDropError {
    /// Invalid, out-of-range or unswappable coordinates
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Location access denied
    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    /// Retryable collaborator failures
    #[error("Transient error: {0}")]
    Transient(#[from] TransientError),

    /// Attempted mutation of a protected marker
    #[error("Concurrency violation: {0}")]
    Concurrency(#[from] ConcurrencyViolation),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Collectible directory errors
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GeoDropError {
    /// Returns true if the failed operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, GeoDropError::Transient(_))
    }

    /// Message to show the user, if this error is user-visible.
    ///
    /// Input errors and concurrency violations are handled inside the
    /// marker pipeline and are not shown, with the exception of the
    /// rejected second draft pin.
    pub fn user_message(&self) -> Option<String> {
        match self {
            GeoDropError::Permission(_) => Some(MSG_LOCATION_UNAVAILABLE.to_string()),
            GeoDropError::Transient(e) => Some(e.user_message().to_string()),
            GeoDropError::Concurrency(ConcurrencyViolation::DraftAlreadyPlaced) => {
                Some(MSG_PIN_ALREADY_PLACED.to_string())
            }
            GeoDropError::Config(e) => Some(e.to_string()),
            GeoDropError::Directory(_) => Some(MSG_FETCH_FAILED.to_string()),
            GeoDropError::Input(_)
            | GeoDropError::Concurrency(_)
            | GeoDropError::Internal(_) => None,
        }
    }
}

/// Errors raised by the coordinate validator.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum InputError {
    /// Value is NaN, infinite or not a number at all
    #[error("Non-finite {axis}: {raw}")]
    NonFinite { axis: String, raw: String },

    /// Coordinate is outside the WGS84 ranges even after the swap attempt
    #[error("Coordinate out of range: lat {lat}, lng {lng}")]
    OutOfRange { lat: f64, lng: f64 },

    /// Position accuracy is negative or not finite
    #[error("Invalid accuracy: {value}")]
    InvalidAccuracy { value: f64 },
}

impl InputError {
    /// Creates a non-finite error for the given axis.
    pub fn non_finite(axis: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::NonFinite {
            axis: axis.into(),
            raw: raw.into(),
        }
    }
}

/// Errors raised when the user has not granted location access.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PermissionError {
    /// Location access denied by the user or platform
    #[error("Location permission denied")]
    LocationDenied,
}

/// Failures that are retried with bounded backoff before surfacing.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum TransientError {
    /// The rendering surface never became ready
    #[error("Rendering surface not ready after {attempts} attempts")]
    SurfaceNotReady { attempts: u32 },

    /// The platform could not determine a position
    #[error("Position unavailable")]
    PositionUnavailable,

    /// An asynchronous operation did not complete in time
    #[error("Operation timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Network request to a collaborator failed
    #[error("Network failure: {reason}")]
    Network { reason: String },
}

impl TransientError {
    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Canonical user message for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            TransientError::PositionUnavailable => MSG_LOCATION_UNAVAILABLE,
            TransientError::Timeout { operation, .. } if operation == "location" => {
                MSG_LOCATION_UNAVAILABLE
            }
            TransientError::SurfaceNotReady { .. } => "map is not ready yet",
            TransientError::Timeout { .. } | TransientError::Network { .. } => MSG_FETCH_FAILED,
        }
    }
}

/// A mutation was attempted against a marker that is shielded from it.
///
/// These are logged and discarded by the marker pipeline; they are only
/// returned as values so callers and tests can observe them.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ConcurrencyViolation {
    /// The marker is dragging, locked or protected
    #[error("Marker {marker} is protected, {operation} discarded")]
    MarkerProtected { marker: String, operation: String },

    /// A draft pin already exists and is locked
    #[error("Draft pin already placed")]
    DraftAlreadyPlaced,

    /// The requested state change is not in the transition table
    #[error("Illegal transition {from} -> {to} for {marker}")]
    IllegalTransition {
        marker: String,
        from: String,
        to: String,
    },

    /// The caller does not own the requested transition
    #[error("{owner} may not move {marker} from {from} to {to}")]
    NotOwner {
        marker: String,
        owner: String,
        from: String,
        to: String,
    },

    /// No draft pin exists for a pin operation
    #[error("No draft pin")]
    NoDraft,
}

impl ConcurrencyViolation {
    /// Creates a protected-marker violation.
    pub fn protected(marker: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::MarkerProtected {
            marker: marker.into(),
            operation: operation.into(),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Map access credentials are missing
    #[error("Missing map access token")]
    MissingAccessToken,
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error only disables rendering.
    pub fn is_rendering_only(&self) -> bool {
        matches!(self, ConfigError::MissingAccessToken)
    }
}

/// Errors returned by the collectible directory.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DirectoryError {
    /// Directory rejected the request
    #[error("Directory rejected request: {reason}")]
    Rejected { reason: String },

    /// Unknown collectible id
    #[error("Collectible not found: {id}")]
    NotFound { id: String },

    /// User is not inside the geofence
    #[error("Outside geofence: {distance_m:.1}m from anchor, radius {radius_m}m")]
    OutsideGeofence { distance_m: f64, radius_m: u32 },

    /// Collectible was already collected
    #[error("Collectible already collected: {id}")]
    AlreadyCollected { id: String },
}

/// Extension trait for converting Results to GeoDropError.
pub trait ResultExt<T> {
    /// Converts the error to an internal error with context.
    fn internal_context(self, context: &str) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn internal_context(self, context: &str) -> Result<T> {
        self.map_err(|e| GeoDropError::Internal(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err: GeoDropError = TransientError::SurfaceNotReady { attempts: 5 }.into();
        assert!(err.is_transient());

        let err: GeoDropError = PermissionError::LocationDenied.into();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_user_messages() {
        let err: GeoDropError = PermissionError::LocationDenied.into();
        assert_eq!(err.user_message().as_deref(), Some(MSG_LOCATION_UNAVAILABLE));

        let err: GeoDropError = ConcurrencyViolation::DraftAlreadyPlaced.into();
        assert_eq!(err.user_message().as_deref(), Some(MSG_PIN_ALREADY_PLACED));

        let err: GeoDropError = TransientError::Network {
            reason: "503".to_string(),
        }
        .into();
        assert_eq!(err.user_message().as_deref(), Some(MSG_FETCH_FAILED));

        let err: GeoDropError = TransientError::timeout("location", 10_000).into();
        assert_eq!(err.user_message().as_deref(), Some(MSG_LOCATION_UNAVAILABLE));
    }

    #[test]
    fn test_handled_locally_have_no_message() {
        let err: GeoDropError = InputError::OutOfRange { lat: 200.0, lng: 300.0 }.into();
        assert!(err.user_message().is_none());

        let err: GeoDropError = ConcurrencyViolation::protected("draft", "bulk_refresh").into();
        assert!(err.user_message().is_none());
    }

    #[test]
    fn test_error_serialization() {
        let err = GeoDropError::Input(InputError::non_finite("lat", "abc"));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Input"));
        assert!(json.contains("abc"));
    }

    #[test]
    fn test_config_error_helpers() {
        let err = ConfigError::invalid_value("markers.debounce_ms", "must be positive");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(ConfigError::MissingAccessToken.is_rendering_only());
        assert!(!ConfigError::file_not_found("/etc/geodrop.yaml").is_rendering_only());
    }

    #[test]
    fn test_timeout_display() {
        let err = TransientError::timeout("location", 10_000);
        let display = format!("{}", err);
        assert!(display.contains("location"));
        assert!(display.contains("10000"));
    }
}
