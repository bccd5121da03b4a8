//! Location provider seam
//!
//! The platform geolocation API sits behind [`LocationProvider`]. Callers go
//! through [`locate`], which bounds the request with a timeout, maps the
//! provider's failures into the crate error taxonomy and validates the fix
//! before anything downstream sees it.

use async_trait::async_trait;
use chrono::Utc;
use geodrop_core::config::LocationConfig;
use geodrop_core::error::{PermissionError, Result, TransientError};
use geodrop_core::types::UserPosition;
use geodrop_geo::validate::validate_position;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Options for a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Ask the platform for a high-accuracy fix
    pub high_accuracy: bool,
    /// Upper bound on the request
    pub timeout: Duration,
    /// Oldest cached fix the provider may hand back
    pub max_age: Duration,
}

impl From<&LocationConfig> for PositionOptions {
    fn from(config: &LocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: config.timeout(),
            max_age: config.max_age(),
        }
    }
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::from(&LocationConfig::default())
    }
}

/// Failures reported by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable")]
    PositionUnavailable,

    #[error("Location request timed out")]
    Timeout,
}

impl LocationError {
    fn into_error(self, timeout_ms: u64) -> geodrop_core::GeoDropError {
        match self {
            LocationError::PermissionDenied => PermissionError::LocationDenied.into(),
            LocationError::PositionUnavailable => TransientError::PositionUnavailable.into(),
            LocationError::Timeout => TransientError::timeout("location", timeout_ms).into(),
        }
    }
}

/// Source of user positions.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Requests the current position.
    ///
    /// Implementations should honor `options` where the platform allows;
    /// [`locate`] enforces the timeout regardless.
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<UserPosition, LocationError>;
}

#[async_trait]
impl<P: LocationProvider + ?Sized> LocationProvider for Arc<P> {
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<UserPosition, LocationError> {
        (**self).current_position(options).await
    }
}

/// Requests a validated position fix.
///
/// # Errors
///
/// - `PermissionError::LocationDenied` if the user refused access
/// - `TransientError` if no fix arrived in time, the provider could not
///   determine one, or the fix is older than `max_age`
/// - `InputError` if the provider returned an unusable coordinate
pub async fn locate<P>(provider: &P, options: PositionOptions) -> Result<UserPosition>
where
    P: LocationProvider + ?Sized,
{
    let timeout_ms = options.timeout.as_millis() as u64;

    let position = timeout(options.timeout, provider.current_position(options))
        .await
        .map_err(|_| TransientError::timeout("location", timeout_ms))?
        .map_err(|e| {
            warn!(error = %e, "Location request failed");
            e.into_error(timeout_ms)
        })?;

    let age = position.age(Utc::now());
    if age.to_std().is_ok_and(|age| age > options.max_age) {
        warn!(age_ms = age.num_milliseconds(), "Discarding stale position fix");
        return Err(TransientError::PositionUnavailable.into());
    }

    let position = validate_position(&position)?;
    debug!(
        lat = position.coordinate.lat,
        lng = position.coordinate.lng,
        accuracy_m = position.accuracy_m,
        "Position fix"
    );
    Ok(position)
}
