//! Coordinate validation and normalization
//!
//! Upstream data is not trusted: anchors arrive as strings from the token
//! metadata, positions arrive from platform providers, and some producers
//! write longitude into the latitude slot. Every coordinate is run through
//! [`validate_coordinate`] before anything else uses it.

use geodrop_core::error::InputError;
use geodrop_core::types::{Collectible, Coordinate, UserPosition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw axis value, either text or a number.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAxis {
    Text(String),
    Number(f64),
}

impl RawAxis {
    /// Parses the value, mapping anything unparseable to NaN.
    pub fn parse(&self) -> f64 {
        match self {
            RawAxis::Number(v) => *v,
            RawAxis::Text(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }

    fn describe(&self) -> String {
        match self {
            RawAxis::Number(v) => v.to_string(),
            RawAxis::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for RawAxis {
    fn from(v: f64) -> Self {
        RawAxis::Number(v)
    }
}

impl From<f32> for RawAxis {
    fn from(v: f32) -> Self {
        RawAxis::Number(v as f64)
    }
}

impl From<i32> for RawAxis {
    fn from(v: i32) -> Self {
        RawAxis::Number(v as f64)
    }
}

impl From<&str> for RawAxis {
    fn from(s: &str) -> Self {
        RawAxis::Text(s.to_string())
    }
}

impl From<String> for RawAxis {
    fn from(s: String) -> Self {
        RawAxis::Text(s)
    }
}

impl From<&String> for RawAxis {
    fn from(s: &String) -> Self {
        RawAxis::Text(s.clone())
    }
}

/// Why a coordinate was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    /// Both axes in range as given
    Ok,
    /// At least one axis is NaN, infinite or unparseable
    NonFinite,
    /// Axes were swapped and the swapped pair is in range
    SwapCorrected,
    /// Out of range even after the swap attempt
    OutOfRange,
}

impl ValidationReason {
    /// Returns true for reasons that yield a usable coordinate.
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReason::Ok | ValidationReason::SwapCorrected)
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::Ok => write!(f, "ok"),
            ValidationReason::NonFinite => write!(f, "non_finite"),
            ValidationReason::SwapCorrected => write!(f, "swap_corrected"),
            ValidationReason::OutOfRange => write!(f, "out_of_range"),
        }
    }
}

/// Output of the validator.
///
/// For invalid results `lat`/`lng` hold the parsed input unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCoordinate {
    pub lat: f64,
    pub lng: f64,
    pub valid: bool,
    pub reason: ValidationReason,
}

impl ValidatedCoordinate {
    fn accepted(lat: f64, lng: f64, reason: ValidationReason) -> Self {
        Self {
            lat,
            lng,
            valid: true,
            reason,
        }
    }

    fn rejected(lat: f64, lng: f64, reason: ValidationReason) -> Self {
        Self {
            lat,
            lng,
            valid: false,
            reason,
        }
    }

    /// Returns the normalized coordinate if valid.
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.valid.then(|| Coordinate::new(self.lat, self.lng))
    }

    /// Converts into a `Result`, mapping rejections to [`InputError`].
    pub fn into_result(self) -> Result<Coordinate, InputError> {
        match self.reason {
            ValidationReason::Ok | ValidationReason::SwapCorrected => {
                Ok(Coordinate::new(self.lat, self.lng))
            }
            ValidationReason::NonFinite => {
                let axis = if self.lat.is_finite() { "lng" } else { "lat" };
                let raw = if self.lat.is_finite() { self.lng } else { self.lat };
                Err(InputError::non_finite(axis, raw.to_string()))
            }
            ValidationReason::OutOfRange => Err(InputError::OutOfRange {
                lat: self.lat,
                lng: self.lng,
            }),
        }
    }
}

#[inline]
fn in_range(lat: f64, lng: f64) -> bool {
    lat.abs() <= 90.0 && lng.abs() <= 180.0
}

/// Validates and normalizes a raw (lat, lng) pair.
///
/// # Examples
///
/// ```
/// use geodrop_geo::validate::{validate_coordinate, ValidationReason};
///
/// let v = validate_coordinate("40.7128", "-74.0060");
/// assert_eq!(v.reason, ValidationReason::Ok);
///
/// // Longitude written into the latitude slot
/// let v = validate_coordinate(-122.4194, 37.7749);
/// assert_eq!(v.reason, ValidationReason::SwapCorrected);
/// assert_eq!((v.lat, v.lng), (37.7749, -122.4194));
/// ```
pub fn validate_coordinate(lat: impl Into<RawAxis>, lng: impl Into<RawAxis>) -> ValidatedCoordinate {
    let (lat, lng) = (lat.into(), lng.into());
    check_parsed(lat.parse(), lng.parse())
}

/// Validates an already numeric coordinate.
pub fn normalize(coordinate: Coordinate) -> ValidatedCoordinate {
    check_parsed(coordinate.lat, coordinate.lng)
}

fn check_parsed(lat: f64, lng: f64) -> ValidatedCoordinate {
    if !lat.is_finite() || !lng.is_finite() {
        return ValidatedCoordinate::rejected(lat, lng, ValidationReason::NonFinite);
    }

    if in_range(lat, lng) {
        return ValidatedCoordinate::accepted(lat, lng, ValidationReason::Ok);
    }

    if lng.abs() <= 90.0 && lat.abs() > 90.0 {
        let (swapped_lat, swapped_lng) = (lng, lat);
        if in_range(swapped_lat, swapped_lng) {
            return ValidatedCoordinate::accepted(
                swapped_lat,
                swapped_lng,
                ValidationReason::SwapCorrected,
            );
        }
    }

    ValidatedCoordinate::rejected(lat, lng, ValidationReason::OutOfRange)
}

/// Validates a position fix, returning it with a normalized coordinate.
///
/// Accuracy must be finite and non-negative.
pub fn validate_position(position: &UserPosition) -> Result<UserPosition, InputError> {
    let coordinate = normalize(position.coordinate).into_result()?;
    if !position.accuracy_m.is_finite() || position.accuracy_m < 0.0 {
        return Err(InputError::InvalidAccuracy {
            value: position.accuracy_m,
        });
    }
    Ok(UserPosition {
        coordinate,
        ..*position
    })
}

/// Validates a collectible's anchor, returning the collectible normalized.
pub fn validate_collectible(collectible: Collectible) -> Result<Collectible, InputError> {
    let anchor = normalize(collectible.anchor).into_result()?;
    Ok(Collectible {
        anchor,
        ..collectible
    })
}

/// Validates string-encoded anchor fields as stored in token metadata.
pub fn parse_anchor(latitude: &str, longitude: &str) -> Result<Coordinate, InputError> {
    let result = validate_coordinate(latitude, longitude);
    if result.reason == ValidationReason::NonFinite {
        let (axis, raw) = if RawAxis::from(latitude).parse().is_finite() {
            ("lng", RawAxis::from(longitude).describe())
        } else {
            ("lat", RawAxis::from(latitude).describe())
        };
        return Err(InputError::non_finite(axis, raw));
    }
    result.into_result()
}
