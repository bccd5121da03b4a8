//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use geodrop::CollectView;
use geodrop_client::{LocationError, LocationProvider, MemoryDirectory, PositionOptions};
use geodrop_core::clock::ManualClock;
use geodrop_core::config::AppConfig;
use geodrop_core::types::{Collectible, Coordinate, UserPosition};
use geodrop_map::{HeadlessSurface, MapSession};
use parking_lot::Mutex;
use std::sync::Arc;

/// Provider whose answer the test controls.
pub struct ScriptedLocation {
    answer: Mutex<Result<(f64, f64), LocationError>>,
}

impl ScriptedLocation {
    pub fn at(lat: f64, lng: f64) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Ok((lat, lng))),
        })
    }

    pub fn failing(error: LocationError) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(Err(error)),
        })
    }

    pub fn move_to(&self, lat: f64, lng: f64) {
        *self.answer.lock() = Ok((lat, lng));
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocation {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<UserPosition, LocationError> {
        let (lat, lng) = (*self.answer.lock())?;
        Ok(UserPosition::new(lat, lng, 5.0))
    }
}

pub type TestView = CollectView<HeadlessSurface, Arc<ManualClock>, ScriptedLocation, MemoryDirectory>;

/// Configuration with a map token so markers render.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.map.access_token = Some("pk.test".to_string());
    config
}

pub fn open_view(
    provider: Arc<ScriptedLocation>,
    directory: Arc<MemoryDirectory>,
) -> (TestView, Arc<ManualClock>) {
    let clock = ManualClock::shared();
    let view = CollectView::open(
        &test_config(),
        HeadlessSurface::new(),
        clock.clone(),
        provider,
        directory,
    );
    (view, clock)
}

pub fn open_session() -> (MapSession<HeadlessSurface, Arc<ManualClock>>, Arc<ManualClock>) {
    let clock = ManualClock::shared();
    let session = MapSession::new(&test_config(), HeadlessSurface::new(), clock.clone());
    (session, clock)
}

/// `count` collectibles stacked north of a point, 0.002 degrees apart.
pub fn drops_near(lat: f64, lng: f64, count: usize) -> Vec<Collectible> {
    (0..count)
        .map(|i| {
            Collectible::builder()
                .id(format!("drop-{}", i))
                .anchor(Coordinate::new(lat + 0.002 * i as f64, lng))
                .radius_m(25)
                .build()
        })
        .collect()
}
