// src/error.rs

use crate::types::EntityId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Invalid geometry: lon={lon}, lat={lat}")]
    InvalidGeometry { lon: f64, lat: f64 },

    #[error("Invalid sample time: {0}")]
    InvalidTime(f64),

    #[error("Report fetch failed: {0}")]
    FetchFailed(String),

    #[error("Report fetch timed out after {0:?}")]
    FetchTimedOut(Duration),

    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),
}

pub type TrackingResult<T> = Result<T, TrackingError>;
