//! Qsse Maps - route-service backed functions
//!
//! This crate provides:
//! - The `RouteService` collaborator trait and a Google Directions client
//! - Encoded-polyline decoding
//! - The `Directions` and `WaypointOptimization` function handlers

pub mod directions;
pub mod error;
pub mod google;
pub mod model;
pub mod polyline;
pub mod service;
pub mod waypoints;

pub use directions::{DirectionsFunction, DirectionsResponseKind};
pub use error::{MapsError, ShapeError};
pub use google::GoogleDirectionsClient;
pub use model::{DirectionsResult, LatLng, Leg, Route, RouteRequest, Step, TextValue};
pub use service::RouteService;
pub use waypoints::{WaypointOptimizationFunction, WaypointResponseKind};
