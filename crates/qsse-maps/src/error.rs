//! Typed errors for the maps crate.

use thiserror::Error;

/// Failures of the route service itself.
#[derive(Debug, Error)]
pub enum MapsError {
    #[error("request to route service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid route service URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("route service answered {status}: {message}")]
    Upstream { status: String, message: String },

    #[error("route service returned no route at index {0}")]
    NoRoute(usize),

    #[error("route has no legs")]
    NoLegs,

    #[error("waypoint order references unknown stop {0}")]
    WaypointOrder(usize),

    #[error("malformed polyline: {0}")]
    Polyline(String),
}

/// Failures turning a route into the requested response shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("unsupported response kind '{0}'")]
    UnsupportedResponseKind(String),
}
