//! Route request and the subset of the Directions API response we consume

use serde::{Deserialize, Serialize};

/// What to ask the route service for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    /// driving, walking, bicycling or transit; passed through as-is
    pub mode: String,
    pub alternatives: bool,
    /// `|`-separated intermediate stops
    pub waypoints: Option<String>,
    pub optimize_waypoints: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextValue {
    pub value: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedPolyline {
    pub points: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub polyline: EncodedPolyline,
    #[serde(default)]
    pub html_instructions: String,
    pub duration: TextValue,
    pub distance: TextValue,
    #[serde(default)]
    pub travel_mode: String,
    pub start_location: LatLng,
    pub end_location: LatLng,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    #[serde(default)]
    pub steps: Vec<Step>,
    pub start_location: LatLng,
    pub end_location: LatLng,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub legs: Vec<Leg>,
    pub overview_polyline: EncodedPolyline,
    #[serde(default)]
    pub waypoint_order: Vec<usize>,
}

/// Body of a Directions API answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResult {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
}
