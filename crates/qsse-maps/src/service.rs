//! Route service collaborator

use async_trait::async_trait;

use crate::error::MapsError;
use crate::model::{DirectionsResult, RouteRequest};

/// Anything that can answer a route request.
#[async_trait]
pub trait RouteService: Send + Sync {
    async fn directions(&self, request: &RouteRequest) -> Result<DirectionsResult, MapsError>;
}
