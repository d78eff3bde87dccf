//! `WaypointOptimization` function

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use qsse_core::{ArgRow, Columns, FunctionError, FunctionHandler, FunctionSpec, Value};
use tracing::debug;

use crate::error::{MapsError, ShapeError};
use crate::model::{LatLng, Route, RouteRequest};
use crate::polyline;
use crate::service::RouteService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointResponseKind {
    /// Ordered leg points
    Points,
    /// Overview polyline
    Route,
    /// `points|||route|||ordered locations`
    All,
}

impl FromStr for WaypointResponseKind {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "points" => Ok(Self::Points),
            "route" => Ok(Self::Route),
            "all" => Ok(Self::All),
            _ => Err(ShapeError::UnsupportedResponseKind(s.to_string())),
        }
    }
}

const PARAMS: &[&str] = &["origin", "destination", "mode", "response", "waypoints"];

pub struct WaypointOptimizationFunction {
    routes: Arc<dyn RouteService>,
}

impl WaypointOptimizationFunction {
    pub fn new(routes: Arc<dyn RouteService>) -> Self {
        Self { routes }
    }

    async fn optimize(&self, row: &ArgRow, cols: &Columns) -> Result<String, FunctionError> {
        let kind: WaypointResponseKind = row
            .str_at(cols.at(3))?
            .parse()
            .map_err(|e: ShapeError| FunctionError::InvalidInput(e.to_string()))?;
        let waypoints = row.str_at(cols.at(4))?;
        let request = RouteRequest {
            origin: row.str_at(cols.at(0))?.to_string(),
            destination: row.str_at(cols.at(1))?.to_string(),
            mode: row.str_at(cols.at(2))?.to_string(),
            alternatives: false,
            waypoints: Some(waypoints.to_string()),
            optimize_waypoints: true,
        };

        let result = self
            .routes
            .directions(&request)
            .await
            .map_err(|e| FunctionError::Collaborator(e.into()))?;
        let route = result
            .routes
            .first()
            .ok_or(MapsError::NoRoute(0))
            .map_err(|e| FunctionError::Collaborator(e.into()))?;

        shape_waypoints(route, waypoints, kind).map_err(|e| FunctionError::Collaborator(e.into()))
    }
}

#[async_trait]
impl FunctionHandler for WaypointOptimizationFunction {
    async fn invoke(&self, spec: &FunctionSpec, rows: Vec<ArgRow>) -> Result<Vec<Value>, FunctionError> {
        let cols = Columns::resolve(spec, PARAMS)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            debug!(row = row.index(), "Optimizing waypoints");
            out.push(Value::Str(self.optimize(row, &cols).await?));
        }
        Ok(out)
    }

    fn required_params(&self) -> &[&'static str] {
        PARAMS
    }
}

/// Whole-number coordinates keep their decimal point (`43.0`).
fn point(p: &LatLng) -> String {
    format!("[{:?}, {:?}]", p.lng, p.lat)
}

/// Shape an optimized route. `waypoints` is the `|`-separated list the request was made with.
pub fn shape_waypoints(
    route: &Route,
    waypoints: &str,
    kind: WaypointResponseKind,
) -> Result<String, MapsError> {
    let points = || -> Result<String, MapsError> {
        let first = route.legs.first().ok_or(MapsError::NoLegs)?;
        let mut list = vec![point(&first.start_location)];
        list.extend(route.legs.iter().map(|leg| point(&leg.end_location)));
        Ok(list.join("||"))
    };
    let overview = || -> Result<String, MapsError> {
        let pairs = polyline::decode_lng_lat(&route.overview_polyline.points)?;
        Ok(serde_json::json!(pairs).to_string())
    };

    match kind {
        WaypointResponseKind::Points => points(),
        WaypointResponseKind::Route => overview(),
        WaypointResponseKind::All => {
            let stops: Vec<&str> = waypoints.split('|').collect();
            let ordered = route
                .waypoint_order
                .iter()
                .map(|&i| {
                    stops.get(i).copied().ok_or(MapsError::WaypointOrder(i))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("{}|||{}|||{}", points()?, overview()?, ordered.join("||")))
        }
    }
}
