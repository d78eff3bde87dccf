//! `Directions` function: turn-by-turn routing shaped per row

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use qsse_core::{ArgRow, Columns, FunctionError, FunctionHandler, FunctionSpec, Value};
use serde_json::json;
use tracing::debug;

use crate::error::{MapsError, ShapeError};
use crate::model::{Route, RouteRequest};
use crate::polyline;
use crate::service::RouteService;

const METERS_PER_MILE: f64 = 1609.344;

/// What a `Directions` row asks to get back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionsResponseKind {
    /// Instructions and coordinates together
    All,
    Coordinates,
    Instructions,
    Durations,
    Distances,
    /// Total minutes
    Duration,
    /// Total miles
    Distance,
}

impl FromStr for DirectionsResponseKind {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "coordinates" => Ok(Self::Coordinates),
            "instructions" => Ok(Self::Instructions),
            "durations" => Ok(Self::Durations),
            "distances" => Ok(Self::Distances),
            "duration" => Ok(Self::Duration),
            "distance" => Ok(Self::Distance),
            _ => Err(ShapeError::UnsupportedResponseKind(s.to_string())),
        }
    }
}

const PARAMS: &[&str] = &["origin", "destination", "mode", "response", "alternative"];

pub struct DirectionsFunction {
    routes: Arc<dyn RouteService>,
}

impl DirectionsFunction {
    pub fn new(routes: Arc<dyn RouteService>) -> Self {
        Self { routes }
    }

    async fn directions_for(&self, row: &ArgRow, cols: &Columns) -> Result<String, FunctionError> {
        let kind: DirectionsResponseKind = row
            .str_at(cols.at(3))?
            .parse()
            .map_err(|e: ShapeError| FunctionError::InvalidInput(e.to_string()))?;
        let alternatives = row.str_at(cols.at(4))?.trim().eq_ignore_ascii_case("true");
        let request = RouteRequest {
            origin: row.str_at(cols.at(0))?.to_string(),
            destination: row.str_at(cols.at(1))?.to_string(),
            mode: row.str_at(cols.at(2))?.to_string(),
            alternatives,
            waypoints: None,
            optimize_waypoints: false,
        };

        let result = self
            .routes
            .directions(&request)
            .await
            .map_err(|e| FunctionError::Collaborator(e.into()))?;
        let index = usize::from(alternatives);
        let route = result
            .routes
            .get(index)
            .ok_or(MapsError::NoRoute(index))
            .map_err(|e| FunctionError::Collaborator(e.into()))?;

        shape_directions(route, kind).map_err(|e| FunctionError::Collaborator(e.into()))
    }
}

#[async_trait]
impl FunctionHandler for DirectionsFunction {
    async fn invoke(&self, spec: &FunctionSpec, rows: Vec<ArgRow>) -> Result<Vec<Value>, FunctionError> {
        let cols = Columns::resolve(spec, PARAMS)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            debug!(row = row.index(), "Resolving directions");
            out.push(Value::Str(self.directions_for(row, &cols).await?));
        }
        Ok(out)
    }

    fn required_params(&self) -> &[&'static str] {
        PARAMS
    }
}

/// Shape the first leg of `route` as requested.
pub fn shape_directions(route: &Route, kind: DirectionsResponseKind) -> Result<String, MapsError> {
    let leg = route.legs.first().ok_or(MapsError::NoLegs)?;
    let steps = &leg.steps;

    let instructions = || -> Vec<String> {
        steps
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "|{}: {}, Distance: {}, Duration: {}",
                    i + 1,
                    s.html_instructions,
                    s.distance.text,
                    s.duration.text
                )
            })
            .collect()
    };
    let coordinates = || -> Result<Vec<Vec<[f64; 2]>>, MapsError> {
        steps
            .iter()
            .map(|s| polyline::decode_lng_lat(&s.polyline.points))
            .collect()
    };

    let shaped = match kind {
        DirectionsResponseKind::Coordinates => json!(coordinates()?).to_string(),
        DirectionsResponseKind::Instructions => json!(instructions()).to_string(),
        DirectionsResponseKind::Durations => json!(steps
            .iter()
            .map(|s| [
                format!("Value: {}", s.duration.value),
                format!("Text: {}", s.duration.text)
            ])
            .collect::<Vec<_>>())
        .to_string(),
        DirectionsResponseKind::Distances => json!(steps
            .iter()
            .map(|s| [
                format!("Value: {}", s.distance.value),
                format!("Text: {}", s.distance.text)
            ])
            .collect::<Vec<_>>())
        .to_string(),
        DirectionsResponseKind::Duration => {
            let seconds: f64 = steps.iter().map(|s| s.duration.value).sum();
            (seconds / 60.0).to_string()
        }
        DirectionsResponseKind::Distance => {
            let meters: f64 = steps.iter().map(|s| s.distance.value).sum();
            (meters / METERS_PER_MILE).to_string()
        }
        DirectionsResponseKind::All => json!([instructions(), coordinates()?]).to_string(),
    };
    Ok(shaped)
}
