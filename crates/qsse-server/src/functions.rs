//! Function id to handler lookup table, built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use qsse_core::{FunctionHandler, FunctionRegistry};
use qsse_maps::{DirectionsFunction, RouteService, WaypointOptimizationFunction};
use thiserror::Error;
use tracing::info;

pub const DIRECTIONS: &str = "Directions";
pub const WAYPOINT_OPTIMIZATION: &str = "WaypointOptimization";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("function {id} ('{name}') has no handler")]
    Unbound { id: i32, name: String },

    #[error("handler bound to function {0}, which is not registered")]
    Unregistered(i32),

    #[error("function {id} ('{name}') does not declare parameter '{param}' its handler needs")]
    MissingParam { id: i32, name: String, param: String },

    #[error("function {id} ('{name}') needs a route service; set GOOGLE_MAPS_API_KEY")]
    NoRouteService { id: i32, name: String },
}

/// Immutable `FunctionId -> handler` table.
#[derive(Clone, Default)]
pub struct FunctionTable {
    handlers: HashMap<i32, Arc<dyn FunctionHandler>>,
}

impl FunctionTable {
    pub fn builder() -> FunctionTableBuilder {
        FunctionTableBuilder::default()
    }

    pub fn get(&self, id: i32) -> Option<Arc<dyn FunctionHandler>> {
        self.handlers.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Default)]
pub struct FunctionTableBuilder {
    handlers: HashMap<i32, Arc<dyn FunctionHandler>>,
}

impl FunctionTableBuilder {
    pub fn bind(mut self, id: i32, handler: Arc<dyn FunctionHandler>) -> Self {
        self.handlers.insert(id, handler);
        self
    }

    /// Check the bindings against `registry`: every registered function has a
    /// handler, every handler has a function, and every parameter a handler
    /// reads is declared.
    pub fn build(self, registry: &FunctionRegistry) -> Result<FunctionTable, Vec<TableError>> {
        let mut errors = Vec::new();

        for spec in registry.iter() {
            match self.handlers.get(&spec.id) {
                None => errors.push(TableError::Unbound {
                    id: spec.id,
                    name: spec.name.clone(),
                }),
                Some(handler) => {
                    for param in handler.required_params() {
                        if spec.param_index(param).is_none() {
                            errors.push(TableError::MissingParam {
                                id: spec.id,
                                name: spec.name.clone(),
                                param: param.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let mut unregistered: Vec<i32> = self
            .handlers
            .keys()
            .copied()
            .filter(|id| registry.resolve(*id).is_err())
            .collect();
        unregistered.sort_unstable();
        errors.extend(unregistered.into_iter().map(TableError::Unregistered));

        if !errors.is_empty() {
            return Err(errors);
        }

        info!("Bound {} function handlers", self.handlers.len());
        Ok(FunctionTable {
            handlers: self.handlers,
        })
    }
}

/// Bind the built-in functions to the registry entries carrying their names.
///
/// Registered functions with any other name are left unbound and reported.
pub fn builtin_table(
    registry: &FunctionRegistry,
    routes: Option<Arc<dyn RouteService>>,
) -> Result<FunctionTable, Vec<TableError>> {
    let mut builder = FunctionTable::builder();
    let mut missing_routes = Vec::new();

    for spec in registry.iter() {
        let handler: Arc<dyn FunctionHandler> = match (spec.name.as_str(), &routes) {
            (DIRECTIONS, Some(routes)) => Arc::new(DirectionsFunction::new(routes.clone())),
            (WAYPOINT_OPTIMIZATION, Some(routes)) => {
                Arc::new(WaypointOptimizationFunction::new(routes.clone()))
            }
            (DIRECTIONS | WAYPOINT_OPTIMIZATION, None) => {
                missing_routes.push(spec.id);
                continue;
            }
            _ => continue,
        };
        builder = builder.bind(spec.id, handler);
    }

    let errors = match builder.build(registry) {
        Ok(table) => return Ok(table),
        Err(errors) => errors,
    };
    // Report a missing key instead of a bare unbound handler
    Err(errors
        .into_iter()
        .map(|e| match e {
            TableError::Unbound { id, name } if missing_routes.contains(&id) => {
                TableError::NoRouteService { id, name }
            }
            other => other,
        })
        .collect())
}
