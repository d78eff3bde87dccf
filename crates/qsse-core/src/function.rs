//! The seam between the dispatcher and user-defined function implementations

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::{ArgRow, Value};
use crate::error::CodecError;
use crate::registry::FunctionSpec;

#[derive(Debug, Error)]
pub enum FunctionError {
    /// A row did not carry what the function needs.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The arguments decoded fine but are not acceptable to the function.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The external computation failed.
    #[error("collaborator failed: {0:#}")]
    Collaborator(anyhow::Error),
}

/// A user-defined function invoked once per `ExecuteFunction` call with every
/// decoded input row.
///
/// Returns the result scalars in output order: one per input row for
/// row-wise functions, a single value for aggregations.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn invoke(&self, spec: &FunctionSpec, rows: Vec<ArgRow>) -> Result<Vec<Value>, FunctionError>;

    /// Parameter names that must be declared for this handler to be bound to a spec.
    fn required_params(&self) -> &[&'static str] {
        &[]
    }
}

/// Column positions of named parameters, resolved once per call.
#[derive(Debug, Clone)]
pub struct Columns {
    positions: Vec<usize>,
}

impl Columns {
    /// Resolve `names` against the function's declared parameters.
    pub fn resolve(spec: &FunctionSpec, names: &[&str]) -> Result<Self, FunctionError> {
        let positions = names
            .iter()
            .map(|name| {
                spec.param_index(name).ok_or_else(|| {
                    FunctionError::InvalidInput(format!(
                        "function '{}' does not declare parameter '{}'",
                        spec.name, name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { positions })
    }

    /// Column index of the `n`-th requested name.
    pub fn at(&self, n: usize) -> usize {
        self.positions[n]
    }
}
