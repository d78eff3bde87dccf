//! Typed errors for the core crate.

use std::path::PathBuf;

use qsse_proto::DataType;
use thiserror::Error;

/// A single problem found while validating a function definition file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("Definition file declares no functions")]
    NoFunctions,

    #[error("Function with id {0} has an empty name")]
    EmptyName(i32),

    #[error("Function '{name}' reuses id {id}")]
    DuplicateId { id: i32, name: String },

    #[error("Function '{name}' has unrecognized Type {value}")]
    UnknownKind { name: String, value: i32 },

    #[error("Function '{name}' has unrecognized ReturnType {value}")]
    UnknownReturnType { name: String, value: i32 },

    #[error("Parameter '{param}' of function '{name}' has unrecognized type {value}")]
    UnknownParamType {
        name: String,
        param: String,
        value: i32,
    },

    #[error("Function '{0}' has a parameter with an empty name")]
    EmptyParamName(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read function definitions from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse function definitions in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid function definitions: {}", join_errors(.0))]
    Invalid(Vec<DefinitionError>),

    #[error("function id {0} is not registered")]
    NotFound(i32),
}

fn join_errors(errors: &[DefinitionError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while converting between wire rows and typed values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("row {row} has {actual} cells, expected {expected}")]
    Arity {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}, column {column}: expected a {} value", .expected.as_str_name())]
    TypeMismatch {
        row: usize,
        column: usize,
        expected: DataType,
    },

    #[error("row {row} has no column {column}")]
    MissingColumn { row: usize, column: usize },
}
