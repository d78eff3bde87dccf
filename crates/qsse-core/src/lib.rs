//! Qsse Core - the protocol-independent half of the SSE bridge
//!
//! This crate provides:
//! - Function definition files and their validation
//! - The read-only function registry
//! - Row codec between `BundledRows` and typed argument rows
//! - Capability advertisement built from the registry
//! - The `FunctionHandler` trait user-defined functions implement

pub mod capabilities;
pub mod codec;
pub mod definition;
pub mod error;
pub mod function;
pub mod registry;
pub mod validation;

pub use capabilities::{build_capabilities, PluginInfo};
pub use codec::{decode_rows, encode_values, ArgRow, Value};
pub use definition::{DefinitionFile, FunctionEntry};
pub use error::{CodecError, DefinitionError, RegistryError};
pub use function::{Columns, FunctionError, FunctionHandler};
pub use registry::{FunctionRegistry, FunctionSpec, ParamSpec};
pub use validation::validate_definitions;

// Re-export the wire enums the registry is typed with
pub use qsse_proto::{DataType, FunctionType};
