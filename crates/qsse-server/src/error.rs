//! Call-level errors and their gRPC status codes.

use std::time::Duration;

use qsse_core::{CodecError, FunctionError, RegistryError};
use qsse_proto::HeaderError;
use qsse_script::ScriptError;
use thiserror::Error;
use tonic::Status;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("unknown function: {0}")]
    UnknownFunction(#[from] RegistryError),

    #[error("no handler bound for function {0}")]
    NoHandler(i32),

    #[error("input rows rejected: {0}")]
    Codec(#[from] CodecError),

    #[error("function '{name}' failed: {source}")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
    },

    #[error("function '{name}' aborted: {reason}")]
    Aborted { name: String, reason: String },

    #[error("function '{name}' exceeded its {timeout:?} deadline")]
    Timeout { name: String, timeout: Duration },

    #[error("script kind {0} is not supported")]
    UnsupportedScript(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("script exceeded its {0:?} deadline")]
    ScriptTimeout(Duration),
}

impl From<DispatchError> for Status {
    fn from(e: DispatchError) -> Self {
        let message = e.to_string();
        match &e {
            DispatchError::Header(_) => Status::invalid_argument(message),
            DispatchError::UnknownFunction(_) => Status::invalid_argument(message),
            DispatchError::NoHandler(_) => Status::internal(message),
            DispatchError::Codec(_) => Status::invalid_argument(message),

            DispatchError::Function {
                source: FunctionError::Codec(_) | FunctionError::InvalidInput(_),
                ..
            } => Status::invalid_argument(message),
            DispatchError::Function {
                source: FunctionError::Collaborator(_),
                ..
            } => Status::internal(message),
            DispatchError::Aborted { .. } => Status::internal(message),
            DispatchError::Timeout { .. } => Status::deadline_exceeded(message),

            DispatchError::UnsupportedScript(_) => Status::unimplemented(message),
            DispatchError::Script(s) if s.is_internal() => Status::internal(message),
            DispatchError::Script(ScriptError::UnsupportedKind(_)) => {
                Status::unimplemented(message)
            }
            DispatchError::Script(_) => Status::invalid_argument(message),
            DispatchError::ScriptTimeout(_) => Status::deadline_exceeded(message),
        }
    }
}
