//! Qsse Script - evaluation of `EvaluateScript` requests
//!
//! The `ScriptEvaluator` trait is the seam the server routes script calls
//! through; `SqlScriptEvaluator` answers them with DataFusion SQL over the
//! call's rows.

pub mod error;
pub mod evaluator;
pub mod sql;

pub use error::ScriptError;
pub use evaluator::ScriptEvaluator;
pub use sql::SqlScriptEvaluator;
