//! Qsse Server - gRPC front end of the plugin
//!
//! This crate provides:
//! - `FunctionDispatcher` for `ExecuteFunction` and `ScriptRouter` for `EvaluateScript`
//! - The `Connector` service with its execution permit pool
//! - TLS loading, the serve loop and graceful shutdown
//! - Configuration, metrics and health endpoints for the `qssed` binary

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod functions;
pub mod health;
pub mod metrics;
pub mod script;
pub mod service;
pub mod transport;

use std::sync::Arc;

use qsse_core::{build_capabilities, FunctionRegistry, PluginInfo};
use qsse_script::ScriptEvaluator;

pub use config::{Cli, FailurePolicy, ServerConfig};
pub use dispatcher::FunctionDispatcher;
pub use error::DispatchError;
pub use functions::{builtin_table, FunctionTable, TableError};
pub use metrics::ServerMetrics;
pub use script::ScriptRouter;
pub use service::{AbandonHandle, SseService};
pub use transport::SseServer;

/// Wire the registry, handlers and evaluator into a `Connector` service.
pub fn build_service(
    config: &ServerConfig,
    registry: Arc<FunctionRegistry>,
    table: FunctionTable,
    evaluator: Arc<dyn ScriptEvaluator>,
    metrics: ServerMetrics,
) -> SseService {
    let capabilities = build_capabilities(&registry, &PluginInfo::default());
    let dispatcher = FunctionDispatcher::new(
        registry,
        Arc::new(table),
        config.failure_policy,
        config.call_timeout,
        metrics.clone(),
    );
    let scripts = ScriptRouter::new(evaluator, config.call_timeout, metrics.clone());
    SseService::new(
        capabilities,
        dispatcher,
        scripts,
        config.max_concurrent_calls,
        metrics,
    )
}
