use async_trait::async_trait;
use qsse_proto::{BundledRows, FunctionType, ScriptRequestHeader};

use crate::error::ScriptError;

/// Evaluates one script call over all of its inbound rows.
///
/// Only `Aggregation` and `Tensor` kinds are ever routed here.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        header: &ScriptRequestHeader,
        rows: Vec<BundledRows>,
        kind: FunctionType,
    ) -> Result<BundledRows, ScriptError>;
}
