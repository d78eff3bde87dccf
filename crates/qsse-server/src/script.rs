//! EvaluateScript routing by function kind.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use qsse_proto::{parse_bin_header, BundledRows, FunctionType, ScriptRequestHeader, SCRIPT_REQUEST_HEADER_KEY};
use qsse_script::ScriptEvaluator;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::{debug, info_span, warn, Instrument};

use crate::dispatcher::{abandoned, abandoned_status, AbandonSignal, ResultStream};
use crate::error::DispatchError;
use crate::metrics::ServerMetrics;

#[derive(Clone)]
pub struct ScriptRouter {
    evaluator: Arc<dyn ScriptEvaluator>,
    call_timeout: Duration,
    metrics: ServerMetrics,
    abandon: Option<AbandonSignal>,
}

impl ScriptRouter {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>, call_timeout: Duration, metrics: ServerMetrics) -> Self {
        Self {
            evaluator,
            call_timeout,
            metrics,
            abandon: None,
        }
    }

    pub fn abandon_on(mut self, signal: AbandonSignal) -> Self {
        self.abandon = Some(signal);
        self
    }

    /// Aggregation and Tensor scripts go to the evaluator; every other kind is
    /// refused before any input is read.
    pub fn route<S, G>(&self, metadata: &MetadataMap, inbound: S, guard: G) -> Result<ResultStream, Status>
    where
        S: Stream<Item = Result<BundledRows, Status>> + Send + Unpin + 'static,
        G: Send + 'static,
    {
        let (header, kind) = parse_script_header(metadata)?;
        let (tx, rx) = mpsc::channel(1);

        let this = self.clone();
        let mut abandon = self.abandon.clone();
        let span = info_span!("evaluate_script", kind = kind.as_str_name());
        tokio::spawn(
            async move {
                let work = async {
                    match inbound.try_collect::<Vec<BundledRows>>().await {
                        Ok(batches) => this.evaluate(&header, batches, kind).await,
                        Err(status) => Err(status),
                    }
                };
                let item = tokio::select! {
                    item = work => item,
                    _ = abandoned(&mut abandon) => {
                        warn!("Abandoning script at shutdown");
                        Err(abandoned_status())
                    }
                };
                if tx.send(item).await.is_err() {
                    debug!("Host went away before the script result was sent; dropping it");
                }
                drop(guard);
            }
            .instrument(span),
        );

        Ok(ReceiverStream::new(rx))
    }

    async fn evaluate(
        &self,
        header: &ScriptRequestHeader,
        batches: Vec<BundledRows>,
        kind: FunctionType,
    ) -> Result<BundledRows, Status> {
        let received: usize = batches.iter().map(|b| b.rows.len()).sum();
        self.metrics.rows_received.inc_by(received as u64);
        debug!(rows = received, "Evaluating script '{}'", header.script);

        let result = tokio::time::timeout(
            self.call_timeout,
            self.evaluator.evaluate(header, batches, kind),
        )
        .await;
        match result {
            Ok(Ok(rows)) => {
                self.metrics.rows_emitted.inc_by(rows.rows.len() as u64);
                Ok(rows)
            }
            Ok(Err(e)) => {
                warn!(rows = received, "Script '{}' failed: {}", header.script, e);
                Err(DispatchError::Script(e).into())
            }
            Err(_) => {
                warn!(rows = received, "Script '{}' timed out", header.script);
                Err(DispatchError::ScriptTimeout(self.call_timeout).into())
            }
        }
    }
}

fn parse_script_header(metadata: &MetadataMap) -> Result<(ScriptRequestHeader, FunctionType), DispatchError> {
    let header: ScriptRequestHeader = parse_bin_header(metadata, SCRIPT_REQUEST_HEADER_KEY)?;
    match FunctionType::try_from(header.function_type) {
        Ok(kind @ (FunctionType::Aggregation | FunctionType::Tensor)) => Ok((header, kind)),
        Ok(FunctionType::Scalar) => Err(DispatchError::UnsupportedScript(
            FunctionType::Scalar.as_str_name().to_string(),
        )),
        Err(_) => Err(DispatchError::UnsupportedScript(header.function_type.to_string())),
    }
}
