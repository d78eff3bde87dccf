//! ExecuteFunction dispatch: header, registry lookup, decode, invoke, encode.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use qsse_core::{decode_rows, encode_values, FunctionHandler, FunctionRegistry, FunctionSpec};
use qsse_proto::{parse_bin_header, BundledRows, FunctionRequestHeader, FUNCTION_REQUEST_HEADER_KEY};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::config::FailurePolicy;
use crate::error::DispatchError;
use crate::functions::FunctionTable;
use crate::metrics::{FunctionLabel, ServerMetrics};

/// Outbound batches of one call; ends when the sender is dropped.
pub type ResultStream = ReceiverStream<Result<BundledRows, Status>>;

const OUTPUT_BUFFER: usize = 4;

/// Flips to `true` once in-flight calls are to be given up.
pub type AbandonSignal = watch::Receiver<bool>;

/// Resolves once `signal` fires; never, if there is none or its sender is gone.
pub(crate) async fn abandoned(signal: &mut Option<AbandonSignal>) {
    if let Some(rx) = signal {
        if rx.wait_for(|abandon| *abandon).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

pub(crate) fn abandoned_status() -> Status {
    Status::unavailable("server shut down before the call finished")
}

/// Aborts a spawned task when the call it serves is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct FunctionDispatcher {
    registry: Arc<FunctionRegistry>,
    table: Arc<FunctionTable>,
    policy: FailurePolicy,
    call_timeout: Duration,
    metrics: ServerMetrics,
    abandon: Option<AbandonSignal>,
}

impl FunctionDispatcher {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        table: Arc<FunctionTable>,
        policy: FailurePolicy,
        call_timeout: Duration,
        metrics: ServerMetrics,
    ) -> Self {
        Self {
            registry,
            table,
            policy,
            call_timeout,
            metrics,
            abandon: None,
        }
    }

    /// Answer in-flight calls with UNAVAILABLE once `signal` fires.
    pub fn abandon_on(mut self, signal: AbandonSignal) -> Self {
        self.abandon = Some(signal);
        self
    }

    /// Resolve the called function from `metadata`, then run it over `inbound`
    /// in the background.
    ///
    /// Header and id problems are returned before any input is read. `guard`
    /// is held until the result has been sent.
    pub fn handle<S, G>(&self, metadata: &MetadataMap, inbound: S, guard: G) -> Result<ResultStream, Status>
    where
        S: Stream<Item = Result<BundledRows, Status>> + Send + Unpin + 'static,
        G: Send + 'static,
    {
        let (spec, handler) = self.prepare(metadata)?;
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);

        let this = self.clone();
        let mut abandon = self.abandon.clone();
        let span = info_span!("execute_function", function_id = spec.id, function = %spec.name);
        tokio::spawn(
            async move {
                let item = tokio::select! {
                    item = this.execute(&spec, handler, inbound) => item,
                    _ = abandoned(&mut abandon) => {
                        warn!("Abandoning call at shutdown");
                        Err(abandoned_status())
                    }
                };
                if let Ok(batch) = &item {
                    this.metrics.rows_emitted.inc_by(batch.rows.len() as u64);
                }
                if tx.send(item).await.is_err() {
                    debug!("Host went away before the result was sent; dropping it");
                }
                drop(guard);
            }
            .instrument(span),
        );

        Ok(ReceiverStream::new(rx))
    }

    fn prepare(
        &self,
        metadata: &MetadataMap,
    ) -> Result<(FunctionSpec, Arc<dyn FunctionHandler>), DispatchError> {
        let header: FunctionRequestHeader = parse_bin_header(metadata, FUNCTION_REQUEST_HEADER_KEY)?;
        let spec = self.registry.resolve(header.function_id)?;
        let handler = self
            .table
            .get(spec.id)
            .ok_or(DispatchError::NoHandler(spec.id))?;
        debug!(function_id = spec.id, "Dispatching to '{}'", spec.name);
        Ok((spec.clone(), handler))
    }

    async fn execute<S>(
        &self,
        spec: &FunctionSpec,
        handler: Arc<dyn FunctionHandler>,
        inbound: S,
    ) -> Result<BundledRows, Status>
    where
        S: Stream<Item = Result<BundledRows, Status>> + Send + Unpin,
    {
        let batches = inbound.try_collect::<Vec<BundledRows>>().await?;
        self.run(spec, handler, batches).await
    }

    async fn run(
        &self,
        spec: &FunctionSpec,
        handler: Arc<dyn FunctionHandler>,
        batches: Vec<BundledRows>,
    ) -> Result<BundledRows, Status> {
        let received: usize = batches.iter().map(|b| b.rows.len()).sum();
        self.metrics.rows_received.inc_by(received as u64);

        let rows = decode_rows(batches, &spec.parameters).map_err(DispatchError::from)?;
        let label = FunctionLabel(spec.name.clone());
        self.metrics.invocations.get_or_create(&label).inc();

        // A panicking handler must still produce an answer
        let task = {
            let spec = spec.clone();
            tokio::spawn(async move { handler.invoke(&spec, rows).await }.in_current_span())
        };
        let _abort = AbortOnDrop(task.abort_handle());

        let outcome = match tokio::time::timeout(self.call_timeout, task).await {
            Ok(Ok(Ok(values))) => return Ok(encode_values(&values, spec.return_type)),
            Ok(Ok(Err(source))) => DispatchError::Function {
                name: spec.name.clone(),
                source,
            },
            Ok(Err(join)) => DispatchError::Aborted {
                name: spec.name.clone(),
                reason: join.to_string(),
            },
            Err(_) => DispatchError::Timeout {
                name: spec.name.clone(),
                timeout: self.call_timeout,
            },
        };

        self.metrics.failures.get_or_create(&label).inc();
        error!(
            function_id = spec.id,
            rows = received,
            "Function '{}' failed: {}",
            spec.name,
            outcome
        );
        match self.policy {
            FailurePolicy::Empty => Ok(BundledRows::default()),
            FailurePolicy::Status => Err(outcome.into()),
        }
    }
}
