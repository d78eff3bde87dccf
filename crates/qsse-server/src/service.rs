//! The `qlik.sse.Connector` gRPC service.

use std::sync::Arc;

use async_trait::async_trait;
use prometheus_client::metrics::gauge::Gauge;
use qsse_proto::connector_server::Connector;
use qsse_proto::{
    parse_bin_header, BundledRows, Capabilities, CommonRequestHeader, Empty,
    COMMON_REQUEST_HEADER_KEY,
};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info};

use crate::dispatcher::{FunctionDispatcher, ResultStream};
use crate::metrics::ServerMetrics;
use crate::script::ScriptRouter;

/// An execution permit plus its slot in the in-flight gauge.
pub struct CallGuard {
    _permit: OwnedSemaphorePermit,
    in_flight: Gauge,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.in_flight.dec();
    }
}

/// Ends every call still running on a service with UNAVAILABLE.
#[derive(Clone)]
pub struct AbandonHandle(Arc<watch::Sender<bool>>);

impl AbandonHandle {
    pub fn abandon(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone)]
pub struct SseService {
    capabilities: Arc<Capabilities>,
    dispatcher: FunctionDispatcher,
    scripts: ScriptRouter,
    permits: Arc<Semaphore>,
    metrics: ServerMetrics,
    abandon: AbandonHandle,
}

impl SseService {
    pub fn new(
        capabilities: Capabilities,
        dispatcher: FunctionDispatcher,
        scripts: ScriptRouter,
        max_concurrent_calls: usize,
        metrics: ServerMetrics,
    ) -> Self {
        let (abandon, signal) = watch::channel(false);
        Self {
            capabilities: Arc::new(capabilities),
            dispatcher: dispatcher.abandon_on(signal.clone()),
            scripts: scripts.abandon_on(signal),
            permits: Arc::new(Semaphore::new(max_concurrent_calls)),
            metrics,
            abandon: AbandonHandle(Arc::new(abandon)),
        }
    }

    pub fn abandon_handle(&self) -> AbandonHandle {
        self.abandon.clone()
    }

    /// Wait for a free execution slot.
    async fn acquire(&self) -> Result<CallGuard, Status> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Status::unavailable("server is shutting down"))?;
        self.metrics.in_flight.inc();
        Ok(CallGuard {
            _permit: permit,
            in_flight: self.metrics.in_flight.clone(),
        })
    }
}

fn log_common_header(metadata: &MetadataMap) {
    if let Ok(common) = parse_bin_header::<CommonRequestHeader>(metadata, COMMON_REQUEST_HEADER_KEY) {
        debug!(
            app_id = %common.app_id,
            user_id = %common.user_id,
            cardinality = %common.cardinality,
            "Request context"
        );
    }
}

#[async_trait]
impl Connector for SseService {
    async fn get_capabilities(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Capabilities>, Status> {
        self.metrics.call("GetCapabilities");
        let _guard = self.acquire().await?;
        info!("GetCapabilities");
        Ok(Response::new(self.capabilities.as_ref().clone()))
    }

    type ExecuteFunctionStream = ResultStream;

    async fn execute_function(
        &self,
        request: Request<Streaming<BundledRows>>,
    ) -> Result<Response<Self::ExecuteFunctionStream>, Status> {
        self.metrics.call("ExecuteFunction");
        let guard = self.acquire().await?;
        log_common_header(request.metadata());

        let metadata = request.metadata().clone();
        let stream = self
            .dispatcher
            .handle(&metadata, request.into_inner(), guard)?;
        Ok(Response::new(stream))
    }

    type EvaluateScriptStream = ResultStream;

    async fn evaluate_script(
        &self,
        request: Request<Streaming<BundledRows>>,
    ) -> Result<Response<Self::EvaluateScriptStream>, Status> {
        self.metrics.call("EvaluateScript");
        let guard = self.acquire().await?;
        log_common_header(request.metadata());

        let metadata = request.metadata().clone();
        let stream = self.scripts.route(&metadata, request.into_inner(), guard)?;
        Ok(Response::new(stream))
    }
}
