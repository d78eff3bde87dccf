#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use qsse_core::{ArgRow, DefinitionFile, FunctionError, FunctionHandler, FunctionRegistry, FunctionSpec, Value};
use qsse_proto::{BundledRows, Dual, FunctionType, Row, ScriptRequestHeader};
use qsse_script::{ScriptError, ScriptEvaluator};
use qsse_server::{build_service, FunctionTable, ServerConfig, ServerMetrics, SseServer};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

pub const SUM_DEFS: &str = r#"{"Functions":[
    {"Id":0,"Name":"sum","Type":1,"ReturnType":0,"Params":{"a":0}},
    {"Id":1,"Name":"broken","Type":0,"ReturnType":0,"Params":{"a":0}}
]}"#;

/// `SUM_DEFS` plus a `gate` function that blocks until opened.
pub const GATED_DEFS: &str = r#"{"Functions":[
    {"Id":0,"Name":"sum","Type":1,"ReturnType":0,"Params":{"a":0}},
    {"Id":1,"Name":"broken","Type":0,"ReturnType":0,"Params":{"a":0}},
    {"Id":2,"Name":"gate","Type":1,"ReturnType":0,"Params":{"a":0}}
]}"#;

pub const GATE_ID: i32 = 2;

/// Sums column 0 parsed as numbers.
#[derive(Default)]
pub struct Sum {
    pub calls: AtomicUsize,
}

#[async_trait]
impl FunctionHandler for Sum {
    async fn invoke(&self, _: &FunctionSpec, rows: Vec<ArgRow>) -> Result<Vec<Value>, FunctionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut total = 0.0;
        for row in &rows {
            total += row
                .str_at(0)?
                .parse::<f64>()
                .map_err(|e| FunctionError::InvalidInput(e.to_string()))?;
        }
        Ok(vec![Value::Num(total)])
    }
}

pub struct Broken;

#[async_trait]
impl FunctionHandler for Broken {
    async fn invoke(&self, _: &FunctionSpec, _: Vec<ArgRow>) -> Result<Vec<Value>, FunctionError> {
        Err(FunctionError::Collaborator(anyhow::anyhow!("upstream unavailable")))
    }
}

/// Holds every invocation until `open` is called and records how many ran at once.
pub struct Gate {
    pub entered: AtomicUsize,
    pub peak: AtomicUsize,
    active: AtomicUsize,
    open: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            entered: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            open: Semaphore::new(0),
        }
    }
}

impl Gate {
    pub fn open(&self) {
        self.open.add_permits(1);
    }

    /// Wait until at least `n` invocations have entered.
    pub async fn entered_at_least(&self, n: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while self.entered.load(Ordering::SeqCst) < n {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("invocations never reached the gate");
    }
}

#[async_trait]
impl FunctionHandler for Gate {
    async fn invoke(&self, _: &FunctionSpec, _: Vec<ArgRow>) -> Result<Vec<Value>, FunctionError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        // Each waiter passes its permit on to the next when dropped
        let passed = self.open.acquire().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        passed.map_err(|e| FunctionError::Collaborator(e.into()))?;
        Ok(vec![Value::Str("opened".to_string())])
    }
}

#[derive(Default)]
pub struct CountingEvaluator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ScriptEvaluator for CountingEvaluator {
    async fn evaluate(
        &self,
        _: &ScriptRequestHeader,
        rows: Vec<BundledRows>,
        _: FunctionType,
    ) -> Result<BundledRows, ScriptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let count: usize = rows.iter().map(|b| b.rows.len()).sum();
        Ok(BundledRows {
            rows: vec![Row {
                duals: vec![Dual {
                    num_data: count as f64,
                    str_data: String::new(),
                }],
            }],
        })
    }
}

pub fn str_batch(cells: &[&str]) -> BundledRows {
    BundledRows {
        rows: cells
            .iter()
            .map(|c| Row {
                duals: vec![Dual {
                    num_data: 0.0,
                    str_data: c.to_string(),
                }],
            })
            .collect(),
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub sum: Arc<Sum>,
    pub gate: Arc<Gate>,
    pub evaluator: Arc<CountingEvaluator>,
    stop: Option<oneshot::Sender<()>>,
    serving: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Send the shutdown signal and wait for the serve loop to return.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.serving.take() {
            Some(serving) => serving.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

pub fn local_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..ServerConfig::default()
    }
}

/// Serve the sum/broken registry with `config` on an ephemeral port.
pub async fn start(config: ServerConfig) -> TestServer {
    serve(config, SUM_DEFS).await
}

/// Like `start`, with the `gate` function registered as `GATE_ID`.
pub async fn start_gated(config: ServerConfig) -> TestServer {
    serve(config, GATED_DEFS).await
}

async fn serve(config: ServerConfig, defs: &str) -> TestServer {
    let defs: DefinitionFile = serde_json::from_str(defs).unwrap();
    let registry = Arc::new(FunctionRegistry::from_definitions(&defs).unwrap());
    let sum = Arc::new(Sum::default());
    let gate = Arc::new(Gate::default());
    let evaluator = Arc::new(CountingEvaluator::default());

    let mut builder = FunctionTable::builder()
        .bind(0, sum.clone())
        .bind(1, Arc::new(Broken));
    if registry.resolve(GATE_ID).is_ok() {
        builder = builder.bind(GATE_ID, gate.clone());
    }
    let table = builder.build(&registry).ok().unwrap();

    let service = build_service(&config, registry, table, evaluator.clone(), ServerMetrics::new());
    let server = SseServer::bind(&config, service).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let serving = tokio::spawn(async move {
        server
            .serve_with_shutdown(async {
                let _ = stopped.await;
            })
            .await
    });

    TestServer {
        addr,
        sum,
        gate,
        evaluator,
        stop: Some(stop),
        serving: Some(serving),
    }
}
