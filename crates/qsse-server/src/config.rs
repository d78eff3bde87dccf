//! Server configuration: command line with environment fallbacks.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

/// What a data call answers when its function fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// One empty result batch; the host sees no error.
    #[default]
    Empty,
    /// A gRPC error status.
    Status,
}

#[derive(Parser, Debug)]
#[command(name = "qssed", about = "Qlik Server-Side Extension plugin server")]
pub struct Cli {
    /// gRPC port to listen on
    #[arg(long, default_value = "50056", env = "SSE_PORT")]
    pub port: u16,

    /// Host address to bind to; IPv6 hosts may be bracketed (`[::]`)
    #[arg(long, default_value = "0.0.0.0", env = "SSE_BIND_HOST")]
    pub bind_host: String,

    /// Directory holding sse_server_key.pem, sse_server_cert.pem and root_cert.pem.
    /// Without it the server runs insecurely.
    #[arg(long, env = "SSE_PEM_DIR")]
    pub pem_dir: Option<PathBuf>,

    /// Function definition file; relative paths resolve against the executable's directory
    #[arg(long, default_value = "FuncDefs_directions.json", env = "SSE_DEFINITION_FILE")]
    pub definition_file: PathBuf,

    /// Calls executing at once; further calls wait
    #[arg(long, default_value = "10", env = "SSE_MAX_CONCURRENT_CALLS")]
    pub max_concurrent_calls: usize,

    /// Deadline for one function or script evaluation
    #[arg(long, default_value = "30", env = "SSE_CALL_TIMEOUT_SECS")]
    pub call_timeout_secs: u64,

    /// How long in-flight calls may run after a shutdown signal
    #[arg(long, default_value = "0", env = "SSE_SHUTDOWN_GRACE_SECS")]
    pub shutdown_grace_secs: u64,

    #[arg(long, value_enum, default_value = "empty", env = "SSE_FAILURE_POLICY")]
    pub failure_policy: FailurePolicy,

    /// Serve /health, /ready and /metrics on this port
    #[arg(long, env = "SSE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    pub maps_api_key: Option<String>,

    #[arg(long, default_value = qsse_maps::google::DEFAULT_BASE_URL, env = "GOOGLE_MAPS_BASE_URL")]
    pub maps_base_url: String,
}

/// Resolved configuration the library runs from.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub pem_dir: Option<PathBuf>,
    pub definition_file: PathBuf,
    pub max_concurrent_calls: usize,
    pub call_timeout: Duration,
    pub shutdown_grace: Duration,
    pub failure_policy: FailurePolicy,
    pub metrics_port: Option<u16>,
    pub maps_api_key: Option<String>,
    pub maps_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 50056)),
            pem_dir: None,
            definition_file: PathBuf::from("FuncDefs_directions.json"),
            max_concurrent_calls: 10,
            call_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::ZERO,
            failure_policy: FailurePolicy::Empty,
            metrics_port: None,
            maps_api_key: None,
            maps_base_url: qsse_maps::google::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Cli {
    pub fn into_config(self) -> Result<ServerConfig> {
        let host = self.bind_host.trim_start_matches('[').trim_end_matches(']');
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("Invalid bind host {}", self.bind_host))?;
        let bind_addr = SocketAddr::new(ip, self.port);
        if self.max_concurrent_calls == 0 {
            anyhow::bail!("--max-concurrent-calls must be at least 1");
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        Ok(ServerConfig {
            bind_addr,
            pem_dir: self.pem_dir,
            definition_file: resolve_definition_path(&self.definition_file, exe_dir.as_deref()),
            max_concurrent_calls: self.max_concurrent_calls,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            failure_policy: self.failure_policy,
            metrics_port: self.metrics_port,
            maps_api_key: self.maps_api_key.filter(|k| !k.is_empty()),
            maps_base_url: self.maps_base_url,
        })
    }
}

/// Relative definition paths are looked up next to the executable.
pub fn resolve_definition_path(path: &Path, exe_dir: Option<&Path>) -> PathBuf {
    match exe_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
