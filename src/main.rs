//! Volume Provisioner
//!
//! Serves the provisioning REST API over a configured orchestrator and
//! exposes Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  REST API (:5656)              Metrics (:9500/metrics)           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                         Provisioner                              │
//! │   resolve ─▶ allocate ─▶ build topology ─▶ submit / reconcile    │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                    Orchestrator Registry                         │
//! │   ┌──────────────────────┐        ┌──────────────────────────┐   │
//! │   │  memory (simulated)  │        │  nomad (HTTP job API)    │   │
//! │   └──────────────────────┘        └──────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_topology_provisioner::{
    AddressAllocator, ApiServer, ApiServerConfig, BackendConfig, BackendFactory,
    DatacenterDefaults, InMemoryConfig, NomadConfig, OrchestratorRegistry, PropertyResolver,
    ProvisionMetrics, Provisioner, ProvisionerConfig, TopologyBuilder,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Provisioner - replicated block volumes as orchestrator jobs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:5656")]
    api_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9500")]
    metrics_addr: String,

    /// Datacenter configuration file (YAML)
    #[arg(long, env = "PROVISIONER_CONFIG")]
    config: Option<String>,

    /// Orchestrator to provision on (memory, nomad)
    #[arg(long, env = "ORCHESTRATOR", default_value = "memory")]
    orchestrator: String,

    /// Nomad API address; overrides the configured datacenter address
    #[arg(long, env = "NOMAD_ADDR")]
    nomad_addr: Option<String>,

    /// Nomad region; overrides the configured region
    #[arg(long, env = "NOMAD_REGION")]
    nomad_region: Option<String>,

    /// Hosts in the simulated cluster of the memory orchestrator
    #[arg(long, env = "MEMORY_HOSTS", default_value = "3")]
    memory_hosts: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Volume Provisioner");
    info!("  Version: {}", volume_topology_provisioner::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Orchestrator: {}", args.orchestrator);

    // Load datacenter configuration
    let mut config = match &args.config {
        Some(path) => ProvisionerConfig::load(path)
            .with_context(|| format!("loading provisioner config from {}", path))?,
        None => ProvisionerConfig::default(),
    };
    if let Some(region) = &args.nomad_region {
        config.region = region.clone();
    }

    let nomad_address = args
        .nomad_addr
        .clone()
        .or_else(|| {
            config
                .address(&config.default_datacenter)
                .map(str::to_string)
        })
        .unwrap_or_else(|| NomadConfig::default().address);

    let backend_config = BackendConfig {
        memory: InMemoryConfig {
            hosts: args.memory_hosts,
            ..Default::default()
        },
        nomad: NomadConfig {
            address: nomad_address,
            region: Some(config.region.clone()),
            ..Default::default()
        },
    };

    // Build the orchestrator registry
    let backend = BackendFactory::create(&args.orchestrator, backend_config)
        .context("creating orchestrator backend")?;
    let orchestrator = backend.name().to_string();
    let registry = OrchestratorRegistry::new()
        .with_backend(backend)
        .with_property_source(
            orchestrator.clone(),
            Arc::new(DatacenterDefaults::new("datacenter-config", config)),
        );

    let backend = registry
        .backend(&orchestrator)
        .with_context(|| format!("orchestrator {} cannot run jobs", orchestrator))?;
    let defaults = registry
        .property_source(&orchestrator)
        .with_context(|| format!("orchestrator {} has no property defaults", orchestrator))?;

    if !backend.health_check().await.unwrap_or(false) {
        error!("Orchestrator {} is not reachable yet", orchestrator);
    }

    // Create provisioner
    let metrics = Arc::new(ProvisionMetrics::new()?);
    let provisioner = Provisioner::new(
        PropertyResolver::new(defaults),
        AddressAllocator::new(),
        TopologyBuilder::default(),
        backend,
        metrics.clone(),
    );

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args
            .api_addr
            .parse()
            .with_context(|| format!("invalid REST API address {}", args.api_addr))?,
    };
    let api_server = ApiServer::new(api_config, provisioner);

    tokio::select! {
        result = api_server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
            api_server.shutdown();
        }
    }

    info!("Provisioner shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,tower=warn,tower_http=info,axum=info,reqwest=info",
            level
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Arc<ProvisionMetrics>) -> anyhow::Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let mut response = Response::new(Body::empty());
                    match (req.uri().path(), metrics.encode()) {
                        ("/metrics", Ok((content_type, buffer))) => {
                            if let Ok(value) = HeaderValue::from_str(&content_type) {
                                response.headers_mut().insert(CONTENT_TYPE, value);
                            }
                            *response.body_mut() = Body::from(buffer);
                        }
                        ("/metrics", Err(e)) => {
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            *response.body_mut() = Body::from(e.to_string());
                        }
                        _ => {
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            *response.body_mut() = Body::from("not found");
                        }
                    }
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics server address {}", addr))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr).serve(make_svc).await?;

    Ok(())
}
