use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{ArgAction, Parser};
use kubewatch_core::{ConfigurationError, DEFAULT_ROOT};
use kubewatch_kubehub::{KubeSource, ResourceRegistry, WatchSupervisor};
use kubewatch_sink::{CollectorSettings, ConsoleSink, FailurePolicy, Fanout, HecSink, OutputMode, Pipeline};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing::{error, info, warn};

/// Tracing filter directives, e.g. `kubewatch_kubehub=debug,info`.
const LOG_ENV: &str = "KUBEWATCH_LOG";
/// `host:port` for the Prometheus scrape endpoint; unset disables it.
const METRICS_ADDR_ENV: &str = "KUBEWATCH_METRICS_ADDR";

/// Exit status for configuration problems detected before or while connecting.
const EXIT_CONFIG: u8 = 2;
/// Exit status for failures after watching started.
const EXIT_RUNTIME: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "kubewatch", version, about = "Watch Kubernetes resources and forward add/delete events")]
struct Cli {
    /// Path to a kubeconfig file (default: $HOME/.kube/config if present, else in-cluster)
    #[arg(long = "kubeconfig")]
    kubeconfig: Option<PathBuf>,

    /// Only watch this namespace (default: all namespaces)
    #[arg(short = 'n', long = "namespace")]
    namespace: Option<String>,

    /// Print flattened key/value records instead of nested documents
    #[arg(long = "flatten", action = ArgAction::SetTrue)]
    flatten: bool,

    /// Require the HTTP event collector (fails if SPLUNK_HEC_* is incomplete)
    #[arg(long = "collector", action = ArgAction::SetTrue, conflicts_with = "no_collector")]
    collector: bool,

    /// Console output only, even when SPLUNK_HEC_HOST is set
    #[arg(long = "no-collector", action = ArgAction::SetTrue)]
    no_collector: bool,

    /// Resources to watch, e.g. pods services deployments
    #[arg(required = true, value_parser = resource_names())]
    resources: Vec<String>,
}

fn resource_names() -> PossibleValuesParser {
    PossibleValuesParser::new(ResourceRegistry::builtin().names())
}

/// Everything `run` needs, resolved once from arguments and environment.
#[derive(Debug)]
struct Settings {
    kubeconfig: Option<PathBuf>,
    namespace: Option<String>,
    resources: Vec<String>,
    output: OutputMode,
    collector: Option<CollectorSettings>,
}

impl Settings {
    fn resolve(cli: Cli) -> Result<Self, ConfigurationError> {
        Self::resolve_with(cli, |key| std::env::var(key).ok())
    }

    fn resolve_with(cli: Cli, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let collector = if cli.no_collector {
            None
        } else {
            match CollectorSettings::from_lookup(lookup)? {
                Some(s) => Some(s),
                None if cli.collector => return Err(ConfigurationError::MissingEnv("SPLUNK_HEC_HOST")),
                None => None,
            }
        };
        let output = if cli.flatten { OutputMode::Flat { root: DEFAULT_ROOT.to_string() } } else { OutputMode::Nested };
        Ok(Self {
            kubeconfig: cli.kubeconfig.or_else(default_kubeconfig),
            namespace: cli.namespace,
            resources: cli.resources,
            output,
            collector,
        })
    }
}

fn default_kubeconfig() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    let path = PathBuf::from(home).join(".kube").join("config");
    path.is_file().then_some(path)
}

/// Logs go to stderr; stdout carries only records.
fn init_tracing() {
    let directives = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::from_str(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    let Ok(addr) = std::env::var(METRICS_ADDR_ENV) else {
        return;
    };
    match addr.parse::<SocketAddr>() {
        Ok(sock) => match PrometheusBuilder::new().with_http_listener(sock).install() {
            Ok(()) => info!(%sock, "Prometheus metrics exporter listening"),
            Err(e) => warn!(error = %e, "failed to install metrics exporter"),
        },
        Err(_) => warn!(addr = %addr, env = METRICS_ADDR_ENV, "invalid metrics address; expected host:port"),
    }
}

fn build_fanout(collector: Option<CollectorSettings>) -> Result<Fanout, ConfigurationError> {
    let mut fanout = Fanout::new().with(Arc::new(ConsoleSink::stdout()), FailurePolicy::BestEffort);
    if let Some(settings) = collector {
        let hec = HecSink::new(settings)?;
        info!(url = hec.url(), "forwarding events to collector");
        fanout = fanout.with(Arc::new(hec), FailurePolicy::Fatal);
    }
    Ok(fanout)
}

/// Cancel `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut s) => {
                    s.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received; shutting down"),
            _ = terminate => info!("terminate received; shutting down"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
}

async fn run(settings: Settings) -> Result<()> {
    let registry = ResourceRegistry::builtin();
    // resolve names before touching the cluster
    for name in &settings.resources {
        registry.lookup(name).map_err(ConfigurationError::from)?;
    }

    let fanout = build_fanout(settings.collector)?;
    let pipeline = Arc::new(Pipeline::new(settings.output, fanout));

    let client = kubewatch_kubehub::connect(settings.kubeconfig.as_deref()).await?;
    let source = Arc::new(KubeSource::new(client));
    let supervisor = WatchSupervisor::new(&registry, &settings.resources, settings.namespace, source, pipeline)?;

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());
    supervisor.run(token).await.context("watching stopped")
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let result = match Settings::resolve(cli) {
        Ok(settings) => run(settings).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let status = exit_status(&e);
            if status == EXIT_CONFIG {
                error!(error = %e, "invalid configuration");
            } else {
                error!(error = %format!("{e:#}"), "kubewatch failed");
            }
            ExitCode::from(status)
        }
    }
}

/// Map a failure to the process exit status.
fn exit_status(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigurationError>().is_some() {
        EXIT_CONFIG
    } else {
        EXIT_RUNTIME
    }
}
