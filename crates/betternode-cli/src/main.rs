//! kube-better-node: evict pods that sit on a node some other node beats.
//!
//! One evaluation pass per invocation. For every running pod with preferred
//! node affinity, the current node's preference score is compared with every
//! schedulable node the pod could also run on. When another node scores
//! higher by more than the tolerance, the pod is deleted so the cluster
//! scheduler places it again.
//!
//! # Usage
//!
//! ```text
//! kube-better-node --dry-run --tolerance 10
//! kube-better-node --config better-node.toml --dry-run=false
//! kube-better-node --kubeconfig ~/.kube/config --context prod --on-error skip-workload
//! kube-better-node --snapshot cluster.json --output json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use betternode_cluster::{ClusterClient, ConnectionOptions, KubeApiClient, StaticCluster};
use betternode_evictor::{ErrorPolicy, Evictor};
use betternode_placement::SelectionPolicy;

mod config;
mod report;

use config::{ConnectionSection, LogFormat, RunConfig};

#[derive(Parser)]
#[command(
    name = "kube-better-node",
    about = "Evict pods whose node no longer best matches their preferred node affinity",
    version
)]
struct Cli {
    /// Report what would be evicted without deleting anything.
    /// `--dry-run=false` overrides a config file that enables it.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    dry_run: Option<bool>,

    /// Score margin a candidate node must clear over the current node.
    #[arg(long)]
    tolerance: Option<i64>,

    /// What to do with a pod whose affinity terms are invalid.
    #[arg(long, value_enum)]
    on_error: Option<OnError>,

    /// Which qualifying node to report.
    #[arg(long, value_enum)]
    selection: Option<Selection>,

    /// TOML run configuration. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read nodes and pods from a snapshot file instead of an API server.
    #[arg(long, conflicts_with_all = ["server", "kubeconfig", "context"])]
    snapshot: Option<PathBuf>,

    /// API server URL. Skips kubeconfig and in-cluster discovery.
    #[arg(long)]
    server: Option<String>,

    /// Bearer token file for --server.
    #[arg(long, requires = "server")]
    token_file: Option<PathBuf>,

    #[arg(long)]
    insecure_skip_tls_verify: bool,

    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context (default: current context).
    #[arg(long)]
    context: Option<String>,

    /// API request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Output format: text or json
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnError {
    FailFast,
    SkipWorkload,
}

impl From<OnError> for ErrorPolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::FailFast => ErrorPolicy::FailFast,
            OnError::SkipWorkload => ErrorPolicy::SkipWorkload,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Selection {
    FirstFit,
    BestFit,
}

impl From<Selection> for SelectionPolicy {
    fn from(value: Selection) -> Self {
        match value {
            Selection::FirstFit => SelectionPolicy::FirstFit,
            Selection::BestFit => SelectionPolicy::BestFit,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Layer the flags given on the command line over `config`.
    fn apply(self, mut config: RunConfig) -> RunConfig {
        let eviction = &mut config.eviction;
        if let Some(dry_run) = self.dry_run {
            eviction.dry_run = dry_run;
        }
        if let Some(tolerance) = self.tolerance {
            eviction.tolerance = tolerance;
        }
        if let Some(on_error) = self.on_error {
            eviction.on_error = on_error.into();
        }
        if let Some(selection) = self.selection {
            eviction.selection = selection.into();
        }

        let connection = &mut config.connection;
        if self.snapshot.is_some() {
            connection.snapshot = self.snapshot;
        }
        if self.server.is_some() {
            connection.server = self.server;
        }
        if self.token_file.is_some() {
            connection.token_file = self.token_file;
        }
        if self.insecure_skip_tls_verify {
            connection.insecure_skip_tls_verify = Some(true);
        }
        if self.kubeconfig.is_some() {
            connection.kubeconfig = self.kubeconfig;
        }
        if self.context.is_some() {
            connection.context = self.context;
        }
        if self.timeout.is_some() {
            connection.timeout_secs = self.timeout;
        }

        if let Some(format) = self.log_format {
            config.log.format = format;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    let output = cli.output;
    let config = cli.apply(file_config);
    config.validate()?;

    init_tracing(config.log.format);

    let client = connect(&config.connection).await?;
    let report = Evictor::new(client.as_ref(), config.eviction.clone())
        .run()
        .await
        .context("evaluation pass failed")?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", report::format_report(&report, config.eviction.dry_run)),
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn connect(section: &ConnectionSection) -> anyhow::Result<Box<dyn ClusterClient>> {
    if let Some(path) = &section.snapshot {
        let cluster = StaticCluster::from_file(path)
            .with_context(|| format!("failed to load snapshot {}", path.display()))?;
        info!(path = %path.display(), "using cluster snapshot");
        return Ok(Box::new(cluster));
    }

    let config = connection_options(section)
        .resolve()
        .await
        .context("failed to resolve cluster connection")?;
    info!(server = %config.cluster_url, "connecting to API server");
    let client = KubeApiClient::new(config).context("failed to build API client")?;
    Ok(Box::new(client))
}

fn connection_options(section: &ConnectionSection) -> ConnectionOptions {
    ConnectionOptions {
        server: section.server.clone(),
        token_file: section.token_file.clone(),
        insecure_skip_tls_verify: section.insecure_skip_tls_verify.unwrap_or(false),
        kubeconfig: section.kubeconfig.clone(),
        context: section.context.clone(),
        timeout: section.timeout_secs.map(Duration::from_secs),
    }
}
