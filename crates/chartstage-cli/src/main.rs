//! chartstage CLI - resumable, poll-driven Helm release provisioning

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;

use error::CliError;

#[derive(Parser)]
#[command(name = "chartstage")]
#[command(author = "chartstage Contributors")]
#[command(version)]
#[command(about = "Resumable, poll-driven Helm release provisioning", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Provider settings file (default: <config dir>/chartstage/settings.yaml)
    #[arg(long, global = true, env = "CHARTSTAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one lifecycle poll: request JSON in, progress event JSON out
    Handle {
        /// Request file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        request: String,

        /// Kubeconfig searched for ClusterID contexts (default: KUBECONFIG or ~/.kube/config)
        #[arg(long, env = "CHARTSTAGE_CLUSTER_KUBECONFIG")]
        cluster_kubeconfig: Option<PathBuf>,

        /// Pretty-print the progress event
        #[arg(long)]
        pretty: bool,
    },

    /// Encode or decode physical identifiers
    Id {
        #[command(subcommand)]
        command: IdCommands,
    },

    /// Show how a chart reference resolves
    #[command(disable_version_flag = true)]
    Resolve {
        /// Chart reference: `repo/chart`, `chart`, or an archive URL
        chart: String,

        /// Chart version
        #[arg(long)]
        version: Option<String>,

        /// Repository URL
        #[arg(long)]
        repository: Option<String>,
    },

    /// Build override values from assignments and an optional document
    Values {
        /// Set values on command line (key=value[,key=value])
        #[arg(long = "set")]
        set: Vec<String>,

        /// Values document to merge on top (http(s):// or s3://)
        #[arg(long)]
        url: Option<String>,

        /// Print YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },
}

#[derive(Subcommand)]
enum IdCommands {
    /// Print the opaque identifier for a release
    Encode {
        #[arg(long)]
        cluster_id: Option<String>,

        #[arg(long)]
        kube_config: Option<String>,

        /// Release name
        #[arg(long)]
        name: String,

        #[arg(short, long, default_value = chartstage_core::DEFAULT_NAMESPACE)]
        namespace: String,

        #[arg(long)]
        region: String,
    },

    /// Print the fields of an opaque identifier
    Decode {
        id: String,
    },
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Handle {
            request,
            cluster_kubeconfig,
            pretty,
        } => commands::handle::run(config, &request, cluster_kubeconfig.as_deref(), pretty).await,

        Commands::Id { command } => match command {
            IdCommands::Encode {
                cluster_id,
                kube_config,
                name,
                namespace,
                region,
            } => commands::id::encode(
                cluster_id.as_deref(),
                kube_config.as_deref(),
                &name,
                &namespace,
                &region,
            ),
            IdCommands::Decode { id } => commands::id::decode(&id),
        },

        Commands::Resolve {
            chart,
            version,
            repository,
        } => commands::resolve::run(config, &chart, version.as_deref(), repository.as_deref()),

        Commands::Values { set, url, yaml } => {
            commands::values::run(config, &set, url.as_deref(), yaml).await
        }
    }
}
