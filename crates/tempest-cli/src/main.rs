use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tempest",
    about = "Tempest: provision and grow Storm clusters",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the clusters declared in a configuration file
    Clusters {
        /// Cluster declaration file (TOML)
        #[arg(short, long, default_value = "conf/clusters.toml")]
        config: PathBuf,
    },
    /// Show launch groups, member ids, and boot scripts without launching.
    ///
    /// Hosts that are only known after launch render as `node-<id>`.
    Plan {
        #[arg(short, long, default_value = "conf/clusters.toml")]
        config: PathBuf,
        /// Cluster name as declared in the configuration file
        #[arg(long)]
        cluster: String,
        /// Credentials file; placeholder credentials are used if omitted
        #[arg(long)]
        credentials: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Also print the rendered root, user and start scripts
        #[arg(long)]
        scripts: bool,
    },
    /// Deploy against the in-memory provider and print the reports.
    Simulate {
        #[arg(short, long, default_value = "conf/clusters.toml")]
        config: PathBuf,
        #[arg(long)]
        cluster: String,
        #[arg(long, default_value = "conf/credential.toml")]
        credentials: PathBuf,
        /// Workers to add after the deployment
        #[arg(long, default_value = "0")]
        add_workers: usize,
        /// Instance type of the added workers
        #[arg(long, default_value = "m1.small")]
        instance_type: String,
        /// Write the attachment file into this directory
        #[arg(long)]
        attach_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clusters { config } => commands::plan::clusters(&config),
        Commands::Plan {
            config,
            cluster,
            credentials,
            format,
            scripts,
        } => commands::plan::plan(&config, &cluster, credentials.as_deref(), &format, scripts),
        Commands::Simulate {
            config,
            cluster,
            credentials,
            add_workers,
            instance_type,
            attach_dir,
        } => {
            commands::simulate::simulate(commands::simulate::SimulateArgs {
                config,
                cluster,
                credentials,
                add_workers,
                instance_type,
                attach_dir,
            })
            .await
        }
    }
}
