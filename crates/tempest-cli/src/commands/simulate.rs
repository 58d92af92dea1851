use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use tempest_core::{ClusterConfiguration, Credentials, Declarations, KeyMaterial};
use tempest_orchestrator::{
    Deployer, DeploymentReport, OrchestratorError, ScaleOutReport, TopologyReconciler,
};
use tempest_provision::{MemoryProvider, NodeLauncher};

pub struct SimulateArgs {
    pub config: PathBuf,
    pub cluster: String,
    pub credentials: PathBuf,
    pub add_workers: usize,
    pub instance_type: String,
    pub attach_dir: Option<PathBuf>,
}

pub async fn simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let declarations = Declarations::from_file(&args.config)?;
    declarations.sanity_check(&args.cluster)?;
    let config = ClusterConfiguration::parse(&declarations, &args.cluster)?;
    let credentials = Credentials::from_file(&args.credentials)?;
    let keys = KeyMaterial::load(config.settings(), &credentials)?;

    let provider = Arc::new(MemoryProvider::new());
    let launcher = NodeLauncher::new(provider.clone());

    let mut deployer = Deployer::new(launcher.clone(), credentials.clone(), keys.clone());
    if let Some(dir) = &args.attach_dir {
        deployer = deployer.with_attachment_dir(dir);
    }
    let report = deployer.deploy(&config).await?;
    print_deployment(&report);

    if args.add_workers > 0 {
        let mut reconciler = TopologyReconciler::new(launcher, config, credentials, keys);
        if let Some(dir) = &args.attach_dir {
            reconciler = reconciler.with_attachment_dir(dir);
        }
        let report = reconciler
            .add_workers(args.add_workers, &args.instance_type)
            .await?;
        print_scale_out(&report);
    }

    info!(tasks = provider.tasks().await.len(), "simulation finished");
    Ok(())
}

fn print_deployment(report: &DeploymentReport) {
    println!("deployment of {}", report.cluster);
    for group in &report.groups {
        match &group.result {
            Ok(machines) => {
                for m in machines {
                    println!(
                        "  node {:>3}  {}  {}  {}",
                        m.node_id,
                        m.machine.id,
                        m.machine.private_address.as_deref().unwrap_or("-"),
                        group.roles
                    );
                }
            }
            Err(e) => println!("  {}  FAILED: {e}", group.key),
        }
    }
    for node in &report.unfilled {
        println!("  node {:>3}  NOT LAUNCHED ({}): {}", node.node_id, node.group, node.error);
    }
    for failure in &report.machine_failures {
        println!("  {}  {}", failure.machine_id, failure.error);
    }
    if let Some(e) = &report.setup_error {
        println!("  setup skipped: {e}");
    }
    print_attachment(report.attachment.as_deref(), report.attachment_error.as_ref());
}

fn print_scale_out(report: &ScaleOutReport) {
    println!("scale-out of {}", report.topology.cluster);
    for machine in &report.added {
        println!(
            "  {}  {}  [worker]",
            machine.id,
            machine.private_address.as_deref().unwrap_or("-")
        );
    }
    for failure in &report.failures {
        println!("  {}  {}", failure.machine_id, failure.error);
    }
    println!("  workers now: {}", report.topology.workers.len());
    print_attachment(report.attachment.as_deref(), report.attachment_error.as_ref());
}

fn print_attachment(path: Option<&Path>, error: Option<&OrchestratorError>) {
    if let Some(path) = path {
        println!("  attached: {}", path.display());
    }
    if let Some(e) = error {
        println!("  attachment not refreshed: {e}");
    }
}
