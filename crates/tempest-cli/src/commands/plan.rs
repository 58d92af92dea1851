use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use tempest_core::{ClusterConfiguration, Credentials, Declarations, KeyMaterial, NodeId, RoleAssignment};
use tempest_script::{BootScriptBuilder, ScriptTopology};

#[derive(Debug, Serialize)]
pub struct PlannedGroup {
    pub key: String,
    pub instance_type: String,
    pub roles: String,
    pub node_ids: Vec<NodeId>,
    /// `(node id, zookeeper id)` for members in this group.
    pub member_ids: Vec<(NodeId, u32)>,
}

#[derive(Debug, Serialize)]
pub struct PlannedScripts {
    pub root: String,
    pub user: String,
    pub start: String,
}

#[derive(Debug, Serialize)]
pub struct Plan {
    pub cluster: String,
    pub groups: Vec<PlannedGroup>,
    pub scripts: Option<PlannedScripts>,
}

pub fn clusters(config: &Path) -> anyhow::Result<()> {
    let declarations = Declarations::from_file(config)?;
    for name in declarations.cluster_names() {
        println!("{name}");
    }
    Ok(())
}

pub fn build_plan(
    config: &Path,
    cluster: &str,
    credentials: Option<&Path>,
    scripts: bool,
) -> anyhow::Result<Plan> {
    let declarations = Declarations::from_file(config)?;
    let config = ClusterConfiguration::parse(&declarations, cluster)?;
    config
        .validate()
        .with_context(|| format!("cluster {cluster} failed validation"))?;

    let assignment = RoleAssignment::new(&config);
    let groups = assignment
        .launch_groups()
        .into_iter()
        .map(|g| PlannedGroup {
            key: g.key(),
            instance_type: g.instance_type.clone(),
            roles: g.roles.to_tag(),
            member_ids: g
                .node_ids
                .iter()
                .filter_map(|&id| assignment.coordination_member_id(id).map(|m| (id, m)))
                .collect(),
            node_ids: g.node_ids,
        })
        .collect();

    let scripts = if scripts {
        let credentials = match credentials {
            Some(path) => Credentials::from_file(path)?,
            None => Credentials::default(),
        };
        let keys = KeyMaterial::default();
        let topology = ScriptTopology::from_assignment(&assignment)?;
        let builder = BootScriptBuilder::new(&config, &credentials, &keys, &topology)?;
        Some(PlannedScripts {
            root: builder.root_phase().render(),
            user: builder.user_phase().render(),
            start: builder.start_sequence().render(),
        })
    } else {
        None
    };

    Ok(Plan {
        cluster: cluster.to_string(),
        groups,
        scripts,
    })
}

fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cluster {}", plan.cluster);
    for group in &plan.groups {
        let _ = writeln!(
            out,
            "  {} x{} {} nodes {:?}",
            group.instance_type,
            group.node_ids.len(),
            group.roles,
            group.node_ids
        );
        for (node, member) in &group.member_ids {
            let _ = writeln!(out, "    node {node} -> zookeeper id {member}");
        }
    }
    if let Some(scripts) = &plan.scripts {
        for script in [&scripts.root, &scripts.user, &scripts.start] {
            out.push('\n');
            out.push_str(script);
        }
    }
    out
}

pub fn plan(
    config: &Path,
    cluster: &str,
    credentials: Option<&Path>,
    format: &str,
    scripts: bool,
) -> anyhow::Result<()> {
    let plan = build_plan(config, cluster, credentials, scripts)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        _ => print!("{}", format_plan(&plan)),
    }
    Ok(())
}
