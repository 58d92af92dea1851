//! Ganglia monitoring.
//!
//! Every node runs gmond and sends its metrics to the ui node over UDP;
//! only the ui node listens (`deaf = no`), runs gmetad against the
//! cluster, and serves the web frontend.

use tempest_core::{PackageManager, Role};

use crate::command::Command;
use crate::topology::HostRef;

/// gmond metrics port.
pub const GMOND_PORT: u16 = 8649;

fn on_ui(line: impl Into<String>) -> Command {
    Command::on_role(Role::Ui, Command::exec(line))
}

fn gmond_service(pm: PackageManager) -> &'static str {
    match pm {
        PackageManager::Apt => "/etc/init.d/ganglia-monitor",
        PackageManager::Yum => "/etc/init.d/gmond",
    }
}

pub fn install(pm: PackageManager) -> Vec<Command> {
    let mut cmds = match pm {
        PackageManager::Apt => vec![
            Command::exec("apt-get install -q -y ganglia-monitor gmetad rrdtool librrds-perl librrd-dev"),
            on_ui("apt-get install -q -y ganglia-webfrontend"),
        ],
        PackageManager::Yum => vec![
            Command::exec("yum -y install ganglia ganglia-gmond ganglia-gmetad"),
            on_ui("yum -y install ganglia-web"),
        ],
    };
    // Packages start their daemons on install; they are restarted once configured.
    cmds.push(Command::exec(format!("{} stop || true", gmond_service(pm))));
    cmds.push(Command::exec("/etc/init.d/gmetad stop || true"));
    cmds
}

pub fn configure(cluster: &str, ui: &HostRef, pm: PackageManager) -> Vec<Command> {
    let mut cmds = vec![
        // Keep the distribution's module section, replace the header.
        Command::exec(
            "sed '1,/Each metrics module that is referenced/d' /etc/ganglia/gmond.conf > /etc/ganglia/stripped_gmond.conf",
        ),
        Command::write_file("/etc/ganglia/gmond.conf", gmond_header(cluster, ui)),
        Command::exec("cat /etc/ganglia/stripped_gmond.conf >> /etc/ganglia/gmond.conf"),
        on_ui("sed 's/deaf = yes/deaf = no/' -i /etc/ganglia/gmond.conf"),
        on_ui(format!(
            "echo 'data_source \"{cluster}\" localhost' >> /etc/ganglia/gmetad.conf"
        )),
    ];

    match pm {
        PackageManager::Apt => {
            cmds.push(on_ui("cp /etc/ganglia-webfrontend/apache.conf /etc/apache2/sites-enabled/ganglia.conf"));
            // Lets external tools post events to the frontend.
            cmds.push(on_ui(
                "sed \"s/\\$conf\\['auth_system'\\] = 'readonly'/\\$conf\\['auth_system'\\] = 'disabled'/\" -i /usr/share/ganglia-webfrontend/conf_default.php",
            ));
            cmds.push(on_ui("chmod 777 /var/lib/ganglia-web/conf/events.json"));
        }
        PackageManager::Yum => {
            cmds.push(Command::on_role(
                Role::Ui,
                Command::write_file(
                    "/etc/httpd/conf.d/ganglia.conf",
                    "Alias /ganglia /usr/share/ganglia\n<Location /ganglia>\nRequire all granted\n</Location>\n",
                ),
            ));
        }
    }
    cmds
}

pub fn start(pm: PackageManager) -> Vec<Command> {
    let mut cmds = match pm {
        PackageManager::Apt => vec![
            on_ui("a2enmod rewrite"),
            on_ui("/etc/init.d/apache2 restart"),
        ],
        PackageManager::Yum => vec![on_ui("/etc/init.d/httpd restart")],
    };
    cmds.push(Command::exec(format!("{} restart", gmond_service(pm))));
    cmds.push(Command::exec("/etc/init.d/gmetad restart"));
    cmds
}

fn gmond_header(cluster: &str, ui: &HostRef) -> String {
    format!(
        r#"globals {{
  daemonize = yes
  setuid = yes
  user = ganglia
  debug_level = 0
  max_udp_msg_len = 1472
  mute = no
  deaf = yes
  allow_extra_data = yes
  host_dmax = 86400
  cleanup_threshold = 300
  gexec = no
  send_metadata_interval = 30
}}

cluster {{
  name = "{cluster}"
  owner = "unspecified"
  latlong = "unspecified"
  url = "unspecified"
}}

host {{
  location = "unspecified"
}}

udp_send_channel {{
  host = {ui}
  port = {GMOND_PORT}
  ttl = 1
}}

udp_recv_channel {{
  port = {GMOND_PORT}
}}

tcp_accept_channel {{
  port = {GMOND_PORT}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_frontend_is_ui_only() {
        for pm in [PackageManager::Apt, PackageManager::Yum] {
            let cmds = install(pm);
            let web: Vec<_> = cmds
                .iter()
                .filter(|c| format!("{c:?}").contains("web"))
                .collect();
            assert_eq!(web.len(), 1);
            assert!(matches!(web[0], Command::OnRole { role: Role::Ui, .. }));
        }
    }

    #[test]
    fn gmond_sends_to_ui_host() {
        let header = gmond_header("prod", &HostRef::Address("10.0.0.7".into()));
        assert!(header.contains("name = \"prod\""));
        assert!(header.contains("host = 10.0.0.7\n  port = 8649"));
    }

    #[test]
    fn service_paths_follow_package_manager() {
        let apt = format!("{:?}", start(PackageManager::Apt));
        let yum = format!("{:?}", start(PackageManager::Yum));
        assert!(apt.contains("/etc/init.d/ganglia-monitor restart"));
        assert!(yum.contains("/etc/init.d/gmond restart"));
        assert!(yum.contains("httpd"));
        assert!(!yum.contains("apache2"));
    }
}
