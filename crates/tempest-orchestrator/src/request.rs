//! Launch requests derived from a cluster's settings.

use tempest_core::{ClusterConfiguration, KeyMaterial, RoleSet};
use tempest_provision::{LaunchRequest, StorageSpec};

/// A request for `count` machines of one instance type and role set.
///
/// Image and region come from the declaration; scale-out overrides them
/// with what discovery found on the running cluster.
pub fn launch_request(
    config: &ClusterConfiguration,
    keys: &KeyMaterial,
    instance_type: &str,
    roles: RoleSet,
    count: usize,
    init_script: String,
) -> LaunchRequest {
    let settings = config.settings();
    let storage = match settings.volume_size_gib() {
        0 => None,
        size_gib => Some(StorageSpec {
            size_gib,
            device: settings.volume_device().to_string(),
        }),
    };

    LaunchRequest {
        cluster: config.name().to_string(),
        instance_type: instance_type.to_string(),
        roles,
        count,
        image_id: settings.image().map(str::to_string),
        region: settings.region().map(str::to_string),
        placement_group: settings.placement_group().map(str::to_string),
        login_user: settings.image_username().to_string(),
        public_key: keys.public_key.clone(),
        init_script,
        map_ephemeral_device: settings.mount_local_storage(),
        storage,
    }
}
