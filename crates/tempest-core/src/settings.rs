//! Cluster-wide settings.
//!
//! Built once from the global records of a declaration and immutable
//! afterwards. Optional values stay `Option`-typed; defaults are applied
//! in the accessors, never by mutating shared state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::warn;

use crate::declaration::{GlobalSetting, Record, SettingKey};
use crate::error::{ConfigError, ConfigResult};
use crate::versions;

/// Default login user of the machine image.
pub const DEFAULT_IMAGE_USERNAME: &str = "ubuntu";

/// Default device path for attached block storage.
pub const DEFAULT_VOLUME_DEVICE: &str = "/dev/sdx";

/// Default location of the node-side helper bundle.
pub const DEFAULT_HELPER_BUNDLE_URL: &str =
    "https://s3-eu-west-1.amazonaws.com/tempest-releases/tempest-node.tar.gz";

/// OS package manager on the machine image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    pub fn parse(value: &str) -> ConfigResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "apt" | "apt-get" => Ok(PackageManager::Apt),
            "yum" => Ok(PackageManager::Yum),
            other => Err(ConfigError::UnsupportedPackageManager(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Yum => "yum",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster-wide settings parsed from a declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalSettings {
    values: BTreeMap<SettingKey, String>,
    pre_config: Vec<String>,
    post_config: Vec<String>,
    mount_local_storage: bool,
    memory_monitor: bool,
    volume_size_gib: u32,
}

impl GlobalSettings {
    /// Collect the global records of a declaration.
    ///
    /// Slot records are ignored. Scalar keys may appear once; the
    /// `remote-exec-*` lists accumulate in declaration order.
    pub fn from_records(records: &[Record]) -> ConfigResult<Self> {
        let mut settings = GlobalSettings::default();

        for record in records {
            let Record::Global(setting) = record else {
                continue;
            };
            settings.apply(setting)?;
        }

        Ok(settings)
    }

    fn apply(&mut self, setting: &GlobalSetting) -> ConfigResult<()> {
        match setting.key {
            SettingKey::RemoteExecPreConfig => {
                self.pre_config.extend(setting.list_items());
                return Ok(());
            }
            SettingKey::RemoteExecPostConfig => {
                self.post_config.extend(setting.list_items());
                return Ok(());
            }
            SettingKey::MountLocalStorage => {
                self.mount_local_storage = parse_bool(setting)?;
            }
            SettingKey::MemoryMonitor => {
                self.memory_monitor = parse_bool(setting)?;
            }
            SettingKey::EbsStorageSize => {
                self.volume_size_gib =
                    setting.value.parse().map_err(|_| invalid(setting))?;
            }
            _ => {}
        }

        if self
            .values
            .insert(setting.key, setting.value.clone())
            .is_some()
        {
            return Err(ConfigError::DuplicateSetting(setting.key.to_string()));
        }
        Ok(())
    }

    /// The raw declared value of a scalar key.
    pub fn raw(&self, key: SettingKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn engine_version(&self) -> Option<&str> {
        self.raw(SettingKey::StormVersion)
    }

    pub fn coordination_version(&self) -> Option<&str> {
        self.raw(SettingKey::ZkVersion)
    }

    pub fn image(&self) -> Option<&str> {
        self.raw(SettingKey::Image)
    }

    pub fn image_username(&self) -> &str {
        self.raw(SettingKey::ImageUsername)
            .unwrap_or(DEFAULT_IMAGE_USERNAME)
    }

    /// Home directory of the image user on every node.
    pub fn home_dir(&self) -> String {
        format!("/home/{}", self.image_username())
    }

    /// Declared package manager; `apt` when absent.
    pub fn package_manager(&self) -> ConfigResult<PackageManager> {
        match self.raw(SettingKey::PackageManager) {
            Some(value) => PackageManager::parse(value),
            None => Ok(PackageManager::Apt),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.raw(SettingKey::Region)
    }

    pub fn placement_group(&self) -> Option<&str> {
        self.raw(SettingKey::PlacementGroup)
    }

    pub fn mount_local_storage(&self) -> bool {
        self.mount_local_storage
    }

    pub fn memory_monitor(&self) -> bool {
        self.memory_monitor
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.raw(SettingKey::PrivateKeyPath)
            .map(PathBuf::from)
            .unwrap_or_else(|| local_home().join(".ssh/id_rsa"))
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.raw(SettingKey::PublicKeyPath)
            .map(PathBuf::from)
            .unwrap_or_else(|| local_home().join(".ssh/id_rsa.pub"))
    }

    pub fn pre_config_commands(&self) -> &[String] {
        &self.pre_config
    }

    pub fn post_config_commands(&self) -> &[String] {
        &self.post_config
    }

    /// Size of the attached volume per machine; 0 means none requested.
    pub fn volume_size_gib(&self) -> u32 {
        self.volume_size_gib
    }

    pub fn volume_device(&self) -> &str {
        self.raw(SettingKey::EbsDevice)
            .unwrap_or(DEFAULT_VOLUME_DEVICE)
    }

    pub fn helper_bundle_url(&self) -> &str {
        self.raw(SettingKey::HelperBundleUrl)
            .unwrap_or(DEFAULT_HELPER_BUNDLE_URL)
    }

    /// Download URL of the requested Storm release.
    pub fn engine_download_url(&self) -> ConfigResult<String> {
        let version = self
            .engine_version()
            .ok_or_else(|| ConfigError::MissingSetting(SettingKey::StormVersion.to_string()))?;
        versions::resolve_engine_url(version).ok_or_else(|| {
            warn!(%version, "storm version not currently supported");
            ConfigError::UnsupportedEngineVersion(version.to_string())
        })
    }

    /// Download URL of the requested ZooKeeper release.
    pub fn coordination_download_url(&self) -> ConfigResult<String> {
        let version = self
            .coordination_version()
            .ok_or_else(|| ConfigError::MissingSetting(SettingKey::ZkVersion.to_string()))?;
        versions::resolve_coordination_url(version).ok_or_else(|| {
            warn!(%version, "zookeeper version not currently supported");
            ConfigError::UnsupportedCoordinationVersion(version.to_string())
        })
    }
}

fn parse_bool(setting: &GlobalSetting) -> ConfigResult<bool> {
    match setting.value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        _ => Err(invalid(setting)),
    }
}

fn invalid(setting: &GlobalSetting) -> ConfigError {
    ConfigError::InvalidValue {
        key: setting.key.to_string(),
        value: setting.value.clone(),
    }
}

fn local_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("~"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::parse_records;

    fn settings(lines: &[&str]) -> ConfigResult<GlobalSettings> {
        let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        GlobalSettings::from_records(&parse_records(&lines)?)
    }

    #[test]
    fn defaults_apply_when_absent() {
        let s = settings(&["m1.small {WORKER}"]).unwrap();
        assert_eq!(s.image_username(), "ubuntu");
        assert_eq!(s.home_dir(), "/home/ubuntu");
        assert_eq!(s.package_manager().unwrap(), PackageManager::Apt);
        assert!(!s.mount_local_storage());
        assert!(!s.memory_monitor());
        assert_eq!(s.volume_size_gib(), 0);
        assert_eq!(s.volume_device(), "/dev/sdx");
        assert!(s.private_key_path().ends_with(".ssh/id_rsa"));
    }

    #[test]
    fn typed_values_are_parsed() {
        let s = settings(&[
            "packagemanager YUM",
            "mount-local-storage True",
            "memory-monitor false",
            "ebs-storage-size 100",
            "image-username ec2-user",
        ])
        .unwrap();
        assert_eq!(s.package_manager().unwrap(), PackageManager::Yum);
        assert!(s.mount_local_storage());
        assert_eq!(s.volume_size_gib(), 100);
        assert_eq!(s.home_dir(), "/home/ec2-user");
    }

    #[test]
    fn unsupported_package_manager_is_an_error() {
        let s = settings(&["packagemanager pacman"]).unwrap();
        assert!(matches!(
            s.package_manager(),
            Err(ConfigError::UnsupportedPackageManager(ref pm)) if pm == "pacman"
        ));
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let err = settings(&["mount-local-storage maybe"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn duplicate_scalar_is_rejected() {
        let err = settings(&["region eu-west-1", "region us-east-1"]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSetting(ref k) if k == "region"));
    }

    #[test]
    fn exec_lists_accumulate_in_order() {
        let s = settings(&[
            "remote-exec-preconfig {echo a, echo b}",
            "remote-exec-postconfig {echo z}",
            "remote-exec-preconfig {echo c}",
        ])
        .unwrap();
        assert_eq!(s.pre_config_commands(), ["echo a", "echo b", "echo c"]);
        assert_eq!(s.post_config_commands(), ["echo z"]);
    }

    #[test]
    fn unsupported_engine_version_fails_instead_of_empty_url() {
        let s = settings(&["storm-version 9.9.9"]).unwrap();
        assert!(matches!(
            s.engine_download_url(),
            Err(ConfigError::UnsupportedEngineVersion(ref v)) if v == "9.9.9"
        ));
    }

    #[test]
    fn missing_version_is_reported() {
        let s = settings(&[]).unwrap();
        assert!(matches!(
            s.coordination_download_url(),
            Err(ConfigError::MissingSetting(_))
        ));
    }
}
