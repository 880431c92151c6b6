//! Configuration surface consumed from the external YAML loader (§6, §10.3).
//!
//! Loading the YAML file from disk is out of scope (§1); this module owns
//! only the struct shapes, their `Deserialize` impls, and the validation
//! that turns a malformed document into `Error::InvalidProfile` before a
//! profile is ever published to the Supervisor.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::Arch;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchConfig {
    pub image: PathBuf,
    pub ram: u32,
    pub cpus: u32,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiVmConfig {
    pub smbios_profile: String,
    #[serde(default)]
    pub mac_prefix: Option<String>,
    #[serde(default)]
    pub disk_serial_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub hide_hypervisor: bool,
    #[serde(default = "default_true")]
    pub stabilize_tsc: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_analysis_timeout_secs")]
    pub analysis_secs: u64,
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_secs: u64,
}

fn default_analysis_timeout_secs() -> u64 {
    60
}

fn default_boot_timeout_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            analysis_secs: default_analysis_timeout_secs(),
            boot_secs: default_boot_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_clean_threshold")]
    pub clean: u32,
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious: u32,
}

fn default_clean_threshold() -> u32 {
    20
}

fn default_suspicious_threshold() -> u32 {
    50
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            clean: default_clean_threshold(),
            suspicious: default_suspicious_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub images_dir: PathBuf,
    pub sockets_dir: PathBuf,
    pub architectures: HashMap<String, ArchConfig>,
    pub anti_vm: AntiVmConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

impl Config {
    /// Parses the `{images_dir, sockets_dir, per-arch {...}, anti_vm {...},
    /// timeouts {...}, thresholds {...}}` document (§6). Does not read from
    /// disk — the caller owns that (out of scope per §1).
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects unknown architecture keys and an empty architecture map;
    /// leaves per-profile image-existence checks to `GuestProfile::validate`.
    pub fn validate(&self) -> Result<()> {
        if self.architectures.is_empty() {
            return Err(Error::Config("no architectures configured".into()));
        }
        for key in self.architectures.keys() {
            key.parse::<Arch>()
                .map_err(|_| Error::Config(format!("unknown architecture '{key}'")))?;
        }
        if self.thresholds.clean > self.thresholds.suspicious {
            return Err(Error::Config(
                "clean threshold must not exceed suspicious threshold".into(),
            ));
        }
        Ok(())
    }

    pub fn arch_config(&self, arch: Arch) -> Option<&ArchConfig> {
        self.architectures.get(&arch.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
images_dir: /var/lib/sandtrap/images
sockets_dir: /tmp/sandtrap
architectures:
  x64:
    image: /var/lib/sandtrap/images/win10-x64.qcow2
    ram: 2048
    cpus: 2
    snapshot: clean
anti_vm:
  smbios_profile: dell_optiplex
  hide_hypervisor: true
  stabilize_tsc: true
timeouts:
  analysis_secs: 60
  boot_secs: 30
thresholds:
  clean: 20
  suspicious: 50
"#;

    #[test]
    fn parses_a_representative_document() {
        let config = Config::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.thresholds.clean, 20);
        assert_eq!(config.thresholds.suspicious, 50);
        assert!(config.arch_config(Arch::X64).is_some());
    }

    #[test]
    fn rejects_unknown_architecture_key() {
        let bad = SAMPLE_YAML.replace("x64:", "sparc64:");
        assert!(Config::from_yaml_str(&bad).is_err());
    }

    #[test]
    fn defaults_fill_in_missing_timeouts_and_thresholds() {
        let minimal = r#"
images_dir: /var/lib/sandtrap/images
sockets_dir: /tmp/sandtrap
architectures:
  arm64:
    image: /var/lib/sandtrap/images/linux-arm64.qcow2
    ram: 1024
    cpus: 1
    snapshot: clean
anti_vm:
  smbios_profile: asus_desktop
"#;
        let config = Config::from_yaml_str(minimal).unwrap();
        assert_eq!(config.timeouts.analysis_secs, 60);
        assert_eq!(config.thresholds.suspicious, 50);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let bad = SAMPLE_YAML
            .replace("clean: 20", "clean: 80")
            .replace("suspicious: 50", "suspicious: 50");
        assert!(Config::from_yaml_str(&bad).is_err());
    }
}
