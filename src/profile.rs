//! `GuestProfile` and `HardwareMask`: the two immutable inputs to the
//! Anti-VM Argument Assembler (§3, §4.1).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Target guest architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    pub fn qemu_binary(self) -> &'static str {
        match self {
            Arch::X64 => "qemu-system-x86_64",
            Arch::Arm64 => "qemu-system-aarch64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::X64 => write!(f, "x64"),
            Arch::Arm64 => write!(f, "arm64"),
        }
    }
}

impl std::str::FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x64" | "x86_64" => Ok(Arch::X64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(Error::InvalidProfile(format!("unknown architecture '{other}'"))),
        }
    }
}

/// Immutable description of a bootable guest. Created at configuration load,
/// read-only after publication to the Supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestProfile {
    pub name: String,
    pub arch: Arch,
    pub disk_image: PathBuf,
    pub ram_mib: u32,
    pub cpus: u32,
    pub snapshot_name: String,
    #[serde(with = "duration_secs")]
    pub boot_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub analysis_timeout: Duration,
}

/// (De)serializes a `Duration` as a whole number of seconds, matching the
/// plain-integer shape of the `timeouts {analysis, boot}` config surface
/// (§6) rather than pulling in a duration-string format.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl GuestProfile {
    /// Fails only with `InvalidProfile`: missing image or zero resources.
    pub fn validate(&self) -> Result<()> {
        if !self.disk_image.exists() {
            return Err(Error::InvalidProfile(format!(
                "disk image '{}' does not exist",
                self.disk_image.display()
            )));
        }
        if self.ram_mib == 0 {
            return Err(Error::InvalidProfile("ram_mib must be nonzero".into()));
        }
        if self.cpus == 0 {
            return Err(Error::InvalidProfile("cpus must be nonzero".into()));
        }
        Ok(())
    }
}

/// One SMBIOS vendor table: BIOS/System/Board/Chassis/CPU strings plus the
/// MAC OUI pool and disk-serial style associated with that consumer-PC
/// profile (§4.1 "Named hardware profiles").
#[derive(Debug, Clone, Copy)]
pub struct SmbiosVendorTable {
    pub profile_name: &'static str,
    pub bios_vendor: &'static str,
    pub bios_version: &'static str,
    pub system_manufacturer: &'static str,
    pub system_product: &'static str,
    pub system_family: &'static str,
    pub board_manufacturer: &'static str,
    pub board_product: &'static str,
    pub chassis_manufacturer: &'static str,
    pub chassis_type: u8,
    pub cpu_manufacturer: &'static str,
    pub cpu_version: &'static str,
    pub serial_style: SerialStyle,
    pub mac_ouis: &'static [&'static str],
    pub disk_serial: DiskSerialStyle,
}

/// Vendor-specific serial/UUID alphabet used when auto-filling SMBIOS
/// serials (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialStyle {
    /// 7 chars from `[A-Z0-9]`.
    Dell,
    /// `MXL` + 7 digits.
    Hp,
    /// `PF` + 6 alphanumeric.
    Lenovo,
    /// 10 uppercase alphanumeric chars.
    Generic,
}

/// Vendor-specific disk-serial suffix format (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSerialStyle {
    /// `WD-WCAV` + 8 alphanumeric.
    WesternDigital,
    /// `ST` + 8 digits + 3 uppercase letters.
    Seagate,
    /// 3 digits + `NX` + 7 digits, prefixed `S`.
    Samsung,
    /// prefix + 12 alphanumeric.
    Generic(&'static str),
}

/// Immutable anti-detection profile derived from a named `SmbiosVendorTable`
/// plus randomly-filled serials/UUID, stable for one guest boot (§3).
#[derive(Debug, Clone)]
pub struct HardwareMask {
    pub vendor: SmbiosVendorTable,
    pub bios_serial: String,
    pub system_serial: String,
    pub system_uuid: String,
    pub board_serial: String,
    pub chassis_serial: String,
    pub mac_address: String,
    pub disk_serial: String,
    pub tsc_frequency_hz: u64,
    pub hide_hypervisor_bit: bool,
    pub hide_paravirt_features: bool,
    pub stabilize_tsc: bool,
    pub disable_hpet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn arch_round_trips_through_str() {
        assert_eq!(Arch::from_str("x64").unwrap(), Arch::X64);
        assert_eq!(Arch::from_str("aarch64").unwrap(), Arch::Arm64);
        assert!(Arch::from_str("sparc").is_err());
    }

    #[test]
    fn validate_rejects_missing_image() {
        let profile = GuestProfile {
            name: "test".into(),
            arch: Arch::X64,
            disk_image: PathBuf::from("/nonexistent/image.qcow2"),
            ram_mib: 1024,
            cpus: 2,
            snapshot_name: "clean".into(),
            boot_timeout: Duration::from_secs(30),
            analysis_timeout: Duration::from_secs(60),
        };
        assert!(matches!(profile.validate(), Err(Error::InvalidProfile(_))));
    }

    #[test]
    fn validate_rejects_zero_ram() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let profile = GuestProfile {
            name: "test".into(),
            arch: Arch::X64,
            disk_image: tmp.path().to_path_buf(),
            ram_mib: 0,
            cpus: 2,
            snapshot_name: "clean".into(),
            boot_timeout: Duration::from_secs(30),
            analysis_timeout: Duration::from_secs(60),
        };
        assert!(profile.validate().is_err());
    }
}
