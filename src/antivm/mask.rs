//! Builds a `HardwareMask` from a named vendor profile, filling serials,
//! UUID, MAC, and disk serial with the vendor-specific alphabets (§3, §4.1).

use rand::Rng;

use crate::error::{Error, Result};
use crate::profile::{DiskSerialStyle, HardwareMask, SerialStyle, SmbiosVendorTable};

const ALPHANUMERIC_UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const DIGITS: &[u8] = b"0123456789";
const UPPER_LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn random_from<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

fn generate_serial<R: Rng + ?Sized>(rng: &mut R, style: SerialStyle) -> String {
    match style {
        SerialStyle::Dell => random_from(rng, ALPHANUMERIC_UPPER, 7),
        SerialStyle::Hp => format!("MXL{}", random_from(rng, DIGITS, 7)),
        SerialStyle::Lenovo => format!("PF{}", random_from(rng, ALPHANUMERIC_UPPER, 6)),
        SerialStyle::Generic => random_from(rng, ALPHANUMERIC_UPPER, 10),
    }
}

fn generate_uuid<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

/// Picks the OUI from `mac_prefix` when the caller supplied one (§6: a
/// configured `anti_vm.mac_prefix` overrides the vendor's OUI pool, same as
/// the original `qemu_launcher.py` applying its configured prefix directly
/// rather than a vendor table), else draws one from `ouis`.
fn generate_mac<R: Rng + ?Sized>(rng: &mut R, ouis: &[&str], mac_prefix: Option<&str>) -> Result<String> {
    let oui = match mac_prefix {
        Some(prefix) => prefix.to_string(),
        None => ouis
            .get(rng.gen_range(0..ouis.len()))
            .ok_or_else(|| Error::InvalidProfile("hardware profile has no MAC OUI pool".into()))?
            .to_string(),
    };
    let tail: [u8; 3] = rng.gen();
    Ok(format!(
        "{}:{:02X}:{:02X}:{:02X}",
        oui, tail[0], tail[1], tail[2]
    ))
}

/// Prefixes with `disk_serial_prefix` when the caller supplied one, else
/// falls back to the vendor's `DiskSerialStyle`.
fn generate_disk_serial<R: Rng + ?Sized>(rng: &mut R, style: DiskSerialStyle, disk_serial_prefix: Option<&str>) -> String {
    if let Some(prefix) = disk_serial_prefix {
        return format!("{prefix}{}", random_from(rng, DIGITS, 8));
    }
    match style {
        DiskSerialStyle::WesternDigital => {
            format!("WD-WCAV{}", random_from(rng, ALPHANUMERIC_UPPER, 8))
        }
        DiskSerialStyle::Seagate => format!(
            "ST{}{}",
            random_from(rng, DIGITS, 8),
            random_from(rng, UPPER_LETTERS, 3)
        ),
        DiskSerialStyle::Samsung => format!(
            "S{}NX{}",
            random_from(rng, DIGITS, 3),
            random_from(rng, DIGITS, 7)
        ),
        DiskSerialStyle::Generic(prefix) => format!("{prefix}{}", random_from(rng, ALPHANUMERIC_UPPER, 12)),
    }
}

/// Fills a `HardwareMask` from `vendor` using the given RNG. Serials/UUID are
/// stable for the lifetime of the returned value (§3: "stable for the
/// lifetime of one guest boot"). `mac_prefix`/`disk_serial_prefix` come from
/// `AntiVmConfig` (§6) and, when set, override the vendor-derived OUI and
/// disk-serial prefix.
pub fn build_mask<R: Rng + ?Sized>(
    rng: &mut R,
    vendor: SmbiosVendorTable,
    tsc_frequency_hz: u64,
    mac_prefix: Option<&str>,
    disk_serial_prefix: Option<&str>,
) -> Result<HardwareMask> {
    let system_serial = generate_serial(rng, vendor.serial_style);
    Ok(HardwareMask {
        vendor,
        bios_serial: system_serial.clone(),
        system_serial: system_serial.clone(),
        system_uuid: generate_uuid(rng),
        board_serial: generate_serial(rng, vendor.serial_style),
        chassis_serial: system_serial,
        mac_address: generate_mac(rng, vendor.mac_ouis, mac_prefix)?,
        disk_serial: generate_disk_serial(rng, vendor.disk_serial, disk_serial_prefix),
        tsc_frequency_hz,
        hide_hypervisor_bit: true,
        hide_paravirt_features: true,
        stabilize_tsc: true,
        disable_hpet: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antivm::profiles;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(42)
    }

    #[test]
    fn dell_serial_is_seven_alphanumeric_chars() {
        let mask = build_mask(&mut rng(), profiles::DELL_OPTIPLEX, 1_000_000_000, None, None).unwrap();
        assert_eq!(mask.system_serial.len(), 7);
        assert!(mask.system_serial.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hp_serial_starts_with_mxl() {
        let mask = build_mask(&mut rng(), profiles::HP_PRODESK, 1_000_000_000, None, None).unwrap();
        assert!(mask.system_serial.starts_with("MXL"));
        assert_eq!(mask.system_serial.len(), 10);
    }

    #[test]
    fn lenovo_serial_starts_with_pf() {
        let mask = build_mask(&mut rng(), profiles::LENOVO_THINKPAD, 1_000_000_000, None, None).unwrap();
        assert!(mask.system_serial.starts_with("PF"));
        assert_eq!(mask.system_serial.len(), 8);
    }

    #[test]
    fn western_digital_disk_serial_has_correct_prefix_and_length() {
        let mask = build_mask(&mut rng(), profiles::DELL_OPTIPLEX, 1_000_000_000, None, None).unwrap();
        assert!(mask.disk_serial.starts_with("WD-WCAV"));
        assert!(mask.disk_serial.len() >= 10);
    }

    #[test]
    fn generated_mac_is_never_a_forbidden_oui() {
        for _ in 0..200 {
            let mask = build_mask(&mut rng(), profiles::ASUS_DESKTOP, 1_000_000_000, None, None).unwrap();
            let oui = &mask.mac_address[..8];
            assert!(!profiles::FORBIDDEN_MAC_OUIS.contains(&oui));
        }
    }

    #[test]
    fn mac_starts_with_vendor_oui() {
        let mask = build_mask(&mut rng(), profiles::DELL_OPTIPLEX, 1_000_000_000, None, None).unwrap();
        let oui = &mask.mac_address[..8];
        assert!(profiles::DELL_OPTIPLEX.mac_ouis.contains(&oui));
    }

    #[test]
    fn mac_prefix_override_replaces_the_vendor_oui() {
        let mask = build_mask(&mut rng(), profiles::DELL_OPTIPLEX, 1_000_000_000, Some("D4:BE:D9"), None).unwrap();
        assert!(mask.mac_address.starts_with("D4:BE:D9:"));
    }

    #[test]
    fn disk_serial_prefix_override_replaces_the_vendor_style() {
        let mask = build_mask(&mut rng(), profiles::HP_PRODESK, 1_000_000_000, None, Some("CUSTOM-")).unwrap();
        assert!(mask.disk_serial.starts_with("CUSTOM-"));
        assert!(!mask.disk_serial.starts_with("MXL"));
    }
}
