//! The seven named consumer-PC hardware profiles (§4.1).

use crate::profile::{DiskSerialStyle, SerialStyle, SmbiosVendorTable};

pub const DELL_OPTIPLEX: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "dell_optiplex",
    bios_vendor: "Dell Inc.",
    bios_version: "A12",
    system_manufacturer: "Dell Inc.",
    system_product: "OptiPlex 7080",
    system_family: "OptiPlex",
    board_manufacturer: "Dell Inc.",
    board_product: "0X8DXD",
    chassis_manufacturer: "Dell Inc.",
    chassis_type: 3,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "Intel(R) Core(TM) i7-10700 CPU @ 2.90GHz",
    serial_style: SerialStyle::Dell,
    mac_ouis: &["D4:BE:D9", "18:03:73", "34:17:EB", "F8:DB:88", "00:14:22"],
    disk_serial: DiskSerialStyle::WesternDigital,
};

pub const DELL_LATITUDE: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "dell_latitude",
    bios_vendor: "Dell Inc.",
    bios_version: "1.15.0",
    system_manufacturer: "Dell Inc.",
    system_product: "Latitude 5520",
    system_family: "Latitude",
    board_manufacturer: "Dell Inc.",
    board_product: "0YWMR4",
    chassis_manufacturer: "Dell Inc.",
    chassis_type: 10,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "11th Gen Intel(R) Core(TM) i5-1145G7 @ 2.60GHz",
    serial_style: SerialStyle::Dell,
    mac_ouis: &["D4:BE:D9", "18:03:73", "34:17:EB", "F8:DB:88", "00:14:22"],
    disk_serial: DiskSerialStyle::WesternDigital,
};

pub const HP_PRODESK: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "hp_prodesk",
    bios_vendor: "HP",
    bios_version: "S14 Ver. 02.09.00",
    system_manufacturer: "HP",
    system_product: "HP ProDesk 400 G7 Small Form Factor",
    system_family: "HP ProDesk",
    board_manufacturer: "HP",
    board_product: "8767",
    chassis_manufacturer: "HP",
    chassis_type: 3,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "Intel(R) Core(TM) i5-10500 CPU @ 3.10GHz",
    serial_style: SerialStyle::Hp,
    mac_ouis: &["94:57:A5", "00:21:5A", "38:63:BB", "3C:D9:2B", "00:1E:0B"],
    disk_serial: DiskSerialStyle::Seagate,
};

pub const HP_ELITEBOOK: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "hp_elitebook",
    bios_vendor: "HP",
    bios_version: "T76 Ver. 01.12.00",
    system_manufacturer: "HP",
    system_product: "HP EliteBook 840 G8 Notebook PC",
    system_family: "HP EliteBook",
    board_manufacturer: "HP",
    board_product: "880D",
    chassis_manufacturer: "HP",
    chassis_type: 10,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "11th Gen Intel(R) Core(TM) i7-1165G7 @ 2.80GHz",
    serial_style: SerialStyle::Hp,
    mac_ouis: &["94:57:A5", "00:21:5A", "38:63:BB", "3C:D9:2B", "00:1E:0B"],
    disk_serial: DiskSerialStyle::Seagate,
};

pub const LENOVO_THINKCENTRE: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "lenovo_thinkcentre",
    bios_vendor: "LENOVO",
    bios_version: "M3CKT49A",
    system_manufacturer: "LENOVO",
    system_product: "ThinkCentre M920q",
    system_family: "ThinkCentre M920q Tiny",
    board_manufacturer: "LENOVO",
    board_product: "313D",
    chassis_manufacturer: "LENOVO",
    chassis_type: 35,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "Intel(R) Core(TM) i7-9700T CPU @ 2.00GHz",
    serial_style: SerialStyle::Lenovo,
    mac_ouis: &["00:06:1B", "7C:7A:91", "6C:C2:17", "68:F7:28", "98:FA:9B"],
    disk_serial: DiskSerialStyle::Samsung,
};

pub const LENOVO_THINKPAD: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "lenovo_thinkpad",
    bios_vendor: "LENOVO",
    bios_version: "N33ET69W (1.50)",
    system_manufacturer: "LENOVO",
    system_product: "ThinkPad T14 Gen 2i",
    system_family: "ThinkPad T14 Gen 2i",
    board_manufacturer: "LENOVO",
    board_product: "20W0CTO1WW",
    chassis_manufacturer: "LENOVO",
    chassis_type: 10,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "11th Gen Intel(R) Core(TM) i7-1165G7 @ 2.80GHz",
    serial_style: SerialStyle::Lenovo,
    mac_ouis: &["00:06:1B", "7C:7A:91", "6C:C2:17", "68:F7:28", "98:FA:9B"],
    disk_serial: DiskSerialStyle::Samsung,
};

pub const ASUS_DESKTOP: SmbiosVendorTable = SmbiosVendorTable {
    profile_name: "asus_desktop",
    bios_vendor: "American Megatrends Inc.",
    bios_version: "3801",
    system_manufacturer: "ASUS",
    system_product: "System Product Name",
    system_family: "ASUS_MB_CNL",
    board_manufacturer: "ASUSTeK COMPUTER INC.",
    board_product: "ROG STRIX Z490-E GAMING",
    chassis_manufacturer: "Default string",
    chassis_type: 3,
    cpu_manufacturer: "Intel(R) Corporation",
    cpu_version: "Intel(R) Core(TM) i9-10900K CPU @ 3.70GHz",
    serial_style: SerialStyle::Generic,
    mac_ouis: &["00:1D:60", "00:15:F2", "2C:4D:54", "40:16:7E", "E0:3F:49"],
    disk_serial: DiskSerialStyle::Generic("WD-WCAV"),
};

pub const ALL_PROFILES: &[SmbiosVendorTable] = &[
    DELL_OPTIPLEX,
    DELL_LATITUDE,
    HP_PRODESK,
    HP_ELITEBOOK,
    LENOVO_THINKCENTRE,
    LENOVO_THINKPAD,
    ASUS_DESKTOP,
];

/// Forbidden MAC OUI prefixes: real virtualization vendors, including the
/// QEMU default (`52:54:00`) that the source mislabeled as Realtek.
pub const FORBIDDEN_MAC_OUIS: &[&str] = &[
    "52:54:00",
    "00:0C:29",
    "00:50:56",
    "08:00:27",
    "00:16:3E",
    "00:15:5D",
];

/// Substrings that must never appear in an emitted SMBIOS string.
pub const FORBIDDEN_VENDOR_SUBSTRINGS: &[&str] =
    &["QEMU", "Bochs", "VirtualBox", "VMware", "Xen", "Hyper-V"];

pub fn lookup(name: &str) -> Option<SmbiosVendorTable> {
    ALL_PROFILES.iter().copied().find(|p| p.profile_name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_profile_contains_a_forbidden_vendor_substring() {
        for profile in ALL_PROFILES {
            for field in [
                profile.bios_vendor,
                profile.system_manufacturer,
                profile.board_manufacturer,
                profile.chassis_manufacturer,
            ] {
                for bad in FORBIDDEN_VENDOR_SUBSTRINGS {
                    assert!(
                        !field.contains(bad),
                        "{} contains forbidden substring {}",
                        field,
                        bad
                    );
                }
            }
        }
    }

    #[test]
    fn no_profile_mac_ouis_overlap_forbidden_list() {
        for profile in ALL_PROFILES {
            for oui in profile.mac_ouis {
                assert!(!FORBIDDEN_MAC_OUIS.contains(oui));
            }
        }
    }

    #[test]
    fn lookup_finds_dell_optiplex() {
        let p = lookup("dell_optiplex").unwrap();
        assert_eq!(p.system_manufacturer, "Dell Inc.");
    }

    #[test]
    fn lookup_is_none_for_unknown_name() {
        assert!(lookup("gateway_2000").is_none());
    }
}
