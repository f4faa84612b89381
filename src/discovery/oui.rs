//! MAC OUI (Organizationally Unique Identifier) lookup.
//!
//! Maps the first three octets of a MAC address to a manufacturer name using
//! a small static table of vendors commonly found on home networks.

/// Known prefixes, as six uppercase hex digits.
const VENDORS: &[(&str, &str)] = &[
    ("000393", "Apple"),
    ("0017F2", "Apple"),
    ("001B63", "Apple"),
    ("001EC2", "Apple"),
    ("BCD1D3", "Apple"),
    ("F09E63", "Apple"),
    ("001A2B", "Cisco"),
    ("000C29", "VMware"),
    ("005056", "VMware"),
    ("000569", "VMware"),
    ("080027", "VirtualBox"),
    ("525400", "QEMU/KVM"),
    ("00155D", "Microsoft Hyper-V"),
    ("00044B", "NVIDIA"),
    ("001132", "Synology"),
    ("00089B", "QNAP"),
    ("245EBE", "QNAP"),
    ("001A11", "Google"),
    ("3C5AB4", "Google"),
    ("18B430", "Nest Labs"),
    ("44650D", "Amazon"),
    ("000E58", "Sonos"),
    ("001788", "Philips Hue"),
    ("AC293A", "Canon"),
    ("443839", "Cumulus"),
    ("50E549", "Gigabyte"),
    ("240AC4", "Espressif"),
    ("248D76", "Espressif"),
    ("30AEA4", "Espressif"),
    ("84F3EB", "Espressif"),
    ("B827EB", "Raspberry Pi"),
    ("D83ADD", "Raspberry Pi"),
    ("DCA632", "Raspberry Pi"),
    ("E45F01", "Raspberry Pi"),
];

/// Look up the manufacturer for a MAC address.
///
/// Accepts `:` or `-` separators in any case. Returns `None` for unknown
/// prefixes or inputs with fewer than three octets.
pub fn lookup(mac: &str) -> Option<&'static str> {
    let prefix = prefix_of(mac)?;
    VENDORS
        .iter()
        .find(|(oui, _)| *oui == prefix)
        .map(|(_, vendor)| *vendor)
}

fn prefix_of(mac: &str) -> Option<String> {
    let prefix: String = mac
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(6)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (prefix.len() == 6).then_some(prefix)
}
