//! MAC address parsing.

use pnet::util::MacAddr;

use crate::error::NetworkError;

/// Parse a MAC address written as six two-digit hex groups separated by
/// `:` or `-` (case-insensitive).
pub fn parse_mac(input: &str) -> Result<MacAddr, NetworkError> {
    let invalid = || NetworkError::InvalidMac {
        input: input.to_string(),
    };

    let normalized = input.trim().replace('-', ":");
    let mut octets = [0u8; 6];
    let mut groups = normalized.split(':');

    for octet in &mut octets {
        let group = groups.next().ok_or_else(invalid)?;
        if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        *octet = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
    }

    if groups.next().is_some() {
        return Err(invalid());
    }

    let [a, b, c, d, e, f] = octets;
    Ok(MacAddr::new(a, b, c, d, e, f))
}
