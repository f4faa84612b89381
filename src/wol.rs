//! Wake-on-LAN magic packets.

use std::net::{Ipv4Addr, SocketAddr};

use pnet::util::MacAddr;
use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{NetworkError, Result};
use crate::network::parse_mac;

/// Standard discard port used for Wake-on-LAN.
pub const WOL_PORT: u16 = 9;

const SYNC_STREAM_LEN: usize = 6;
const MAC_REPETITIONS: usize = 16;

/// Size of a magic packet: sync stream plus sixteen copies of the MAC.
pub const MAGIC_PACKET_LEN: usize = SYNC_STREAM_LEN + MAC_REPETITIONS * 6;

/// A Wake-on-LAN payload for a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    pub fn new(mac: MacAddr) -> Self {
        let octets = mac.octets();
        let mut packet = [0xffu8; MAGIC_PACKET_LEN];
        for chunk in packet[SYNC_STREAM_LEN..].chunks_exact_mut(octets.len()) {
            chunk.copy_from_slice(&octets);
        }
        Self(packet)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Broadcast a magic packet for `mac` on the local network.
///
/// Fails without sending anything if `mac` is malformed.
pub async fn wake(mac: &str) -> Result<()> {
    let target = parse_mac(mac)?;
    let packet = MagicPacket::new(target);

    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    socket.set_broadcast(true)?;

    let sent = socket
        .send_to(
            packet.as_bytes(),
            SocketAddr::from((Ipv4Addr::BROADCAST, WOL_PORT)),
        )
        .await?;
    if sent != MAGIC_PACKET_LEN {
        return Err(NetworkError::SendFailed(format!(
            "short write: {sent} of {MAGIC_PACKET_LEN} bytes"
        ))
        .into());
    }

    info!(mac = %target, "magic packet sent");
    Ok(())
}
