//! BACnet/IPv6 (Annex U) Data Link Implementation
//!
//! Mirrors [`super::bip`]'s BACnet/IP (Annex J) implementation over UDP/IPv6
//! instead of UDP/IPv4: BVLL6 framing (link-layer type 0x82), the same
//! broadcast-distribution/foreign-device registration model, adapted to
//! IPv6's lack of a link-local broadcast address — B/IPv6 nodes join a
//! well-known multicast group instead.
//!
//! This implements the subset of Annex U's BVLC6 functions this crate's
//! BACnet/IP port also implements (unicast/broadcast/forwarded NPDU and
//! foreign-device registration); the VMAC address-resolution exchange
//! (Annex U.5) used to map a BACnet/IPv6 VMAC to its IPv6 socket address is
//! not implemented — addressing here is by [`SocketAddr`] directly, the
//! same as `bip`.

#[cfg(feature = "std")]
use std::{
    io::ErrorKind,
    net::{Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    time::{Duration, Instant},
};

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::datalink::{DataLink, DataLinkAddress, DataLinkError, DataLinkType, Result};

/// BACnet/IPv6 well-known port (same numeric value as BACnet/IP).
pub const BACNET_IPV6_PORT: u16 = 47808;

/// BACnet/IPv6 multicast group used for local broadcast emulation
/// (Annex U.2, site-local scope).
pub const BACNET_IPV6_MULTICAST_GROUP: Ipv6Addr = Ipv6Addr::new(0xFF05, 0, 0, 0, 0, 0, 0x0BAC, 0x0001);

/// BVLL6 (BACnet Virtual Link Layer for IPv6) message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bvlc6Function {
    Result = 0x00,
    OriginalUnicastNpdu = 0x01,
    OriginalBroadcastNpdu = 0x02,
    ForwardedNpdu = 0x08,
    RegisterForeignDevice = 0x09,
    DeleteForeignDeviceTableEntry = 0x0A,
    DistributeBroadcastToNetwork = 0x0C,
}

/// BVLL6 header: `0x82`, function, 2-byte total length.
#[derive(Debug, Clone)]
pub struct Bvlc6Header {
    pub bvlc_type: u8,
    pub function: Bvlc6Function,
    pub length: u16,
}

impl Bvlc6Header {
    pub fn new(function: Bvlc6Function, length: u16) -> Self {
        Self { bvlc_type: 0x82, function, length }
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.bvlc_type, self.function as u8, (self.length >> 8) as u8, (self.length & 0xFF) as u8]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(DataLinkError::InvalidFrame);
        }
        if data[0] != 0x82 {
            return Err(DataLinkError::InvalidFrame);
        }
        let function = match data[1] {
            0x00 => Bvlc6Function::Result,
            0x01 => Bvlc6Function::OriginalUnicastNpdu,
            0x02 => Bvlc6Function::OriginalBroadcastNpdu,
            0x08 => Bvlc6Function::ForwardedNpdu,
            0x09 => Bvlc6Function::RegisterForeignDevice,
            0x0A => Bvlc6Function::DeleteForeignDeviceTableEntry,
            0x0C => Bvlc6Function::DistributeBroadcastToNetwork,
            _ => return Err(DataLinkError::InvalidFrame),
        };
        let length = ((data[2] as u16) << 8) | (data[3] as u16);
        Ok(Self { bvlc_type: data[0], function, length })
    }
}

#[derive(Debug, Clone)]
#[cfg(feature = "std")]
struct Bip6FdtEntry {
    address: SocketAddr,
    ttl: u16,
    registered_at: Instant,
}

/// BACnet/IPv6 data link. Binds a UDPv6 socket, joins the BACnet multicast
/// group for broadcast emulation, and implements the same foreign-device
/// registration accounting `bip` does.
#[cfg(feature = "std")]
pub struct BacnetIpv6DataLink {
    socket: UdpSocket,
    local_addr: SocketAddr,
    multicast_addr: SocketAddr,
    fdt: Vec<Bip6FdtEntry>,
}

#[cfg(feature = "std")]
impl BacnetIpv6DataLink {
    pub fn new<A: ToSocketAddrs>(bind_addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).map_err(DataLinkError::IoError)?;
        let local_addr = socket.local_addr().map_err(DataLinkError::IoError)?;

        if let SocketAddr::V6(local) = local_addr {
            socket
                .join_multicast_v6(&BACNET_IPV6_MULTICAST_GROUP, local.scope_id())
                .map_err(DataLinkError::IoError)?;
        } else {
            return Err(DataLinkError::UnsupportedType);
        }

        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(DataLinkError::IoError)?;

        let multicast_addr = SocketAddr::new(BACNET_IPV6_MULTICAST_GROUP.into(), BACNET_IPV6_PORT);

        Ok(Self { socket, local_addr, multicast_addr, fdt: Vec::new() })
    }

    pub fn send_unicast_npdu(&mut self, npdu: &[u8], dest: SocketAddr) -> Result<()> {
        let header = Bvlc6Header::new(Bvlc6Function::OriginalUnicastNpdu, 4 + npdu.len() as u16);
        let mut frame = header.encode();
        frame.extend_from_slice(npdu);
        self.socket.send_to(&frame, dest).map_err(DataLinkError::IoError)?;
        Ok(())
    }

    pub fn send_broadcast_npdu(&mut self, npdu: &[u8]) -> Result<()> {
        let header = Bvlc6Header::new(Bvlc6Function::OriginalBroadcastNpdu, 4 + npdu.len() as u16);
        let mut frame = header.encode();
        frame.extend_from_slice(npdu);
        self.socket.send_to(&frame, self.multicast_addr).map_err(DataLinkError::IoError)?;
        Ok(())
    }

    pub fn register_foreign_device(&mut self, bbmd_addr: SocketAddr, ttl: u16) -> Result<()> {
        let mut frame = Bvlc6Header::new(Bvlc6Function::RegisterForeignDevice, 6).encode();
        frame.extend_from_slice(&ttl.to_be_bytes());
        self.socket.send_to(&frame, bbmd_addr).map_err(DataLinkError::IoError)?;
        Ok(())
    }

    pub fn cleanup_fdt(&mut self) {
        let now = Instant::now();
        self.fdt.retain(|e| now.duration_since(e.registered_at).as_secs() < e.ttl as u64);
    }

    fn process_bvlc6_message(&mut self, data: &[u8], source: SocketAddr) -> Result<Option<Vec<u8>>> {
        let header = Bvlc6Header::decode(data)?;
        if data.len() != header.length as usize {
            return Err(DataLinkError::InvalidFrame);
        }

        match header.function {
            Bvlc6Function::OriginalUnicastNpdu | Bvlc6Function::OriginalBroadcastNpdu => {
                if data.len() > 4 {
                    Ok(Some(data[4..].to_vec()))
                } else {
                    Err(DataLinkError::InvalidFrame)
                }
            }
            Bvlc6Function::ForwardedNpdu => {
                if data.len() > 22 {
                    // 4-byte header + 18-byte originating address.
                    Ok(Some(data[22..].to_vec()))
                } else {
                    Err(DataLinkError::InvalidFrame)
                }
            }
            Bvlc6Function::RegisterForeignDevice => {
                if data.len() == 6 {
                    let ttl = u16::from_be_bytes([data[4], data[5]]);
                    self.fdt.push(Bip6FdtEntry { address: source, ttl, registered_at: Instant::now() });
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(feature = "std")]
impl DataLink for BacnetIpv6DataLink {
    fn send_frame(&mut self, frame: &[u8], dest: &DataLinkAddress) -> Result<()> {
        match dest {
            DataLinkAddress::Ipv6(addr) => self.send_unicast_npdu(frame, *addr),
            DataLinkAddress::Broadcast => self.send_broadcast_npdu(frame),
            _ => Err(DataLinkError::UnsupportedType),
        }
    }

    fn receive_frame(&mut self) -> Result<(Vec<u8>, DataLinkAddress)> {
        let mut buffer = [0u8; 1500];
        match self.socket.recv_from(&mut buffer) {
            Ok((len, source)) => {
                let data = &buffer[..len];
                if let Some(npdu) = self.process_bvlc6_message(data, source)? {
                    Ok((npdu, DataLinkAddress::Ipv6(source)))
                } else {
                    Err(DataLinkError::InvalidFrame)
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Err(DataLinkError::IoError(e))
            }
            Err(e) => Err(DataLinkError::IoError(e)),
        }
    }

    fn link_type(&self) -> DataLinkType {
        DataLinkType::BacnetIpv6
    }

    fn local_address(&self) -> DataLinkAddress {
        DataLinkAddress::Ipv6(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bvlc6_header_encode_decode() {
        let header = Bvlc6Header::new(Bvlc6Function::OriginalUnicastNpdu, 512);
        let encoded = header.encode();
        assert_eq!(encoded, vec![0x82, 0x01, 0x02, 0x00]);

        let decoded = Bvlc6Header::decode(&encoded).unwrap();
        assert_eq!(decoded.function, Bvlc6Function::OriginalUnicastNpdu);
        assert_eq!(decoded.length, 512);
    }

    #[test]
    fn test_bvlc6_header_rejects_wrong_type_byte() {
        let frame = [0x81, 0x01, 0x00, 0x04];
        assert!(Bvlc6Header::decode(&frame).is_err());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_bacnet_ipv6_creation() {
        let datalink = BacnetIpv6DataLink::new("[::1]:0").unwrap();
        assert_eq!(datalink.link_type(), DataLinkType::BacnetIpv6);
    }
}
