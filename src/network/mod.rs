//! BACnet Network Layer Module
//!
//! This module implements the network layer functionality for BACnet according to ASHRAE 135.
//! The network layer provides routing capabilities and enables communication between different
//! BACnet networks.
//!
//! # Overview
//!
//! The network layer is responsible for:
//! - Routing messages between different BACnet networks
//! - Network address translation
//! - Broadcast management
//! - Router discovery and management
//! - Network layer protocol messages (Who-Is-Router-To-Network, I-Am-Router-To-Network, etc.)
//!
//! # Network Layer Protocol Data Unit (NPDU)
//!
//! The NPDU contains:
//! - Protocol version
//! - Control information (priority, data expecting reply, etc.)
//! - Destination network address (DNET, DADR)
//! - Source network address (SNET, SADR)
//! - Hop count for routing
//!
//! # Example
//!
//! ```no_run
//! use bacnet_rs::network::*;
//!
//! // Example of creating a network message
//! let npdu = Npdu {
//!     version: 1,
//!     control: NpduControl::default(),
//!     destination: None,
//!     source: None,
//!     hop_count: None,
//! };
//! ```

#[cfg(feature = "std")]
use std::error::Error;

#[cfg(feature = "std")]
use std::fmt;

#[cfg(not(feature = "std"))]
use core::fmt;

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

/// Multi-port router core: split-horizon Who-Is/I-Am-Router-To-Network,
/// hop-count floor, and queue-and-retry route discovery.
#[cfg(feature = "std")]
pub mod router;

/// Result type for network operations
#[cfg(feature = "std")]
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(not(feature = "std"))]
pub type Result<T> = core::result::Result<T, NetworkError>;

/// Errors that can occur in network operations
#[derive(Debug)]
pub enum NetworkError {
    /// Invalid NPDU format
    InvalidNpdu(String),
    /// Routing error
    RoutingError(String),
    /// Network unreachable
    NetworkUnreachable(u16),
    /// Hop count exceeded
    HopCountExceeded,
    /// Invalid network address
    InvalidAddress,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::InvalidNpdu(msg) => write!(f, "Invalid NPDU: {}", msg),
            NetworkError::RoutingError(msg) => write!(f, "Routing error: {}", msg),
            NetworkError::NetworkUnreachable(net) => write!(f, "Network {} unreachable", net),
            NetworkError::HopCountExceeded => write!(f, "Hop count exceeded"),
            NetworkError::InvalidAddress => write!(f, "Invalid network address"),
        }
    }
}

#[cfg(feature = "std")]
impl Error for NetworkError {}

/// Network layer message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NetworkMessageType {
    WhoIsRouterToNetwork = 0x00,
    IAmRouterToNetwork = 0x01,
    ICouldBeRouterToNetwork = 0x02,
    RejectMessageToNetwork = 0x03,
    RouterBusyToNetwork = 0x04,
    RouterAvailableToNetwork = 0x05,
    InitializeRoutingTable = 0x06,
    InitializeRoutingTableAck = 0x07,
    EstablishConnectionToNetwork = 0x08,
    DisconnectConnectionToNetwork = 0x09,
    WhatIsNetworkNumber = 0x12,
    NetworkNumberIs = 0x13,
}

/// NPDU control flags
#[derive(Debug, Clone, Copy, Default)]
pub struct NpduControl {
    /// Network layer message
    pub network_message: bool,
    /// Destination specifier present
    pub destination_present: bool,
    /// Source specifier present
    pub source_present: bool,
    /// Data expecting reply
    pub expecting_reply: bool,
    /// Network priority (0-3)
    pub priority: u8,
}

impl NpduControl {
    /// Create control byte from flags
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.network_message {
            byte |= 0x80;
        }
        if self.destination_present {
            byte |= 0x20;
        }
        if self.source_present {
            byte |= 0x08;
        }
        if self.expecting_reply {
            byte |= 0x04;
        }
        byte |= self.priority & 0x03;
        byte
    }

    /// Parse control byte into flags
    pub fn from_byte(byte: u8) -> Self {
        Self {
            network_message: (byte & 0x80) != 0,
            destination_present: (byte & 0x20) != 0,
            source_present: (byte & 0x08) != 0,
            expecting_reply: (byte & 0x04) != 0,
            priority: byte & 0x03,
        }
    }
}

/// Network address (network number + MAC address)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct NetworkAddress {
    /// Network number (0 = local network, 65535 = broadcast)
    pub network: u16,
    /// MAC address on that network
    pub address: Vec<u8>,
}

impl NetworkAddress {
    /// Create a new network address
    pub fn new(network: u16, address: Vec<u8>) -> Self {
        Self { network, address }
    }

    /// Check if this is a broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.network == 0xFFFF
    }

    /// Check if this is a local network address
    pub fn is_local(&self) -> bool {
        self.network == 0
    }

    /// Construct a local-network address for the given MAC (e.g. a 6-byte
    /// BACnet/IP address+port or a single-byte MS/TP station).
    pub fn local(address: Vec<u8>) -> Self {
        Self { network: 0, address }
    }

    /// The global broadcast address (network 0xFFFF, no MAC).
    pub fn global_broadcast() -> Self {
        Self {
            network: 0xFFFF,
            address: Vec::new(),
        }
    }

    /// Parse a human-readable BACnet address of the form used by CLI tools
    /// and config files:
    ///
    /// - `*` — global broadcast
    /// - `net:*` — remote broadcast on network `net`
    /// - `[net:]host[:port]` — a unicast IPv4 BACnet/IP address
    /// - `[net:][ipv6]:port` — a unicast IPv6 BACnet/IP address (brackets
    ///   required around the literal when a port follows, matching standard
    ///   IPv6 URL syntax)
    /// - `[net:]aa:bb:cc:dd:ee:ff` — a bare hex MAC
    ///
    /// A missing port defaults to 47808 (0xBAC0) for IP forms.
    #[cfg(feature = "std")]
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(NetworkError::InvalidAddress);
        }

        if input == "*" {
            return Ok(Self::global_broadcast());
        }

        // Split off an optional leading "net:" prefix. IPv6 literals may
        // themselves contain ':', so only split on the first ':' when what
        // precedes it is entirely numeric.
        let (network, rest) = match input.find(':') {
            Some(idx) if input[..idx].chars().all(|c| c.is_ascii_digit()) && !input[..idx].is_empty() => {
                let network: u16 = input[..idx]
                    .parse()
                    .map_err(|_| NetworkError::InvalidAddress)?;
                (network, &input[idx + 1..])
            }
            _ => (0u16, input),
        };

        if rest == "*" {
            return Ok(Self {
                network,
                address: Vec::new(),
            });
        }

        let mac = Self::parse_mac(rest)?;
        Ok(Self { network, address: mac })
    }

    #[cfg(feature = "std")]
    fn parse_mac(rest: &str) -> Result<Vec<u8>> {
        use std::net::{SocketAddr, ToSocketAddrs};

        // Bare hex MAC, colon-separated octets (e.g. "aa:bb:cc:dd:ee:ff"),
        // with no dots (which would indicate an IPv4 literal instead).
        if !rest.contains('.') && !rest.contains('[') {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() > 1 && parts.iter().all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit())) {
                let mut mac = Vec::with_capacity(parts.len());
                for part in parts {
                    mac.push(u8::from_str_radix(part, 16).map_err(|_| NetworkError::InvalidAddress)?);
                }
                return Ok(mac);
            }
        }

        // Otherwise treat it as host[:port] or [ipv6]:port, defaulting the
        // port to the BACnet/IP well-known port.
        let with_port = if rest.contains(':') || rest.contains('[') {
            rest.to_string()
        } else {
            format!("{rest}:47808")
        };

        let addr: SocketAddr = with_port
            .to_socket_addrs()
            .map_err(|_| NetworkError::InvalidAddress)?
            .next()
            .ok_or(NetworkError::InvalidAddress)?;

        Ok(socket_addr_to_mac(addr))
    }
}

/// Encode a socket address into its BACnet/IP (6-byte) or BACnet/IPv6
/// (18-byte) MAC representation: address bytes followed by a 2-byte
/// big-endian port.
#[cfg(feature = "std")]
fn socket_addr_to_mac(addr: std::net::SocketAddr) -> Vec<u8> {
    match addr {
        std::net::SocketAddr::V4(v4) => {
            let mut mac = v4.ip().octets().to_vec();
            mac.extend_from_slice(&v4.port().to_be_bytes());
            mac
        }
        std::net::SocketAddr::V6(v6) => {
            let mut mac = v6.ip().octets().to_vec();
            mac.extend_from_slice(&v6.port().to_be_bytes());
            mac
        }
    }
}

/// Network Protocol Data Unit (NPDU)
#[derive(Debug, Clone)]
pub struct Npdu {
    /// Protocol version (always 1)
    pub version: u8,
    /// Control information
    pub control: NpduControl,
    /// Destination network address
    pub destination: Option<NetworkAddress>,
    /// Source network address
    pub source: Option<NetworkAddress>,
    /// Hop count (only present if destination is present)
    pub hop_count: Option<u8>,
}

impl Npdu {
    /// Create a new NPDU with default values
    pub fn new() -> Self {
        Self {
            version: 1,
            control: NpduControl::default(),
            destination: None,
            source: None,
            hop_count: None,
        }
    }

    /// Create NPDU for global broadcast (matching YABE/bacnet-stack)
    pub fn global_broadcast() -> Self {
        Self {
            version: 1,
            control: NpduControl {
                network_message: false,
                destination_present: true,
                source_present: false,
                expecting_reply: false, // YABE uses 0x20 (no expecting_reply bit)
                priority: 0,
            },
            destination: Some(NetworkAddress {
                network: 0xFFFF,
                address: vec![],
            }),
            source: None,
            hop_count: Some(255),
        }
    }

    /// Check if this is a network layer message
    pub fn is_network_message(&self) -> bool {
        self.control.network_message
    }
}

impl Npdu {
    /// Encode NPDU to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();

        // Version
        buffer.push(self.version);

        // Control byte
        buffer.push(self.control.to_byte());

        // Destination network address
        if let Some(ref dest) = self.destination {
            buffer.extend_from_slice(&dest.network.to_be_bytes());
            buffer.push(dest.address.len() as u8);
            buffer.extend_from_slice(&dest.address);
        }

        // Source network address
        if let Some(ref src) = self.source {
            buffer.extend_from_slice(&src.network.to_be_bytes());
            buffer.push(src.address.len() as u8);
            buffer.extend_from_slice(&src.address);
        }

        // Hop count (only if destination is present)
        if self.destination.is_some() {
            buffer.push(self.hop_count.unwrap_or(255));
        }

        buffer
    }

    /// Decode NPDU from bytes
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(NetworkError::InvalidNpdu("NPDU too short".to_string()));
        }

        let mut pos = 0;

        // Version
        let version = data[pos];
        pos += 1;

        if version != 1 {
            return Err(NetworkError::InvalidNpdu(format!(
                "Invalid NPDU version: {}",
                version
            )));
        }

        // Control byte
        let control = NpduControl::from_byte(data[pos]);
        pos += 1;

        // Destination network address
        let destination = if control.destination_present {
            if pos + 3 > data.len() {
                return Err(NetworkError::InvalidNpdu(
                    "Invalid destination address".to_string(),
                ));
            }

            let network = u16::from_be_bytes([data[pos], data[pos + 1]]);
            pos += 2;

            let addr_len = data[pos] as usize;
            pos += 1;

            if pos + addr_len > data.len() {
                return Err(NetworkError::InvalidNpdu(
                    "Invalid destination address length".to_string(),
                ));
            }

            let address = data[pos..pos + addr_len].to_vec();
            pos += addr_len;

            Some(NetworkAddress::new(network, address))
        } else {
            None
        };

        // Source network address
        let source = if control.source_present {
            if pos + 3 > data.len() {
                return Err(NetworkError::InvalidNpdu(
                    "Invalid source address".to_string(),
                ));
            }

            let network = u16::from_be_bytes([data[pos], data[pos + 1]]);
            pos += 2;

            let addr_len = data[pos] as usize;
            pos += 1;

            if pos + addr_len > data.len() {
                return Err(NetworkError::InvalidNpdu(
                    "Invalid source address length".to_string(),
                ));
            }

            let address = data[pos..pos + addr_len].to_vec();
            pos += addr_len;

            Some(NetworkAddress::new(network, address))
        } else {
            None
        };

        // Hop count (only if destination is present)
        let hop_count = if destination.is_some() {
            if pos >= data.len() {
                return Err(NetworkError::InvalidNpdu("Missing hop count".to_string()));
            }
            let hc = data[pos];
            pos += 1;
            Some(hc)
        } else {
            None
        };

        let npdu = Npdu {
            version,
            control,
            destination,
            source,
            hop_count,
        };

        Ok((npdu, pos))
    }
}

impl Default for Npdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Network layer message handling
pub struct NetworkLayerMessage {
    /// Message type
    pub message_type: NetworkMessageType,
    /// Message data
    pub data: Vec<u8>,
}

impl NetworkLayerMessage {
    /// Create a new network layer message
    pub fn new(message_type: NetworkMessageType, data: Vec<u8>) -> Self {
        Self { message_type, data }
    }

    /// Encode network layer message
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = vec![self.message_type as u8];
        buffer.extend_from_slice(&self.data);
        buffer
    }

    /// Decode network layer message
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(NetworkError::InvalidNpdu(
                "Empty network message".to_string(),
            ));
        }

        let message_type = match data[0] {
            0x00 => NetworkMessageType::WhoIsRouterToNetwork,
            0x01 => NetworkMessageType::IAmRouterToNetwork,
            0x02 => NetworkMessageType::ICouldBeRouterToNetwork,
            0x03 => NetworkMessageType::RejectMessageToNetwork,
            0x04 => NetworkMessageType::RouterBusyToNetwork,
            0x05 => NetworkMessageType::RouterAvailableToNetwork,
            0x06 => NetworkMessageType::InitializeRoutingTable,
            0x07 => NetworkMessageType::InitializeRoutingTableAck,
            0x08 => NetworkMessageType::EstablishConnectionToNetwork,
            0x09 => NetworkMessageType::DisconnectConnectionToNetwork,
            0x12 => NetworkMessageType::WhatIsNetworkNumber,
            0x13 => NetworkMessageType::NetworkNumberIs,
            _ => {
                return Err(NetworkError::InvalidNpdu(format!(
                    "Unknown network message type: {}",
                    data[0]
                )))
            }
        };

        let message_data = if data.len() > 1 {
            data[1..].to_vec()
        } else {
            Vec::new()
        };

        Ok(NetworkLayerMessage::new(message_type, message_data))
    }
}
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npdu_control() {
        let control = NpduControl {
            network_message: true,
            destination_present: false,
            source_present: true,
            expecting_reply: false,
            priority: 2,
        };

        let byte = control.to_byte();
        let decoded = NpduControl::from_byte(byte);

        assert_eq!(control.network_message, decoded.network_message);
        assert_eq!(control.destination_present, decoded.destination_present);
        assert_eq!(control.source_present, decoded.source_present);
        assert_eq!(control.expecting_reply, decoded.expecting_reply);
        assert_eq!(control.priority, decoded.priority);
    }

    #[test]
    fn test_npdu_encode_decode_basic() {
        let npdu = Npdu::new();
        let encoded = npdu.encode();
        let (decoded, consumed) = Npdu::decode(&encoded).unwrap();

        assert_eq!(decoded.version, 1);
        assert_eq!(consumed, 2); // version + control
        assert_eq!(decoded.destination, None);
        assert_eq!(decoded.source, None);
    }

    #[test]
    fn test_npdu_with_destination() {
        let mut npdu = Npdu::new();
        npdu.control.destination_present = true;
        npdu.destination = Some(NetworkAddress::new(100, vec![192, 168, 1, 1]));
        npdu.hop_count = Some(5);

        let encoded = npdu.encode();
        let (decoded, _) = Npdu::decode(&encoded).unwrap();

        assert_eq!(decoded.destination.as_ref().unwrap().network, 100);
        assert_eq!(
            decoded.destination.as_ref().unwrap().address,
            vec![192, 168, 1, 1]
        );
        assert_eq!(decoded.hop_count, Some(5));
    }

    #[test]
    fn test_network_message() {
        let message = NetworkLayerMessage::new(
            NetworkMessageType::WhoIsRouterToNetwork,
            vec![0x00, 0x64], // Network 100
        );

        let encoded = message.encode();
        let decoded = NetworkLayerMessage::decode(&encoded).unwrap();

        assert_eq!(
            decoded.message_type,
            NetworkMessageType::WhoIsRouterToNetwork
        );
        assert_eq!(decoded.data, vec![0x00, 0x64]);
    }

    #[test]
    fn test_network_address_properties() {
        let local_addr = NetworkAddress::new(0, vec![192, 168, 1, 1]);
        assert!(local_addr.is_local());
        assert!(!local_addr.is_broadcast());

        let broadcast_addr = NetworkAddress::new(0xFFFF, vec![]);
        assert!(broadcast_addr.is_broadcast());
        assert!(!broadcast_addr.is_local());

        let remote_addr = NetworkAddress::new(100, vec![10, 0, 0, 1]);
        assert!(!remote_addr.is_local());
        assert!(!remote_addr.is_broadcast());
    }
}
