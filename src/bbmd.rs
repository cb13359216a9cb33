//! BACnet Broadcast Management Device (BBMD) and foreign-device registration.
//!
//! BACnet/IP has no native broadcast across IP subnets, so Annex J defines
//! two cooperating roles:
//!
//! - A **BBMD** holds a Broadcast Distribution Table (BDT) of peer BBMDs and
//!   a Foreign Device Table (FDT) of devices that registered with it from
//!   outside the local subnet. When it sees a broadcast NPDU it wraps it in
//!   a Forwarded-NPDU and relays it to every other BDT peer and every live
//!   FDT entry, then delivers it locally.
//! - A **foreign device** is a BACnet/IP node outside the BBMD's subnet that
//!   registers with one BBMD (Register-Foreign-Device, re-sent at roughly
//!   half its TTL) so that the BBMD's relayed broadcasts reach it.
//!
//! [`Bbmd`] implements the first role, [`ForeignDeviceManager`] the second.
//! Both are poll-driven: nothing here spawns a task or owns a socket. A
//! caller feeds them inbound BVLC frames and drains outbound ones, the same
//! way [`crate::tsm::Tsm`] is driven from an event loop.

#[cfg(feature = "std")]
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

#[cfg(feature = "std")]
use crate::datalink::bip::{BdtEntry, BvlcFunction, BvlcHeader};

/// Errors raised while managing a BDT/FDT or a foreign-device registration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum BbmdError {
    #[cfg_attr(feature = "std", error("broadcast distribution table is full"))]
    BdtFull,
    #[cfg_attr(feature = "std", error("foreign device table is full"))]
    FdtFull,
    #[cfg_attr(feature = "std", error("frame too short to be a valid BVLC message"))]
    FrameTooShort,
    #[cfg_attr(
        feature = "std",
        error("cannot send a Distribute-Broadcast-To-Network while not registered")
    )]
    NotRegistered,
}

#[cfg(not(feature = "std"))]
impl core::fmt::Display for BbmdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A foreign device registered with this BBMD.
#[derive(Debug, Clone)]
#[cfg(feature = "std")]
struct ForeignDeviceEntry {
    address: SocketAddr,
    ttl: u16,
    registered_at: Instant,
}

#[cfg(feature = "std")]
impl ForeignDeviceEntry {
    /// Grace period beyond the registered TTL before an entry is evicted
    /// (Annex J.5.2.3 permits up to 30s of slack).
    fn expires_at(&self) -> Instant {
        self.registered_at + Duration::from_secs(self.ttl as u64 + 30)
    }
}

/// Instructions produced by feeding [`Bbmd`] an inbound frame, telling the
/// caller what to put on the wire. A single inbound broadcast can fan out
/// to many outbound sends, so this is a `Vec` rather than an `Option`.
#[derive(Debug, Clone)]
#[cfg(feature = "std")]
pub struct BbmdAction {
    pub frame: Vec<u8>,
    pub dest: SocketAddr,
}

/// Core BBMD relay logic: BDT, FDT, and the forwarding decision for
/// received broadcasts. Transport-agnostic — it produces [`BbmdAction`]s,
/// it does not own a socket.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct Bbmd {
    local_address: SocketAddr,
    bdt: Vec<BdtEntry>,
    fdt: Vec<ForeignDeviceEntry>,
    max_fdt_entries: usize,
}

#[cfg(feature = "std")]
impl Bbmd {
    pub fn new(local_address: SocketAddr) -> Self {
        Self {
            local_address,
            bdt: Vec::new(),
            fdt: Vec::new(),
            max_fdt_entries: 64,
        }
    }

    pub fn with_bdt(local_address: SocketAddr, bdt: Vec<BdtEntry>) -> Self {
        Self {
            local_address,
            bdt,
            fdt: Vec::new(),
            max_fdt_entries: 64,
        }
    }

    pub fn add_bdt_entry(&mut self, entry: BdtEntry) -> Result<(), BbmdError> {
        if self.bdt.iter().any(|e| e.address == entry.address) {
            return Ok(());
        }
        self.bdt.push(entry);
        Ok(())
    }

    pub fn remove_bdt_entry(&mut self, address: SocketAddr) {
        self.bdt.retain(|e| e.address != address);
    }

    pub fn foreign_device_count(&self) -> usize {
        self.fdt.len()
    }

    /// Drop FDT entries whose TTL (plus grace period) has elapsed. Call
    /// this periodically; registration does not expire itself.
    pub fn expire_foreign_devices(&mut self) {
        let now = Instant::now();
        self.fdt.retain(|e| e.expires_at() > now);
    }

    /// Handle a Register-Foreign-Device request. `ttl` of 0 deregisters.
    fn register_foreign_device(
        &mut self,
        source: SocketAddr,
        ttl: u16,
    ) -> Result<Vec<BbmdAction>, BbmdError> {
        if ttl == 0 {
            self.fdt.retain(|e| e.address != source);
            return Ok(Vec::new());
        }
        if let Some(existing) = self.fdt.iter_mut().find(|e| e.address == source) {
            existing.ttl = ttl;
            existing.registered_at = Instant::now();
        } else {
            if self.fdt.len() >= self.max_fdt_entries {
                return Err(BbmdError::FdtFull);
            }
            self.fdt.push(ForeignDeviceEntry {
                address: source,
                ttl,
                registered_at: Instant::now(),
            });
        }
        log::info!("foreign device {} registered, ttl={}s", source, ttl);
        Ok(vec![bvlc_result_action(source, BvlcResult::Success)])
    }

    /// Feed an inbound BVLC frame and get back the deliver-locally payload
    /// (if any) plus every outbound relay frame this should trigger.
    pub fn handle_frame(
        &mut self,
        data: &[u8],
        source: SocketAddr,
    ) -> Result<(Option<Vec<u8>>, Vec<BbmdAction>), BbmdError> {
        let header = BvlcHeader::decode(data).map_err(|_| BbmdError::FrameTooShort)?;
        if data.len() < 4 {
            return Err(BbmdError::FrameTooShort);
        }

        match header.function {
            BvlcFunction::OriginalBroadcastNpdu => {
                let npdu = &data[4..];
                let relays = self.forward_broadcast(npdu, source, source);
                Ok((Some(npdu.to_vec()), relays))
            }
            BvlcFunction::DistributeBroadcastToNetwork => {
                // Only a registered foreign device may ask us to broadcast
                // on its behalf (Annex J.5.2.4).
                if !self.fdt.iter().any(|e| e.address == source) {
                    return Ok((None, Vec::new()));
                }
                let npdu = &data[4..];
                let relays = self.forward_broadcast(npdu, source, source);
                Ok((Some(npdu.to_vec()), relays))
            }
            BvlcFunction::RegisterForeignDevice => {
                if data.len() < 6 {
                    return Err(BbmdError::FrameTooShort);
                }
                let ttl = u16::from_be_bytes([data[4], data[5]]);
                let relays = self.register_foreign_device(source, ttl)?;
                Ok((None, relays))
            }
            BvlcFunction::DeleteForeignDeviceTableEntry => {
                self.fdt.retain(|e| e.address != source);
                Ok((None, Vec::new()))
            }
            BvlcFunction::OriginalUnicastNpdu => Ok((Some(data[4..].to_vec()), Vec::new())),
            _ => Ok((None, Vec::new())),
        }
    }

    /// Build the Forwarded-NPDU relay set for a broadcast that arrived
    /// from `original_source`: every other BDT peer, and every live FDT
    /// entry, excluding whoever sent it to us.
    fn forward_broadcast(
        &self,
        npdu: &[u8],
        original_source: SocketAddr,
        received_from: SocketAddr,
    ) -> Vec<BbmdAction> {
        let mut frame = Vec::with_capacity(10 + npdu.len());
        frame.extend_from_slice(&BvlcHeader::new(BvlcFunction::ForwardedNpdu, (10 + npdu.len()) as u16).encode());
        encode_source_address(&mut frame, original_source);
        frame.extend_from_slice(npdu);

        let mut actions = Vec::new();
        for entry in &self.bdt {
            if entry.address != received_from && entry.address != self.local_address {
                actions.push(BbmdAction {
                    frame: frame.clone(),
                    dest: entry.address,
                });
            }
        }
        for entry in &self.fdt {
            if entry.address != received_from {
                actions.push(BbmdAction {
                    frame: frame.clone(),
                    dest: entry.address,
                });
            }
        }
        actions
    }
}

/// BVLC-Result codes (Annex J.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BvlcResult {
    Success = 0x0000,
    WriteBdtNak = 0x0010,
    ReadBdtNak = 0x0020,
    RegisterForeignDeviceNak = 0x0030,
    ReadFdtNak = 0x0040,
    DeleteFdtEntryNak = 0x0050,
    DistributeBroadcastToNetworkNak = 0x0060,
}

#[cfg(feature = "std")]
fn bvlc_result_action(dest: SocketAddr, result: BvlcResult) -> BbmdAction {
    let mut frame = BvlcHeader::new(BvlcFunction::Result, 6).encode();
    frame.extend_from_slice(&(result as u16).to_be_bytes());
    BbmdAction { frame, dest }
}

#[cfg(feature = "std")]
fn encode_source_address(frame: &mut Vec<u8>, addr: SocketAddr) {
    match addr {
        SocketAddr::V4(v4) => {
            frame.extend_from_slice(&v4.ip().octets());
            frame.extend_from_slice(&v4.port().to_be_bytes());
        }
        SocketAddr::V6(_) => {
            // BACnet/IP (Annex J) carries only IPv4 originating addresses;
            // an IPv6 BBMD peer would use BACnet/IPv6 (Annex U) instead.
            frame.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        }
    }
}

/// Client-side foreign-device registration, including periodic
/// re-registration. Drive it with [`ForeignDeviceManager::poll`] from the
/// same loop that polls [`crate::tsm::Tsm`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    Registering,
    Registered,
    Failed,
}

#[cfg(feature = "std")]
#[derive(Debug)]
pub struct ForeignDeviceManager {
    bbmd_address: SocketAddr,
    ttl: u16,
    state: RegistrationState,
    last_sent: Option<Instant>,
}

#[cfg(feature = "std")]
impl ForeignDeviceManager {
    pub fn new(bbmd_address: SocketAddr, ttl: u16) -> Self {
        Self {
            bbmd_address,
            ttl,
            state: RegistrationState::Idle,
            last_sent: None,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Build the initial Register-Foreign-Device frame and transition to
    /// `Registering`.
    pub fn start(&mut self) -> (Vec<u8>, SocketAddr) {
        self.state = RegistrationState::Registering;
        self.last_sent = Some(Instant::now());
        (self.registration_frame(), self.bbmd_address)
    }

    fn registration_frame(&self) -> Vec<u8> {
        let mut frame = BvlcHeader::new(BvlcFunction::RegisterForeignDevice, 6).encode();
        frame.extend_from_slice(&self.ttl.to_be_bytes());
        frame
    }

    /// Half the TTL, rounded down, per Annex J.5.2.3's re-registration
    /// recommendation; never zero so we don't spin.
    fn re_registration_interval(&self) -> Duration {
        Duration::from_secs((self.ttl as u64 / 2).max(1))
    }

    /// Called periodically; returns a re-registration frame to send if one
    /// is due.
    pub fn poll(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        if self.state != RegistrationState::Registered && self.state != RegistrationState::Registering {
            return None;
        }
        let due = self
            .last_sent
            .map(|t| t.elapsed() >= self.re_registration_interval())
            .unwrap_or(true);
        if due {
            self.last_sent = Some(Instant::now());
            Some((self.registration_frame(), self.bbmd_address))
        } else {
            None
        }
    }

    /// Feed a BVLC-Result reply back in.
    pub fn handle_bvlc_result(&mut self, result: BvlcResult) {
        self.state = match result {
            BvlcResult::Success => RegistrationState::Registered,
            _ => RegistrationState::Failed,
        };
    }

    /// Build a Delete-Foreign-Device-Table-Entry and go idle.
    pub fn stop(&mut self) -> (Vec<u8>, SocketAddr) {
        self.state = RegistrationState::Idle;
        let frame = BvlcHeader::new(BvlcFunction::DeleteForeignDeviceTableEntry, 4).encode();
        (frame, self.bbmd_address)
    }

    /// Wrap an NPDU as Distribute-Broadcast-To-Network, refusing while not
    /// registered (Annex J.5.2.4 requires an active registration).
    pub fn send_distribute_broadcast(&self, npdu: &[u8]) -> Result<(Vec<u8>, SocketAddr), BbmdError> {
        if self.state != RegistrationState::Registered {
            return Err(BbmdError::NotRegistered);
        }
        let mut frame =
            BvlcHeader::new(BvlcFunction::DistributeBroadcastToNetwork, (4 + npdu.len()) as u16).encode();
        frame.extend_from_slice(npdu);
        Ok((frame, self.bbmd_address))
    }
}

#[cfg(test)]
#[cfg(feature = "std")]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn register_foreign_device_adds_entry() {
        let mut bbmd = Bbmd::new(addr("10.0.0.1:47808"));
        let mut frame = BvlcHeader::new(BvlcFunction::RegisterForeignDevice, 6).encode();
        frame.extend_from_slice(&600u16.to_be_bytes());

        let (payload, actions) = bbmd.handle_frame(&frame, addr("192.0.2.5:47808")).unwrap();
        assert!(payload.is_none());
        assert_eq!(actions.len(), 1);
        assert_eq!(bbmd.foreign_device_count(), 1);
    }

    #[test]
    fn deregister_with_zero_ttl_removes_entry() {
        let mut bbmd = Bbmd::new(addr("10.0.0.1:47808"));
        let source = addr("192.0.2.5:47808");
        let mut frame = BvlcHeader::new(BvlcFunction::RegisterForeignDevice, 6).encode();
        frame.extend_from_slice(&600u16.to_be_bytes());
        bbmd.handle_frame(&frame, source).unwrap();
        assert_eq!(bbmd.foreign_device_count(), 1);

        let mut zero_frame = BvlcHeader::new(BvlcFunction::RegisterForeignDevice, 6).encode();
        zero_frame.extend_from_slice(&0u16.to_be_bytes());
        bbmd.handle_frame(&zero_frame, source).unwrap();
        assert_eq!(bbmd.foreign_device_count(), 0);
    }

    #[test]
    fn broadcast_forwards_to_bdt_peers_except_sender() {
        let peer_a = addr("10.0.0.2:47808");
        let peer_b = addr("10.0.0.3:47808");
        let mut bbmd = Bbmd::with_bdt(
            addr("10.0.0.1:47808"),
            vec![
                BdtEntry { address: peer_a, mask: [255, 255, 255, 0] },
                BdtEntry { address: peer_b, mask: [255, 255, 255, 0] },
            ],
        );

        let npdu = vec![0x01, 0x20, 0x00, 0x00, 0x00];
        let mut frame = BvlcHeader::new(BvlcFunction::OriginalBroadcastNpdu, (4 + npdu.len()) as u16).encode();
        frame.extend_from_slice(&npdu);

        let (delivered, actions) = bbmd.handle_frame(&frame, peer_a).unwrap();
        assert_eq!(delivered, Some(npdu));
        // Forwarded to peer_b only; peer_a is the sender and is excluded.
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].dest, peer_b);
    }

    #[test]
    fn distribute_broadcast_requires_registration() {
        let manager = ForeignDeviceManager::new(addr("10.0.0.1:47808"), 600);
        assert_eq!(
            manager.send_distribute_broadcast(&[0x01]),
            Err(BbmdError::NotRegistered)
        );
    }

    #[test]
    fn foreign_device_manager_registers_and_redistributes() {
        let mut manager = ForeignDeviceManager::new(addr("10.0.0.1:47808"), 600);
        let (_, dest) = manager.start();
        assert_eq!(dest, addr("10.0.0.1:47808"));
        assert_eq!(manager.state(), RegistrationState::Registering);

        manager.handle_bvlc_result(BvlcResult::Success);
        assert_eq!(manager.state(), RegistrationState::Registered);

        let (frame, _) = manager.send_distribute_broadcast(&[0xAA, 0xBB]).unwrap();
        assert!(frame.ends_with(&[0xAA, 0xBB]));
    }

    #[test]
    fn poll_does_not_resend_before_half_ttl() {
        let mut manager = ForeignDeviceManager::new(addr("10.0.0.1:47808"), 600);
        manager.start();
        manager.handle_bvlc_result(BvlcResult::Success);
        assert!(manager.poll().is_none());
    }
}
