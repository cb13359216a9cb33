//! APDU segmentation and reassembly (ASHRAE 135 Clause 5.4) — the sliding
//! window protocol that carries an APDU larger than a peer's MTU across
//! several segments.
//!
//! [`crate::app::SegmentationManager`] reassembles segments unconditionally
//! (whatever arrives, in whatever order, is concatenated once the "no more
//! follows" segment turns up) — fine for a reliable link, wrong for an
//! unreliable datagram substrate. This module replaces that with the full
//! window protocol: bounded window, modular sequence-number comparison,
//! duplicate/out-of-window handling, and timeout-driven retransmission of
//! an entire outstanding window.
//!
//! A fresh transfer — including one re-established after an abort — always
//! starts from the locally configured window size, never a size negotiated
//! by a prior, now-dead transfer.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::service::AbortReason;

/// Default window size proposed at the start of a segmented transfer
/// (ASHRAE 135 Clause 5.4.1 suggests values up to 127; most stacks default
/// to a modest value to bound buffering on constrained peers).
pub const DEFAULT_PROPOSED_WINDOW_SIZE: u8 = 16;

/// Header overhead subtracted from a peer's MTU for a segment belonging to
/// a Confirmed-Request-PDU (PDU type/flags byte, max-segments/max-apdu
/// byte, invoke-id, sequence-number, proposed-window-size, service-choice).
pub const CONFIRMED_REQUEST_SEGMENT_OVERHEAD: usize = 5;

/// Header overhead subtracted from a peer's MTU for a segment belonging to
/// a ComplexAck-PDU (PDU type/flags byte, invoke-id, sequence-number,
/// proposed-window-size, service-choice).
pub const COMPLEX_ACK_SEGMENT_OVERHEAD: usize = 4;

/// Maximum number of segments a single transfer may be split into
/// (an 8-bit modular sequence space).
pub const MAX_SEGMENTS: usize = 256;

/// Errors a segmented transfer can terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationError {
    /// The payload requires more than [`MAX_SEGMENTS`] segments at the
    /// negotiated window/MTU; refused at setup rather than attempted.
    TooManySegments,
    /// Two successive segment-ack timeouts; the transfer is abandoned.
    SegmentationTimeout,
    /// A segment arrived outside the current window.
    InvalidApduInThisState,
    /// A peer proposed a window size outside `1..=127`.
    WindowSizeOutOfRange,
}

impl SegmentationError {
    /// The Abort-PDU reason this failure maps to.
    pub fn abort_reason(&self) -> AbortReason {
        match self {
            SegmentationError::TooManySegments => AbortReason::ApduTooLong,
            SegmentationError::SegmentationTimeout => AbortReason::TsmTimeout,
            SegmentationError::InvalidApduInThisState => AbortReason::InvalidApduInThisState,
            SegmentationError::WindowSizeOutOfRange => AbortReason::WindowSizeOutOfRange,
        }
    }
}

#[cfg(feature = "std")]
impl std::fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SegmentationError {}

/// Modular-arithmetic "is `value` within the window `[base, base+size)`"
/// test used by both halves of the protocol:
/// `(value - base) mod 256 < window_size`.
pub fn in_window(value: u8, base: u8, window_size: u8) -> bool {
    let distance = value.wrapping_sub(base);
    (distance as u32) < window_size as u32
}

/// A segment whose sequence number lies behind the current window base —
/// already received and acknowledged in an earlier window. Window sizes
/// are bounded to 127, so "behind" is unambiguous: the modular distance
/// interpreted as signed is negative.
pub fn duplicate_in_window(value: u8, base: u8) -> bool {
    (value.wrapping_sub(base) as i8) < 0
}

/// How many segments a payload will require at `max_segment_payload` bytes
/// per segment, refusing transfers that would need more than
/// [`MAX_SEGMENTS`].
pub fn check_segment_count(
    payload_len: usize,
    max_segment_payload: usize,
) -> Result<usize, SegmentationError> {
    if max_segment_payload == 0 {
        return Err(SegmentationError::TooManySegments);
    }
    let count = payload_len.div_ceil(max_segment_payload).max(1);
    if count > MAX_SEGMENTS {
        Err(SegmentationError::TooManySegments)
    } else {
        Ok(count)
    }
}

/// The payload bytes available per segment once header overhead for the
/// given PDU kind is subtracted from the peer's advertised MTU.
pub fn compute_max_segment_payload(peer_mtu: usize, overhead: usize) -> usize {
    peer_mtu.saturating_sub(overhead)
}

/// Split `data` into `max_segment_payload`-byte chunks. Always returns at
/// least one (possibly empty) segment, matching
/// `SegmentationManager::segment_message` for the zero-length case.
pub fn split_payload(data: &[u8], max_segment_payload: usize) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    let payload = max_segment_payload.max(1);
    data.chunks(payload).map(|c| c.to_vec()).collect()
}

/// What a caller should do after feeding an event into [`SegmentSender`] or
/// [`SegmentReceiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentAction {
    /// Send these `(sequence_number, payload)` segments now and (re)arm the
    /// segment-ack timer.
    Send(Vec<(u8, Vec<u8>)>),
    /// Emit a SegmentAck with this `(sequence_number, actual_window_size,
    /// negative)`.
    Ack { sequence_number: u8, actual_window_size: u8, negative: bool },
    /// Nothing to do yet (e.g. a duplicate segment was silently dropped).
    None,
    /// The full payload has been reassembled and should be delivered
    /// upward.
    Complete(Vec<u8>),
    /// The transfer failed; abort the transaction with this reason.
    Abort(SegmentationError),
}

/// Sender half of a segmented transfer: splits a payload into segments and
/// drives a sliding window across them.
#[derive(Debug)]
pub struct SegmentSender {
    segments: Vec<Vec<u8>>,
    window_size: u8,
    /// Base sequence number of the current outstanding window (lowest
    /// unacknowledged segment).
    base: u8,
    retries_left: u8,
    sent_once: bool,
}

impl SegmentSender {
    /// Build a sender for `payload`, negotiating the smaller of the local
    /// and peer-advertised window sizes — both parties honor the smaller
    /// of their advertised values.
    pub fn new(
        payload: &[u8],
        peer_mtu: usize,
        local_window: u8,
        peer_window: u8,
        overhead: usize,
        retries: u8,
    ) -> Result<Self, SegmentationError> {
        if local_window == 0 || local_window > 127 || peer_window == 0 || peer_window > 127 {
            return Err(SegmentationError::WindowSizeOutOfRange);
        }
        let max_payload = compute_max_segment_payload(peer_mtu, overhead);
        check_segment_count(payload.len(), max_payload)?;
        let segments = split_payload(payload, max_payload);
        Ok(Self {
            segments,
            window_size: local_window.min(peer_window),
            base: 0,
            retries_left: retries,
            sent_once: false,
        })
    }

    pub fn total_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn window_size(&self) -> u8 {
        self.window_size
    }

    /// The segments of the currently outstanding window, each paired with
    /// whether it is the transfer's last segment (`more_follows = false`).
    fn current_window(&self) -> Vec<(u8, Vec<u8>)> {
        let mut out = Vec::new();
        for i in 0..self.window_size as usize {
            let seq = self.base.wrapping_add(i as u8);
            let index = self.base as usize + i;
            if index >= self.segments.len() {
                break;
            }
            out.push((seq, self.segments[index].clone()));
        }
        out
    }

    /// Begin (or resume, on retransmit) transmission of the current window.
    pub fn send_window(&mut self) -> SegmentAction {
        self.sent_once = true;
        SegmentAction::Send(self.current_window())
    }

    pub fn is_complete(&self) -> bool {
        self.base as usize >= self.segments.len()
    }

    /// Feed a SegmentAck from the peer. Advances the window base past the
    /// acknowledged sequence number (clamped to the peer's actual window
    /// size), and either reports completion, arms the next window, or
    /// treats a negative ack as a request to resend the outstanding window.
    pub fn on_segment_ack(
        &mut self,
        sequence_number: u8,
        actual_window_size: u8,
        negative: bool,
    ) -> SegmentAction {
        if negative {
            return self.send_window();
        }
        let last_sent = self.base.wrapping_add(
            (self.current_window().len().saturating_sub(1)) as u8,
        );
        if !in_window(sequence_number, self.base, self.window_size) && sequence_number != last_sent.wrapping_add(1) {
            // Ack for a segment we haven't sent in this window; ignore.
            return SegmentAction::None;
        }
        let advance = sequence_number.wrapping_sub(self.base).wrapping_add(1) as usize;
        self.base = self.base.wrapping_add(advance.min(self.segments.len()) as u8);
        if actual_window_size > 0 {
            self.window_size = self.window_size.min(actual_window_size);
        }
        self.retries_left = self.retries_left.max(1);
        if self.is_complete() {
            SegmentAction::None
        } else {
            self.send_window()
        }
    }

    /// The segment-ack timer fired with no ack received. One retransmit of
    /// the full window is allowed; a second consecutive timeout aborts.
    pub fn on_timeout(&mut self) -> SegmentAction {
        if !self.sent_once {
            return self.send_window();
        }
        if self.retries_left == 0 {
            return SegmentAction::Abort(SegmentationError::SegmentationTimeout);
        }
        self.retries_left -= 1;
        self.send_window()
    }
}

/// Receiver half of a segmented transfer: accepts segments within the
/// current window, discards duplicates, and aborts on an out-of-window
/// segment (a gap the sender will never fill because it has already moved
/// its own window forward).
#[derive(Debug)]
pub struct SegmentReceiver {
    window_size: u8,
    base: u8,
    payload: Vec<u8>,
    received_in_window: Vec<bool>,
    aborted: bool,
}

impl SegmentReceiver {
    /// `advertised_window` is this receiver's own configured window size;
    /// the ack it emits never exceeds it, matching the sender's advertised
    /// value being honored symmetrically in the other direction.
    pub fn new(advertised_window: u8) -> Self {
        Self {
            window_size: advertised_window.clamp(1, 127),
            base: 0,
            payload: Vec::new(),
            received_in_window: vec![false; advertised_window.clamp(1, 127) as usize],
            aborted: false,
        }
    }

    pub fn window_size(&self) -> u8 {
        self.window_size
    }

    /// Process one inbound segment.
    pub fn accept_segment(
        &mut self,
        sequence_number: u8,
        data: &[u8],
        more_follows: bool,
    ) -> SegmentAction {
        if self.aborted {
            return SegmentAction::None;
        }
        if !in_window(sequence_number, self.base, self.window_size) {
            self.aborted = true;
            return SegmentAction::Abort(SegmentationError::InvalidApduInThisState);
        }
        let slot = sequence_number.wrapping_sub(self.base) as usize;
        if self.received_in_window.get(slot).copied().unwrap_or(false) {
            // Idempotent duplicate: nothing changes, no new ack needed
            // beyond what was already sent for this segment.
            return SegmentAction::None;
        }
        if slot >= self.received_in_window.len() {
            self.received_in_window.resize(slot + 1, false);
        }
        self.received_in_window[slot] = true;
        self.payload.extend_from_slice(data);

        if !more_follows {
            let all_prior_received = (0..=slot).all(|i| self.received_in_window[i]);
            if all_prior_received {
                return SegmentAction::Complete(core::mem::take(&mut self.payload));
            }
        }

        // Window fully received (all slots up to window_size filled):
        // slide forward and ack.
        let window_full = self
            .received_in_window
            .iter()
            .take(self.window_size as usize)
            .all(|r| *r);
        if window_full || !more_follows {
            let advanced_by = if window_full {
                self.window_size
            } else {
                (slot + 1) as u8
            };
            self.base = self.base.wrapping_add(advanced_by);
            self.received_in_window = vec![false; self.window_size as usize];
            SegmentAction::Ack {
                sequence_number,
                actual_window_size: self.window_size,
                negative: false,
            }
        } else {
            SegmentAction::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_window_wraps_modularly() {
        assert!(in_window(5, 0, 16));
        assert!(!in_window(16, 0, 16));
        assert!(in_window(2, 250, 16)); // wraps past 255
        assert!(!in_window(20, 250, 16));
    }

    #[test]
    fn split_and_check_segment_count_round_trip() {
        let data = vec![7u8; 4000];
        let max_payload = compute_max_segment_payload(1476, CONFIRMED_REQUEST_SEGMENT_OVERHEAD);
        let count = check_segment_count(data.len(), max_payload).unwrap();
        let segments = split_payload(&data, max_payload);
        assert_eq!(segments.len(), count);
        let reassembled: Vec<u8> = segments.into_iter().flatten().collect();
        assert_eq!(reassembled, data);
    }

    #[test]
    fn too_many_segments_is_refused_at_setup() {
        let data = vec![0u8; 1_000_000];
        let err = SegmentSender::new(&data, 50, 16, 16, CONFIRMED_REQUEST_SEGMENT_OVERHEAD, 2)
            .unwrap_err();
        assert_eq!(err, SegmentationError::TooManySegments);
    }

    #[test]
    fn sender_receiver_round_trip_for_any_window() {
        for window in [1u8, 2, 16, 127] {
            let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
            let mut sender = SegmentSender::new(
                &data,
                480,
                window,
                window,
                CONFIRMED_REQUEST_SEGMENT_OVERHEAD,
                2,
            )
            .unwrap();
            let mut receiver = SegmentReceiver::new(window);
            let mut reassembled = None;

            let SegmentAction::Send(mut pending) = sender.send_window() else {
                panic!("expected Send")
            };
            let total = sender.total_segments();
            loop {
                let mut next_pending = Vec::new();
                for (seq, payload) in pending {
                    let more_follows = (seq as usize) + 1 < total;
                    match receiver.accept_segment(seq, &payload, more_follows) {
                        SegmentAction::Ack {
                            sequence_number,
                            actual_window_size,
                            negative,
                        } => {
                            if let SegmentAction::Send(more) =
                                sender.on_segment_ack(sequence_number, actual_window_size, negative)
                            {
                                next_pending = more;
                            }
                        }
                        SegmentAction::Complete(payload) => {
                            reassembled = Some(payload);
                        }
                        SegmentAction::Abort(e) => panic!("unexpected abort: {e:?}"),
                        SegmentAction::None => {}
                        SegmentAction::Send(_) => unreachable!(),
                    }
                }
                if reassembled.is_some() || next_pending.is_empty() {
                    break;
                }
                pending = next_pending;
            }

            assert_eq!(reassembled, Some(data.clone()), "window size {window}");
        }
    }

    #[test]
    fn duplicate_segment_is_idempotent() {
        let mut receiver = SegmentReceiver::new(4);
        let action1 = receiver.accept_segment(0, b"abc", true);
        let action2 = receiver.accept_segment(0, b"abc", true);
        assert!(matches!(action1, SegmentAction::Complete(_)));
        assert_eq!(action2, SegmentAction::None);
    }

    #[test]
    fn out_of_window_segment_aborts_once() {
        let mut receiver = SegmentReceiver::new(2);
        let action = receiver.accept_segment(10, b"late", true);
        assert_eq!(
            action,
            SegmentAction::Abort(SegmentationError::InvalidApduInThisState)
        );
        // No further segments are processed for this transfer.
        assert_eq!(receiver.accept_segment(0, b"abc", true), SegmentAction::None);
    }

    #[test]
    fn sender_retransmits_once_then_aborts_on_second_timeout() {
        let data = vec![1u8; 100];
        let mut sender =
            SegmentSender::new(&data, 480, 16, 16, CONFIRMED_REQUEST_SEGMENT_OVERHEAD, 1).unwrap();
        let _ = sender.send_window();
        let retransmit = sender.on_timeout();
        assert!(matches!(retransmit, SegmentAction::Send(_)));
        let aborted = sender.on_timeout();
        assert_eq!(
            aborted,
            SegmentAction::Abort(SegmentationError::SegmentationTimeout)
        );
    }

    #[test]
    fn fresh_transfer_does_not_inherit_prior_window_size() {
        // A re-established transfer after an abort starts at the
        // configured window, never whatever the dead transfer last
        // negotiated down to.
        let data = vec![1u8; 100];
        let mut sender =
            SegmentSender::new(&data, 480, 16, 4, CONFIRMED_REQUEST_SEGMENT_OVERHEAD, 1).unwrap();
        assert_eq!(sender.window_size(), 4);
        let _ = sender.send_window();
        let _ = sender.on_segment_ack(sender.window_size() - 1, 1, false);
        assert_eq!(sender.window_size(), 1);

        // New sender for the re-established transfer: configured window
        // (16, 16) again, not the negotiated-down value of 1.
        let fresh = SegmentSender::new(&data, 480, 16, 16, CONFIRMED_REQUEST_SEGMENT_OVERHEAD, 1)
            .unwrap();
        assert_eq!(fresh.window_size(), 16);
    }
}
