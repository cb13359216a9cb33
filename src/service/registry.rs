//! Dispatch table that routes incoming confirmed and unconfirmed service
//! requests to application-supplied handlers.
//!
//! A confirmed request with no registered handler is rejected with
//! [`RejectReason::UnrecognizedService`]. An unconfirmed request with no
//! registered handler is silently dropped, per ASHRAE 135 Clause 5.4.2 —
//! unconfirmed services never produce a reply of any kind.

use super::{ConfirmedServiceChoice, RejectReason, ServiceError, UnconfirmedServiceChoice};
use crate::network::NetworkAddress;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, collections::BTreeMap as HashMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::HashMap;

/// A confirmed handler receives the invoke id, the raw service-argument
/// bytes, and the peer address, and returns either the encoded reply payload
/// (for a ComplexAck) or `None` (the caller emits a bare SimpleAck).
pub type ConfirmedHandler = Box<
    dyn Fn(u8, &[u8], &NetworkAddress) -> Result<Option<Vec<u8>>, ServiceError> + Send + Sync,
>;

/// An unconfirmed handler receives the raw service-argument bytes and the
/// peer address; its return value is ignored (there is nothing to reply
/// with).
pub type UnconfirmedHandler = Box<dyn Fn(&[u8], &NetworkAddress) + Send + Sync>;

/// Holds the confirmed/unconfirmed handler tables an application registers
/// its service implementations into. One registry is shared by the
/// transaction state machine for the lifetime of a device.
#[derive(Default)]
pub struct ServiceRegistry {
    confirmed: HashMap<u8, ConfirmedHandler>,
    unconfirmed: HashMap<u8, UnconfirmedHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            confirmed: HashMap::new(),
            unconfirmed: HashMap::new(),
        }
    }

    pub fn register_confirmed(&mut self, choice: ConfirmedServiceChoice, handler: ConfirmedHandler) {
        self.confirmed.insert(choice as u8, handler);
    }

    pub fn register_unconfirmed(&mut self, choice: UnconfirmedServiceChoice, handler: UnconfirmedHandler) {
        self.unconfirmed.insert(choice as u8, handler);
    }

    /// Dispatch a confirmed-request APDU payload to its registered handler.
    ///
    /// Returns `Err(ServiceError::Rejected(RejectReason::UnrecognizedService))`
    /// when no handler has been registered for `service_choice` — the caller
    /// is expected to turn that into a Reject-PDU back to the requester.
    pub fn dispatch_confirmed(
        &self,
        service_choice: u8,
        invoke_id: u8,
        args: &[u8],
        source: &NetworkAddress,
    ) -> Result<Option<Vec<u8>>, ServiceError> {
        match self.confirmed.get(&service_choice) {
            Some(handler) => handler(invoke_id, args, source),
            None => Err(ServiceError::Rejected(RejectReason::UnrecognizedService)),
        }
    }

    /// Dispatch an unconfirmed-request APDU payload. A missing handler is
    /// not an error — the request is simply ignored.
    pub fn dispatch_unconfirmed(&self, service_choice: u8, args: &[u8], source: &NetworkAddress) {
        if let Some(handler) = self.unconfirmed.get(&service_choice) {
            handler(args, source);
        }
    }

    pub fn has_confirmed_handler(&self, service_choice: u8) -> bool {
        self.confirmed.contains_key(&service_choice)
    }

    pub fn has_unconfirmed_handler(&self, service_choice: u8) -> bool {
        self.unconfirmed.contains_key(&service_choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatch_confirmed_without_handler_rejects() {
        let registry = ServiceRegistry::new();
        let addr = NetworkAddress::local(vec![1, 2, 3, 4, 0xBA, 0xC0]);
        let result = registry.dispatch_confirmed(ConfirmedServiceChoice::ReadProperty as u8, 1, &[], &addr);
        assert!(matches!(
            result,
            Err(ServiceError::Rejected(RejectReason::UnrecognizedService))
        ));
    }

    #[test]
    fn dispatch_unconfirmed_without_handler_is_silent() {
        let registry = ServiceRegistry::new();
        let addr = NetworkAddress::local(vec![1, 2, 3, 4, 0xBA, 0xC0]);
        registry.dispatch_unconfirmed(UnconfirmedServiceChoice::WhoIs as u8, &[], &addr);
    }

    #[test]
    fn registered_confirmed_handler_is_invoked() {
        let mut registry = ServiceRegistry::new();
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        registry.register_confirmed(
            ConfirmedServiceChoice::ReadProperty,
            Box::new(move |_invoke_id, _args, _source| {
                called_clone.store(true, Ordering::SeqCst);
                Ok(None)
            }),
        );

        let addr = NetworkAddress::local(vec![1, 2, 3, 4, 0xBA, 0xC0]);
        let result = registry.dispatch_confirmed(ConfirmedServiceChoice::ReadProperty as u8, 7, &[], &addr);
        assert!(result.is_ok());
        assert!(called.load(Ordering::SeqCst));
    }
}
