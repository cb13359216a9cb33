//! Application error taxonomy (ASHRAE 135 Clause 18) and the typed PDU
//! payloads the transaction state machine raises to callers and serializes
//! to the wire.
//!
//! Five kinds of failure reach a caller of the [`crate::client`] API:
//! an [`ApplicationError`] (a recognized `(ErrorClass, ErrorCode)` pair,
//! parsed from or serialized to an Error-PDU), a [`BacnetReject`] (a
//! locally-generated protocol syntax fault, never retried), a
//! [`BacnetAbort`] (a transaction-level failure either side may raise), a
//! timeout once retries are exhausted, or a transport error. The first
//! three are modeled here as `std::error::Error` types so [`crate::tsm`]
//! can serialize them to the matching PDU and [`crate::client`] can
//! propagate them unchanged to the caller.

#[cfg(feature = "std")]
use std::fmt;

#[cfg(not(feature = "std"))]
use core::fmt;

use super::{AbortReason, RejectReason};

/// BACnet error class (Clause 18, `BACnetErrorClass`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorClass {
    Device = 0,
    Object = 1,
    Property = 2,
    Resources = 3,
    Security = 4,
    Services = 5,
    Vt = 6,
    Communication = 7,
}

impl TryFrom<u32> for ErrorClass {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(Self::Device),
            1 => Ok(Self::Object),
            2 => Ok(Self::Property),
            3 => Ok(Self::Resources),
            4 => Ok(Self::Security),
            5 => Ok(Self::Services),
            6 => Ok(Self::Vt),
            7 => Ok(Self::Communication),
            _ => Err(()),
        }
    }
}

/// BACnet error code (Clause 18, `BACnetErrorCode`) — the subset actually
/// produced by the services this stack dispatches (object access, property
/// access, device management). Unrecognized wire values round-trip through
/// [`ErrorCode::Other`] rather than failing to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Other(u32),
    UnknownObject,
    UnknownProperty,
    UnsupportedObjectType,
    ReadAccessDenied,
    WriteAccessDenied,
    InvalidDataType,
    InvalidArrayIndex,
    PropertyIsNotAnArray,
    ValueOutOfRange,
    NoSpaceForObject,
    NoSpaceToAddListElement,
    NoSpaceToWriteProperty,
    ConfigurationInProgress,
    DeviceBusy,
    OperationalProblem,
    ServiceRequestDenied,
    TimeoutGeneric,
    FileAccessDenied,
    InconsistentParameters,
    InvalidConfigurationData,
    CharacterSetNotSupported,
}

impl ErrorCode {
    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::Other(c) => *c,
            ErrorCode::UnknownObject => 31,
            ErrorCode::UnknownProperty => 32,
            ErrorCode::UnsupportedObjectType => 24,
            ErrorCode::ReadAccessDenied => 27,
            ErrorCode::WriteAccessDenied => 40,
            ErrorCode::InvalidDataType => 9,
            ErrorCode::InvalidArrayIndex => 42,
            ErrorCode::PropertyIsNotAnArray => 50,
            ErrorCode::ValueOutOfRange => 37,
            ErrorCode::NoSpaceForObject => 45,
            ErrorCode::NoSpaceToAddListElement => 46,
            ErrorCode::NoSpaceToWriteProperty => 47,
            ErrorCode::ConfigurationInProgress => 2,
            ErrorCode::DeviceBusy => 3,
            ErrorCode::OperationalProblem => 25,
            ErrorCode::ServiceRequestDenied => 29,
            ErrorCode::TimeoutGeneric => 38,
            ErrorCode::FileAccessDenied => 5,
            ErrorCode::InconsistentParameters => 7,
            ErrorCode::InvalidConfigurationData => 46,
            ErrorCode::CharacterSetNotSupported => 41,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            31 => ErrorCode::UnknownObject,
            32 => ErrorCode::UnknownProperty,
            24 => ErrorCode::UnsupportedObjectType,
            27 => ErrorCode::ReadAccessDenied,
            40 => ErrorCode::WriteAccessDenied,
            9 => ErrorCode::InvalidDataType,
            42 => ErrorCode::InvalidArrayIndex,
            50 => ErrorCode::PropertyIsNotAnArray,
            37 => ErrorCode::ValueOutOfRange,
            45 => ErrorCode::NoSpaceForObject,
            2 => ErrorCode::ConfigurationInProgress,
            3 => ErrorCode::DeviceBusy,
            25 => ErrorCode::OperationalProblem,
            29 => ErrorCode::ServiceRequestDenied,
            38 => ErrorCode::TimeoutGeneric,
            5 => ErrorCode::FileAccessDenied,
            7 => ErrorCode::InconsistentParameters,
            41 => ErrorCode::CharacterSetNotSupported,
            other => ErrorCode::Other(other),
        }
    }
}

/// A recognized `(error-class, error-code)` pair — raised by a service
/// handler, serialized to an Error-PDU outbound, or parsed from one inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationError {
    pub error_class: ErrorClass,
    pub error_code: ErrorCode,
}

impl ApplicationError {
    pub fn new(error_class: ErrorClass, error_code: ErrorCode) -> Self {
        Self {
            error_class,
            error_code,
        }
    }

    pub fn unknown_object() -> Self {
        Self::new(ErrorClass::Object, ErrorCode::UnknownObject)
    }

    pub fn unknown_property() -> Self {
        Self::new(ErrorClass::Property, ErrorCode::UnknownProperty)
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {:?} (code {})",
            self.error_class,
            self.error_code,
            self.error_code.code()
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ApplicationError {}

/// A Reject-PDU, either received from a peer or about to be sent to one.
/// Rejects are always locally generated by the recipient of a malformed
/// request and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetReject(pub RejectReason);

impl fmt::Display for BacnetReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reject: {:?}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BacnetReject {}

/// An Abort-PDU, either received from a peer or about to be sent to one.
/// Either side may abort a transaction; both sides discard transaction
/// state on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetAbort(pub AbortReason);

impl fmt::Display for BacnetAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Abort: {:?}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BacnetAbort {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_known_values() {
        let original = ErrorCode::UnknownObject;
        assert_eq!(ErrorCode::from_code(original.code()), original);
    }

    #[test]
    fn unrecognized_code_round_trips_through_other() {
        let decoded = ErrorCode::from_code(9001);
        assert_eq!(decoded, ErrorCode::Other(9001));
        assert_eq!(decoded.code(), 9001);
    }

    #[test]
    fn application_error_display_is_human_readable() {
        let err = ApplicationError::unknown_object();
        let text = format!("{err}");
        assert!(text.contains("Object"));
        assert!(text.contains("UnknownObject"));
    }
}
