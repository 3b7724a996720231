//! Error taxonomy for the reader, registry, and transport layers.
//!
//! Decode-level anomalies (short or malformed notification payloads) are
//! *not* errors — decoders return an empty sample sequence and log the event,
//! so a single garbled notification never terminates a stream. Everything
//! here is either a contract violation surfaced to the caller or a transport
//! failure propagated unchanged; retry policy belongs to the caller.

use thiserror::Error;
use uuid::Uuid;

use crate::reader::ReaderState;
use crate::types::StreamKind;

#[derive(Debug, Error)]
pub enum Error {
    /// No registered family's predicate matched the device name. Fatal to the
    /// `create_reader` call only.
    #[error("device {device_name:?} is not supported by any registered family")]
    DeviceNotSupported { device_name: String },

    /// Registry lookup miss on an internal family identifier — a programmer
    /// or integration error, not an environmental one.
    #[error("unknown family {family_id:?}")]
    UnknownFamily { family_id: String },

    /// A stream operation was invoked for a capability the bound family does
    /// not declare.
    #[error("family {family_id} does not support {capability} streaming")]
    UnsupportedCapability {
        family_id: &'static str,
        capability: StreamKind,
    },

    /// A connection or stream operation was invoked out of order.
    #[error("cannot {attempted} while {current}")]
    InvalidState {
        current: ReaderState,
        attempted: &'static str,
    },

    /// A stream is marked active without a bound callback. Unreachable
    /// through the public API (callbacks are bound atomically with stream
    /// start); kept as a guard on the internal invariant.
    #[error("{stream} stream is active but no callback is bound")]
    CallbackNotSet { stream: StreamKind },

    /// No Bluetooth adapter is available on this host.
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    /// The peripheral does not expose a characteristic the bound family needs.
    #[error("characteristic {0} not found on the connected peripheral")]
    CharacteristicNotFound(Uuid),

    /// A transport operation exceeded its deadline.
    #[error("transport operation timed out: {0}")]
    Timeout(&'static str),

    /// Transport-level failure, propagated unchanged from the BLE stack.
    #[error("transport error: {0}")]
    Connection(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
