//! Error types for tunnel attribute decoding and expression construction.
//!
//! Every variant is raised while building an object or expression from
//! configuration. Packet-time evaluation never fails; a missing or
//! wrong-direction tunnel is reported through the register verdict instead.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;

/// Errors that can occur while decoding or constructing tunnel state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    /// Attribute stream is truncated or an attribute header is inconsistent.
    #[error("Malformed attribute in {container}: {reason}")]
    MalformedAttribute {
        /// Container being parsed (e.g., "tunnel key").
        container: &'static str,
        /// What was wrong with the framing.
        reason: String,
    },

    /// Attribute payload does not match the policy for its type.
    #[error("Attribute {attr} in {container} has length {actual}, expected {expected}")]
    UnexpectedType {
        /// Container being parsed.
        container: &'static str,
        /// Attribute type number.
        attr: u16,
        /// Payload length required by the policy.
        expected: usize,
        /// Payload length found on the wire.
        actual: usize,
    },

    /// A mandatory attribute is absent.
    #[error("Missing mandatory attribute: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// Recognized container with an unsupported discriminant.
    #[error("Unsupported {what}: {value}")]
    UnsupportedVariant {
        /// What was being selected (e.g., "ERSPAN version").
        what: &'static str,
        /// Offending value.
        value: u32,
    },

    /// Tunnel flags carry bits outside the recognized mask.
    #[error("Unsupported tunnel flags 0x{flags:08x} (supported mask 0x{mask:08x})")]
    UnsupportedFlag {
        /// Flags as received.
        flags: u32,
        /// Recognized mask.
        mask: u32,
    },

    /// Get expression selects a field this extension does not provide.
    #[error("Unsupported tunnel field: {0}")]
    UnsupportedField(u32),

    /// Destination register cannot hold the selected field.
    #[error("Register {register} cannot store {len} bytes")]
    RegisterWidthMismatch {
        /// Destination register as configured.
        register: u32,
        /// Width of the selected field in bytes.
        len: usize,
    },

    /// Both an IPv4 and an IPv6 endpoint container were supplied.
    #[error("Tunnel key carries both IPv4 and IPv6 endpoints")]
    AmbiguousEndpoint,

    /// A field value is outside its permitted range.
    #[error("{field} value {value} out of range (max {max})")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Value as received.
        value: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// Human-readable configuration could not be compiled to attributes.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl TunnelError {
    /// Creates a malformed attribute error.
    pub fn malformed(container: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedAttribute {
            container,
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub const fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Creates an unsupported variant error.
    pub const fn unsupported(what: &'static str, value: u32) -> Self {
        Self::UnsupportedVariant { what, value }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by the attribute framing itself
    /// rather than by the values it carried.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            TunnelError::MalformedAttribute { .. } | TunnelError::UnexpectedType { .. }
        )
    }
}
