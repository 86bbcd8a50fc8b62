//! nf_tables tunnel extension.
//!
//! Provides the two halves of tunnel support in a packet-filter rule set:
//!
//! - [`TunnelObject`]: a stateful object decoded from a tunnel key attribute
//!   set (id, outer endpoints, ports, flags, TOS/TTL and VXLAN or ERSPAN
//!   options). Evaluating it attaches its shared [`TunnelInfo`] to a packet.
//! - [`TunnelGetExpr`]: a match expression that loads "has tunnel metadata"
//!   or the tunnel id into a register, optionally restricted by direction.
//!
//! Attribute buffers use netlink framing. [`TunnelConfig`] and
//! [`GetExprConfig`] provide a serde front end that compiles to those
//! buffers.

pub mod attr;
pub mod config;
pub mod consts;
pub mod error;
pub mod expr;
pub mod key;
pub mod object;
pub mod options;
pub mod packet;
pub mod registers;
pub mod store;
pub mod types;

pub use config::{FlagName, GetExprConfig, TunnelConfig};
pub use error::{TunnelError, TunnelResult};
pub use expr::{GetOutcome, TunnelField, TunnelGetExpr, TunnelMode};
pub use object::TunnelObject;
pub use packet::PacketTunnelContext;
pub use registers::{Register, RegisterSink, Registers, Verdict};
pub use store::TunnelObjectStore;
pub use types::{TunnelEndpoint, TunnelFlags, TunnelId, TunnelInfo, TunnelKey, TunnelOptions};
