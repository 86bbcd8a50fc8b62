//! Policy-checked netlink attribute parsing and the matching attribute writer.
//!
//! Each container (tunnel key, IPv4 endpoint, options, ...) has a [`Policy`]
//! listing the attribute types it understands and the payload shape of each.
//! [`AttributeSet::parse`] walks one level of attributes, rejects framing and
//! length errors, and skips types the policy does not list so that newer
//! senders remain compatible. Nested containers are parsed on demand with
//! their own policy via [`AttributeSet::nested`].

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};
use netlink_packet_utils::nla::{Nla, NlasIterator};
use netlink_packet_utils::traits::Emitable;
use tracing::debug;

use crate::error::{TunnelError, TunnelResult};

const NLA_HEADER_LEN: usize = 4;

/// Payload shape expected for an attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    U8,
    /// Big-endian 16-bit integer.
    U16,
    /// Big-endian 32-bit integer (also used for IPv4 addresses).
    U32,
    /// Opaque payload of exactly this many bytes.
    Binary(usize),
    /// Nested attribute container, validated by the caller's policy.
    Nested,
}

impl AttrKind {
    const fn expected_len(self) -> Option<usize> {
        match self {
            AttrKind::U8 => Some(1),
            AttrKind::U16 => Some(2),
            AttrKind::U32 => Some(4),
            AttrKind::Binary(len) => Some(len),
            AttrKind::Nested => None,
        }
    }
}

/// Attribute policy for one container level.
#[derive(Debug)]
pub struct Policy {
    name: &'static str,
    entries: &'static [(u16, AttrKind)],
}

impl Policy {
    pub const fn new(name: &'static str, entries: &'static [(u16, AttrKind)]) -> Self {
        Self { name, entries }
    }

    /// Container name used in error messages.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn kind_of(&self, attr: u16) -> Option<AttrKind> {
        self.entries
            .iter()
            .find(|(ty, _)| *ty == attr)
            .map(|(_, kind)| *kind)
    }
}

/// Validated attributes of a single container, borrowed from the input buffer.
#[derive(Debug, Clone)]
pub struct AttributeSet<'a> {
    container: &'static str,
    attrs: BTreeMap<u16, &'a [u8]>,
}

impl<'a> AttributeSet<'a> {
    /// Parses one level of attributes from `buf` against `policy`.
    ///
    /// # Errors
    ///
    /// - [`TunnelError::MalformedAttribute`] if an attribute header is
    ///   truncated or its length is inconsistent with the buffer
    /// - [`TunnelError::UnexpectedType`] if a known attribute's payload
    ///   length does not match the policy
    pub fn parse(buf: &'a [u8], policy: &Policy) -> TunnelResult<Self> {
        let mut attrs = BTreeMap::new();

        for nla in NlasIterator::new(buf) {
            let nla = nla.map_err(|e| TunnelError::malformed(policy.name, e.to_string()))?;
            let attr = nla.kind();
            // Borrow the payload from the input buffer rather than from `nla`.
            let len = usize::from(nla.length());
            let value = nla
                .into_inner()
                .get(NLA_HEADER_LEN..len)
                .ok_or_else(|| TunnelError::malformed(policy.name, "length shorter than header"))?;

            let Some(kind) = policy.kind_of(attr) else {
                debug!(container = policy.name, attr, "Skipping unknown attribute");
                continue;
            };

            if let Some(expected) = kind.expected_len() {
                if value.len() != expected {
                    return Err(TunnelError::UnexpectedType {
                        container: policy.name,
                        attr,
                        expected,
                        actual: value.len(),
                    });
                }
            }

            // Later occurrences replace earlier ones.
            attrs.insert(attr, value);
        }

        Ok(Self {
            container: policy.name,
            attrs,
        })
    }

    /// Container name this set was parsed for.
    pub fn container(&self) -> &'static str {
        self.container
    }

    pub fn contains(&self, attr: u16) -> bool {
        self.attrs.contains_key(&attr)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn sized(&self, attr: u16, len: usize) -> Option<&'a [u8]> {
        self.attrs.get(&attr).copied().filter(|v| v.len() == len)
    }

    pub fn get_u8(&self, attr: u16) -> Option<u8> {
        self.sized(attr, 1).map(|v| v[0])
    }

    pub fn get_u16(&self, attr: u16) -> Option<u16> {
        self.sized(attr, 2).map(BigEndian::read_u16)
    }

    pub fn get_u32(&self, attr: u16) -> Option<u32> {
        self.sized(attr, 4).map(BigEndian::read_u32)
    }

    pub fn get_ipv4(&self, attr: u16) -> Option<Ipv4Addr> {
        self.get_u32(attr).map(Ipv4Addr::from)
    }

    pub fn get_ipv6(&self, attr: u16) -> Option<Ipv6Addr> {
        self.sized(attr, 16).map(|v| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(v);
            Ipv6Addr::from(octets)
        })
    }

    /// Returns the big-endian u32 at `attr` or a [`TunnelError::MissingField`].
    pub fn require_u32(&self, attr: u16, field: &'static str) -> TunnelResult<u32> {
        self.get_u32(attr).ok_or(TunnelError::missing(field))
    }

    pub fn require_u8(&self, attr: u16, field: &'static str) -> TunnelResult<u8> {
        self.get_u8(attr).ok_or(TunnelError::missing(field))
    }

    /// Parses the nested container at `attr` with its own policy.
    ///
    /// Returns `Ok(None)` if the container is absent.
    pub fn nested(&self, attr: u16, policy: &Policy) -> TunnelResult<Option<AttributeSet<'a>>> {
        self.attrs
            .get(&attr)
            .map(|payload| AttributeSet::parse(payload, policy))
            .transpose()
    }
}

/// An attribute to be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    U8(u16, u8),
    /// Emitted big-endian.
    U16(u16, u16),
    /// Emitted big-endian.
    U32(u16, u32),
    Bytes(u16, Vec<u8>),
    Nested(u16, Vec<Attr>),
}

impl Attr {
    pub fn ipv4(attr: u16, addr: Ipv4Addr) -> Self {
        Attr::Bytes(attr, addr.octets().to_vec())
    }

    pub fn ipv6(attr: u16, addr: Ipv6Addr) -> Self {
        Attr::Bytes(attr, addr.octets().to_vec())
    }
}

impl Nla for Attr {
    fn value_len(&self) -> usize {
        match self {
            Attr::U8(..) => 1,
            Attr::U16(..) => 2,
            Attr::U32(..) => 4,
            Attr::Bytes(_, bytes) => bytes.len(),
            Attr::Nested(_, children) => children.as_slice().buffer_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            Attr::U8(attr, _)
            | Attr::U16(attr, _)
            | Attr::U32(attr, _)
            | Attr::Bytes(attr, _)
            | Attr::Nested(attr, _) => *attr,
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            Attr::U8(_, value) => buffer[0] = *value,
            Attr::U16(_, value) => BigEndian::write_u16(buffer, *value),
            Attr::U32(_, value) => BigEndian::write_u32(buffer, *value),
            Attr::Bytes(_, bytes) => buffer[..bytes.len()].copy_from_slice(bytes),
            Attr::Nested(_, children) => children.as_slice().emit(buffer),
        }
    }

    fn is_nested(&self) -> bool {
        matches!(self, Attr::Nested(..))
    }
}

/// Serializes a list of attributes into a padded netlink attribute stream.
pub fn emit_attrs(attrs: &[Attr]) -> Vec<u8> {
    let mut buf = vec![0u8; attrs.buffer_len()];
    attrs.emit(&mut buf);
    buf
}
