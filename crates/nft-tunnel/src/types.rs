//! Tunnel metadata model: endpoints, flags, vendor options, key and info.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::consts::{
    tun_flags, wire_flags, ERSPAN_DIR_MAX, ERSPAN_HWID_MAX, ERSPAN_OPTS_LEN, ERSPAN_VERSION_1,
    ERSPAN_VERSION_2, VXLAN_OPTS_LEN,
};
use crate::error::{TunnelError, TunnelResult};

/// Default TTL applied when the key does not specify one.
pub const DEFAULT_TTL: u8 = u8::MAX;

/// 64-bit tunnel identifier built from the 32-bit key carried on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TunnelId(u64);

impl TunnelId {
    pub const fn from_key32(key: u32) -> Self {
        TunnelId(key as u64)
    }

    /// Returns the 32-bit key (low 32 bits of the identifier).
    pub const fn to_key32(self) -> u32 {
        self.0 as u32
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outer endpoint addresses of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum TunnelEndpoint {
    V4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
    },
    V6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        flow_label: u32,
    },
}

impl TunnelEndpoint {
    /// IPv4 endpoint with an unspecified source.
    pub const fn v4(dst: Ipv4Addr) -> Self {
        TunnelEndpoint::V4 {
            src: Ipv4Addr::UNSPECIFIED,
            dst,
        }
    }

    /// IPv6 endpoint with an unspecified source and no flow label.
    pub const fn v6(dst: Ipv6Addr) -> Self {
        TunnelEndpoint::V6 {
            src: Ipv6Addr::UNSPECIFIED,
            dst,
            flow_label: 0,
        }
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, TunnelEndpoint::V6 { .. })
    }

    pub fn src(&self) -> IpAddr {
        match self {
            TunnelEndpoint::V4 { src, .. } => IpAddr::V4(*src),
            TunnelEndpoint::V6 { src, .. } => IpAddr::V6(*src),
        }
    }

    pub fn dst(&self) -> IpAddr {
        match self {
            TunnelEndpoint::V4 { dst, .. } => IpAddr::V4(*dst),
            TunnelEndpoint::V6 { dst, .. } => IpAddr::V6(*dst),
        }
    }

    /// Flow label; always 0 for IPv4 endpoints.
    pub const fn flow_label(&self) -> u32 {
        match self {
            TunnelEndpoint::V4 { .. } => 0,
            TunnelEndpoint::V6 { flow_label, .. } => *flow_label,
        }
    }
}

impl fmt::Display for TunnelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src(), self.dst())
    }
}

/// Tunnel transmit flags.
///
/// `checksum_tx` is the logical inverse of the wire "zero checksum" bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelFlags {
    pub checksum_tx: bool,
    pub dont_fragment: bool,
    pub sequence_numbers: bool,
    /// Route lookups for this key are not cached. Always set on decoded keys.
    pub no_cache: bool,
}

impl Default for TunnelFlags {
    fn default() -> Self {
        Self {
            checksum_tx: true,
            dont_fragment: false,
            sequence_numbers: false,
            no_cache: true,
        }
    }
}

impl TunnelFlags {
    /// Parses user-visible wire flags on top of the default flag set.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::UnsupportedFlag`] if any bit outside
    /// [`wire_flags::MASK`] is set.
    pub fn from_wire(flags: u32) -> TunnelResult<Self> {
        if flags & !wire_flags::MASK != 0 {
            return Err(TunnelError::UnsupportedFlag {
                flags,
                mask: wire_flags::MASK,
            });
        }

        let mut out = Self::default();
        if flags & wire_flags::ZERO_CSUM_TX != 0 {
            out.checksum_tx = false;
        }
        if flags & wire_flags::DONT_FRAGMENT != 0 {
            out.dont_fragment = true;
        }
        if flags & wire_flags::SEQ_NUMBER != 0 {
            out.sequence_numbers = true;
        }
        Ok(out)
    }

    /// Converts back to user-visible wire flags.
    pub const fn to_wire(&self) -> u32 {
        let mut flags = 0;
        if !self.checksum_tx {
            flags |= wire_flags::ZERO_CSUM_TX;
        }
        if self.dont_fragment {
            flags |= wire_flags::DONT_FRAGMENT;
        }
        if self.sequence_numbers {
            flags |= wire_flags::SEQ_NUMBER;
        }
        flags
    }

    /// Tunnel metadata flag word (TUNNEL_KEY is always present).
    pub const fn to_tun_flags(&self) -> u16 {
        let mut flags = tun_flags::KEY;
        if self.checksum_tx {
            flags |= tun_flags::CSUM;
        }
        if self.dont_fragment {
            flags |= tun_flags::DONT_FRAGMENT;
        }
        if self.sequence_numbers {
            flags |= tun_flags::SEQ;
        }
        if self.no_cache {
            flags |= tun_flags::NOCACHE;
        }
        flags
    }
}

/// Vendor-specific tunnel options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelOptions {
    #[default]
    None,
    Vxlan {
        gbp: u32,
    },
    ErspanV1 {
        index: u32,
    },
    ErspanV2 {
        hardware_id: u8,
        direction: u8,
    },
}

impl TunnelOptions {
    /// Builds ERSPAN v2 options, checking the hardware id and direction ranges.
    pub fn erspan_v2(hardware_id: u8, direction: u8) -> TunnelResult<Self> {
        if hardware_id > ERSPAN_HWID_MAX {
            return Err(TunnelError::OutOfRange {
                field: "ERSPAN hardware id",
                value: hardware_id.into(),
                max: ERSPAN_HWID_MAX.into(),
            });
        }
        if direction > ERSPAN_DIR_MAX {
            return Err(TunnelError::OutOfRange {
                field: "ERSPAN direction",
                value: direction.into(),
                max: ERSPAN_DIR_MAX.into(),
            });
        }
        Ok(TunnelOptions::ErspanV2 {
            hardware_id,
            direction,
        })
    }

    pub const fn is_none(&self) -> bool {
        matches!(self, TunnelOptions::None)
    }

    /// ERSPAN version for ERSPAN options.
    pub const fn erspan_version(&self) -> Option<u32> {
        match self {
            TunnelOptions::ErspanV1 { .. } => Some(ERSPAN_VERSION_1),
            TunnelOptions::ErspanV2 { .. } => Some(ERSPAN_VERSION_2),
            TunnelOptions::None | TunnelOptions::Vxlan { .. } => None,
        }
    }

    /// Length of the option payload attached to the tunnel metadata.
    pub const fn option_len(&self) -> usize {
        match self {
            TunnelOptions::None => 0,
            TunnelOptions::Vxlan { .. } => VXLAN_OPTS_LEN,
            TunnelOptions::ErspanV1 { .. } | TunnelOptions::ErspanV2 { .. } => ERSPAN_OPTS_LEN,
        }
    }

    /// Option type flag attached to the tunnel metadata.
    pub const fn option_flags(&self) -> u16 {
        match self {
            TunnelOptions::None => 0,
            TunnelOptions::Vxlan { .. } => tun_flags::VXLAN_OPT,
            TunnelOptions::ErspanV1 { .. } | TunnelOptions::ErspanV2 { .. } => {
                tun_flags::ERSPAN_OPT
            }
        }
    }
}

/// Outer tunnel key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TunnelKey {
    pub id: TunnelId,
    pub endpoint: TunnelEndpoint,
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: TunnelFlags,
    pub tos: u8,
    pub ttl: u8,
}

impl TunnelKey {
    /// Creates a key with default ports, flags, TOS and TTL.
    pub fn new(id: TunnelId, endpoint: TunnelEndpoint) -> Self {
        Self {
            id,
            endpoint,
            src_port: 0,
            dst_port: 0,
            flags: TunnelFlags::default(),
            tos: 0,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the transport ports (builder pattern)
    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    /// Set the flags (builder pattern)
    pub fn with_flags(mut self, flags: TunnelFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set TOS and TTL (builder pattern)
    pub fn with_tos_ttl(mut self, tos: u8, ttl: u8) -> Self {
        self.tos = tos;
        self.ttl = ttl;
        self
    }
}

/// Immutable tunnel metadata attached to packets.
///
/// Shared between packets through `Arc<TunnelInfo>`; never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TunnelInfo {
    key: TunnelKey,
    options: TunnelOptions,
    is_tx: bool,
}

impl TunnelInfo {
    /// Metadata for the transmit path (what tunnel objects attach).
    pub const fn tx(key: TunnelKey, options: TunnelOptions) -> Self {
        Self {
            key,
            options,
            is_tx: true,
        }
    }

    /// Metadata as a receiving tunnel device would attach it.
    pub const fn rx(key: TunnelKey, options: TunnelOptions) -> Self {
        Self {
            key,
            options,
            is_tx: false,
        }
    }

    pub const fn key(&self) -> &TunnelKey {
        &self.key
    }

    pub const fn options(&self) -> &TunnelOptions {
        &self.options
    }

    pub const fn is_tx(&self) -> bool {
        self.is_tx
    }

    pub const fn is_ipv6(&self) -> bool {
        self.key.endpoint.is_ipv6()
    }

    /// Full tunnel metadata flag word, including the option type flag.
    pub const fn tun_flags(&self) -> u16 {
        self.key.flags.to_tun_flags() | self.options.option_flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tunnel_id_key32() {
        let id = TunnelId::from_key32(0x2a);
        assert_eq!(id.to_key32(), 0x2a);
        assert_eq!(id.as_u64(), 0x2a);
        assert_eq!(TunnelId::from_key32(u32::MAX).to_key32(), u32::MAX);
    }

    #[test]
    fn test_endpoint_accessors() {
        let v4 = TunnelEndpoint::v4(Ipv4Addr::new(192, 168, 1, 1));
        assert!(!v4.is_ipv6());
        assert_eq!(v4.src(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(v4.flow_label(), 0);
        assert_eq!(v4.to_string(), "0.0.0.0 -> 192.168.1.1");

        let v6 = TunnelEndpoint::V6 {
            src: "2001:db8::1".parse().unwrap(),
            dst: "2001:db8::2".parse().unwrap(),
            flow_label: 7,
        };
        assert!(v6.is_ipv6());
        assert_eq!(v6.flow_label(), 7);
    }

    #[test]
    fn test_default_flags() {
        let flags = TunnelFlags::default();
        assert!(flags.checksum_tx);
        assert!(flags.no_cache);
        assert!(!flags.dont_fragment);
        assert!(!flags.sequence_numbers);
        assert_eq!(flags.to_wire(), 0);
        assert_eq!(
            flags.to_tun_flags(),
            tun_flags::KEY | tun_flags::CSUM | tun_flags::NOCACHE
        );
    }

    #[test]
    fn test_zero_checksum_inversion() {
        let flags = TunnelFlags::from_wire(wire_flags::ZERO_CSUM_TX).unwrap();
        assert!(!flags.checksum_tx);
        assert_eq!(flags.to_wire(), wire_flags::ZERO_CSUM_TX);
        assert_eq!(flags.to_tun_flags() & tun_flags::CSUM, 0);
    }

    #[test]
    fn test_all_flags() {
        let flags = TunnelFlags::from_wire(wire_flags::MASK).unwrap();
        assert_eq!(
            flags,
            TunnelFlags {
                checksum_tx: false,
                dont_fragment: true,
                sequence_numbers: true,
                no_cache: true,
            }
        );
        assert_eq!(flags.to_wire(), wire_flags::MASK);
    }

    #[test]
    fn test_unsupported_flag() {
        let err = TunnelFlags::from_wire(0x8).unwrap_err();
        assert_eq!(
            err,
            TunnelError::UnsupportedFlag {
                flags: 0x8,
                mask: wire_flags::MASK,
            }
        );
    }

    #[test]
    fn test_option_len_and_flags() {
        assert_eq!(TunnelOptions::None.option_len(), 0);
        assert_eq!(TunnelOptions::None.option_flags(), 0);

        let vxlan = TunnelOptions::Vxlan { gbp: 1 };
        assert_eq!(vxlan.option_len(), VXLAN_OPTS_LEN);
        assert_eq!(vxlan.option_flags(), tun_flags::VXLAN_OPT);

        let erspan = TunnelOptions::ErspanV1 { index: 5 };
        assert_eq!(erspan.option_len(), ERSPAN_OPTS_LEN);
        assert_eq!(erspan.option_flags(), tun_flags::ERSPAN_OPT);
        assert_eq!(erspan.erspan_version(), Some(ERSPAN_VERSION_1));
    }

    #[test]
    fn test_erspan_v2_ranges() {
        assert_eq!(
            TunnelOptions::erspan_v2(31, 1),
            Ok(TunnelOptions::ErspanV2 {
                hardware_id: 31,
                direction: 1,
            })
        );
        assert!(matches!(
            TunnelOptions::erspan_v2(32, 0),
            Err(TunnelError::OutOfRange { value: 32, max: 31, .. })
        ));
        assert!(matches!(
            TunnelOptions::erspan_v2(0, 2),
            Err(TunnelError::OutOfRange { value: 2, max: 1, .. })
        ));
    }

    #[test]
    fn test_key_builder() {
        let key = TunnelKey::new(
            TunnelId::from_key32(1),
            TunnelEndpoint::v4(Ipv4Addr::new(10, 0, 0, 1)),
        )
        .with_ports(4789, 4790)
        .with_tos_ttl(0x10, 64);

        assert_eq!(key.src_port, 4789);
        assert_eq!(key.dst_port, 4790);
        assert_eq!(key.tos, 0x10);
        assert_eq!(key.ttl, 64);
        assert_eq!(TunnelKey::new(key.id, key.endpoint).ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_info_direction() {
        let key = TunnelKey::new(
            TunnelId::from_key32(1),
            TunnelEndpoint::v6("2001:db8::2".parse().unwrap()),
        );
        let tx = TunnelInfo::tx(key, TunnelOptions::Vxlan { gbp: 3 });
        assert!(tx.is_tx());
        assert!(tx.is_ipv6());
        assert_eq!(tx.tun_flags() & tun_flags::VXLAN_OPT, tun_flags::VXLAN_OPT);

        let rx = TunnelInfo::rx(key, TunnelOptions::None);
        assert!(!rx.is_tx());
    }

    #[test]
    fn test_info_serializes_direction() {
        let key = TunnelKey::new(TunnelId::from_key32(2), TunnelEndpoint::v4(Ipv4Addr::LOCALHOST));
        let value = serde_json::to_value(TunnelInfo::rx(key, TunnelOptions::None)).unwrap();
        assert_eq!(value["is_tx"], serde_json::Value::Bool(false));
        assert_eq!(value["key"]["ttl"], 255);
        assert_eq!(value["options"]["type"], "none");
    }

    #[test]
    fn test_options_serde_tagging() {
        let json = serde_json::to_string(&TunnelOptions::ErspanV1 { index: 9 }).unwrap();
        assert_eq!(json, r#"{"type":"erspan_v1","index":9}"#);
    }
}
