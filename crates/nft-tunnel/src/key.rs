//! Tunnel key codec: id, outer endpoints, ports, flags, TOS/TTL and options.

use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::{debug, instrument};

use crate::attr::{Attr, AttrKind, AttributeSet, Policy};
use crate::consts::{ip6_attrs, ip_attrs, key_attrs};
use crate::error::{TunnelError, TunnelResult};
use crate::options::{decode_options, encode_options, OPTS_POLICY};
use crate::types::{
    TunnelEndpoint, TunnelFlags, TunnelId, TunnelKey, TunnelOptions, DEFAULT_TTL,
};

pub(crate) static KEY_POLICY: Policy = Policy::new(
    "tunnel key",
    &[
        (key_attrs::ID, AttrKind::U32),
        (key_attrs::IP, AttrKind::Nested),
        (key_attrs::IP6, AttrKind::Nested),
        (key_attrs::FLAGS, AttrKind::U32),
        (key_attrs::TOS, AttrKind::U8),
        (key_attrs::TTL, AttrKind::U8),
        (key_attrs::SPORT, AttrKind::U16),
        (key_attrs::DPORT, AttrKind::U16),
        (key_attrs::OPTS, AttrKind::Nested),
    ],
);

static IP_POLICY: Policy = Policy::new(
    "ipv4 endpoint",
    &[(ip_attrs::SRC, AttrKind::U32), (ip_attrs::DST, AttrKind::U32)],
);

static IP6_POLICY: Policy = Policy::new(
    "ipv6 endpoint",
    &[
        (ip6_attrs::SRC, AttrKind::Binary(16)),
        (ip6_attrs::DST, AttrKind::Binary(16)),
        (ip6_attrs::FLOWLABEL, AttrKind::U32),
    ],
);

/// Decodes a tunnel key and its options from a parsed key container.
#[instrument(skip(attrs), level = "debug")]
pub fn decode_key(attrs: &AttributeSet<'_>) -> TunnelResult<(TunnelKey, TunnelOptions)> {
    let id = attrs.require_u32(key_attrs::ID, "tunnel id")?;
    let endpoint = decode_endpoint(attrs)?;

    let mut key = TunnelKey::new(TunnelId::from_key32(id), endpoint);

    if let Some(port) = attrs.get_u16(key_attrs::SPORT) {
        key.src_port = port;
    }
    if let Some(port) = attrs.get_u16(key_attrs::DPORT) {
        key.dst_port = port;
    }

    if let Some(flags) = attrs.get_u32(key_attrs::FLAGS) {
        key.flags = TunnelFlags::from_wire(flags).inspect_err(|e| {
            debug!(error = %e, "Rejecting tunnel flags");
        })?;
    }

    key.tos = attrs.get_u8(key_attrs::TOS).unwrap_or(0);
    key.ttl = attrs.get_u8(key_attrs::TTL).unwrap_or(DEFAULT_TTL);

    let options = match attrs.nested(key_attrs::OPTS, &OPTS_POLICY)? {
        Some(opts) => decode_options(&opts)?,
        None => TunnelOptions::None,
    };

    Ok((key, options))
}

fn decode_endpoint(attrs: &AttributeSet<'_>) -> TunnelResult<TunnelEndpoint> {
    let ip = attrs.nested(key_attrs::IP, &IP_POLICY)?;
    let ip6 = attrs.nested(key_attrs::IP6, &IP6_POLICY)?;

    match (ip, ip6) {
        (Some(_), Some(_)) => {
            debug!("Rejecting tunnel key with both IPv4 and IPv6 endpoints");
            Err(TunnelError::AmbiguousEndpoint)
        }
        (Some(ip), None) => {
            let dst = ip
                .get_ipv4(ip_attrs::DST)
                .ok_or(TunnelError::missing("IPv4 destination"))?;
            let src = ip.get_ipv4(ip_attrs::SRC).unwrap_or(Ipv4Addr::UNSPECIFIED);
            Ok(TunnelEndpoint::V4 { src, dst })
        }
        (None, Some(ip6)) => {
            let dst = ip6
                .get_ipv6(ip6_attrs::DST)
                .ok_or(TunnelError::missing("IPv6 destination"))?;
            let src = ip6.get_ipv6(ip6_attrs::SRC).unwrap_or(Ipv6Addr::UNSPECIFIED);
            let flow_label = ip6.get_u32(ip6_attrs::FLOWLABEL).unwrap_or(0);
            Ok(TunnelEndpoint::V6 {
                src,
                dst,
                flow_label,
            })
        }
        (None, None) => Err(TunnelError::missing("tunnel endpoint")),
    }
}

/// Encodes a key and options as the attributes of a key container.
///
/// Flags, ports, TOS and TTL are always emitted so the dump is canonical.
pub fn encode_key(key: &TunnelKey, options: &TunnelOptions) -> Vec<Attr> {
    let mut attrs = vec![
        Attr::U32(key_attrs::ID, key.id.to_key32()),
        encode_endpoint(&key.endpoint),
        Attr::U16(key_attrs::SPORT, key.src_port),
        Attr::U16(key_attrs::DPORT, key.dst_port),
        Attr::U32(key_attrs::FLAGS, key.flags.to_wire()),
        Attr::U8(key_attrs::TOS, key.tos),
        Attr::U8(key_attrs::TTL, key.ttl),
    ];
    attrs.extend(encode_options(key_attrs::OPTS, options));
    attrs
}

fn encode_endpoint(endpoint: &TunnelEndpoint) -> Attr {
    match *endpoint {
        TunnelEndpoint::V4 { src, dst } => Attr::Nested(
            key_attrs::IP,
            vec![Attr::ipv4(ip_attrs::SRC, src), Attr::ipv4(ip_attrs::DST, dst)],
        ),
        TunnelEndpoint::V6 {
            src,
            dst,
            flow_label,
        } => Attr::Nested(
            key_attrs::IP6,
            vec![
                Attr::ipv6(ip6_attrs::SRC, src),
                Attr::ipv6(ip6_attrs::DST, dst),
                Attr::U32(ip6_attrs::FLOWLABEL, flow_label),
            ],
        ),
    }
}
