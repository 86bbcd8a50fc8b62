//! VXLAN / ERSPAN tunnel option codec.

use tracing::debug;

use crate::attr::{Attr, AttrKind, AttributeSet, Policy};
use crate::consts::{erspan_attrs, opts_attrs, vxlan_attrs, ERSPAN_VERSION_1, ERSPAN_VERSION_2};
use crate::error::{TunnelError, TunnelResult};
use crate::types::TunnelOptions;

pub(crate) static OPTS_POLICY: Policy = Policy::new(
    "tunnel options",
    &[
        (opts_attrs::VXLAN, AttrKind::Nested),
        (opts_attrs::ERSPAN, AttrKind::Nested),
    ],
);

static VXLAN_POLICY: Policy = Policy::new("vxlan options", &[(vxlan_attrs::GBP, AttrKind::U32)]);

static ERSPAN_POLICY: Policy = Policy::new(
    "erspan options",
    &[
        (erspan_attrs::VERSION, AttrKind::U32),
        (erspan_attrs::V1_INDEX, AttrKind::U32),
        (erspan_attrs::V2_HWID, AttrKind::U8),
        (erspan_attrs::V2_DIR, AttrKind::U8),
    ],
);

/// Decodes an already-parsed options container.
///
/// VXLAN takes precedence when both vendor containers are present. A
/// container with neither is rejected.
pub fn decode_options(opts: &AttributeSet<'_>) -> TunnelResult<TunnelOptions> {
    if let Some(vxlan) = opts.nested(opts_attrs::VXLAN, &VXLAN_POLICY)? {
        return decode_vxlan(&vxlan);
    }
    if let Some(erspan) = opts.nested(opts_attrs::ERSPAN, &ERSPAN_POLICY)? {
        return decode_erspan(&erspan);
    }

    debug!("Tunnel options carry no supported vendor format");
    Err(TunnelError::unsupported("tunnel option format", 0))
}

fn decode_vxlan(attrs: &AttributeSet<'_>) -> TunnelResult<TunnelOptions> {
    let gbp = attrs.require_u32(vxlan_attrs::GBP, "VXLAN GBP")?;
    Ok(TunnelOptions::Vxlan { gbp })
}

fn decode_erspan(attrs: &AttributeSet<'_>) -> TunnelResult<TunnelOptions> {
    let version = attrs.require_u32(erspan_attrs::VERSION, "ERSPAN version")?;

    match version {
        ERSPAN_VERSION_1 => {
            let index = attrs.require_u32(erspan_attrs::V1_INDEX, "ERSPAN v1 index")?;
            Ok(TunnelOptions::ErspanV1 { index })
        }
        ERSPAN_VERSION_2 => {
            let direction = attrs.require_u8(erspan_attrs::V2_DIR, "ERSPAN v2 direction")?;
            let hardware_id = attrs.require_u8(erspan_attrs::V2_HWID, "ERSPAN v2 hardware id")?;
            TunnelOptions::erspan_v2(hardware_id, direction)
        }
        other => {
            debug!(version = other, "Rejecting unsupported ERSPAN version");
            Err(TunnelError::unsupported("ERSPAN version", other))
        }
    }
}

/// Encodes options as the key's options container.
///
/// Returns `None` for [`TunnelOptions::None`]; the container is omitted
/// rather than emitted empty.
pub fn encode_options(attr: u16, options: &TunnelOptions) -> Option<Attr> {
    let inner = match *options {
        TunnelOptions::None => return None,
        TunnelOptions::Vxlan { gbp } => {
            Attr::Nested(opts_attrs::VXLAN, vec![Attr::U32(vxlan_attrs::GBP, gbp)])
        }
        TunnelOptions::ErspanV1 { index } => Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, ERSPAN_VERSION_1),
                Attr::U32(erspan_attrs::V1_INDEX, index),
            ],
        ),
        TunnelOptions::ErspanV2 {
            hardware_id,
            direction,
        } => Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, ERSPAN_VERSION_2),
                Attr::U8(erspan_attrs::V2_HWID, hardware_id),
                Attr::U8(erspan_attrs::V2_DIR, direction),
            ],
        ),
    };

    Some(Attr::Nested(attr, vec![inner]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::emit_attrs;
    use pretty_assertions::assert_eq;

    fn decode(attrs: &[Attr]) -> TunnelResult<TunnelOptions> {
        let buf = emit_attrs(attrs);
        let set = AttributeSet::parse(&buf, &OPTS_POLICY)?;
        decode_options(&set)
    }

    fn round_trip(options: TunnelOptions) -> TunnelOptions {
        let Some(Attr::Nested(_, children)) = encode_options(9, &options) else {
            panic!("expected nested options container");
        };
        decode(&children).unwrap()
    }

    #[test]
    fn test_decode_vxlan() {
        let options = decode(&[Attr::Nested(
            opts_attrs::VXLAN,
            vec![Attr::U32(vxlan_attrs::GBP, 0x1234)],
        )])
        .unwrap();
        assert_eq!(options, TunnelOptions::Vxlan { gbp: 0x1234 });
    }

    #[test]
    fn test_vxlan_missing_gbp() {
        let err = decode(&[Attr::Nested(opts_attrs::VXLAN, vec![])]).unwrap_err();
        assert_eq!(err, TunnelError::missing("VXLAN GBP"));
    }

    #[test]
    fn test_decode_erspan_v1() {
        let options = decode(&[Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, 1),
                Attr::U32(erspan_attrs::V1_INDEX, 77),
            ],
        )])
        .unwrap();
        assert_eq!(options, TunnelOptions::ErspanV1 { index: 77 });
    }

    #[test]
    fn test_decode_erspan_v2() {
        let options = decode(&[Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, 2),
                Attr::U8(erspan_attrs::V2_HWID, 17),
                Attr::U8(erspan_attrs::V2_DIR, 1),
            ],
        )])
        .unwrap();
        assert_eq!(
            options,
            TunnelOptions::ErspanV2 {
                hardware_id: 17,
                direction: 1,
            }
        );
    }

    #[test]
    fn test_erspan_missing_fields() {
        let err = decode(&[Attr::Nested(opts_attrs::ERSPAN, vec![])]).unwrap_err();
        assert_eq!(err, TunnelError::missing("ERSPAN version"));

        let err = decode(&[Attr::Nested(
            opts_attrs::ERSPAN,
            vec![Attr::U32(erspan_attrs::VERSION, 1)],
        )])
        .unwrap_err();
        assert_eq!(err, TunnelError::missing("ERSPAN v1 index"));

        let err = decode(&[Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, 2),
                Attr::U8(erspan_attrs::V2_HWID, 1),
            ],
        )])
        .unwrap_err();
        assert_eq!(err, TunnelError::missing("ERSPAN v2 direction"));
    }

    #[test]
    fn test_erspan_unsupported_version() {
        let err = decode(&[Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, 3),
                Attr::U32(erspan_attrs::V1_INDEX, 1),
            ],
        )])
        .unwrap_err();
        assert_eq!(err, TunnelError::unsupported("ERSPAN version", 3));
    }

    #[test]
    fn test_erspan_v2_out_of_range() {
        let err = decode(&[Attr::Nested(
            opts_attrs::ERSPAN,
            vec![
                Attr::U32(erspan_attrs::VERSION, 2),
                Attr::U8(erspan_attrs::V2_HWID, 40),
                Attr::U8(erspan_attrs::V2_DIR, 0),
            ],
        )])
        .unwrap_err();
        assert!(matches!(err, TunnelError::OutOfRange { value: 40, .. }));
    }

    #[test]
    fn test_empty_container_rejected() {
        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, TunnelError::UnsupportedVariant { .. }));
    }

    #[test]
    fn test_vxlan_takes_precedence() {
        let options = decode(&[
            Attr::Nested(
                opts_attrs::ERSPAN,
                vec![
                    Attr::U32(erspan_attrs::VERSION, 1),
                    Attr::U32(erspan_attrs::V1_INDEX, 1),
                ],
            ),
            Attr::Nested(opts_attrs::VXLAN, vec![Attr::U32(vxlan_attrs::GBP, 5)]),
        ])
        .unwrap();
        assert_eq!(options, TunnelOptions::Vxlan { gbp: 5 });
    }

    #[test]
    fn test_encode_none_omitted() {
        assert_eq!(encode_options(9, &TunnelOptions::None), None);
    }

    #[test]
    fn test_round_trips() {
        for options in [
            TunnelOptions::Vxlan { gbp: u32::MAX },
            TunnelOptions::ErspanV1 { index: 0xdead },
            TunnelOptions::ErspanV2 {
                hardware_id: 31,
                direction: 0,
            },
        ] {
            assert_eq!(round_trip(options), options);
        }
    }
}
