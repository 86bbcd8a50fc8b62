//! Human-readable tunnel configuration.
//!
//! A [`TunnelConfig`] describes a tunnel object the way an operator writes it
//! (addresses, port numbers, flag names) and compiles down to the attribute
//! buffer accepted by [`TunnelObject::from_attrs`](crate::TunnelObject::from_attrs).
//!
//! ```yaml
//! id: 42
//! src: 192.0.2.1
//! dst: 192.0.2.2
//! dport: 4789
//! flags: [dont_fragment]
//! options:
//!   type: vxlan
//!   gbp: 100
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::attr::emit_attrs;
use crate::error::{TunnelError, TunnelResult};
use crate::expr::{TunnelField, TunnelGetExpr, TunnelMode};
use crate::key::encode_key;
use crate::types::{
    TunnelEndpoint, TunnelFlags, TunnelId, TunnelInfo, TunnelKey, TunnelOptions, DEFAULT_TTL,
};

/// Largest IPv6 flow label (20 bits).
pub const FLOW_LABEL_MAX: u32 = 0x000f_ffff;

/// User-settable tunnel flag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagName {
    /// Transmit without a UDP checksum.
    ZeroCsumTx,
    DontFragment,
    SeqNumber,
}

/// Tunnel object configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<IpAddr>,
    pub dst: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_label: Option<u32>,
    #[serde(default)]
    pub sport: u16,
    #[serde(default)]
    pub dport: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagName>,
    #[serde(default)]
    pub tos: u8,
    #[serde(default = "default_ttl")]
    pub ttl: u8,
    #[serde(default, skip_serializing_if = "TunnelOptions::is_none")]
    pub options: TunnelOptions,
}

fn default_ttl() -> u8 {
    DEFAULT_TTL
}

impl TunnelConfig {
    /// Minimal IPv4 or IPv6 configuration towards `dst`.
    pub fn new(id: u32, dst: IpAddr) -> Self {
        Self {
            id,
            src: None,
            dst,
            flow_label: None,
            sport: 0,
            dport: 0,
            flags: Vec::new(),
            tos: 0,
            ttl: DEFAULT_TTL,
            options: TunnelOptions::None,
        }
    }

    /// Loads a configuration from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> TunnelResult<Self> {
        load_file(path.as_ref())
    }

    /// Validates the configuration and builds the key it describes.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::InvalidConfig`] if the source and destination
    /// address families differ, a flow label is given for IPv4 or exceeds
    /// 20 bits, and [`TunnelError::OutOfRange`] for invalid ERSPAN v2 fields.
    pub fn to_key(&self) -> TunnelResult<(TunnelKey, TunnelOptions)> {
        let endpoint = self.endpoint()?;

        let mut flags = TunnelFlags::default();
        for flag in &self.flags {
            match flag {
                FlagName::ZeroCsumTx => flags.checksum_tx = false,
                FlagName::DontFragment => flags.dont_fragment = true,
                FlagName::SeqNumber => flags.sequence_numbers = true,
            }
        }

        let options = match self.options {
            TunnelOptions::ErspanV2 {
                hardware_id,
                direction,
            } => TunnelOptions::erspan_v2(hardware_id, direction)?,
            other => other,
        };

        let key = TunnelKey::new(TunnelId::from_key32(self.id), endpoint)
            .with_ports(self.sport, self.dport)
            .with_flags(flags)
            .with_tos_ttl(self.tos, self.ttl);
        Ok((key, options))
    }

    /// Compiles the configuration into a tunnel key attribute buffer.
    pub fn encode(&self) -> TunnelResult<Vec<u8>> {
        let (key, options) = self.to_key()?;
        let buf = emit_attrs(&encode_key(&key, &options));
        debug!(id = self.id, len = buf.len(), "Encoded tunnel configuration");
        Ok(buf)
    }

    fn endpoint(&self) -> TunnelResult<TunnelEndpoint> {
        match (self.src, self.dst) {
            (None | Some(IpAddr::V4(_)), IpAddr::V4(dst)) => {
                if self.flow_label.is_some() {
                    return Err(TunnelError::invalid_config(
                        "flow_label",
                        "flow label requires an IPv6 destination",
                    ));
                }
                let src = match self.src {
                    Some(IpAddr::V4(addr)) => addr,
                    _ => Ipv4Addr::UNSPECIFIED,
                };
                Ok(TunnelEndpoint::V4 { src, dst })
            }
            (None | Some(IpAddr::V6(_)), IpAddr::V6(dst)) => {
                let label = self.flow_label.unwrap_or(0);
                if label > FLOW_LABEL_MAX {
                    return Err(TunnelError::invalid_config(
                        "flow_label",
                        format!("{label:#x} exceeds 20 bits"),
                    ));
                }
                let src = match self.src {
                    Some(IpAddr::V6(addr)) => addr,
                    _ => Ipv6Addr::UNSPECIFIED,
                };
                Ok(TunnelEndpoint::V6 {
                    src,
                    dst,
                    flow_label: label,
                })
            }
            (Some(src), dst) => Err(TunnelError::invalid_config(
                "src",
                format!("{src} and {dst} are different address families"),
            )),
        }
    }
}

impl From<&TunnelInfo> for TunnelConfig {
    fn from(info: &TunnelInfo) -> Self {
        let key = info.key();
        let src = key.endpoint.src();

        let mut flags = Vec::new();
        if !key.flags.checksum_tx {
            flags.push(FlagName::ZeroCsumTx);
        }
        if key.flags.dont_fragment {
            flags.push(FlagName::DontFragment);
        }
        if key.flags.sequence_numbers {
            flags.push(FlagName::SeqNumber);
        }

        Self {
            id: key.id.to_key32(),
            src: (!src.is_unspecified()).then_some(src),
            dst: key.endpoint.dst(),
            flow_label: key.endpoint.is_ipv6().then(|| key.endpoint.flow_label()),
            sport: key.src_port,
            dport: key.dst_port,
            flags,
            tos: key.tos,
            ttl: key.ttl,
            options: *info.options(),
        }
    }
}

/// Tunnel match expression configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetExprConfig {
    pub field: TunnelField,
    #[serde(default)]
    pub mode: TunnelMode,
    /// Destination register, nftables numbering.
    pub dreg: u32,
}

impl GetExprConfig {
    pub fn build(&self) -> TunnelResult<TunnelGetExpr> {
        TunnelGetExpr::new(self.field, self.dreg, self.mode)
    }

    /// Compiles the configuration into expression attributes.
    pub fn encode(&self) -> TunnelResult<Vec<u8>> {
        Ok(self.build()?.to_bytes())
    }

    pub fn load(path: impl AsRef<Path>) -> TunnelResult<Self> {
        load_file(path.as_ref())
    }
}

fn load_file<T: DeserializeOwned>(path: &Path) -> TunnelResult<T> {
    let shown = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TunnelError::invalid_config(shown.clone(), format!("failed to read: {e}"))
    })?;

    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let parsed = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(&contents).map_err(|e| e.to_string()),
        other => Err(format!("unsupported file extension {other:?}")),
    };

    let value = parsed.map_err(|message| TunnelError::invalid_config(shown, message))?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TunnelObject;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_defaults() {
        let config: TunnelConfig = serde_yaml::from_str("id: 7\ndst: 10.0.0.1\n").unwrap();
        assert_eq!(config, TunnelConfig::new(7, "10.0.0.1".parse().unwrap()));
        assert_eq!(config.ttl, 255);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<TunnelConfig, _> =
            serde_yaml::from_str("id: 7\ndst: 10.0.0.1\ncolour: red\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_decodes_back() {
        let config: TunnelConfig = serde_yaml::from_str(
            r#"
id: 42
src: 192.0.2.1
dst: 192.0.2.2
sport: 1000
dport: 4789
flags: [zero_csum_tx, seq_number]
tos: 8
ttl: 64
options:
  type: vxlan
  gbp: 100
"#,
        )
        .unwrap();

        let object = TunnelObject::from_attrs(&config.encode().unwrap()).unwrap();
        let key = object.info().key();
        assert_eq!(key.id.to_key32(), 42);
        assert_eq!(
            key.endpoint,
            TunnelEndpoint::V4 {
                src: Ipv4Addr::new(192, 0, 2, 1),
                dst: Ipv4Addr::new(192, 0, 2, 2),
            }
        );
        assert!(!key.flags.checksum_tx);
        assert!(key.flags.sequence_numbers);
        assert!(!key.flags.dont_fragment);
        assert_eq!((key.src_port, key.dst_port, key.tos, key.ttl), (1000, 4789, 8, 64));
        assert_eq!(*object.info().options(), TunnelOptions::Vxlan { gbp: 100 });

        assert_eq!(TunnelConfig::from(object.info().as_ref()), config);
    }

    #[test]
    fn test_ipv6_endpoint() {
        let mut config = TunnelConfig::new(1, IpAddr::V6(Ipv6Addr::LOCALHOST));
        config.flow_label = Some(0x12345);

        let (key, _) = config.to_key().unwrap();
        assert_eq!(
            key.endpoint,
            TunnelEndpoint::V6 {
                src: Ipv6Addr::UNSPECIFIED,
                dst: Ipv6Addr::LOCALHOST,
                flow_label: 0x12345,
            }
        );
    }

    #[test]
    fn test_family_mismatch() {
        let mut config = TunnelConfig::new(1, IpAddr::V6(Ipv6Addr::LOCALHOST));
        config.src = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let err = config.encode().unwrap_err();
        assert!(matches!(err, TunnelError::InvalidConfig { ref field, .. } if field == "src"));
    }

    #[test]
    fn test_flow_label_validation() {
        let mut v4 = TunnelConfig::new(1, IpAddr::V4(Ipv4Addr::LOCALHOST));
        v4.flow_label = Some(1);
        assert!(matches!(
            v4.to_key(),
            Err(TunnelError::InvalidConfig { .. })
        ));

        let mut v6 = TunnelConfig::new(1, IpAddr::V6(Ipv6Addr::LOCALHOST));
        v6.flow_label = Some(FLOW_LABEL_MAX + 1);
        assert!(matches!(
            v6.to_key(),
            Err(TunnelError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_erspan_v2_range() {
        let mut config = TunnelConfig::new(1, IpAddr::V4(Ipv4Addr::LOCALHOST));
        config.options = TunnelOptions::ErspanV2 {
            hardware_id: 32,
            direction: 0,
        };
        assert!(matches!(
            config.to_key(),
            Err(TunnelError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_load_yaml_and_json() {
        let yaml = write_temp(".yaml", "id: 3\ndst: 10.0.0.3\ndport: 4789\n");
        let config = TunnelConfig::load(yaml.path()).unwrap();
        assert_eq!(config.dport, 4789);

        let json = write_temp(
            ".json",
            r#"{"id": 3, "dst": "10.0.0.3", "options": {"type": "erspan_v1", "index": 5}}"#,
        );
        let config = TunnelConfig::load(json.path()).unwrap();
        assert_eq!(config.options, TunnelOptions::ErspanV1 { index: 5 });
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let file = write_temp(".toml", "id = 3");
        assert!(matches!(
            TunnelConfig::load(file.path()),
            Err(TunnelError::InvalidConfig { .. })
        ));
        assert!(TunnelConfig::load("/nonexistent/tunnel.yaml").is_err());
    }

    #[test]
    fn test_load_error_names_path() {
        let file = write_temp(".json", "{ not json");
        let shown = file.path().display().to_string();

        let err = GetExprConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, TunnelError::InvalidConfig { ref field, .. } if *field == shown));
    }

    #[test]
    fn test_get_expr_config() {
        let config: GetExprConfig =
            serde_yaml::from_str("field: id\nmode: tx\ndreg: 8\n").unwrap();
        let expr = TunnelGetExpr::from_attrs(&config.encode().unwrap()).unwrap();
        assert_eq!(expr.field(), TunnelField::Id);
        assert_eq!(expr.mode(), TunnelMode::Tx);

        let config: GetExprConfig = serde_yaml::from_str("field: path\ndreg: 0\n").unwrap();
        assert_eq!(config.mode, TunnelMode::Any);
        assert!(matches!(
            config.encode(),
            Err(TunnelError::RegisterWidthMismatch { .. })
        ));
    }
}
