//! Tunnel object: decoded tunnel metadata that rules attach to packets.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::attr::{emit_attrs, Attr, AttributeSet};
use crate::error::TunnelResult;
use crate::key::{decode_key, encode_key, KEY_POLICY};
use crate::packet::PacketTunnelContext;
use crate::types::TunnelInfo;

/// Tunnel object holding shared, immutable transmit metadata.
#[derive(Debug, Clone)]
pub struct TunnelObject {
    info: Arc<TunnelInfo>,
}

impl TunnelObject {
    /// Wraps already-built metadata.
    pub fn new(info: TunnelInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Decodes a tunnel object from its key attributes.
    ///
    /// The metadata is only allocated once decoding has fully succeeded, so
    /// a failed decode leaves nothing behind.
    #[instrument(skip(buf), fields(len = buf.len()), level = "debug")]
    pub fn from_attrs(buf: &[u8]) -> TunnelResult<Self> {
        let attrs = AttributeSet::parse(buf, &KEY_POLICY)?;
        let (key, options) = decode_key(&attrs)?;

        debug!(
            id = %key.id,
            endpoint = %key.endpoint,
            options = ?options,
            "Decoded tunnel object"
        );

        Ok(Self::new(TunnelInfo::tx(key, options)))
    }

    pub fn info(&self) -> &Arc<TunnelInfo> {
        &self.info
    }

    pub fn dump(&self) -> Vec<Attr> {
        encode_key(self.info.key(), self.info.options())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        emit_attrs(&self.dump())
    }

    /// Attaches this object's metadata to a packet, releasing whatever the
    /// packet carried before.
    pub fn eval(&self, ctx: &mut PacketTunnelContext) {
        drop(ctx.replace(Arc::clone(&self.info)));
    }

    /// Number of live references to the metadata, this object included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.info)
    }
}
