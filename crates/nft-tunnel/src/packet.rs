//! Per-packet tunnel metadata association.

use std::sync::Arc;

use crate::types::TunnelInfo;

/// Tunnel metadata attached to a single packet.
///
/// Cloning the context (e.g., when a packet is cloned for retransmission)
/// shares the attached metadata rather than copying it.
#[derive(Debug, Clone, Default)]
pub struct PacketTunnelContext {
    tunnel: Option<Arc<TunnelInfo>>,
}

impl PacketTunnelContext {
    /// Context for a packet without tunnel metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a packet received with tunnel metadata attached.
    pub fn with_tunnel(info: Arc<TunnelInfo>) -> Self {
        Self { tunnel: Some(info) }
    }

    pub fn tunnel_info(&self) -> Option<&TunnelInfo> {
        self.tunnel.as_deref()
    }

    pub fn tunnel(&self) -> Option<&Arc<TunnelInfo>> {
        self.tunnel.as_ref()
    }

    pub fn has_tunnel(&self) -> bool {
        self.tunnel.is_some()
    }

    /// Installs `info`, returning the previously attached reference.
    pub fn replace(&mut self, info: Arc<TunnelInfo>) -> Option<Arc<TunnelInfo>> {
        self.tunnel.replace(info)
    }

    /// Detaches and returns the current metadata.
    pub fn take(&mut self) -> Option<Arc<TunnelInfo>> {
        self.tunnel.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TunnelEndpoint, TunnelId, TunnelKey, TunnelOptions};
    use std::net::Ipv4Addr;

    fn info(id: u32) -> Arc<TunnelInfo> {
        let key = TunnelKey::new(
            TunnelId::from_key32(id),
            TunnelEndpoint::v4(Ipv4Addr::new(10, 0, 0, 1)),
        );
        Arc::new(TunnelInfo::tx(key, TunnelOptions::None))
    }

    #[test]
    fn test_empty_context() {
        let ctx = PacketTunnelContext::new();
        assert!(!ctx.has_tunnel());
        assert!(ctx.tunnel_info().is_none());
    }

    #[test]
    fn test_replace_returns_previous() {
        let first = info(1);
        let second = info(2);
        let mut ctx = PacketTunnelContext::with_tunnel(Arc::clone(&first));

        let previous = ctx.replace(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert_eq!(ctx.tunnel_info().unwrap().key().id.to_key32(), 2);
    }

    #[test]
    fn test_clone_shares_metadata() {
        let shared = info(3);
        let ctx = PacketTunnelContext::with_tunnel(Arc::clone(&shared));
        let clone = ctx.clone();

        assert_eq!(Arc::strong_count(&shared), 3);
        drop(ctx);
        assert_eq!(Arc::strong_count(&shared), 2);
        assert!(Arc::ptr_eq(clone.tunnel().unwrap(), &shared));
    }

    #[test]
    fn test_take() {
        let mut ctx = PacketTunnelContext::with_tunnel(info(4));
        assert!(ctx.take().is_some());
        assert!(!ctx.has_tunnel());
    }
}
