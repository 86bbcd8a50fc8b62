//! Attribute numbers and flag values for the nf_tables tunnel extension.

/// Get expression attributes (NFTA_TUNNEL_*)
pub mod expr_attrs {
    pub const KEY: u16 = 1;
    pub const DREG: u16 = 2;
    pub const MODE: u16 = 3;
}

/// Tunnel object attributes (NFTA_TUNNEL_KEY_*)
pub mod key_attrs {
    pub const ID: u16 = 1;
    pub const IP: u16 = 2;
    pub const IP6: u16 = 3;
    pub const FLAGS: u16 = 4;
    pub const TOS: u16 = 5;
    pub const TTL: u16 = 6;
    pub const SPORT: u16 = 7;
    pub const DPORT: u16 = 8;
    pub const OPTS: u16 = 9;
}

/// IPv4 endpoint attributes (NFTA_TUNNEL_KEY_IP_*)
pub mod ip_attrs {
    pub const SRC: u16 = 1;
    pub const DST: u16 = 2;
}

/// IPv6 endpoint attributes (NFTA_TUNNEL_KEY_IP6_*)
pub mod ip6_attrs {
    pub const SRC: u16 = 1;
    pub const DST: u16 = 2;
    pub const FLOWLABEL: u16 = 3;
}

/// Option container attributes (NFTA_TUNNEL_KEY_OPTS_*)
pub mod opts_attrs {
    pub const VXLAN: u16 = 1;
    pub const ERSPAN: u16 = 2;
}

/// VXLAN option attributes (NFTA_TUNNEL_KEY_VXLAN_*)
pub mod vxlan_attrs {
    pub const GBP: u16 = 1;
}

/// ERSPAN option attributes (NFTA_TUNNEL_KEY_ERSPAN_*)
pub mod erspan_attrs {
    pub const VERSION: u16 = 1;
    pub const V1_INDEX: u16 = 2;
    pub const V2_HWID: u16 = 3;
    pub const V2_DIR: u16 = 4;
}

/// User-visible tunnel flags (NFT_TUNNEL_F_*)
pub mod wire_flags {
    pub const ZERO_CSUM_TX: u32 = 1 << 0;
    pub const DONT_FRAGMENT: u32 = 1 << 1;
    pub const SEQ_NUMBER: u32 = 1 << 2;
    pub const MASK: u32 = ZERO_CSUM_TX | DONT_FRAGMENT | SEQ_NUMBER;
}

/// Tunnel metadata flags carried alongside the key (TUNNEL_*)
pub mod tun_flags {
    pub const CSUM: u16 = 0x0001;
    pub const KEY: u16 = 0x0004;
    pub const SEQ: u16 = 0x0008;
    pub const DONT_FRAGMENT: u16 = 0x0100;
    pub const VXLAN_OPT: u16 = 0x1000;
    pub const NOCACHE: u16 = 0x2000;
    pub const ERSPAN_OPT: u16 = 0x4000;
}

pub const ERSPAN_VERSION_1: u32 = 1;
pub const ERSPAN_VERSION_2: u32 = 2;

/// Size of the VXLAN option payload attached to tunnel metadata.
pub const VXLAN_OPTS_LEN: usize = 4;

/// Size of the ERSPAN option payload attached to tunnel metadata.
pub const ERSPAN_OPTS_LEN: usize = 12;

pub const ERSPAN_HWID_MAX: u8 = 31;
pub const ERSPAN_DIR_MAX: u8 = 1;
