//! Register file and verdict sink used by packet-time evaluation.
//!
//! Register numbering follows nf_tables: `NFT_REG_1..NFT_REG_4` name 16-byte
//! registers and `NFT_REG32_00..NFT_REG32_15` name 32-bit registers; both
//! address the same data area. The first 16 bytes hold the verdict and cannot
//! be used as a store destination.

use serde::Serialize;

use crate::error::{TunnelError, TunnelResult};

/// Number of 32-bit words in the register file, verdict area included.
pub const NFT_REG32_NUM: usize = 20;

const NFT_REG_SIZE: u32 = 16;
const NFT_REG32_SIZE: u32 = 4;
const WORDS_PER_REG: u32 = NFT_REG_SIZE / NFT_REG32_SIZE;

pub const NFT_REG_VERDICT: u32 = 0;
pub const NFT_REG_1: u32 = 1;
pub const NFT_REG_4: u32 = 4;
pub const NFT_REG32_00: u32 = 8;
pub const NFT_REG32_15: u32 = 23;

/// Validated store destination, as an index into 32-bit register words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Register(u32);

impl Register {
    /// Parses a destination register and checks that `len` bytes fit.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::RegisterWidthMismatch`] if the register aliases
    /// the verdict or the store would run past the end of the register file.
    pub fn for_store(wire: u32, len: usize) -> TunnelResult<Self> {
        let index = match wire {
            NFT_REG_VERDICT..=NFT_REG_4 => wire * WORDS_PER_REG,
            _ => wire.wrapping_add(WORDS_PER_REG).wrapping_sub(NFT_REG32_00),
        };

        let end = (index as usize)
            .checked_mul(NFT_REG32_SIZE as usize)
            .and_then(|offset| offset.checked_add(len));
        let fits = matches!(end, Some(end) if end <= NFT_REG32_NUM * NFT_REG32_SIZE as usize);

        if index < WORDS_PER_REG || len == 0 || !fits {
            return Err(TunnelError::RegisterWidthMismatch {
                register: wire,
                len,
            });
        }
        Ok(Register(index))
    }

    /// Word index into the register file.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Register number for dumps; 16-byte aligned registers use the legacy
    /// `NFT_REG_x` numbering.
    pub const fn to_wire(self) -> u32 {
        if self.0 % WORDS_PER_REG == 0 {
            self.0 / WORDS_PER_REG
        } else {
            self.0 - WORDS_PER_REG + NFT_REG32_00
        }
    }
}

/// Rule evaluation outcome recorded by expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Continue,
    /// Stop evaluating the current rule.
    Break,
}

/// Destination for expression results.
pub trait RegisterSink {
    /// Stores a single byte, zeroing the rest of the word.
    fn store8(&mut self, reg: Register, value: u8);

    fn store32(&mut self, reg: Register, value: u32);

    fn set_verdict(&mut self, verdict: Verdict);
}

/// In-memory register file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    data: [u32; NFT_REG32_NUM],
    verdict: Verdict,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn load8(&self, reg: Register) -> u8 {
        self.data[reg.index()] as u8
    }

    pub fn load32(&self, reg: Register) -> u32 {
        self.data[reg.index()]
    }
}

impl RegisterSink for Registers {
    fn store8(&mut self, reg: Register, value: u8) {
        self.data[reg.index()] = u32::from(value);
    }

    fn store32(&mut self, reg: Register, value: u32) {
        self.data[reg.index()] = value;
    }

    fn set_verdict(&mut self, verdict: Verdict) {
        self.verdict = verdict;
    }
}
