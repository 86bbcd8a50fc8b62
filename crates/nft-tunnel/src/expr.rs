//! Tunnel match expression: loads a field of the packet's tunnel metadata
//! into a register, optionally restricted to one direction.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attr::{emit_attrs, Attr, AttrKind, AttributeSet, Policy};
use crate::consts::expr_attrs;
use crate::error::{TunnelError, TunnelResult};
use crate::packet::PacketTunnelContext;
use crate::registers::{Register, RegisterSink, Verdict};
use crate::types::TunnelInfo;

static EXPR_POLICY: Policy = Policy::new(
    "tunnel expression",
    &[
        (expr_attrs::KEY, AttrKind::U32),
        (expr_attrs::DREG, AttrKind::U32),
        (expr_attrs::MODE, AttrKind::U32),
    ],
);

/// Field loaded by the expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelField {
    /// Whether the packet carries matching tunnel metadata (1 byte).
    Path,
    /// 32-bit tunnel id.
    Id,
}

impl TunnelField {
    pub fn from_wire(value: u32) -> TunnelResult<Self> {
        match value {
            0 => Ok(Self::Path),
            1 => Ok(Self::Id),
            other => Err(TunnelError::UnsupportedField(other)),
        }
    }

    pub const fn to_wire(self) -> u32 {
        match self {
            Self::Path => 0,
            Self::Id => 1,
        }
    }

    /// Number of bytes written to the destination register.
    pub const fn width(self) -> usize {
        match self {
            Self::Path => 1,
            Self::Id => 4,
        }
    }
}

/// Direction restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    #[default]
    Any,
    /// Only metadata not marked for transmit.
    Rx,
    /// Only metadata marked for transmit.
    Tx,
}

impl TunnelMode {
    pub fn from_wire(value: u32) -> TunnelResult<Self> {
        match value {
            0 => Ok(Self::Any),
            1 => Ok(Self::Rx),
            2 => Ok(Self::Tx),
            other => Err(TunnelError::unsupported("tunnel mode", other)),
        }
    }

    pub const fn to_wire(self) -> u32 {
        match self {
            Self::Any => 0,
            Self::Rx => 1,
            Self::Tx => 2,
        }
    }

    /// Returns true if metadata of this direction satisfies the mode.
    pub const fn matches(self, info: &TunnelInfo) -> bool {
        match self {
            Self::Any => true,
            Self::Rx => !info.is_tx(),
            Self::Tx => info.is_tx(),
        }
    }
}

/// Result of evaluating the expression against one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum GetOutcome {
    Path(bool),
    Id(u32),
    /// Abort the current rule without writing a value.
    NoMatch,
}

/// Configured tunnel match expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelGetExpr {
    field: TunnelField,
    dreg: Register,
    mode: TunnelMode,
}

impl TunnelGetExpr {
    /// Builds an expression, validating the destination register.
    pub fn new(field: TunnelField, dreg: u32, mode: TunnelMode) -> TunnelResult<Self> {
        let dreg = Register::for_store(dreg, field.width())?;
        Ok(Self { field, dreg, mode })
    }

    /// Builds an expression from its attribute encoding.
    ///
    /// # Errors
    ///
    /// - [`TunnelError::MissingField`] if the field or register is absent
    /// - [`TunnelError::UnsupportedField`] for an unknown field
    /// - [`TunnelError::UnsupportedVariant`] for an unknown mode
    /// - [`TunnelError::RegisterWidthMismatch`] if the register cannot hold
    ///   the field
    pub fn from_attrs(buf: &[u8]) -> TunnelResult<Self> {
        let attrs = AttributeSet::parse(buf, &EXPR_POLICY)?;

        let field = attrs.require_u32(expr_attrs::KEY, "tunnel field")?;
        let dreg = attrs.require_u32(expr_attrs::DREG, "destination register")?;
        let field = TunnelField::from_wire(field)?;

        let mode = match attrs.get_u32(expr_attrs::MODE) {
            Some(mode) => TunnelMode::from_wire(mode)?,
            None => TunnelMode::Any,
        };

        Self::new(field, dreg, mode).inspect_err(|e| {
            debug!(error = %e, "Rejecting tunnel expression");
        })
    }

    pub fn field(&self) -> TunnelField {
        self.field
    }

    pub fn dreg(&self) -> Register {
        self.dreg
    }

    pub fn mode(&self) -> TunnelMode {
        self.mode
    }

    pub fn dump(&self) -> Vec<Attr> {
        vec![
            Attr::U32(expr_attrs::KEY, self.field.to_wire()),
            Attr::U32(expr_attrs::DREG, self.dreg.to_wire()),
            Attr::U32(expr_attrs::MODE, self.mode.to_wire()),
        ]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        emit_attrs(&self.dump())
    }

    /// Evaluates the expression against a packet's tunnel metadata.
    pub fn evaluate(&self, ctx: &PacketTunnelContext) -> GetOutcome {
        let matched = ctx.tunnel_info().filter(|info| self.mode.matches(info));

        match self.field {
            TunnelField::Path => GetOutcome::Path(matched.is_some()),
            TunnelField::Id => match matched {
                Some(info) => GetOutcome::Id(info.key().id.to_key32()),
                None => GetOutcome::NoMatch,
            },
        }
    }

    /// Evaluates the expression, writes the outcome to `regs` and returns it.
    pub fn eval<S: RegisterSink + ?Sized>(
        &self,
        regs: &mut S,
        ctx: &PacketTunnelContext,
    ) -> GetOutcome {
        let outcome = self.evaluate(ctx);

        match outcome {
            GetOutcome::Path(present) => regs.store8(self.dreg, u8::from(present)),
            GetOutcome::Id(id) => regs.store32(self.dreg, id),
            GetOutcome::NoMatch => regs.set_verdict(Verdict::Break),
        }
        outcome
    }
}
