//! nft-tunnel command line tool
//!
//! Compiles tunnel configurations to attribute buffers, decodes buffers back
//! to tunnel metadata and evaluates match expressions against them.
//!
//! # Usage
//!
//! ```bash
//! # Compile a YAML tunnel object to hex attributes
//! nft-tunnel encode tunnel.yaml
//!
//! # Decode hex attributes into JSON
//! nft-tunnel decode 08000100...
//!
//! # Load the tunnel id of a transmit packet into NFT_REG32_00
//! nft-tunnel eval --object tunnel.yaml --field id --mode tx
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use nft_tunnel::registers::NFT_REG32_00;
use nft_tunnel::{
    GetExprConfig, PacketTunnelContext, Registers, TunnelConfig, TunnelField, TunnelGetExpr,
    TunnelInfo, TunnelMode, TunnelObject,
};

#[derive(Parser, Debug)]
#[command(name = "nft-tunnel")]
#[command(author, version, about = "nf_tables tunnel object and expression tool", long_about = None)]
struct Args {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a YAML/JSON configuration into hex attributes
    Encode {
        /// Configuration file
        config: PathBuf,

        /// Treat the file as a match expression instead of a tunnel object
        #[arg(long)]
        expr: bool,
    },

    /// Decode hex tunnel key attributes into JSON
    Decode {
        /// Hex-encoded attribute buffer
        hex: String,
    },

    /// Evaluate a match expression against a packet
    Eval {
        /// Tunnel object configuration attached to the packet
        #[arg(long, conflicts_with = "object_hex")]
        object: Option<PathBuf>,

        /// Tunnel object as hex attributes
        #[arg(long)]
        object_hex: Option<String>,

        /// Field to load
        #[arg(long, value_enum)]
        field: FieldArg,

        /// Direction restriction
        #[arg(long, value_enum, default_value = "any")]
        mode: ModeArg,

        /// Destination register
        #[arg(long, default_value_t = NFT_REG32_00)]
        dreg: u32,

        /// Direction of the packet's tunnel metadata
        #[arg(long, value_enum, default_value = "tx")]
        direction: DirectionArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FieldArg {
    Path,
    Id,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Any,
    Rx,
    Tx,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DirectionArg {
    /// Metadata set by the tunnel object
    Tx,
    /// Metadata as attached on receive
    Rx,
    /// No tunnel metadata
    None,
}

impl From<FieldArg> for TunnelField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Path => TunnelField::Path,
            FieldArg::Id => TunnelField::Id,
        }
    }
}

impl From<ModeArg> for TunnelMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Any => TunnelMode::Any,
            ModeArg::Rx => TunnelMode::Rx,
            ModeArg::Tx => TunnelMode::Tx,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Encode { config, expr } => encode(&config, expr),
        Command::Decode { hex } => decode(&hex),
        Command::Eval {
            object,
            object_hex,
            field,
            mode,
            dreg,
            direction,
        } => {
            let object = match (object, object_hex) {
                (Some(path), _) => load_object(&path)?,
                (None, Some(hex)) => decode_object(&hex)?,
                (None, None) => bail!("one of --object or --object-hex is required"),
            };
            let expr = TunnelGetExpr::new(field.into(), dreg, mode.into())
                .context("invalid match expression")?;
            eval(&object, &expr, direction)
        }
    }
}

fn encode(path: &Path, expr: bool) -> Result<()> {
    let buf = if expr {
        GetExprConfig::load(path)?.encode()?
    } else {
        TunnelConfig::load(path)?.encode()?
    };
    println!("{}", hex::encode(buf));
    Ok(())
}

fn decode(input: &str) -> Result<()> {
    let object = decode_object(input)?;
    let info = object.info();

    let output = json!({
        "info": info.as_ref(),
        "config": TunnelConfig::from(info.as_ref()),
        "tun_flags": format!("{:#06x}", info.tun_flags()),
        "canonical": hex::encode(object.to_bytes()),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn eval(object: &TunnelObject, expr: &TunnelGetExpr, direction: DirectionArg) -> Result<()> {
    let mut ctx = PacketTunnelContext::new();
    match direction {
        DirectionArg::Tx => object.eval(&mut ctx),
        DirectionArg::Rx => {
            let info = object.info();
            let rx = TunnelInfo::rx(*info.key(), *info.options());
            ctx = PacketTunnelContext::with_tunnel(Arc::new(rx));
        }
        DirectionArg::None => {}
    }

    let mut regs = Registers::new();
    let outcome = expr.eval(&mut regs, &ctx);
    debug!(?outcome, "Evaluated match expression");

    let output = json!({
        "outcome": outcome,
        "verdict": regs.verdict(),
        "dreg": expr.dreg().to_wire(),
        "register": format!("{:#010x}", regs.load32(expr.dreg())),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_object(path: &Path) -> Result<TunnelObject> {
    let buf = TunnelConfig::load(path)?
        .encode()
        .with_context(|| format!("failed to compile {}", path.display()))?;
    Ok(TunnelObject::from_attrs(&buf)?)
}

fn decode_object(input: &str) -> Result<TunnelObject> {
    let buf = hex::decode(input.trim()).context("attribute buffer is not valid hex")?;
    TunnelObject::from_attrs(&buf).context("failed to decode tunnel object")
}
