use std::io::{self, Write as _};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mpproc_core::{iproto, registry, Capture, PROCEDURES};
use tracing_subscriber::EnvFilter;

mod convert;
mod remote;

pub const ENV_LOG: &str = "MPPROC_LOG";

#[derive(Parser, Debug)]
#[command(name = "mpproc")]
#[command(about = "Run MessagePack stored procedures in-process or on a database.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered procedures.
    List,
    /// Call a procedure and print each value it returns.
    Call {
        /// Procedure name, optionally module-qualified (`procedures.sum`).
        name: String,
        /// Arguments as JSON, normally an array. Defaults to `[]`.
        #[arg(conflicts_with = "hex")]
        args: Option<String>,
        /// Arguments as hex-encoded MessagePack, passed through unchanged.
        #[arg(long)]
        hex: Option<String>,
        /// Print returned values as hex-encoded MessagePack instead of JSON.
        #[arg(long, default_value_t = false)]
        hex_out: bool,
        /// Call over iproto on a database at `host:port` instead of in-process.
        #[arg(long)]
        remote: Option<String>,
        /// Connect and I/O timeout for `--remote`, in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
    /// Check that a database at `host:port` answers iproto requests.
    Ping {
        addr: String,
        /// Connect and I/O timeout, in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();
    if let Err(err) = try_main() {
        eprintln!("mpproc: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::List => run_list(),
        Command::Call {
            name,
            args,
            hex,
            hex_out,
            remote,
            timeout,
        } => {
            let args = encode_args(args.as_deref(), hex.as_deref())?;
            match remote {
                Some(addr) => run_remote_call(&addr, timeout, &name, &args, hex_out),
                None => run_call(&name, &args, hex_out),
            }
        }
        Command::Ping { addr, timeout } => run_ping(&addr, timeout),
    }
}

fn run_list() -> Result<()> {
    let mut out = io::stdout().lock();
    for p in PROCEDURES {
        writeln!(out, "{:<6} {:<17} {}", p.name, p.module, p.about)?;
    }
    Ok(())
}

fn encode_args(json: Option<&str>, hex_args: Option<&str>) -> Result<Vec<u8>> {
    if let Some(h) = hex_args {
        return hex::decode(h.trim()).context("parse --hex arguments");
    }
    let json = json.unwrap_or("[]");
    let v: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("parse JSON arguments: {json}"))?;
    convert::encode(&convert::json_to_mp(&v))
}

fn print_values<'a>(values: impl IntoIterator<Item = &'a [u8]>, hex_out: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    for mp in values {
        if hex_out {
            writeln!(out, "{}", hex::encode(mp))?;
            continue;
        }
        for v in convert::decode_all(mp).context("render result (try --hex-out)")? {
            writeln!(out, "{}", convert::mp_to_json(&v))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn run_call(name: &str, args: &[u8], hex_out: bool) -> Result<()> {
    tracing::debug!(procedure = name, args = %hex::encode(args), "encoded arguments");

    let mut host = Capture::new();
    registry::call(name, &mut host, args).with_context(|| format!("call {name}"))?;
    print_values(host.returned().iter().map(Vec::as_slice), hex_out)
}

fn run_remote_call(addr: &str, timeout: u64, name: &str, args: &[u8], hex_out: bool) -> Result<()> {
    tracing::debug!(procedure = name, addr, args = %hex::encode(args), "encoded arguments");

    let mut conn = remote::Connection::connect(addr, Duration::from_secs(timeout))?;
    let data = conn
        .call(name, args)
        .with_context(|| format!("call {name} on {addr}"))?;
    print_values(iproto::split_array(&data)?, hex_out)
}

fn run_ping(addr: &str, timeout: u64) -> Result<()> {
    let mut conn = remote::Connection::connect(addr, Duration::from_secs(timeout))?;
    conn.ping().with_context(|| format!("ping {addr}"))?;
    println!("ok");
    Ok(())
}
