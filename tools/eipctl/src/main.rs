//! eipctl - EtherNet/IP scanner command line tool
//!
//! Explicit reads and writes, identity queries, FANUC register access and
//! implicit I/O connections against a single device.

mod explicit;
mod implicit;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use voltage_eip::{load_config, ScannerConfig, Session};

use crate::explicit::{DataType, FanucCommands};

#[derive(Parser)]
#[command(name = "eipctl")]
#[command(about = "EtherNet/IP scanner for VoltageEMS")]
#[command(long_about = "EtherNet/IP scanner for VoltageEMS

Explicit messaging:
  identity    Read the identity object
  read        Get_Attribute_Single on any class/instance/attribute
  write       Set_Attribute_Single on any class/instance/attribute
  fanuc       FANUC R-30iB Plus registers

Implicit messaging:
  implicit    Open a configured I/O connection, exchange data, close it

Examples:
  eipctl --host 192.168.1.10 identity
  eipctl --host 192.168.1.10 read --class 0x01 --instance 1 --attribute 7 --type raw
  eipctl --host 192.168.1.10 fanuc block 1 10
  eipctl -c config/eipctl.yaml implicit robot_io --cycles 200")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Scanner configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Device address (overrides the configuration)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Explicit messaging port (overrides the configuration)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Response timeout in milliseconds (overrides the configuration)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the identity object (class 0x01, instance 1)
    Identity,

    /// Read one attribute
    Read {
        #[arg(long, value_parser = parse_number)]
        class: u16,
        #[arg(long, value_parser = parse_number)]
        instance: u16,
        #[arg(long, value_parser = parse_number)]
        attribute: u16,
        /// How to decode the reply data
        #[arg(long = "type", value_enum, default_value_t = DataType::Raw)]
        data_type: DataType,
    },

    /// Write one attribute
    Write {
        #[arg(long, value_parser = parse_number)]
        class: u16,
        #[arg(long, value_parser = parse_number)]
        instance: u16,
        #[arg(long, value_parser = parse_number)]
        attribute: u16,
        /// How to encode the value
        #[arg(long = "type", value_enum)]
        data_type: DataType,
        /// Value to write (hex bytes for `raw`, e.g. "0A0B")
        value: String,
    },

    /// FANUC R-30iB Plus registers
    #[command(subcommand)]
    Fanuc(FanucCommands),

    /// Open a configured implicit connection and exchange cyclic data
    Implicit {
        /// Connection name from the configuration file
        connection: String,
        /// Number of polling steps before closing
        #[arg(long, default_value_t = 200)]
        cycles: u32,
        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Use Large Forward Open
        #[arg(long)]
        large: bool,
    },
}

/// Parse decimal or `0x` prefixed hexadecimal
fn parse_number(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn resolve_config(cli: &Cli) -> Result<ScannerConfig> {
    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = &cli.host {
        config.session.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.session.port = port;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.session.timeout_ms = timeout_ms;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let session = Session::connect(
        &config.session.host,
        config.session.port,
        config.session.timeout(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to open session with {}:{}",
            config.session.host, config.session.port
        )
    })?;

    if !cli.json {
        println!(
            "{} {}:{} (handle 0x{:08X})",
            "Session:".bright_cyan(),
            config.session.host,
            config.session.port,
            session.handle()
        );
    }

    let result = match cli.command {
        Commands::Identity => explicit::identity(&session, cli.json).await,
        Commands::Read {
            class,
            instance,
            attribute,
            data_type,
        } => explicit::read(&session, class, instance, attribute, data_type, cli.json).await,
        Commands::Write {
            class,
            instance,
            attribute,
            data_type,
            value,
        } => {
            explicit::write(&session, class, instance, attribute, data_type, &value, cli.json)
                .await
        },
        Commands::Fanuc(command) => explicit::fanuc(&session, command, cli.json).await,
        Commands::Implicit {
            connection,
            cycles,
            interval_ms,
            large,
        } => {
            implicit::run(
                &session,
                &config,
                &connection,
                cycles,
                Duration::from_millis(interval_ms),
                large,
                cli.json,
            )
            .await
        },
    };

    session.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    logging::init(cli.verbose, !cli.no_color);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x6B"), Ok(0x6B));
        assert_eq!(parse_number("107"), Ok(107));
        assert!(parse_number("0xZZ").is_err());
        assert!(parse_number("70000").is_err());
    }
}
