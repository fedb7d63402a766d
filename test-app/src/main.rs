// hyvfd command-line demo -- drives a Huanyang VFD interactively from G-code
// typed on stdin, against real hardware or a simulated drive.
//
// Usage:
//   hyvfd-cli --port /dev/ttyUSB0
//   hyvfd-cli --port COM3 --baud 19200 --interval 500
//   hyvfd-cli --mock --log-level debug
//
// At the prompt:
//   M3, M4, M5, Snnnn   spindle commands (several per line are fine)
//   ?                   print the output RPM
//   $                   print link and speed status
//   help                list commands
//   exit                close the drive and quit

mod logging;
mod sim;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use hyvfd::{Drive, DriveBuilder};

use crate::logging::{LogFormat, LogLevel, init_logging};

const COMMAND_HELP: &str = "Commands: M3, M4, M5, Snnnn, ?, $, exit, help";

/// Interactive command-line demo for Huanyang VFDs.
#[derive(Parser)]
#[command(name = "hyvfd-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Required unless --mock.
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Output frequency polling interval in milliseconds.
    #[arg(long, default_value_t = 750)]
    interval: u64,

    /// Conversion factor from RPM to drive frequency units.
    #[arg(long, default_value_t = 3.47222)]
    rpm2hz: f64,

    /// Talk to a simulated drive instead of a serial port.
    #[arg(long)]
    mock: bool,

    /// Log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

async fn connect(cli: &Cli) -> Result<Drive> {
    let mut builder = DriveBuilder::new()
        .baud_rate(cli.baud)
        .hertz_per_rpm(cli.rpm2hz)
        .poll_interval(Duration::from_millis(cli.interval));

    if cli.mock {
        let drive = builder.build().context("invalid drive settings")?;
        drive
            .open_with_transport(Box::new(sim::simulated_transport()))
            .await
            .context("failed to start simulated drive")?;
        println!("Connected (simulated drive)");
        return Ok(drive);
    }

    let Some(port) = cli.port.as_deref() else {
        bail!("--port is required when not using --mock");
    };
    builder = builder.serial_port(port);
    let drive = builder.build().context("invalid drive settings")?;
    drive
        .open()
        .await
        .with_context(|| format!("failed to open serial port '{port}'"))?;
    println!("Connected to {port} at {} baud", cli.baud);
    Ok(drive)
}

fn print_status(drive: &Drive) {
    let status = drive.processed();
    println!(
        "online: {}  rpm: {}  frequency: {}/{}  at speed: {}  queue drained: {}",
        drive.online(),
        drive.output_rpm(),
        drive.output_frequency(),
        drive.set_frequency(),
        status.frequency_ok,
        status.queue_drained,
    );
}

async fn prompt() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    Ok(())
}

async fn repl(drive: &Drive) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt().await?;
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "?" => println!("Output RPM: {}", drive.output_rpm()),
            "$" => print_status(drive),
            "help" => println!("{COMMAND_HELP}"),
            "exit" => break,
            text => {
                if !drive.command(text) {
                    println!("Command queue full, some words were dropped");
                }
            }
        }
        prompt().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    println!("hyvfd command line demo");
    println!("{COMMAND_HELP}");

    let drive = connect(&cli).await?;
    let result = repl(&drive).await;
    drive.close().await.context("failed to close drive")?;
    println!("End.");
    result
}
