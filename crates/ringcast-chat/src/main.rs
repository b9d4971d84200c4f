/// ringcast: console peer for a ring relay.
///
/// Every peer listens on its own address and forwards to exactly one next
/// hop. Messages travel round the ring until each recipient has them, and
/// each recipient sends a notification back round to the sender.
///
/// Usage:
///   ringcast --name P1 --listen 127.0.0.1:9651 --next-hop 127.0.0.1:9652
///   ringcast                      # prompts for name and addresses
mod commands;
mod console;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use commands::Command;
use ringcast_protocol::{PeerAddress, RingRuntime, RuntimeChannels, RuntimeConfig, RuntimeHandle};
use ringcast_transport::{RingNode, RingNodeConfig};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(name = "ringcast", version, about = "Ring relay chat peer")]
struct Cli {
    /// Display name of this peer, unique within the ring.
    #[arg(short, long, env = "RINGCAST_NAME")]
    name: Option<String>,

    /// Address to listen on (host:port).
    #[arg(short, long, env = "RINGCAST_LISTEN")]
    listen: Option<String>,

    /// Address of the next peer in the ring (host:port).
    #[arg(long, env = "RINGCAST_NEXT_HOP")]
    next_hop: Option<String>,

    /// Address other peers should see in our frames. Defaults to --listen.
    #[arg(long)]
    advertise: Option<PeerAddress>,

    /// Hop ceiling for messages we send.
    #[arg(long, default_value = "10")]
    max_hops: u32,

    /// Seconds between reconnect attempts to the next hop.
    #[arg(long, default_value = "5")]
    reconnect_secs: u64,

    /// Log file. Default: <name>.log
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log to stderr instead of a file.
    #[arg(long)]
    log_stderr: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();

    let name = match cli.name.clone() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => prompt(&mut input, "Enter your name: ").await?,
    };
    let listen = address(cli.listen.as_deref(), &mut input, "Enter your address (host:port): ")
        .await
        .context("invalid listen address")?;
    let next_hop = address(
        cli.next_hop.as_deref(),
        &mut input,
        "Enter next hop address (host:port): ",
    )
    .await
    .context("invalid next hop address")?;

    init_logging(&cli, &name)?;

    let mut node_config = RingNodeConfig::new(listen, next_hop.clone())
        .reconnect_interval(Duration::from_secs(cli.reconnect_secs.max(1)));
    if let Some(advertised) = cli.advertise.clone() {
        node_config = node_config.advertised(advertised);
    }
    let node = RingNode::bind(node_config)
        .await
        .context("cannot bind listen address")?;

    let mut config = RuntimeConfig::new(name.as_str());
    config.default_max_hops = cli.max_hops;

    eprintln!("ringcast v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("{} listening on {}, next hop {}", name, node.local_addr(), next_hop);
    eprintln!("Type 'help' for commands.");
    eprintln!();

    let channels = RingRuntime::spawn(node, config);
    let handle = channels.handle.clone();
    run(channels, &mut input).await?;

    handle.shutdown();
    if tokio::time::timeout(Duration::from_secs(5), handle.stopped())
        .await
        .is_err()
    {
        tracing::warn!("shutdown did not complete in time");
    }
    tracing::info!("{name} left the ring");
    Ok(())
}

/// Console loop: commands from stdin, events from the runtime.
async fn run(channels: RuntimeChannels, input: &mut Input) -> Result<()> {
    let RuntimeChannels {
        handle,
        mut messages,
        mut notifications,
        mut status_changes,
        mut events,
    } = channels;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCtrl+C received, shutting down...");
                break;
            }
            line = input.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(&handle, command).await,
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
            Some(msg) = messages.recv() => {
                println!("{}", console::delivered_line(&msg));
            }
            Some(notice) = notifications.recv() => {
                match console::notification_line(&notice) {
                    Some(line) => println!("{line}"),
                    None => tracing::debug!(
                        "relayed receipt: {} received {}'s message",
                        notice.recipient,
                        notice.original_sender
                    ),
                }
            }
            Some(change) = status_changes.recv() => {
                tracing::info!("message {} {} -> {}", change.message_id, change.previous, change.current);
            }
            Some(event) = events.recv() => {
                if let Some(line) = console::event_line(&event) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

async fn execute(handle: &RuntimeHandle, command: Command) {
    match command {
        Command::Send { recipients, text } => match handle.send(&recipients, &text).await {
            Ok(id) => println!("Sent {id} to {}", recipients.join(", ")),
            Err(e) => println!("Send failed: {e}"),
        },
        Command::Print => println!("{}", console::ledger(&handle.delivered())),
        Command::Peers => println!("{}", console::peers(&handle.peers())),
        Command::Status(id) => println!("{}", console::status(&id, handle.status(&id).as_ref())),
        Command::Stats => match serde_json::to_string_pretty(&handle.metrics()) {
            Ok(json) => {
                println!("{json}");
                println!("next hop connected: {}", handle.next_hop_connected());
            }
            Err(e) => println!("cannot render stats: {e}"),
        },
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
}

// ── Start-up ─────────────────────────────────────────────────────────

async fn prompt(input: &mut Input, question: &str) -> Result<String> {
    loop {
        print!("{question}");
        std::io::stdout().flush()?;
        match input.next_line().await? {
            Some(line) if !line.trim().is_empty() => return Ok(line.trim().to_string()),
            Some(_) => continue,
            None => bail!("stdin closed while waiting for input"),
        }
    }
}

/// A flag value must parse; an interactive answer is asked again until it does.
async fn address(flag: Option<&str>, input: &mut Input, question: &str) -> Result<PeerAddress> {
    if let Some(value) = flag {
        return Ok(value.parse()?);
    }
    loop {
        let answer = prompt(input, question).await?;
        match answer.parse() {
            Ok(addr) => return Ok(addr),
            Err(e) => println!("{e}"),
        }
    }
}

fn init_logging(cli: &Cli, name: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if cli.log_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    let path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{name}.log")));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
