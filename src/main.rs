//! vMix TCP command line client
//!
//! Sends commands to a vMix instance or prints everything it pushes.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::{signal, time};
use tracing::{error, info, warn};
use vmix_tcp::config::{parse_level, ClientConfig, ConnectionSection, LoggingSection};
use vmix_tcp::observability::init_logging;
use vmix_tcp::{listener, ClientResult, Command, Event, EventKind, FunctionCommand, TcpClient};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Persistent client for the vMix TCP API
#[derive(Parser)]
#[command(name = "vmix-tcp")]
#[command(about = "Send commands to vMix and watch tally, activators and responses")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// vMix host, overrides the configuration file
    #[arg(long, env = "VMIX_HOST")]
    host: Option<String>,

    /// vMix TCP API port, overrides the configuration file
    #[arg(long, env = "VMIX_PORT")]
    port: Option<u32>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send commands and print the responses
    Send {
        /// Raw commands, sent in order (e.g. "tally" or "XMLTEXT vmix/version")
        commands: Vec<String>,

        /// Send a FUNCTION call instead of raw commands
        #[arg(short, long, value_name = "NAME", conflicts_with = "commands")]
        function: Option<String>,

        /// Function parameter as key=value, repeatable, order is kept
        #[arg(short, long, value_name = "KEY=VALUE", requires = "function")]
        param: Vec<String>,

        /// How long to wait for responses after sending
        #[arg(long, default_value_t = 500)]
        wait_ms: u64,
    },
    /// Print pushed messages until Ctrl-C
    Listen {
        /// Subscriptions to request on every connect (e.g. tally, acts)
        #[arg(short, long)]
        subscribe: Vec<String>,
    },
    /// Validate the configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    init_cli_logging(&config.logging, cli.verbose);

    let result = match cli.command {
        Commands::Send {
            commands,
            function,
            param,
            wait_ms,
        } => match build_commands(commands, function, param) {
            Ok(commands) => run_send(&config, commands, Duration::from_millis(wait_ms)).await,
            Err(e) => Err(e),
        },
        Commands::Listen { subscribe } => run_listen(&config, subscribe).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(cli: &Cli) -> CliResult<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path)?,
        None => {
            let default_path = PathBuf::from("vmix.toml");
            if default_path.exists() {
                ClientConfig::load_from_file(&default_path)?
            } else {
                let host = cli
                    .host
                    .clone()
                    .ok_or("No configuration file found; pass --host, VMIX_HOST or -c/--config")?;
                ClientConfig {
                    connection: ConnectionSection::new(host),
                    logging: LoggingSection::default(),
                }
            }
        }
    };

    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
        config.connection.host_env = None;
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn init_cli_logging(logging: &LoggingSection, verbose: u8) {
    let level = match verbose {
        0 => parse_level(&logging.level),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    init_logging(level, logging.format(), logging.spans);
}

fn build_commands(
    raw: Vec<String>,
    function: Option<String>,
    params: Vec<String>,
) -> CliResult<Vec<Command>> {
    if let Some(name) = function {
        let mut function = FunctionCommand::new(name);
        for param in params {
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| format!("Parameter '{param}' is not key=value"))?;
            function = function.param(key, value);
        }
        return Ok(vec![function.into()]);
    }

    if raw.is_empty() {
        return Err("Nothing to send: pass commands or --function".into());
    }
    Ok(raw.into_iter().map(Command::from).collect())
}

/// Forward the given kinds to a channel the CLI can await on
fn forward_events(client: &TcpClient, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    let forward = listener(move |event| {
        let _ = tx.send(event.clone());
    });
    for kind in kinds {
        client.add_listener(*kind, forward.clone());
    }
    rx
}

async fn run_send(config: &ClientConfig, commands: Vec<Command>, wait: Duration) -> CliResult<()> {
    let options = config.to_options().with_auto_reconnect(false);
    let connect_timeout = options.connect_timeout;
    let client = TcpClient::new(config.host(), options)?;
    let mut events = forward_events(
        &client,
        &[
            EventKind::Connect,
            EventKind::Close,
            EventKind::Data,
            EventKind::Error,
        ],
    );

    if !config.connection.connect_on_startup {
        client.connect()?;
    }

    // Connect or give up
    loop {
        let event = time::timeout(connect_timeout * 2, events.recv())
            .await
            .map_err(|_| "Timed out waiting for connection")?
            .ok_or("Client stopped")?;
        match event {
            Event::Connect => break,
            Event::Close { .. } => {
                client.shutdown().await?;
                return Err(format!(
                    "Could not connect to {}:{}",
                    client.host(),
                    client.port()
                )
                .into());
            }
            Event::Error(message) => warn!("{}", message),
            _ => {}
        }
    }

    info!(count = commands.len(), "Sending commands");
    client.send(commands)?;

    let deadline = time::sleep(wait);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(Event::Data(line)) => println!("{line}"),
                Some(Event::Error(message)) => eprintln!("error: {message}"),
                Some(Event::Close { .. }) | None => break,
                Some(_) => {}
            },
        }
    }

    client.shutdown().await?;
    Ok(())
}

async fn run_listen(config: &ClientConfig, subscriptions: Vec<String>) -> CliResult<()> {
    let client = TcpClient::new(config.host(), config.to_options())?;
    let mut events = forward_events(&client, &EventKind::ALL);

    if !config.connection.connect_on_startup {
        client.connect()?;
    }

    let subscribe: Vec<Command> = subscriptions
        .iter()
        .map(|topic| Command::from(format!("SUBSCRIBE {}", topic.to_uppercase())))
        .collect();

    info!(host = %client.host(), port = client.port(), "Listening, press Ctrl-C to stop");

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, Event::Connect) {
                    request_subscriptions(&client, &subscribe)?;
                }
                print_event(&event)?;
            }
        }
    }

    client.shutdown().await?;
    Ok(())
}

/// Subscribe on the current connection
///
/// A connection lost before the request goes out is not fatal; the next
/// `connect` retries it.
fn request_subscriptions(client: &TcpClient, subscribe: &[Command]) -> ClientResult<()> {
    if subscribe.is_empty() {
        return Ok(());
    }
    match client.send(subscribe.to_vec()) {
        Err(e) if e.is_usage_error() => {
            warn!(error = %e, "Could not subscribe, retrying on next connect");
            Ok(())
        }
        result => result,
    }
}

fn print_event(event: &Event) -> CliResult<()> {
    match event {
        Event::Data(line) => println!("{line}"),
        Event::Xml(body) => println!("xml: {body}"),
        Event::Activators(line) => println!("activators: {line}"),
        Event::Tally(summary) => println!("tally: {}", serde_json::to_string(summary)?),
        Event::Error(message) => eprintln!("error: {message}"),
        Event::Lookup { address } => info!(%address, "Resolved host"),
        Event::Close { had_error } => info!(had_error, "Connection closed"),
        other => info!(event = %other.kind(), "Connection event"),
    }
    Ok(())
}

fn handle_config_command(config: &ClientConfig, show: bool) -> CliResult<()> {
    if show {
        println!("{}", config.to_toml()?);
    }
    info!(
        host = %config.host(),
        port = config.connection.port,
        "Configuration is valid"
    );
    Ok(())
}
