//! Command-line interface for the twinlink message mapper.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use twinlink_core::config::{env_vars, split_list, ConnectorSettings};
use twinlink_core::MappingCatalog;
use twinlink_routing::{Routed, Router, TransportMessage};

/// twinlink - map digital twin messages to cloud messages and back.
#[derive(Parser, Debug)]
#[command(name = "twinlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// JSON settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path of the message mapper config.
    #[arg(long, global = true)]
    mapper_config: Option<String>,

    #[arg(long, global = true)]
    device_id: Option<String>,

    #[arg(long, global = true)]
    hub_name: Option<String>,

    /// Comma-separated local topic filters forwarded unchanged.
    #[arg(long, global = true)]
    passthrough_device_topics: Option<String>,

    /// Comma-separated cloud command names forwarded unchanged.
    #[arg(long, global = true)]
    passthrough_command_names: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route one Ditto message towards the cloud.
    Telemetry {
        /// Local topic the message was received on.
        #[arg(long)]
        topic: Option<String>,
        /// Payload file, stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Route one cloud command towards the device.
    Command {
        /// Payload file, stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Route newline-delimited payloads from stdin.
    Stream {
        direction: Direction,
        /// Local topic of every telemetry line.
        #[arg(long)]
        topic: Option<String>,
    },
    /// Load and validate the message mapper config.
    Check,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Telemetry,
    Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = resolve_settings(&args)?;

    init_logging(&settings, args.verbose);

    match args.command {
        Command::Check => run_check(&settings),
        Command::Telemetry { topic, file } => {
            let router = build_router(&settings)?;
            let payload = read_payload(file.as_deref())?;
            let mut msg = TransportMessage::new(payload);
            if let Some(topic) = topic {
                msg = msg.with_source_topic(topic);
            }
            print_routed(router.route_telemetry(msg)?);
            Ok(())
        }
        Command::Command { file } => {
            let router = build_router(&settings)?;
            let payload = read_payload(file.as_deref())?;
            print_routed(router.route_command(TransportMessage::new(payload))?);
            Ok(())
        }
        Command::Stream { direction, topic } => {
            let router = Arc::new(build_router(&settings)?);
            run_stream(router, direction, topic).await
        }
    }
}

/// Defaults, settings file, environment, then flags.
fn resolve_settings(args: &Args) -> Result<ConnectorSettings> {
    let mut settings = ConnectorSettings::load(args.config.as_deref())
        .context("cannot parse config")?;

    if let Some(v) = &args.mapper_config {
        settings.message_mapper_config = v.clone();
    }
    if let Some(v) = &args.device_id {
        settings.device_id = v.clone();
    }
    if let Some(v) = &args.hub_name {
        settings.hub_name = v.clone();
    }
    if let Some(v) = &args.passthrough_device_topics {
        settings.passthrough_device_topics = split_list(v);
    }
    if let Some(v) = &args.passthrough_command_names {
        settings.passthrough_command_names = split_list(v);
    }
    Ok(settings)
}

fn init_logging(settings: &ConnectorSettings, verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let level = if verbose { "debug" } else { settings.log_level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("twinlink={}", level)));

    // Logs go to stderr, routed messages to stdout
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

/// A mapper config that fails to load leaves only the passthrough handlers.
fn build_router(settings: &ConnectorSettings) -> Result<Router> {
    settings.validate().context("settings validation error")?;

    let catalog = match MappingCatalog::load(&settings.message_mapper_config) {
        Ok(catalog) => Some(Arc::new(catalog)),
        Err(e) => {
            error!(
                path = %settings.message_mapper_config,
                error = %e,
                "Cannot load message mapper config"
            );
            None
        }
    };

    let router = Router::from_settings(settings, catalog);
    for handler in router.telemetry_handlers() {
        info!(handler = handler.name(), topics = %handler.topics(), "Telemetry handler ready");
    }
    for handler in router.command_handlers() {
        info!(handler = handler.name(), "Command handler ready");
    }
    Ok(router)
}

fn run_check(settings: &ConnectorSettings) -> Result<()> {
    let catalog = MappingCatalog::load(&settings.message_mapper_config)
        .with_context(|| format!("cannot load {}", settings.message_mapper_config))?;

    println!("Message mapper config: {}", settings.message_mapper_config);
    println!("Telemetry rules:");
    for mappings in catalog.telemetry_mappings() {
        for (sub_type, rule) in &mappings.sub_types {
            let props = &rule.mapping_properties;
            println!(
                "  {}/{} topic={:?} path={:?} descriptor={}",
                mappings.message_type,
                sub_type,
                props.topic_pattern().unwrap_or("-"),
                props.path_pattern().unwrap_or("-"),
                rule.descriptor().unwrap_or("-"),
            );
        }
    }
    println!("Command rules:");
    for name in catalog.command_names() {
        let rule = catalog.command_mapping(name)?;
        println!(
            "  {} thing={:?} action={:?} descriptor={}",
            name,
            rule.mapping_properties.thing,
            rule.mapping_properties.action,
            rule.descriptor().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn run_stream(router: Arc<Router>, direction: Direction, topic: Option<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let router = router.clone();
        let topic = topic.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut msg = TransportMessage::new(line);
            match direction {
                Direction::Telemetry => {
                    if let Some(topic) = topic {
                        msg = msg.with_source_topic(topic);
                    }
                    router.route_telemetry(msg)
                }
                Direction::Command => router.route_command(msg),
            }
        })
        .await?;

        match result {
            Ok(routed) => print_routed(routed),
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Message not routed");
                println!("{}", json!({"error": e.to_string(), "kind": e.kind()}));
            }
        }
    }
    Ok(())
}

fn read_payload(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_routed(routed: Routed) {
    match routed {
        Routed::Forward(msg) => {
            let payload = serde_json::from_slice::<Value>(&msg.payload)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&msg.payload).into_owned()));
            println!(
                "{}",
                json!({"topic": msg.outgoing_topic(), "payload": payload})
            );
        }
        Routed::Dropped => println!("{}", json!({"dropped": true})),
    }
}
