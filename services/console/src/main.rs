//! SwarmLink control console
//!
//! Discovers units from their beacons, serves remote clients on the command
//! port and relays operator commands typed on stdin.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swarmlink_c2_router::{console_chain, CommandRelay, ConsoleState, RelayTrigger, TargetSelection};
use swarmlink_core::entity::EntityStore;
use swarmlink_core::{logging, Config, NodeRole};
use swarmlink_mesh::{
    BeaconReceiver, Binding, CommandSender, ConnectionListener, ConnectionRegistry,
    ConnectionSettings, Dispatcher, EventBus, LinkEvent,
};
use swarmlink_unit_status::{LogSink, UnitRoster, DEFAULT_SINK_CAPACITY};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod prompt;

use prompt::{Outcome, Prompt, HELP};

const USAGE: &str = "usage: swarmlink-console [--config <path>] [--node-id <id>]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    node_id: Option<String>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args_iter = args.iter().skip(1);
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => match args_iter.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--node-id" => match args_iter.next() {
                Some(id) => parsed.node_id = Some(id.clone()),
                None => bail!("--node-id was provided without a value"),
            },
            "--help" | "-h" => parsed.help = true,
            other => bail!("unexpected argument {other}\n{USAGE}"),
        }
    }
    Ok(parsed)
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            let mut config = Config::default_config();
            config.node.node_id = "console".to_string();
            config.node.role = NodeRole::Console;
            config
        }
    };
    if let Some(id) = &args.node_id {
        config.node.node_id = id.clone();
        config.validate()?;
    }
    if config.node.role != NodeRole::Console {
        warn!(role = ?config.node.role, "configuration is not for a console, running as one anyway");
    }
    Ok(config)
}

async fn log_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(LinkEvent::PeerConnected { address, name, .. }) => {
                info!(peer = %name, address = %address, "client connected")
            }
            Ok(LinkEvent::PeerDisconnected { address, name, .. }) => {
                info!(peer = ?name, address = %address, "client disconnected")
            }
            Ok(LinkEvent::CommandReceived { from, command }) => {
                info!(peer = %from, action = %command.action, "forwarding client command")
            }
            Ok(event) => debug!(?event, "link event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn prune_roster(roster: Arc<UnitRoster>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let gone = roster.prune_stale();
                if !gone.is_empty() {
                    println!("units lost: {}", gone.join(", "));
                }
            }
        }
    }
}

async fn operator_loop(mut prompt: Prompt, shutdown: CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        match prompt.handle(&line).await {
            Ok(Outcome::Print(text)) if text.is_empty() => {}
            Ok(Outcome::Print(text)) => println!("{text}"),
            Ok(Outcome::Quit) => break,
            Err(e) => println!("error: {e}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(&std::env::args().collect::<Vec<_>>())?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }
    let config = load_config(&args)?;
    logging::init_with(&config.logging);

    let node_id = config.node.node_id.clone();
    info!(node_id = %node_id, "starting console");

    let (log, log_writer) = match &config.logging.sink_path {
        Some(path) => {
            let (sink, writer) = LogSink::open(path, DEFAULT_SINK_CAPACITY).await?;
            (sink, Some(writer))
        }
        None => (LogSink::tracing_only(), None),
    };

    let roster = Arc::new(UnitRoster::new(
        Duration::from_millis(config.broadcast.stale_after_ms),
        config.network.command_port,
    ));
    let binding = Binding::unbound();
    let relay = Arc::new(CommandRelay::new(
        CommandSender::new(node_id.as_str(), config.network.connect_timeout())
            .with_max_frame_len(config.network.max_frame_len),
        Arc::clone(&roster),
        binding.clone(),
        Arc::new(EntityStore::new()),
    ));
    let state = Arc::new(ConsoleState::new(
        node_id.as_str(),
        config.node.behaviors.clone(),
        Arc::clone(&relay),
    ));
    let trigger = Arc::new(RelayTrigger::new(
        Arc::clone(&relay),
        TargetSelection::Bound,
        Handle::current(),
    ));

    let registry = ConnectionRegistry::new();
    let chain = console_chain(
        state,
        Arc::clone(&trigger),
        Arc::clone(&registry),
        binding.clone(),
        log.clone(),
    );
    let events = EventBus::default();
    tokio::spawn(log_events(events.clone()));
    let dispatcher = Arc::new(Dispatcher::new(chain, trigger, binding, events));

    let listener = ConnectionListener::bind(
        SocketAddr::new(config.network.bind_address, config.network.command_port),
        registry,
        dispatcher,
        ConnectionSettings::from(&config.network),
    )
    .await
    .context("binding the command port")?;
    let shutdown = listener.shutdown_token();
    let listener_task = tokio::spawn(listener.run());

    let receiver = BeaconReceiver::bind(
        SocketAddr::new(config.network.bind_address, config.network.broadcast_port),
        node_id.as_str(),
        roster.clone(),
    )
    .await
    .context("binding the beacon port")?;
    let receiver_task = tokio::spawn(receiver.run(shutdown.clone()));
    tokio::spawn(prune_roster(
        Arc::clone(&roster),
        Duration::from_millis((config.broadcast.stale_after_ms / 2).max(100)),
        shutdown.clone(),
    ));

    let operator = tokio::spawn(operator_loop(Prompt::new(relay), shutdown.clone()));
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            info!("shutdown requested");
        }
        finished = operator => {
            finished.context("operator prompt panicked")??;
            info!("operator left");
        }
    }

    shutdown.cancel();
    listener_task.await.context("listener task panicked")??;
    receiver_task.await.context("beacon receiver panicked")??;

    drop(log);
    if let Some(writer) = log_writer {
        if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
            warn!("log sink still busy at exit");
        }
    }
    info!("console stopped");
    Ok(())
}
