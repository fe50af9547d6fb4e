//! SwarmLink field unit daemon
//!
//! Serves commands and queries on the command port and emits beacons from a
//! fixed-period control loop.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swarmlink_core::broadcast::BroadcastVariant;
use swarmlink_core::capability::ActionTrigger;
use swarmlink_core::{logging, Config};
use swarmlink_mesh::{
    Binding, BoundTarget, BroadcastHandler, ConnectionListener, ConnectionRegistry,
    ConnectionSettings, Dispatcher, EventBus, LinkEvent, LocalEndpoint, UdpBroadcastTransport,
};
use swarmlink_unit_status::{unit_chain, LocalUnit, LogSink, DEFAULT_SINK_CAPACITY};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const USAGE: &str = "usage: swarmlink-unit [--config <path>] [--node-id <id>]";

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
        None => Config::default_config(),
    };
    if let Some(id) = &args.node_id {
        config.node.node_id = id.clone();
        config.validate()?;
    }
    Ok(config)
}

async fn log_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(LinkEvent::PeerConnected { address, name, .. }) => {
                info!(peer = %name, address = %address, "peer connected")
            }
            Ok(LinkEvent::PeerDisconnected { address, name, .. }) => {
                info!(peer = ?name, address = %address, "peer disconnected")
            }
            Ok(LinkEvent::MotorsIgnored { from, .. }) => {
                debug!(peer = %from, "motor command for another unit")
            }
            Ok(event) => debug!(?event, "link event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
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
    let endpoint = LocalEndpoint::resolve(
        node_id.as_str(),
        config.network.advertise_address,
        config.network.command_port,
        config.network.broadcast_port,
    );
    info!(
        node_id = %node_id,
        address = %endpoint.address(),
        behaviors = ?config.node.behaviors,
        "starting unit"
    );

    let (log, log_writer) = match &config.logging.sink_path {
        Some(path) => {
            let (sink, writer) = LogSink::open(path, DEFAULT_SINK_CAPACITY).await?;
            (sink, Some(writer))
        }
        None => (LogSink::tracing_only(), None),
    };

    let unit = Arc::new(
        LocalUnit::new(node_id.as_str(), config.node.behaviors.clone())
            .with_controllers(config.node.controllers.clone())
            .with_log_sink(log.clone()),
    );
    let binding = Binding::fixed(BoundTarget::new(
        node_id.as_str(),
        endpoint.address().to_string(),
    ));
    let registry = ConnectionRegistry::new();
    let chain = unit_chain(
        Arc::clone(&unit),
        Arc::clone(&registry),
        binding.clone(),
        Some(endpoint.command_addr().to_string()),
        log.clone(),
    );
    let events = EventBus::default();
    tokio::spawn(log_events(events.clone()));
    let dispatcher = Arc::new(Dispatcher::new(chain, unit.clone(), binding, events));

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

    let mut broadcaster = if config.broadcast.enabled {
        let transport = Arc::new(
            UdpBroadcastTransport::bind(endpoint.broadcast_addr())
                .await
                .context("opening the beacon socket")?,
        );
        let mut handler = BroadcastHandler::new(unit.clone(), transport)
            .with_address(endpoint.command_addr().to_string());
        handler
            .register(BroadcastVariant::Heartbeat, config.broadcast.heartbeat_period_ticks)
            .register(BroadcastVariant::Position, config.broadcast.position_period_ticks)
            .register(
                BroadcastVariant::SharedEntityLocation,
                config.broadcast.shared_entity_period_ticks,
            );
        Some(handler)
    } else {
        info!("beacons disabled");
        None
    };

    let mut interval = tokio::time::interval(config.broadcast.tick());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                if let Some(handler) = broadcaster.as_mut() {
                    handler.update(tick);
                }
            }
            result = &mut ctrl_c => {
                result.context("waiting for ctrl-c")?;
                info!("shutdown requested");
                break;
            }
        }
    }

    shutdown.cancel();
    listener_task.await.context("listener task panicked")??;
    unit.stop_all();

    drop(broadcaster);
    drop(unit);
    drop(log);
    if let Some(writer) = log_writer {
        if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
            warn!("log sink still busy at exit");
        }
    }
    info!(ticks = tick, "unit stopped");
    Ok(())
}
