mod command;
mod config;
mod manager;
mod scheduler;

use anyhow::Result;
use clap::Parser;
use command::OperatorCommand;
use config::AppConfig;
use manager::{Scenario, SimulatedManager};
use scheduler::{PairEvent, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use summit_shared::{terminal_state, Event, Side};
use tokio::io::{AsyncBufReadExt, BufReader};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "summit-link")]
#[command(about = "Bring two Summit bridge/device pairs to a streaming-ready state", long_about = None)]
#[command(version)]
struct Args {
    /// Pair configuration file (JSON); built-in demo pairs when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Behaviour of the simulated management service
    #[arg(long, value_enum, default_value_t = Scenario::Healthy)]
    scenario: Scenario,

    /// Latency of each simulated management call, in milliseconds
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => {
            info!("[MAIN] No config file given, using demo pairs");
            AppConfig::demo()
        }
    };
    info!("[MAIN] Left pair: {}", config.left.name);
    info!("[MAIN] Right pair: {}", config.right.name);

    let names = [config.pair_name(Side::Left)?, config.pair_name(Side::Right)?];
    let manager = Arc::new(
        SimulatedManager::new(&names, args.scenario)
            .with_latency(Duration::from_millis(args.latency_ms)),
    );
    let mut supervisor = Supervisor::start(&config, manager.clone())?;

    let commands: Vec<&str> = OperatorCommand::ALL.iter().map(|c| c.as_str()).collect();
    info!(
        "[MAIN] Type `<left|right> <{}>`, `status` or `sim <offline|online|stall|unstall|drop <side>|garble <side>|flaky <side> <n>>`",
        commands.join("|")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Main event loop
    loop {
        tokio::select! {
            event = supervisor.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => operator_input(&supervisor, &manager, line.trim()).await,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("[MAIN] Operator input closed: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => {
                info!("[MAIN] Shutting down");
                break;
            }
        }
    }

    supervisor.shutdown().await;
    info!(
        "[MAIN] {} management calls made, at most {} in flight per pair",
        manager.calls().len(),
        manager.max_in_flight()
    );
    Ok(())
}

fn log_event(event: &PairEvent) {
    match event {
        PairEvent::StateChanged {
            side,
            from,
            to,
            error,
        } => match error {
            Some(message) if to < from => {
                warn!("[MAIN] {}: {} -> {} ({})", side, from, to, message)
            }
            _ => info!("[MAIN] {}: {} -> {}", side, from, to),
        },
        PairEvent::CommandFinished {
            side,
            command,
            result,
        } => info!("[MAIN] {} {}: {}", side, command, result.message()),
    }
}

fn parse_side(side: &str) -> Option<Side> {
    match side {
        "left" => Some(Side::Left),
        "right" => Some(Side::Right),
        _ => None,
    }
}

async fn operator_input(supervisor: &Supervisor, sim: &SimulatedManager, line: &str) {
    if line.is_empty() {
        return;
    }
    if let Some(action) = line.strip_prefix("sim ") {
        simulate(supervisor, sim, action.trim()).await;
        return;
    }
    if line == "status" {
        for side in [Side::Left, Side::Right] {
            let state = supervisor.pair(side).snapshot();
            info!(
                "[MAIN] {} {}: {} (bridge {}%, device {}%){}",
                side,
                state.name,
                state.phase,
                state.bridge_battery,
                state.device_battery,
                if terminal_state(&state) {
                    " awaiting operator"
                } else {
                    ""
                }
            );
        }
        return;
    }

    let Some((side, command)) = line.split_once(' ') else {
        warn!("[MAIN] Expected `<left|right> <command>`, got `{}`", line);
        return;
    };
    let Some(side) = parse_side(side) else {
        warn!("[MAIN] Unknown pair `{}`", side);
        return;
    };
    let command = match command.trim().parse::<OperatorCommand>() {
        Ok(command) => command,
        Err(e) => {
            warn!("[MAIN] {}", e);
            return;
        }
    };

    // Resets go through the reducer entry point; everything else needs the service
    let outcome = if command == OperatorCommand::Reset {
        let name = supervisor.pair(side).snapshot().name.to_string();
        supervisor.dispatch(Event::ResetConnection { name }).await
    } else {
        supervisor.pair(side).request(command).await.map(|_| ())
    };
    if let Err(e) = outcome {
        error!("[MAIN] {} {} failed: {:#}", side, command, e);
    }
}

/// Change the simulated service's behaviour at runtime
async fn simulate(supervisor: &Supervisor, sim: &SimulatedManager, action: &str) {
    let words: Vec<&str> = action.split_whitespace().collect();
    let bridge = |side: &str| {
        parse_side(side).map(|side| supervisor.pair(side).snapshot().name.bridge().to_string())
    };

    match words.as_slice() {
        ["offline"] => sim.set_listing_failure(true).await,
        ["online"] => sim.set_listing_failure(false).await,
        ["stall"] => sim.set_connects_stall(true).await,
        ["unstall"] => sim.set_connects_stall(false).await,
        ["drop", side] => match bridge(side) {
            Some(bridge) => sim.drop_bridge_link(&bridge).await,
            None => warn!("[MAIN] Unknown pair `{}`", side),
        },
        ["garble", side] => match bridge(side) {
            Some(bridge) => sim.garble_bridge_details(&bridge).await,
            None => warn!("[MAIN] Unknown pair `{}`", side),
        },
        ["flaky", side, count] => match (bridge(side), count.parse::<u32>()) {
            (Some(bridge), Ok(count)) => sim.set_soft_failures(&bridge, count).await,
            _ => warn!("[MAIN] Expected `sim flaky <left|right> <count>`"),
        },
        _ => warn!("[MAIN] Unknown simulation action `{}`", action),
    }
}
