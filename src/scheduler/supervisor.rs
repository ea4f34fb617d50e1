//! Wires the two pair schedulers together and exposes them to the host

use anyhow::{anyhow, Result};
use futures::future::join_all;
use std::sync::Arc;
use summit_shared::{Event, PairState, Side};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

use super::pair::{Inbound, PairEvent, PairLinks, PairScheduler};
use crate::command::{CommandExecutor, CommandResult, OperatorCommand};
use crate::config::AppConfig;
use crate::manager::DeviceManager;

/// Read and dispatch access to one running pair
#[derive(Clone)]
pub struct PairHandle {
    side: Side,
    snapshot: watch::Receiver<PairState>,
    inbox: mpsc::Sender<Inbound>,
}

impl PairHandle {
    pub fn side(&self) -> Side {
        self.side
    }

    /// Latest published state
    pub fn snapshot(&self) -> PairState {
        self.snapshot.borrow().clone()
    }

    /// Watch every published state
    pub fn subscribe(&self) -> watch::Receiver<PairState> {
        self.snapshot.clone()
    }

    /// Feed an event to this pair's reducer
    pub async fn dispatch(&self, event: Event) -> Result<()> {
        self.inbox
            .send(Inbound::Event(event))
            .await
            .map_err(|_| anyhow!("{} pair scheduler has stopped", self.side))
    }

    /// Run an operator command and wait for its result
    pub async fn request(&self, command: OperatorCommand) -> Result<CommandResult> {
        let (reply, result) = oneshot::channel();
        self.inbox
            .send(Inbound::Command {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| anyhow!("{} pair scheduler has stopped", self.side))?;
        result
            .await
            .map_err(|_| anyhow!("{} pair dropped command {}", self.side, command))
    }
}

/// Owns both pair schedulers
pub struct Supervisor {
    left: PairHandle,
    right: PairHandle,
    events: mpsc::UnboundedReceiver<PairEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn a scheduler for each configured pair
    pub fn start(config: &AppConfig, manager: Arc<dyn DeviceManager>) -> Result<Self> {
        let left_state = PairState::new(config.pair_name(Side::Left)?);
        let right_state = PairState::new(config.pair_name(Side::Right)?);

        let (left_tx, left_rx) = watch::channel(left_state.clone());
        let (right_tx, right_rx) = watch::channel(right_state.clone());
        let (left_inbox_tx, left_inbox) = mpsc::channel(config.scheduler.inbox_capacity);
        let (right_inbox_tx, right_inbox) = mpsc::channel(config.scheduler.inbox_capacity);
        let (to_right, from_left) = mpsc::unbounded_channel();
        let (to_left, from_right) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let cadence = config.scheduler.cadence();
        let left = PairScheduler::new(
            Side::Left,
            left_state,
            manager.clone(),
            CommandExecutor::new(manager.clone(), config.left.config.clone()),
            cadence,
            PairLinks {
                snapshot: left_tx,
                peer_state: right_rx.clone(),
                inbox: left_inbox,
                from_peer: from_right,
                to_peer: to_right,
                events: events_tx.clone(),
            },
        );
        let right = PairScheduler::new(
            Side::Right,
            right_state,
            manager.clone(),
            CommandExecutor::new(manager, config.right.config.clone()),
            cadence,
            PairLinks {
                snapshot: right_tx,
                peer_state: left_rx.clone(),
                inbox: right_inbox,
                from_peer: from_left,
                to_peer: to_left,
                events: events_tx,
            },
        );

        info!(
            "[SCHED] Starting schedulers for {} and {}",
            config.left.name, config.right.name
        );
        let tasks = vec![tokio::spawn(left.run()), tokio::spawn(right.run())];

        Ok(Self {
            left: PairHandle {
                side: Side::Left,
                snapshot: left_rx,
                inbox: left_inbox_tx,
            },
            right: PairHandle {
                side: Side::Right,
                snapshot: right_rx,
                inbox: right_inbox_tx,
            },
            events,
            tasks,
        })
    }

    pub fn pair(&self, side: Side) -> &PairHandle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Latest states of the left and right pairs
    pub fn snapshot(&self) -> (PairState, PairState) {
        (self.left.snapshot(), self.right.snapshot())
    }

    /// Offer an event to both pairs; only the addressed pair reacts
    pub async fn dispatch(&self, event: Event) -> Result<()> {
        self.left.dispatch(event.clone()).await?;
        self.right.dispatch(event).await
    }

    /// Next notification from either pair
    pub async fn recv(&mut self) -> Option<PairEvent> {
        self.events.recv().await
    }

    /// Stop both schedulers and wait for them to finish
    pub async fn shutdown(self) {
        let Supervisor {
            left, right, tasks, ..
        } = self;
        drop(left);
        drop(right);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!("[SCHED] Scheduler task failed: {}", e);
            }
        }
    }
}
