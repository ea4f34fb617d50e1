//! Per-pair scheduler task
//!
//! Owns one [`PairState`] exclusively. Each pass decides the next steps from
//! the current phase, makes one management call at a time, folds the outcome
//! through the reducer, publishes the new snapshot and yields before the
//! next step. Events keep arriving while a call is in flight; one that moves
//! the pair elsewhere (a reset) abandons the call. Between passes it sleeps
//! for the adaptive cadence, waking early for operator traffic.

use std::sync::Arc;
use summit_shared::{
    poll_interval, reduce, terminal_state, Cadence, ConnectionState, Event, PairState, Side,
};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::steps::{plan, Step};
use crate::command::{CommandExecutor, CommandResult, OperatorCommand};
use crate::manager::DeviceManager;

/// Messages delivered to a pair's inbox
#[derive(Debug)]
pub enum Inbound {
    /// Event from the presentation layer, fed straight to the reducer
    Event(Event),
    /// Operator command, executed between steps
    Command {
        command: OperatorCommand,
        reply: Option<oneshot::Sender<CommandResult>>,
    },
}

/// Notifications for the host
#[derive(Debug, Clone, PartialEq)]
pub enum PairEvent {
    StateChanged {
        side: Side,
        from: ConnectionState,
        to: ConnectionState,
        error: Option<String>,
    },
    CommandFinished {
        side: Side,
        command: OperatorCommand,
        result: CommandResult,
    },
}

/// Channels connecting a scheduler to its peer and to the host
pub struct PairLinks {
    pub snapshot: watch::Sender<PairState>,
    pub peer_state: watch::Receiver<PairState>,
    pub inbox: mpsc::Receiver<Inbound>,
    /// System-wide events raised by the peer
    pub from_peer: mpsc::UnboundedReceiver<Event>,
    pub to_peer: mpsc::UnboundedSender<Event>,
    pub events: mpsc::UnboundedSender<PairEvent>,
}

pub struct PairScheduler {
    side: Side,
    state: PairState,
    manager: Arc<dyn DeviceManager>,
    executor: CommandExecutor,
    cadence: Cadence,
    links: PairLinks,
}

impl PairScheduler {
    pub fn new(
        side: Side,
        state: PairState,
        manager: Arc<dyn DeviceManager>,
        executor: CommandExecutor,
        cadence: Cadence,
        links: PairLinks,
    ) -> Self {
        Self {
            side,
            state,
            manager,
            executor,
            cadence,
            links,
        }
    }

    /// Run until every handle to this pair's inbox is dropped
    pub async fn run(mut self) {
        info!(
            "[SCHED] {} pair {} starting ({} backend)",
            self.side,
            self.state.name,
            self.manager.name()
        );

        loop {
            if !self.drain().await {
                break;
            }

            self.pass().await;

            let interval = {
                let peer = self.links.peer_state.borrow();
                poll_interval(&self.cadence, &self.state, &peer)
            };
            debug!("[SCHED] {} pair sleeping {:?}", self.side, interval);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                message = self.links.inbox.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
                Some(event) = self.links.from_peer.recv() => self.apply(&event),
            }
        }

        info!("[SCHED] {} pair {} stopped", self.side, self.state.name);
    }

    /// Handle everything already queued; false once the inbox is closed
    async fn drain(&mut self) -> bool {
        while let Ok(event) = self.links.from_peer.try_recv() {
            self.apply(&event);
        }
        loop {
            match self.links.inbox.try_recv() {
                Ok(message) => self.handle(message).await,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// One pass over the dispatch table, one call in flight at a time
    async fn pass(&mut self) {
        for step in plan(self.state.phase) {
            if !step.applies_to(self.state.phase) {
                continue;
            }
            debug!("[SCHED] {} pair step {:?} at {}", self.side, step, self.state.phase);

            if let Some(start) = step.start_event(&self.state.name) {
                self.apply(&start);
            }
            let (outcome, deferred) = self.call(step).await;
            if let Some(outcome) = &outcome {
                self.report_failure(step, outcome);
                self.apply_local(outcome);
            }
            for message in deferred {
                self.handle(message).await;
            }
            if outcome.is_none() {
                break;
            }

            tokio::task::yield_now().await;
        }
    }

    /// Make the step's call while still taking events.
    ///
    /// An event that moves the pair to another phase abandons the call and
    /// yields no outcome. Commands wait until the call is over.
    async fn call(&mut self, step: Step) -> (Option<Event>, Vec<Inbound>) {
        let manager = self.manager.clone();
        let name = self.state.name.clone();
        let phase = self.state.phase;
        let call = step.perform(manager.as_ref(), &name);
        tokio::pin!(call);

        let mut deferred = Vec::new();
        loop {
            let event = tokio::select! {
                outcome = &mut call => return (Some(outcome), deferred),
                message = self.links.inbox.recv() => match message {
                    Some(Inbound::Event(event)) => event,
                    Some(command) => {
                        deferred.push(command);
                        continue;
                    }
                    None => break,
                },
                Some(event) = self.links.from_peer.recv() => event,
            };

            self.apply(&event);
            if self.state.phase != phase {
                break;
            }
        }

        info!(
            "[SCHED] {} pair abandoned {:?} at {}",
            self.side, step, self.state.phase
        );
        (None, deferred)
    }

    async fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Event(event) => self.apply(&event),
            Inbound::Command { command, reply } => {
                let result = self.executor.execute(command, &self.state).await;
                for event in result.events() {
                    self.apply(event);
                }
                let _ = self.links.events.send(PairEvent::CommandFinished {
                    side: self.side,
                    command,
                    result: result.clone(),
                });
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }
    }

    /// Apply an outcome this scheduler produced, sharing system-wide ones
    fn apply_local(&mut self, event: &Event) {
        if event.is_system_wide() {
            let _ = self.links.to_peer.send(event.clone());
        }
        self.apply(event);
    }

    fn apply(&mut self, event: &Event) {
        let next = reduce(self.state.clone(), event);
        if next == self.state {
            return;
        }

        let (from, to) = (self.state.phase, next.phase);
        self.state = next;
        self.links.snapshot.send_replace(self.state.clone());

        if from != to {
            if terminal_state(&self.state) {
                warn!(
                    "[SCHED] {} pair {} -> {}{}",
                    self.side,
                    from,
                    to,
                    self.state
                        .error
                        .as_deref()
                        .map(|e| format!(": {e}"))
                        .unwrap_or_default()
                );
            } else {
                info!("[SCHED] {} pair {} -> {}", self.side, from, to);
            }
            let _ = self.links.events.send(PairEvent::StateChanged {
                side: self.side,
                from,
                to,
                error: self.state.error.clone(),
            });
        }
    }

    fn report_failure(&self, step: Step, outcome: &Event) {
        match outcome {
            Event::ConnectedBridgesFailure { message }
            | Event::ListBridgesFailure { message }
            | Event::ConnectBridgeFailure { message, .. }
            | Event::BridgeFailure { message, .. }
            | Event::DeviceFailure { message, .. } => {
                error!("[SCHED] {} pair {:?} failed: {}", self.side, step, message)
            }
            _ => {}
        }
    }
}
