//! The replica actor: message-serialised access to a [`ReplicaEngine`].
//!
//! Client calls and remote envelopes are interleaved by one task.
//! Requests whose dependency clock is ahead of the local clock are
//! parked in a FIFO wait queue and answered as soon as the clock
//! catches up; an optional deadline fails them with a causal timeout
//! instead of waiting forever.

use crate::engine::{ReplicaEngine, Update};
use crate::error::EngineError;
use crate::EngineStats;
use opal_core::{ObjectKey, Value, VectorClock};
use opal_net::Envelope;
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// A read's result: values in key order plus the merged clock the
/// client should carry into its next request.
pub type ReadReply = (Vec<(ObjectKey, Value)>, VectorClock);

/// Commands accepted by the replica actor. The dependency clock is
/// optional; absent means "no dependencies" (the empty clock), which
/// also absorbs legacy callers that never track clocks.
pub enum Command {
    Read {
        keys: Vec<ObjectKey>,
        clock: Option<VectorClock>,
        reply: oneshot::Sender<Result<ReadReply, EngineError>>,
    },
    Update {
        batch: Vec<Update>,
        clock: Option<VectorClock>,
        reply: oneshot::Sender<Result<VectorClock, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

enum Pending {
    Read {
        keys: Vec<ObjectKey>,
        reply: oneshot::Sender<Result<ReadReply, EngineError>>,
    },
    Update {
        batch: Vec<Update>,
        reply: oneshot::Sender<Result<VectorClock, EngineError>>,
    },
}

struct Waiter {
    dependency: VectorClock,
    deadline: Option<Instant>,
    pending: Pending,
}

/// Cheap, cloneable client handle to one replica actor.
#[derive(Clone)]
pub struct ReplicaHandle {
    commands: mpsc::Sender<Command>,
}

impl ReplicaHandle {
    pub async fn read(
        &self,
        keys: Vec<ObjectKey>,
        clock: Option<VectorClock>,
    ) -> Result<ReadReply, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Read {
                keys,
                clock,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::Shutdown)?;
        rx.await.map_err(|_| EngineError::Shutdown)?
    }

    pub async fn update(
        &self,
        batch: Vec<Update>,
        clock: Option<VectorClock>,
    ) -> Result<VectorClock, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Update {
                batch,
                clock,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::Shutdown)?;
        rx.await.map_err(|_| EngineError::Shutdown)?
    }

    /// Force a snapshot now, regardless of the interval.
    pub async fn snapshot(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply: tx })
            .await
            .map_err(|_| EngineError::Shutdown)?;
        rx.await.map_err(|_| EngineError::Shutdown)?
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats { reply: tx })
            .await
            .map_err(|_| EngineError::Shutdown)?;
        rx.await.map_err(|_| EngineError::Shutdown)
    }
}

/// Start the actor for `engine`, consuming remote envelopes from
/// `inbox`. The actor stops when every handle is dropped.
pub fn spawn(engine: ReplicaEngine, inbox: mpsc::UnboundedReceiver<Envelope>) -> ReplicaHandle {
    let (commands, rx) = mpsc::channel(64);
    tokio::spawn(run(engine, rx, inbox));
    ReplicaHandle { commands }
}

async fn run(
    mut engine: ReplicaEngine,
    mut commands: mpsc::Receiver<Command>,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
) {
    let mut waiting: VecDeque<Waiter> = VecDeque::new();
    let mut inbox_open = true;

    loop {
        let next_deadline = waiting.iter().filter_map(|w| w.deadline).min();

        tokio::select! {
            maybe_cmd = commands.recv() => match maybe_cmd {
                Some(cmd) => handle_command(&mut engine, &mut waiting, cmd),
                None => break,
            },
            maybe_env = inbox.recv(), if inbox_open => match maybe_env {
                Some(envelope) => {
                    if engine.deliver(envelope) > 0 {
                        drain_ready(&mut engine, &mut waiting);
                    }
                }
                None => inbox_open = false,
            },
            _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                if next_deadline.is_some() =>
            {
                expire(&mut waiting);
            }
        }
    }
}

fn handle_command(engine: &mut ReplicaEngine, waiting: &mut VecDeque<Waiter>, cmd: Command) {
    match cmd {
        Command::Read { keys, clock, reply } => {
            let dependency = clock.unwrap_or_default();
            if engine.is_ready(&dependency) {
                let _ = reply.send(Ok(engine.read(&keys, &dependency)));
            } else {
                park(engine, waiting, dependency, Pending::Read { keys, reply });
            }
        }
        Command::Update { batch, clock, reply } => {
            let dependency = clock.unwrap_or_default();
            if engine.is_ready(&dependency) {
                let result = engine.update(&batch, &dependency);
                let advanced = result.is_ok();
                let _ = reply.send(result);
                if advanced {
                    drain_ready(engine, waiting);
                }
            } else {
                park(engine, waiting, dependency, Pending::Update { batch, reply });
            }
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(engine.snapshot_now());
        }
        Command::Stats { reply } => {
            let _ = reply.send(engine.stats());
        }
    }
}

fn park(
    engine: &ReplicaEngine,
    waiting: &mut VecDeque<Waiter>,
    dependency: VectorClock,
    pending: Pending,
) {
    debug!(
        replica = %engine.id(),
        waiting = waiting.len() + 1,
        "gating request on causal dependencies"
    );
    let deadline = engine
        .config()
        .wait_deadline
        .map(|d| Instant::now() + d);
    waiting.push_back(Waiter {
        dependency,
        deadline,
        pending,
    });
}

/// Answer every parked request whose dependencies are now satisfied,
/// in queue order. Executing a parked update advances the clock, so
/// the scan restarts until a full pass parks everything that is left.
fn drain_ready(engine: &mut ReplicaEngine, waiting: &mut VecDeque<Waiter>) {
    loop {
        let Some(pos) = waiting.iter().position(|w| engine.is_ready(&w.dependency)) else {
            break;
        };
        let Some(waiter) = waiting.remove(pos) else {
            break;
        };
        match waiter.pending {
            Pending::Read { keys, reply } => {
                let _ = reply.send(Ok(engine.read(&keys, &waiter.dependency)));
            }
            Pending::Update { batch, reply } => {
                let _ = reply.send(engine.update(&batch, &waiter.dependency));
            }
        }
    }
}

fn expire(waiting: &mut VecDeque<Waiter>) {
    let now = Instant::now();
    let mut kept = VecDeque::new();
    while let Some(waiter) = waiting.pop_front() {
        if waiter.deadline.is_some_and(|d| d <= now) {
            match waiter.pending {
                Pending::Read { reply, .. } => {
                    let _ = reply.send(Err(EngineError::CausalTimeout));
                }
                Pending::Update { reply, .. } => {
                    let _ = reply.send(Err(EngineError::CausalTimeout));
                }
            }
        } else {
            kept.push_back(waiter);
        }
    }
    *waiting = kept;
}
