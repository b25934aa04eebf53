//! Command/acknowledgment engine
//!
//! Serializes requests to the belt so that at most one acknowledged request
//! is in flight per session. Each submission waits for its turn, registers
//! its correlation key, sends the request and then waits a bounded time for
//! the dispatcher to resolve it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use navibelt_core::{BeltConfig, BeltError, DeviceMessage, QueuePolicy, Request, Result, TransportError};

use crate::dispatcher::finish_link;
use crate::session::{PendingCommand, Resolution, Session};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Identifier of a submitted command, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request bound to its command identifier
#[derive(Debug, Clone)]
pub struct Command {
    pub id: CommandId,
    pub request: Request,
    pub created_at: Instant,
}

/// Successful outcome of a command
#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgment {
    pub command_id: CommandId,
    pub request: Request,
    /// Decoded acknowledgment, `None` for requests the belt does not answer
    pub response: Option<DeviceMessage>,
    /// Time between sending and resolution
    pub round_trip: Duration,
}

// ----------------------------------------------------------------------------
// Command Engine
// ----------------------------------------------------------------------------

/// Issues requests and correlates their acknowledgments
#[derive(Clone)]
pub struct CommandEngine {
    session: Arc<Mutex<Session>>,
    /// Held by the command currently between send and resolution
    turn: Arc<Mutex<()>>,
    config: BeltConfig,
}

impl CommandEngine {
    pub fn new(session: Arc<Mutex<Session>>, config: BeltConfig) -> Self {
        Self {
            session,
            turn: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub fn prepare(&self, request: Request) -> Command {
        Command {
            id: CommandId::new(),
            request,
            created_at: Instant::now(),
        }
    }

    /// Prepare and submit a request
    pub async fn execute(&self, request: Request) -> Result<Acknowledgment> {
        self.submit(self.prepare(request)).await
    }

    /// Submit a command and wait for its resolution
    ///
    /// Resolves exactly once: acknowledged, rejected, timed out, cancelled
    /// or failed because the link went away.
    pub async fn submit(&self, command: Command) -> Result<Acknowledgment> {
        let mut abandon = AbandonGuard {
            session: self.session.clone(),
            id: command.id,
            armed: true,
        };
        let result = self.run(command).await;
        abandon.armed = false;
        result
    }

    async fn run(&self, command: Command) -> Result<Acknowledgment> {
        let Command { id, request, .. } = command;
        request.validate()?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut session = self.session.lock().await;
            if !session.state().is_active() {
                return Err(BeltError::NotConnected);
            }
            session.enqueue(id, cancel_tx);
        }

        let _turn = self.wait_for_turn(id, cancel_rx).await?;

        let (transport, epoch, resolution_rx) = {
            let mut session = self.session.lock().await;
            if !session.dequeue(id) {
                return Err(BeltError::Cancelled);
            }
            let transport = match session.transport() {
                Some(transport) if session.state().is_active() => transport,
                _ => return Err(BeltError::Disconnected),
            };
            // Registered before sending, the acknowledgment may overtake the write
            let resolution_rx = request.ack_matcher().map(|matcher| {
                let (responder, rx) = oneshot::channel();
                session.register_pending(PendingCommand {
                    id,
                    request: request.clone(),
                    matcher,
                    issued_at: Instant::now(),
                    responder,
                });
                rx
            });
            (transport, session.epoch(), resolution_rx)
        };

        let started = Instant::now();
        debug!("Sending {} command {}", request.name(), id);
        let sent = match tokio::time::timeout(self.config.ack_timeout, transport.send(request.encode())).await {
            Ok(sent) => sent,
            Err(_) => Err(TransportError::Timeout {
                duration_ms: self.config.ack_timeout.as_millis() as u64,
            }),
        };
        if let Err(error) = sent {
            warn!("Failed to send {} command {}: {}", request.name(), id, error);
            self.session.lock().await.take_pending(id);
            // A failed write is a lost link
            finish_link(&self.session, epoch, Some(error.to_string())).await;
            return Err(error.into());
        }

        let Some(mut resolution_rx) = resolution_rx else {
            return Ok(Acknowledgment {
                command_id: id,
                request,
                response: None,
                round_trip: started.elapsed(),
            });
        };

        let resolution = match tokio::time::timeout(self.config.ack_timeout, &mut resolution_rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Resolution::Disconnected,
            Err(_) => {
                let mut session = self.session.lock().await;
                if session.take_pending(id).is_some() {
                    let timeout_ms = self.config.ack_timeout.as_millis() as u64;
                    warn!("No acknowledgment for {} command {} within {}ms", request.name(), id, timeout_ms);
                    return Err(BeltError::TimedOut { timeout_ms });
                }
                // Resolved by the dispatcher while the timer fired
                resolution_rx.try_recv().unwrap_or(Resolution::Disconnected)
            }
        };

        match resolution {
            Resolution::Acknowledged(frame) => {
                let response = match DeviceMessage::decode(&frame) {
                    Ok(message) => Some(message),
                    Err(error) => {
                        debug!("Acknowledgment of {} did not decode: {}", request.name(), error);
                        None
                    }
                };
                Ok(Acknowledgment {
                    command_id: id,
                    request,
                    response,
                    round_trip: started.elapsed(),
                })
            }
            Resolution::Rejected { reason } => {
                warn!("Belt rejected {} command {} (reason {:#04x})", request.name(), id, reason);
                Err(BeltError::Rejected { reason })
            }
            Resolution::Cancelled => Err(BeltError::Cancelled),
            Resolution::Disconnected => Err(BeltError::Disconnected),
        }
    }

    async fn wait_for_turn(&self, id: CommandId, cancel_rx: oneshot::Receiver<()>) -> Result<OwnedMutexGuard<()>> {
        match self.config.queue_policy {
            QueuePolicy::FailFast => match self.turn.clone().try_lock_owned() {
                Ok(guard) => Ok(guard),
                Err(_) => {
                    self.session.lock().await.dequeue(id);
                    Err(BeltError::EngineBusy)
                }
            },
            QueuePolicy::Fifo => {
                tokio::select! {
                    guard = self.turn.clone().lock_owned() => Ok(guard),
                    _ = cancel_rx => {
                        debug!("Command {} cancelled while queued", id);
                        Err(BeltError::Cancelled)
                    }
                }
            }
        }
    }

    /// Cancel a queued or pending command
    ///
    /// Returns false when the command already resolved.
    pub async fn cancel(&self, id: CommandId) -> bool {
        self.session.lock().await.cancel(id)
    }
}

/// Clears the bookkeeping of a submission whose caller went away
struct AbandonGuard {
    session: Arc<Mutex<Session>>,
    id: CommandId,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        if let Ok(mut session) = self.session.try_lock() {
            session.abandon(id);
            return;
        }
        if let Ok(handle) = Handle::try_current() {
            let session = self.session.clone();
            handle.spawn(async move { session.lock().await.abandon(id) });
        }
    }
}
