//! Command channel over the Blox command characteristic
//!
//! Exactly one command may be outstanding per channel. A second call while
//! one is pending is rejected immediately rather than queued. Responses
//! arrive as notifications and are fed through the reassembler by a pump
//! task; the waiting call is settled exactly once by whichever comes first
//! of a complete response, a write error, a timeout or `cleanup()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::oneshot;

use crate::core::bluetooth::central::GattLink;
use crate::core::bluetooth::notification::{NotificationStream, Subscription, pump_notifications};
use crate::core::bluetooth::reassembler::{self, DecodeOutcome, ReassemblyBuffer};
use crate::core::bluetooth::types::{ChannelPhase, Response};
use crate::error::{Result, TransportError};

/// The single in-flight request of a channel.
pub struct PendingCommand {
    id: u64,
    command: String,
    created_at: Instant,
    responder: oneshot::Sender<Result<Response>>,
    /// Keeps notifications enabled for as long as the command is pending.
    subscription: Option<Subscription>,
}

impl PendingCommand {
    fn settle(self, result: Result<Response>) {
        debug!(
            "Command {:?} settled after {:?}",
            self.command,
            self.created_at.elapsed()
        );
        let _ = self.responder.send(result);
    }
}

pub enum ExchangeState {
    Idle,
    Awaiting(PendingCommand),
    ReceivingChunks(PendingCommand, ReassemblyBuffer),
}

impl ExchangeState {
    pub fn phase(&self) -> ChannelPhase {
        match self {
            ExchangeState::Idle => ChannelPhase::Idle,
            ExchangeState::Awaiting(_) => ChannelPhase::Awaiting,
            ExchangeState::ReceivingChunks(..) => ChannelPhase::ReceivingChunks,
        }
    }

    fn pending_id(&self) -> Option<u64> {
        match self {
            ExchangeState::Idle => None,
            ExchangeState::Awaiting(p) | ExchangeState::ReceivingChunks(p, _) => Some(p.id),
        }
    }

    fn into_pending(self) -> Option<PendingCommand> {
        match self {
            ExchangeState::Idle => None,
            ExchangeState::Awaiting(p) | ExchangeState::ReceivingChunks(p, _) => Some(p),
        }
    }
}

fn lock(state: &Mutex<ExchangeState>) -> MutexGuard<'_, ExchangeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Feed one notification into the exchange identified by `id`.
fn handle_notification(state: &Mutex<ExchangeState>, id: u64, raw: &[u8]) {
    let mut guard = lock(state);
    if guard.pending_id() != Some(id) {
        debug!("Dropping notification for a settled exchange");
        return;
    }

    let (pending, buffer) = match std::mem::replace(&mut *guard, ExchangeState::Idle) {
        ExchangeState::Awaiting(p) => (p, None),
        ExchangeState::ReceivingChunks(p, b) => (p, Some(b)),
        ExchangeState::Idle => return,
    };

    let (buffer, outcome) = reassembler::step(buffer, raw);
    match outcome {
        DecodeOutcome::Complete(response) => pending.settle(Ok(response)),
        DecodeOutcome::Pending | DecodeOutcome::Ignored => {
            *guard = match buffer {
                Some(buffer) => ExchangeState::ReceivingChunks(pending, buffer),
                None => ExchangeState::Awaiting(pending),
            };
        }
    }
}

/// Restores `Idle` for its exchange on every exit path, including the
/// waiting future being dropped.
struct ExchangeGuard {
    state: Arc<Mutex<ExchangeState>>,
    id: u64,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.pending_id() == Some(self.id) {
            debug!("Clearing pending command state");
            // Dropping the pending command drops its subscription, which
            // disables notifications.
            drop(std::mem::replace(&mut *state, ExchangeState::Idle).into_pending());
        }
    }
}

pub struct CommandChannel {
    link: Arc<dyn GattLink>,
    state: Arc<Mutex<ExchangeState>>,
    next_id: AtomicU64,
}

impl CommandChannel {
    pub fn new(link: Arc<dyn GattLink>) -> Self {
        Self {
            link,
            state: Arc::new(Mutex::new(ExchangeState::Idle)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        lock(&self.state).phase()
    }

    /// Write `command` and wait for its response, bounded by `timeout`.
    pub async fn write_and_wait_for_response(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<Response> {
        let (id, receiver) = self.begin(command)?;
        let _guard = ExchangeGuard {
            state: self.state.clone(),
            id,
        };

        let exchange = async {
            match self.link.subscribe().await {
                Ok(stream) => self.attach(id, stream),
                Err(e) => warn!("Failed to enable notifications, continuing: {}", e),
            }

            info!("Sending command: {:?}", command);
            self.link.write(command.as_bytes()).await?;

            receiver.await.unwrap_or(Err(TransportError::Cancelled))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Command {:?} timed out after {:?}", command, timeout);
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    /// Tear down any outstanding exchange and its subscription. Safe to call
    /// any number of times; the channel is idle afterwards.
    pub fn cleanup(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), ExchangeState::Idle);
        if let Some(pending) = previous.into_pending() {
            info!("Cancelling outstanding command {:?}", pending.command);
            pending.settle(Err(TransportError::Cancelled));
        }
    }

    fn begin(&self, command: &str) -> Result<(u64, oneshot::Receiver<Result<Response>>)> {
        let mut state = lock(&self.state);
        if !matches!(*state, ExchangeState::Idle) {
            warn!("Rejecting {:?}: another command is in progress", command);
            return Err(TransportError::CommandInProgress);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (responder, receiver) = oneshot::channel();
        *state = ExchangeState::Awaiting(PendingCommand {
            id,
            command: command.to_string(),
            created_at: Instant::now(),
            responder,
            subscription: None,
        });
        Ok((id, receiver))
    }

    fn attach(&self, id: u64, stream: NotificationStream) {
        let (receiver, subscription) = stream.into_parts();
        let token = subscription.token();
        {
            let mut state = lock(&self.state);
            match &mut *state {
                ExchangeState::Awaiting(p) | ExchangeState::ReceivingChunks(p, _) if p.id == id => {
                    p.subscription = Some(subscription);
                }
                // Exchange already gone; dropping the subscription disables it.
                _ => return,
            }
        }

        let state = self.state.clone();
        tokio::spawn(pump_notifications(receiver, token, move |raw| {
            handle_notification(&state, id, &raw)
        }));
    }
}
