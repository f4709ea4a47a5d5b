//! Command/outcome correlation
//!
//! The robot answers a navigation command twice: once when it accepts the
//! command and once, through an outcome handler, when the command finishes.
//! [`CommandCorrelator`] folds both answers into a single awaitable result.
//!
//! There is exactly one pending-command slot. Every dispatch claims it under a
//! fresh ticket and installs an outcome handler bound to that ticket, so an
//! outcome can only ever reach the caller that issued the command, and only
//! once. Outcomes for older tickets, or repeated outcomes for a ticket that was
//! already answered, are logged and dropped.
//!
//! A command only counts as en route once the robot has accepted it. Until
//! then `interrupt()` waits, so a stop can never overtake the command it is
//! meant to stop.

use crate::core::{CancelReason, PoiId, TourFailure};
use crate::lock;
use crate::robot::{DockId, Outcome, OutcomeClass, OutcomeHandler, RobotClient, RobotError};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};

/// Target of a navigation command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// The POI at `index` in the tour, known to the robot as `id`
    Poi { index: usize, id: PoiId },
    /// A docking station
    Dock(DockId),
}

impl Destination {
    /// Reason code the robot reports when this leg is stopped
    pub fn cancel_reason(&self) -> CancelReason {
        match self {
            Destination::Poi { .. } => CancelReason::EnRouteToPoi,
            Destination::Dock(_) => CancelReason::EnRouteToDock,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Destination::Poi { index, id } => write!(f, "POI {id} (stop {})", index + 1),
            Destination::Dock(id) => write!(f, "dock {id}"),
        }
    }
}

/// A dispatched command that reached its destination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arrival {
    pub ticket: u64,
    pub destination: Destination,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Another command still owns the slot
    #[error("a command is already in flight towards {0}")]
    InFlight(Destination),
    /// The robot refused the command; nothing is pending
    #[error(transparent)]
    Rejected(RobotError),
    /// The command was accepted but did not reach its destination
    #[error("{failure}")]
    Failed { ticket: u64, failure: TourFailure },
}

// The single outstanding command: its ticket, its target and the caller's reply channel
struct PendingCommand {
    ticket: u64,
    destination: Destination,
    accepted: bool,
    reply: oneshot::Sender<Outcome>,
}

#[derive(Clone, Copy)]
struct PendingState {
    ticket: u64,
    destination: Destination,
    accepted: bool,
}

#[derive(Default)]
struct Slot {
    issued: u64,
    pending: Option<PendingCommand>,
}

// Frees the slot if the dispatch ends without an outcome (rejection, timeout, dropped caller)
struct Claim<'a> {
    slot: &'a Mutex<Slot>,
    acceptance: &'a Notify,
    ticket: u64,
}

impl Claim<'_> {
    fn accept(&self) {
        if let Some(pending) = lock(self.slot)
            .pending
            .as_mut()
            .filter(|p| p.ticket == self.ticket)
        {
            pending.accepted = true;
        }
        self.acceptance.notify_waiters();
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        {
            let mut slot = lock(self.slot);
            if slot.pending.as_ref().is_some_and(|p| p.ticket == self.ticket) {
                debug!("Releasing command #{} without an outcome", self.ticket);
                slot.pending = None;
            }
        }
        self.acceptance.notify_waiters();
    }
}

/// Hands an outcome to the caller waiting on `ticket`; returns false if nobody was
fn deliver(slot: &Mutex<Slot>, ticket: u64, outcome: Outcome) -> bool {
    let pending = {
        let mut slot = lock(slot);
        let current = slot.pending.as_ref().is_some_and(|p| p.ticket == ticket);
        if current { slot.pending.take() } else { None }
    };

    let Some(pending) = pending else {
        warn!(
            "Dropping outcome {:#05x} for command #{}: nobody is waiting for it",
            outcome.code, ticket
        );
        return false;
    };
    if pending.reply.send(outcome).is_err() {
        debug!(
            "Caller of command #{} to {} went away before its outcome",
            ticket, pending.destination
        );
    }
    true
}

/// Issues navigation commands and pairs each one with its outcome
pub struct CommandCorrelator {
    robot: Arc<dyn RobotClient>,
    slot: Arc<Mutex<Slot>>,
    acceptance: Notify,
    outcome_timeout: Option<Duration>,
}

impl CommandCorrelator {
    pub fn new(robot: Arc<dyn RobotClient>) -> Self {
        CommandCorrelator {
            robot,
            slot: Arc::default(),
            acceptance: Notify::new(),
            outcome_timeout: None,
        }
    }

    /// Bounds how long an accepted command may take to report its outcome
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.outcome_timeout = limit;
        self
    }

    pub fn robot(&self) -> &Arc<dyn RobotClient> {
        &self.robot
    }

    /// Destination of the command currently holding the slot, accepted or not
    pub fn in_flight(&self) -> Option<Destination> {
        lock(&self.slot).pending.as_ref().map(|p| p.destination)
    }

    /// Destination of the command the robot has accepted and is carrying out
    pub fn en_route(&self) -> Option<Destination> {
        lock(&self.slot)
            .pending
            .as_ref()
            .filter(|p| p.accepted)
            .map(|p| p.destination)
    }

    /// Ticket of the most recently issued command (0 before the first one)
    pub fn latest_ticket(&self) -> u64 {
        lock(&self.slot).issued
    }

    /// Sends the robot to `destination` and waits for the outcome.
    ///
    /// Fails fast with [`DispatchError::InFlight`] if another command is still
    /// outstanding. A rejected command leaves nothing pending.
    pub async fn dispatch(&self, destination: Destination) -> Result<Arrival, DispatchError> {
        let (claim, reply) = self.claim(destination)?;
        let ticket = claim.ticket;
        self.register_handler(ticket, destination);

        let accepted = match destination {
            Destination::Poi { id, .. } => self.robot.go_to_poi(id).await,
            Destination::Dock(dock_id) => self.robot.go_to_dock(dock_id).await,
        };
        if let Err(err) = accepted {
            warn!("Robot rejected command #{ticket} to {destination}: {err}");
            return Err(DispatchError::Rejected(err));
        }
        claim.accept();
        debug!("Command #{ticket} to {destination} accepted");

        let received = match self.outcome_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(
                        "No outcome for command #{ticket} to {destination} after {} ms",
                        limit.as_millis()
                    );
                    let failure = TourFailure::timed_out(limit);
                    return Err(DispatchError::Failed { ticket, failure });
                }
            },
            None => reply.await,
        };
        drop(claim);

        let Ok(outcome) = received else {
            let failure = TourFailure::outcome_lost();
            return Err(DispatchError::Failed { ticket, failure });
        };

        match outcome.classify() {
            OutcomeClass::Reached => {
                info!("Reached {destination}");
                Ok(Arrival { ticket, destination })
            }
            OutcomeClass::Failed { critical } => {
                if critical {
                    error!(
                        "Critical failure on the way to {destination}: {} ({:#05x})",
                        outcome.message, outcome.code
                    );
                } else {
                    warn!(
                        "Could not reach {destination}: {} ({:#05x})",
                        outcome.message, outcome.code
                    );
                }
                let failure = TourFailure::navigation(outcome.code, outcome.message, critical);
                Err(DispatchError::Failed { ticket, failure })
            }
            OutcomeClass::Interrupted(reason) => {
                info!("Leg to {destination} interrupted (reason {})", reason.code());
                let failure = TourFailure::interrupted(reason);
                Err(DispatchError::Failed { ticket, failure })
            }
        }
    }

    /// Stops the command in flight, if any, and answers its caller with a
    /// cancellation. Returns the interrupted destination.
    ///
    /// A command still waiting for acceptance is stopped once the robot has
    /// taken it; if the robot rejects it instead there is nothing to stop.
    pub async fn interrupt(&self) -> Result<Option<Destination>, RobotError> {
        let (ticket, destination) = loop {
            let accepted = self.acceptance.notified();
            match self.pending() {
                None => return Ok(None),
                Some(pending) if pending.accepted => break (pending.ticket, pending.destination),
                Some(pending) => {
                    debug!(
                        "Waiting for command #{} to be accepted before stopping it",
                        pending.ticket
                    );
                    accepted.await;
                }
            }
        };

        info!("Interrupting command #{ticket} to {destination}");
        self.robot.stop().await?;

        // The robot normally reports the cancellation itself during stop()
        if self.pending().is_some_and(|pending| pending.ticket == ticket) {
            debug!("Robot did not report the interruption of command #{ticket}; synthesising it");
            deliver(
                &self.slot,
                ticket,
                Outcome::interrupted(destination.cancel_reason()),
            );
        }
        Ok(Some(destination))
    }

    fn pending(&self) -> Option<PendingState> {
        lock(&self.slot).pending.as_ref().map(|p| PendingState {
            ticket: p.ticket,
            destination: p.destination,
            accepted: p.accepted,
        })
    }

    fn claim(
        &self,
        destination: Destination,
    ) -> Result<(Claim<'_>, oneshot::Receiver<Outcome>), DispatchError> {
        let mut slot = lock(&self.slot);
        if let Some(pending) = &slot.pending {
            return Err(DispatchError::InFlight(pending.destination));
        }

        slot.issued += 1;
        let ticket = slot.issued;
        let (reply, receiver) = oneshot::channel();
        slot.pending = Some(PendingCommand {
            ticket,
            destination,
            accepted: false,
            reply,
        });
        let claim = Claim {
            slot: &self.slot,
            acceptance: &self.acceptance,
            ticket,
        };
        Ok((claim, receiver))
    }

    fn register_handler(&self, ticket: u64, destination: Destination) {
        let slot = Arc::clone(&self.slot);
        let handler: OutcomeHandler = Arc::new(move |outcome| {
            deliver(&slot, ticket, outcome);
        });
        match destination {
            Destination::Poi { .. } => self.robot.on_poi_outcome(handler),
            Destination::Dock(_) => self.robot.on_dock_outcome(handler),
        }
    }
}
