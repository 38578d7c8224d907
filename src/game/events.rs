//! Pending connection events and their per-tick reconciliation

use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::ws::protocol::{Moving, PlayerId};

use super::registry::{Outbound, Player, PlayerRegistry, Spawn};

/// Something a connection task observed between two ticks
#[derive(Debug)]
pub enum Event {
    /// Connection admitted; carries the spawn data and the send queue
    Joined { spawn: Spawn, outbound: Outbound },
    /// Connection closed for any reason
    Left { id: PlayerId },
    /// Client's full intent mask after its latest `AmmaMoving`
    Moving { id: PlayerId, moving: Moving },
    /// Client ping with its own timestamp
    Ping { id: PlayerId, timestamp: u32 },
}

/// Append-only buffer shared by connection tasks and drained by the tick
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Vec<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.pending.lock().push(event);
    }

    /// Swap the pending buffer with `spare`, which must be empty
    pub fn drain_into(&self, spare: &mut Vec<Event>) {
        debug_assert!(spare.is_empty());
        std::mem::swap(&mut *self.pending.lock(), spare);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// What a tick must broadcast after reconciliation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Effects {
    /// Admitted this tick, in arrival order
    pub joined: Vec<PlayerId>,
    /// Known before this tick and gone now
    pub left: Vec<PlayerId>,
    /// Latest ping timestamp per live player
    pub pings: BTreeMap<PlayerId, u32>,
    /// Joins undone by a leave inside the same tick
    pub cancelled: usize,
    /// Intent or ping events for players that no longer exist
    pub dropped: usize,
}

/// Turns raw events into [`Effects`] and applies them to the registry
#[derive(Debug, Default)]
pub struct Reconciler {
    arena: Vec<Event>,
    pending_joins: Vec<Player>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `queue` and reconcile it against `registry`.
    ///
    /// Joins are staged until the whole buffer is read so that a leave later
    /// in the same tick cancels them. Intent and pings apply to whichever
    /// record (staged or live) currently holds the id; for an unknown id they
    /// are dropped.
    pub fn reconcile(&mut self, queue: &EventQueue, registry: &mut PlayerRegistry) -> Effects {
        let mut effects = Effects::default();

        self.arena.clear();
        queue.drain_into(&mut self.arena);

        for event in self.arena.drain(..) {
            match event {
                Event::Joined { spawn, outbound } => {
                    trace!(player_id = spawn.id, "Staging join");
                    self.pending_joins.push(Player::new(spawn, outbound));
                }
                Event::Left { id } => {
                    if let Some(idx) = self.pending_joins.iter().position(|p| p.id == id) {
                        self.pending_joins.remove(idx);
                        effects.pings.remove(&id);
                        effects.cancelled += 1;
                        debug!(player_id = id, "Join and leave in the same tick, cancelled");
                    } else if registry.remove(id).is_some() {
                        effects.pings.remove(&id);
                        effects.left.push(id);
                    } else {
                        trace!(player_id = id, "Leave for unknown player ignored");
                    }
                }
                Event::Moving { id, moving } => {
                    let target = match self.pending_joins.iter_mut().find(|p| p.id == id) {
                        Some(player) => Some(player),
                        None => registry.get_mut(id),
                    };
                    match target {
                        Some(player) => player.moving = moving,
                        None => effects.dropped += 1,
                    }
                }
                Event::Ping { id, timestamp } => {
                    if registry.contains(id) || self.pending_joins.iter().any(|p| p.id == id) {
                        effects.pings.insert(id, timestamp);
                    } else {
                        effects.dropped += 1;
                    }
                }
            }
        }

        for player in self.pending_joins.drain(..) {
            effects.joined.push(player.id);
            registry.insert(player);
        }

        effects
    }
}
