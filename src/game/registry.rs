//! Connection registry: admission control and the live player table
//!
//! [`Admission`] is shared with every connection task and decides who gets
//! in. [`PlayerRegistry`] is owned by the tick loop and is the only place that
//! holds a player's outbound channel.

use bytes::Bytes;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::ws::protocol::{Moving, PlayerId};

use super::physics::{PhysicsSystem, PLAYER_SIZE, WORLD_HEIGHT, WORLD_WIDTH};

/// Outbound half of a connection's bounded send queue
pub type Outbound = mpsc::Sender<Bytes>;

/// Identity and initial state handed out on admission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spawn {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub hue: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("server is full ({capacity} players)")]
    CapacityExceeded { capacity: usize },

    #[error("player ids exhausted")]
    IdsExhausted,
}

/// Capacity gate and id allocator shared by all connection tasks
pub struct Admission {
    capacity: usize,
    next_id: AtomicU32,
    population: AtomicUsize,
    rng: Mutex<ChaCha8Rng>,
}

impl Admission {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            next_id: AtomicU32::new(0),
            population: AtomicUsize::new(0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Reserve a seat, then assign an id and a spawn point.
    ///
    /// A refused connection never consumes an id.
    pub fn admit(&self) -> Result<Spawn, AdmissionError> {
        self.population
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .map_err(|_| AdmissionError::CapacityExceeded {
                capacity: self.capacity,
            })?;

        let id = match self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| id.checked_add(1))
        {
            Ok(id) => id,
            Err(_) => {
                self.release();
                return Err(AdmissionError::IdsExhausted);
            }
        };

        let mut rng = self.rng.lock();
        Ok(Spawn {
            id,
            x: rng.gen_range(0.0..WORLD_WIDTH - PLAYER_SIZE),
            y: rng.gen_range(0.0..WORLD_HEIGHT - PLAYER_SIZE),
            hue: rng.gen(),
        })
    }

    /// Give back a seat taken by [`Admission::admit`]
    pub fn release(&self) {
        let _ = self
            .population
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Connections currently holding a seat
    pub fn population(&self) -> usize {
        self.population.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Result of a non-blocking send to one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Connection already gone; its close path reports the leave
    Closed,
    /// Queue full: the client is not keeping up
    Overflow,
}

/// Authoritative player state (owned by the tick loop)
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub hue: u8,
    /// Intent accumulated from the client
    pub moving: Moving,
    /// Mask most recently broadcast to everyone
    pub broadcast_moving: Moving,
    outbound: Option<Outbound>,
}

impl Player {
    pub fn new(spawn: Spawn, outbound: Outbound) -> Self {
        Self {
            id: spawn.id,
            x: spawn.x,
            y: spawn.y,
            hue: spawn.hue,
            moving: Moving::NONE,
            broadcast_moving: Moving::NONE,
            outbound: Some(outbound),
        }
    }

    /// Queue a frame without waiting
    pub fn send(&self, payload: Bytes) -> SendOutcome {
        let Some(outbound) = &self.outbound else {
            return SendOutcome::Closed;
        };

        match outbound.try_send(payload) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => SendOutcome::Overflow,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Live players keyed by id, iterated in id order
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: Player) {
        debug_assert!(PhysicsSystem::in_bounds(player.x, player.y));
        self.players.insert(player.id, player);
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Drop a player's outbound channel so its connection task shuts down.
    ///
    /// The player stays registered until the connection reports its leave.
    pub fn sever(&mut self, id: PlayerId) -> bool {
        self.players
            .get_mut(&id)
            .and_then(|p| p.outbound.take())
            .is_some()
    }
}
