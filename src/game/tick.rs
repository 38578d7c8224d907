//! Authoritative tick loop: reconcile, broadcast, integrate

use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ws::protocol::{Hello, PlayerId, PlayerJoined, PlayerLeft, PlayerMoving, Pong, Record};

use super::events::{EventQueue, Reconciler};
use super::physics::PhysicsSystem;
use super::registry::{Player, PlayerRegistry, SendOutcome};
use super::stats::{Stats, StatsHandle, TickReport};

/// Frames queued during one tick
#[derive(Debug, Default)]
struct Outbox {
    messages: u64,
    bytes: u64,
    overflowed: BTreeSet<PlayerId>,
}

impl Outbox {
    fn send(&mut self, player: &Player, payload: &Bytes) {
        match player.send(payload.clone()) {
            SendOutcome::Sent => {
                self.messages += 1;
                self.bytes += payload.len() as u64;
            }
            SendOutcome::Overflow => {
                self.overflowed.insert(player.id);
            }
            SendOutcome::Closed => {}
        }
    }
}

fn joined_record(player: &Player) -> Bytes {
    PlayerJoined {
        id: player.id,
        x: player.x,
        y: player.y,
        hue: player.hue,
        moving: player.moving,
    }
    .encode()
}

/// The single-threaded driver of the shared world
pub struct TickLoop {
    registry: PlayerRegistry,
    reconciler: Reconciler,
    events: Arc<EventQueue>,
    stats: Stats,
    tick_interval: Duration,
    stats_log_interval: Option<Duration>,
    last_stats_log: Instant,
}

impl TickLoop {
    pub fn new(
        events: Arc<EventQueue>,
        stats: StatsHandle,
        tick_interval: Duration,
        stats_log_interval: Option<Duration>,
    ) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            reconciler: Reconciler::new(),
            events,
            stats: Stats::new(stats),
            tick_interval,
            stats_log_interval,
            last_stats_log: Instant::now(),
        }
    }

    /// Run until `shutdown` flips to true.
    ///
    /// Each wait is `tick_interval` minus the time the tick took, and physics
    /// uses the measured time between tick starts.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.tick_interval.as_secs_f64() * 1000.0,
            "Tick loop started"
        );

        let mut previous = Instant::now();

        loop {
            let started = Instant::now();
            let dt = started.duration_since(previous).as_secs_f32();
            previous = started;

            self.tick(dt);
            self.maybe_log_stats();

            let wait = self.tick_interval.saturating_sub(started.elapsed());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(players = self.registry.len(), "Tick loop stopped");
    }

    /// Run one tick with `dt` seconds of elapsed time
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let started = Instant::now();
        let mut outbox = Outbox::default();

        // Reconcile everything that arrived since the last tick
        let effects = self.reconciler.reconcile(&self.events, &mut self.registry);
        let joined: BTreeSet<PlayerId> = effects.joined.iter().copied().collect();

        // Greet each newcomer and hand it the current world
        for &id in &effects.joined {
            let Some(player) = self.registry.get(id) else {
                continue;
            };

            let hello = Hello {
                id,
                x: player.x,
                y: player.y,
                hue: player.hue,
            }
            .encode();
            outbox.send(player, &hello);

            for other in self.registry.iter().filter(|other| other.id != id) {
                outbox.send(player, &joined_record(other));
            }

            info!(player_id = id, x = player.x, y = player.y, "Player joined");
        }

        // Announce newcomers to players who were already here
        for &id in &effects.joined {
            let Some(player) = self.registry.get(id) else {
                continue;
            };
            let record = joined_record(player);

            for other in self.registry.iter().filter(|other| !joined.contains(&other.id)) {
                outbox.send(other, &record);
            }
        }

        for &id in &effects.left {
            let record = PlayerLeft { id }.encode();
            for other in self.registry.iter() {
                outbox.send(other, &record);
            }
            info!(player_id = id, "Player left");
        }

        // At most one movement update per player per tick
        let changed: Vec<PlayerId> = self
            .registry
            .iter()
            .filter(|p| p.moving != p.broadcast_moving)
            .map(|p| p.id)
            .collect();

        for id in changed {
            let Some(player) = self.registry.get_mut(id) else {
                continue;
            };
            player.broadcast_moving = player.moving;

            let record = PlayerMoving {
                id,
                x: player.x,
                y: player.y,
                moving: player.moving,
            }
            .encode();

            for other in self.registry.iter() {
                outbox.send(other, &record);
            }
        }

        for player in self.registry.iter_mut() {
            let (x, y) = PhysicsSystem::step(player.x, player.y, player.moving, dt);
            player.x = x;
            player.y = y;
        }

        for (&id, &timestamp) in &effects.pings {
            if let Some(player) = self.registry.get(id).filter(|p| p.is_connected()) {
                outbox.send(player, &Pong { timestamp }.encode());
            }
        }

        for &id in &outbox.overflowed {
            if self.registry.sever(id) {
                warn!(
                    player_id = id,
                    "Outbound queue full, disconnecting slow client"
                );
            }
        }

        if effects.dropped > 0 {
            debug!(
                dropped = effects.dropped,
                "Dropped events for departed players"
            );
        }

        let report = TickReport {
            duration: started.elapsed(),
            messages_sent: outbox.messages,
            bytes_sent: outbox.bytes,
            joined: effects.joined.len() as u64,
            left: effects.left.len() as u64,
            cancelled: effects.cancelled as u64,
            overflowed: outbox.overflowed.len() as u64,
            population: self.registry.len(),
        };
        self.stats.record_tick(&report);
        report
    }

    fn maybe_log_stats(&mut self) {
        let Some(interval) = self.stats_log_interval else {
            return;
        };
        if self.last_stats_log.elapsed() < interval {
            return;
        }
        self.last_stats_log = Instant::now();

        let s = self.stats.current();
        info!(
            uptime_secs = s.uptime_secs,
            ticks = s.ticks,
            tick_ms = s.tick_time_avg_ms,
            players = s.players_current,
            joined = s.players_joined,
            left = s.players_left,
            rejected = s.players_rejected,
            malformed = s.malformed_messages,
            sent = s.messages_sent,
            received = s.messages_received,
            "Server stats"
        );
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }
}
