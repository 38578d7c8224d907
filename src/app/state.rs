//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{Admission, EventQueue, StatsHandle, TickLoop};
use crate::util::time::tick_interval;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub admission: Arc<Admission>,
    pub events: Arc<EventQueue>,
    pub stats: StatsHandle,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let seed = config.world_seed.unwrap_or_else(rand::random);
        let admission = Arc::new(Admission::new(config.max_players, seed));

        Self {
            config,
            admission,
            events: Arc::new(EventQueue::new()),
            stats: StatsHandle::new(),
        }
    }

    /// Build the tick loop that drains this state's event queue
    pub fn tick_loop(&self) -> TickLoop {
        TickLoop::new(
            self.events.clone(),
            self.stats.clone(),
            tick_interval(self.config.tick_rate),
            self.config.stats_log_interval(),
        )
    }
}
