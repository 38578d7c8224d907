//! Game simulation modules

pub mod events;
pub mod physics;
pub mod registry;
pub mod stats;
pub mod tick;

pub use events::{Event, EventQueue};
pub use registry::{Admission, AdmissionError, Spawn};
pub use stats::{StatsHandle, StatsSnapshot};
pub use tick::TickLoop;
