//! World dimensions and player movement integration

use crate::ws::protocol::Moving;

/// Width of the toroidal play field
pub const WORLD_WIDTH: f32 = 800.0;
/// Height of the toroidal play field
pub const WORLD_HEIGHT: f32 = 600.0;
/// Visual size of a player square; spawn positions are inset by it
pub const PLAYER_SIZE: f32 = 30.0;
/// Linear speed in world units per second
pub const PLAYER_SPEED: f32 = 500.0;

/// Physics system for advancing player positions
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Combined direction for a movement mask.
    ///
    /// The summed unit vectors are divided by their *squared* length, so a
    /// diagonal comes out as (±0.5, ±0.5). Clients predict with the same
    /// formula, so this must not be changed to a true normalisation.
    pub fn direction(moving: Moving) -> (f32, f32) {
        let (dx, dy) = moving
            .directions()
            .map(|d| d.vector())
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));

        let len_sq = dx * dx + dy * dy;
        if len_sq == 0.0 {
            return (0.0, 0.0);
        }

        (dx / len_sq, dy / len_sq)
    }

    /// Advance a position by `dt` seconds of movement and wrap it into the world
    pub fn step(x: f32, y: f32, moving: Moving, dt: f32) -> (f32, f32) {
        let (dx, dy) = Self::direction(moving);
        let new_x = x + dx * PLAYER_SPEED * dt;
        let new_y = y + dy * PLAYER_SPEED * dt;

        (Self::wrap(new_x, WORLD_WIDTH), Self::wrap(new_y, WORLD_HEIGHT))
    }

    /// Non-negative modulo, clamped so float rounding never yields `size` itself
    pub fn wrap(value: f32, size: f32) -> f32 {
        let wrapped = value.rem_euclid(size);
        if wrapped >= size {
            0.0
        } else {
            wrapped
        }
    }

    /// Whether a position lies inside the world bounds
    pub fn in_bounds(x: f32, y: f32) -> bool {
        (0.0..WORLD_WIDTH).contains(&x) && (0.0..WORLD_HEIGHT).contains(&y)
    }
}
