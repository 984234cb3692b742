//! Simulation Entity
//!
//! A single physics body tracked by [`GameState`](super::state::GameState).

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::core::vec2::FixedVec2;

/// Bit flags carried in the 16-byte input wire format (§3).
pub mod input_flags {
    /// Move up (+Y).
    pub const MOVE_UP: u8 = 0x01;
    /// Move down (-Y).
    pub const MOVE_DOWN: u8 = 0x02;
    /// Move left (-X).
    pub const MOVE_LEFT: u8 = 0x04;
    /// Move right (+X).
    pub const MOVE_RIGHT: u8 = 0x08;
    /// Attack action.
    pub const ATTACK: u8 = 0x10;
    /// First skill slot.
    pub const SKILL_1: u8 = 0x20;
    /// Second skill slot.
    pub const SKILL_2: u8 = 0x40;
    /// Jump action.
    pub const JUMP: u8 = 0x80;

    /// Bitwise-or of every flag this protocol defines. Any bit not in
    /// this mask is undefined and must be rejected by input validation.
    pub const ALL: u8 = MOVE_UP | MOVE_DOWN | MOVE_LEFT | MOVE_RIGHT
        | ATTACK | SKILL_1 | SKILL_2 | JUMP;
}

/// A simulated physics body.
///
/// `w` and `h` are always positive; `id` is unique within a
/// [`GameState`](super::state::GameState).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity id.
    pub id: i32,
    /// Position X (Q16.16).
    pub x: Fixed,
    /// Position Y (Q16.16).
    pub y: Fixed,
    /// Velocity X (Q16.16).
    pub vx: Fixed,
    /// Velocity Y (Q16.16).
    pub vy: Fixed,
    /// Width (Q16.16), always > 0.
    pub w: Fixed,
    /// Height (Q16.16), always > 0.
    pub h: Fixed,
    /// Current hit points.
    pub hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
}

impl Entity {
    /// Construct a new entity at full health.
    pub fn new(id: i32, x: Fixed, y: Fixed, w: Fixed, h: Fixed, max_hp: i32) -> Self {
        debug_assert!(w > 0 && h > 0, "entity extents must be positive");
        Self {
            id,
            x,
            y,
            vx: 0,
            vy: 0,
            w,
            h,
            hp: max_hp,
            max_hp,
        }
    }

    /// Position as a vector.
    #[inline]
    pub fn position(&self) -> FixedVec2 {
        FixedVec2::new(self.x, self.y)
    }

    /// Velocity as a vector.
    #[inline]
    pub fn velocity(&self) -> FixedVec2 {
        FixedVec2::new(self.vx, self.vy)
    }

    /// Apply directional input flags, setting velocity to the sum of
    /// per-axis `±speed` contributions (§4.3 `apply_input`).
    ///
    /// Opposing flags set together (e.g. `MOVE_LEFT | MOVE_RIGHT`)
    /// cancel to zero on that axis, matching a plain signed sum.
    pub fn apply_input(&mut self, flags: u8, speed: Fixed) {
        let mut vx: Fixed = 0;
        let mut vy: Fixed = 0;

        if flags & input_flags::MOVE_RIGHT != 0 {
            vx = vx.wrapping_add(speed);
        }
        if flags & input_flags::MOVE_LEFT != 0 {
            vx = vx.wrapping_sub(speed);
        }
        if flags & input_flags::MOVE_UP != 0 {
            vy = vy.wrapping_add(speed);
        }
        if flags & input_flags::MOVE_DOWN != 0 {
            vy = vy.wrapping_sub(speed);
        }

        self.vx = vx;
        self.vy = vy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    #[test]
    fn test_new_entity_full_health() {
        let e = Entity::new(1, 0, 0, to_fixed(1.0), to_fixed(1.0), 100);
        assert_eq!(e.hp, 100);
        assert_eq!(e.max_hp, 100);
        assert_eq!(e.vx, 0);
    }

    #[test]
    fn test_apply_input_single_direction() {
        let mut e = Entity::new(1, 0, 0, to_fixed(1.0), to_fixed(1.0), 10);
        e.apply_input(input_flags::MOVE_RIGHT, to_fixed(5.0));
        assert_eq!(e.vx, to_fixed(5.0));
        assert_eq!(e.vy, 0);
    }

    #[test]
    fn test_apply_input_opposing_flags_cancel() {
        let mut e = Entity::new(1, 0, 0, to_fixed(1.0), to_fixed(1.0), 10);
        e.apply_input(input_flags::MOVE_LEFT | input_flags::MOVE_RIGHT, to_fixed(5.0));
        assert_eq!(e.vx, 0);
    }

    #[test]
    fn test_apply_input_diagonal() {
        let mut e = Entity::new(1, 0, 0, to_fixed(1.0), to_fixed(1.0), 10);
        e.apply_input(input_flags::MOVE_UP | input_flags::MOVE_RIGHT, to_fixed(3.0));
        assert_eq!(e.vx, to_fixed(3.0));
        assert_eq!(e.vy, to_fixed(3.0));
    }

    #[test]
    fn test_flag_mask_covers_defined_bits() {
        assert_eq!(input_flags::ALL, 0xFF);
    }
}
