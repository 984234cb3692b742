//! Entity Physics and Collision Broad Phase
//!
//! Per-tick integration (§4.3): gravity, velocity clamp, position
//! integration, world-bounds clamp, friction — applied to entities in
//! ascending id order so the result is independent of map iteration
//! order. Followed by a spatial-hash grid rebuild and a bucket-ordered
//! collision pass that emits a stable list of overlapping id pairs;
//! resolving those collisions is left to the caller.

use std::collections::BTreeMap;

use crate::core::fixed::{Fixed, fixed_clamp, fixed_mul};
use crate::core::vec2::FixedVec2;
use crate::sim::entity::Entity;

/// Tuning constants and world bounds for one simulation.
#[derive(Clone, Copy, Debug)]
pub struct PhysicsConfig {
    /// Downward acceleration, fixed-point units per second.
    pub gravity: Fixed,
    /// Friction factor applied to horizontal velocity each tick
    /// (Q16.16, typically close to but below `FIXED_ONE`).
    pub friction: Fixed,
    /// Maximum magnitude for either velocity component.
    pub velocity_max: Fixed,
    /// World bounds, lower corner.
    pub world_min: FixedVec2,
    /// World bounds, upper corner.
    pub world_max: FixedVec2,
    /// Spatial hash cell size (§4.3 default: `64 * 2^16`).
    pub cell_size: Fixed,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        use crate::core::fixed::to_fixed;
        Self {
            gravity: to_fixed(20.0),
            friction: to_fixed(0.9),
            velocity_max: to_fixed(40.0),
            world_min: FixedVec2::from_ints(-1000, -1000),
            world_max: FixedVec2::from_ints(1000, 1000),
            cell_size: to_fixed(64.0),
        }
    }
}

/// Integrate every entity forward by `dt_ms`, in ascending id order.
pub fn update(entities: &mut BTreeMap<i32, Entity>, dt_ms: i64, config: &PhysicsConfig) {
    for entity in entities.values_mut() {
        // Gravity: vy += (G * dt_ms) / 1000
        let gravity_delta = ((entity_i64(config.gravity) * dt_ms) / 1000) as Fixed;
        entity.vy = entity.vy.wrapping_sub(gravity_delta);

        // Clamp velocity magnitude per axis.
        entity.vx = fixed_clamp(entity.vx, -config.velocity_max, config.velocity_max);
        entity.vy = fixed_clamp(entity.vy, -config.velocity_max, config.velocity_max);

        // Integrate position: x += (vx * dt_ms) / 1000
        let dx = ((entity_i64(entity.vx) * dt_ms) / 1000) as Fixed;
        let dy = ((entity_i64(entity.vy) * dt_ms) / 1000) as Fixed;
        entity.x = entity.x.wrapping_add(dx);
        entity.y = entity.y.wrapping_add(dy);

        // Clamp to world bounds.
        let pos = entity.position().clamp_to_bounds(config.world_min, config.world_max);
        entity.x = pos.x;
        entity.y = pos.y;

        // Friction: vx = (vx * F) >> 16
        entity.vx = fixed_mul(entity.vx, config.friction);
    }
}

#[inline]
fn entity_i64(v: Fixed) -> i64 {
    v as i64
}

/// Floor division on raw Q16.16 values — `floor(a / b)` rather than
/// truncation toward zero, so bucket coordinates are continuous across
/// zero.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn bucket_key(x: Fixed, y: Fixed, cell: Fixed) -> (i32, i32) {
    (
        floor_div(x as i64, cell as i64) as i32,
        floor_div(y as i64, cell as i64) as i32,
    )
}

/// Axis-aligned bounding box overlap test using fixed-point comparisons.
fn aabb_overlap(a: &Entity, b: &Entity) -> bool {
    let a_half_w = a.w / 2;
    let a_half_h = a.h / 2;
    let b_half_w = b.w / 2;
    let b_half_h = b.h / 2;

    let a_min_x = a.x.wrapping_sub(a_half_w);
    let a_max_x = a.x.wrapping_add(a_half_w);
    let a_min_y = a.y.wrapping_sub(a_half_h);
    let a_max_y = a.y.wrapping_add(a_half_h);

    let b_min_x = b.x.wrapping_sub(b_half_w);
    let b_max_x = b.x.wrapping_add(b_half_w);
    let b_min_y = b.y.wrapping_sub(b_half_h);
    let b_max_y = b.y.wrapping_add(b_half_h);

    a_min_x <= b_max_x && a_max_x >= b_min_x && a_min_y <= b_max_y && a_max_y >= b_min_y
}

/// Rebuild the spatial hash and run the collision pass, returning a
/// stable `(id_low, id_high)` list. Resolution is out of scope here —
/// the caller decides what to do with overlapping pairs.
pub fn detect_collisions(entities: &BTreeMap<i32, Entity>, cell_size: Fixed) -> Vec<(i32, i32)> {
    let mut grid: BTreeMap<(i32, i32), Vec<i32>> = BTreeMap::new();

    // Entities are visited in ascending id order (BTreeMap iteration),
    // so each bucket's list is id-ascending too.
    for (id, entity) in entities {
        let key = bucket_key(entity.x, entity.y, cell_size);
        grid.entry(key).or_default().push(*id);
    }

    let mut pairs = Vec::new();

    // BTreeMap iterates keys in lexicographic tuple order already.
    for (&(bx, by), ids) in &grid {
        // In-bucket pairs.
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                push_if_overlapping(entities, ids[i], ids[j], &mut pairs);
            }
        }

        // Right and below neighbor buckets only, to avoid double-counting.
        for neighbor_key in [(bx + 1, by), (bx, by + 1)] {
            if let Some(neighbor_ids) = grid.get(&neighbor_key) {
                for &i in ids {
                    for &j in neighbor_ids {
                        push_if_overlapping(entities, i, j, &mut pairs);
                    }
                }
            }
        }
    }

    pairs
}

fn push_if_overlapping(
    entities: &BTreeMap<i32, Entity>,
    a_id: i32,
    b_id: i32,
    out: &mut Vec<(i32, i32)>,
) {
    if let (Some(a), Some(b)) = (entities.get(&a_id), entities.get(&b_id)) {
        if aabb_overlap(a, b) {
            out.push(if a_id < b_id { (a_id, b_id) } else { (b_id, a_id) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    fn make(id: i32, x: f64, y: f64) -> Entity {
        Entity::new(id, to_fixed(x), to_fixed(y), to_fixed(1.0), to_fixed(1.0), 10)
    }

    #[test]
    fn test_update_applies_gravity_and_integrates() {
        let mut entities = BTreeMap::new();
        entities.insert(1, make(1, 0.0, 0.0));
        let config = PhysicsConfig::default();

        update(&mut entities, 1000, &config);

        let e = entities.get(&1).unwrap();
        assert!(e.vy < 0, "gravity should pull velocity downward");
        assert!(e.y < 0, "entity should have moved in the direction of gravity");
    }

    #[test]
    fn test_update_clamps_velocity() {
        let mut entities = BTreeMap::new();
        let mut e = make(1, 0.0, 0.0);
        e.vx = to_fixed(1000.0);
        entities.insert(1, e);
        let config = PhysicsConfig::default();

        update(&mut entities, 16, &config);

        let e = entities.get(&1).unwrap();
        assert!(e.vx <= config.velocity_max);
    }

    #[test]
    fn test_update_clamps_to_world_bounds() {
        let mut entities = BTreeMap::new();
        entities.insert(1, make(1, 5000.0, 5000.0));
        let config = PhysicsConfig::default();

        update(&mut entities, 16, &config);

        let e = entities.get(&1).unwrap();
        assert_eq!(e.x, config.world_max.x);
        assert_eq!(e.y, config.world_max.y);
    }

    #[test]
    fn test_update_iterates_id_ascending_deterministically() {
        let mut a = BTreeMap::new();
        a.insert(3, make(3, 1.0, 1.0));
        a.insert(1, make(1, 2.0, 2.0));
        a.insert(2, make(2, 3.0, 3.0));

        let mut b = a.clone();
        let config = PhysicsConfig::default();
        update(&mut a, 16, &config);
        update(&mut b, 16, &config);

        assert_eq!(a, b);
    }

    #[test]
    fn test_floor_div_negative() {
        assert_eq!(floor_div(-1, 64), -1);
        assert_eq!(floor_div(-65, 64), -2);
        assert_eq!(floor_div(63, 64), 0);
    }

    #[test]
    fn test_aabb_overlap_detects_touching_entities() {
        let mut entities = BTreeMap::new();
        entities.insert(1, make(1, 0.0, 0.0));
        entities.insert(2, make(2, 0.5, 0.0));

        let pairs = detect_collisions(&entities, to_fixed(64.0));
        assert_eq!(pairs, vec![(1, 2)]);
    }

    #[test]
    fn test_no_collision_when_far_apart() {
        let mut entities = BTreeMap::new();
        entities.insert(1, make(1, 0.0, 0.0));
        entities.insert(2, make(2, 100.0, 100.0));

        let pairs = detect_collisions(&entities, to_fixed(64.0));
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_collision_pairs_stable_id_order() {
        let mut entities = BTreeMap::new();
        entities.insert(5, make(5, 0.0, 0.0));
        entities.insert(2, make(2, 0.4, 0.0));

        let pairs = detect_collisions(&entities, to_fixed(64.0));
        assert_eq!(pairs, vec![(2, 5)]);
    }
}
