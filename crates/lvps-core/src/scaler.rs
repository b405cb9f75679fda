//! Affine mapping between field coordinates and a fixed-size world canvas.
//!
//! Field coordinates are the positioning system's native frame; world
//! coordinates are the discretized canvas a renderer or grid search works
//! in. The mapping is scale, center shift, and optional per-axis mirroring.

use crate::{FieldMap, distance_between};
use rand::Rng;
use rand::rngs::SmallRng;
use tracing::{info, warn};

/// Reject-sampling attempt cap for [`FieldScaler::random_traversable_point`].
const RANDOM_POINT_ATTEMPTS: u32 = 1000;

/// Field/world coordinate mapper.
#[derive(Debug, Clone)]
pub struct FieldScaler {
    scale: f64,
    shift_x: f64,
    shift_y: f64,
    world_width: u32,
    world_height: u32,
    invert_x: bool,
    invert_y: bool,
}

impl FieldScaler {
    /// Builds a scaler that centers the map boundary on the world canvas.
    #[must_use]
    pub fn new(
        map: &FieldMap,
        world_width: u32,
        world_height: u32,
        scale: f64,
        invert_x: bool,
        invert_y: bool,
    ) -> Self {
        let (center_x, center_y) = map.boundary().centroid();
        let shift_x = f64::from(world_width) / 2.0 - (center_x * scale).round();
        let shift_y = f64::from(world_height) / 2.0 - (center_y * scale).round();
        Self {
            scale,
            shift_x,
            shift_y,
            world_width,
            world_height,
            invert_x,
            invert_y,
        }
    }

    /// Builds a scaler whose scale factor is stepped down from 1.0 in 0.05
    /// decrements until the longest map side fits within `margin` of the
    /// shorter canvas side. Both axes are mirrored, matching the rendered
    /// frame orientation.
    #[must_use]
    pub fn fitted(map: &FieldMap, world_width: u32, world_height: u32, margin: f64) -> Self {
        let max_scaled_side = f64::from(world_width.min(world_height)) * margin;
        let max_map_side = map.width().max(map.length());
        let mut scale = 1.0;
        while max_map_side * scale > max_scaled_side && scale > 0.05 {
            scale -= 0.05;
        }
        info!(scale, "fitted field scaler");
        Self::new(map, world_width, world_height, scale, true, true)
    }

    /// Scale factor from field to world units.
    #[must_use]
    pub const fn scale_factor(&self) -> f64 {
        self.scale
    }

    /// Maps a field coordinate onto the world canvas. World coordinates are
    /// snapped to whole units before shifting.
    #[must_use]
    pub fn to_world(&self, field_x: f64, field_y: f64) -> (f64, f64) {
        let x = (field_x * self.scale).round() + self.shift_x;
        let y = (field_y * self.scale).round() + self.shift_y;
        (
            self.mirror(x, self.invert_x, self.world_width),
            self.mirror(y, self.invert_y, self.world_height),
        )
    }

    /// Maps a world coordinate back to the field frame. The half-cell offset
    /// targets the center of the world cell rather than its corner.
    #[must_use]
    pub fn to_field(&self, world_x: f64, world_y: f64) -> (f64, f64) {
        let x = self.mirror(world_x, self.invert_x, self.world_width) - self.shift_x;
        let y = self.mirror(world_y, self.invert_y, self.world_height) - self.shift_y;
        let half_cell = (1.0 / self.scale) / 2.0;
        (x / self.scale + half_cell, y / self.scale + half_cell)
    }

    /// Converts a field distance to world units.
    #[must_use]
    pub fn scale_distance(&self, field_distance: f64) -> f64 {
        field_distance * self.scale
    }

    /// Converts a world distance to field units.
    #[must_use]
    pub fn unscale_distance(&self, world_distance: f64) -> f64 {
        world_distance / self.scale
    }

    /// Draws a random world point whose field image is in bounds and not
    /// inside an obstacle. Gives up after a fixed number of rejections.
    #[must_use]
    pub fn random_traversable_point(
        &self,
        map: &FieldMap,
        rng: &mut SmallRng,
    ) -> Option<(f64, f64)> {
        for _ in 0..RANDOM_POINT_ATTEMPTS {
            let world_x = f64::from(rng.random_range(0..self.world_width));
            let world_y = f64::from(rng.random_range(0..self.world_height));
            let (field_x, field_y) = self.to_field(world_x, world_y);
            if map.is_in_bounds(field_x, field_y, 0.0)
                && map.blocking_obstacle(field_x, field_y, 0.0).is_none()
            {
                return Some((world_x, world_y));
            }
        }
        warn!("unable to find traversable world coordinates");
        None
    }

    /// Point on the line toward `(target_x, target_y)` reachable within
    /// `max_dist` world units, found by a unit-step walk. Returns the target
    /// itself when it is already within range.
    ///
    /// Steps advance one x unit when the slope is shallow and one slope unit
    /// otherwise, so step length and the traveled counter disagree slightly
    /// off-axis. The walk predates the closed-form solution and its exact
    /// endpoints are load bearing.
    #[must_use]
    pub fn nearest_traversable_point(
        &self,
        from_x: f64,
        from_y: f64,
        target_x: f64,
        target_y: f64,
        max_dist: f64,
    ) -> (f64, f64) {
        walk_toward(from_x, from_y, target_x, target_y, max_dist)
    }

    /// Same walk in field units, for callers that never leave the field
    /// frame.
    #[must_use]
    pub fn nearest_traversable_field_point(
        &self,
        from_x: f64,
        from_y: f64,
        target_x: f64,
        target_y: f64,
        max_dist: f64,
    ) -> (f64, f64) {
        walk_toward(from_x, from_y, target_x, target_y, max_dist)
    }

    /// Whether a world point is visible from another: within sight range and
    /// with an obstacle-free straight path in the field frame.
    #[must_use]
    pub fn is_visible(
        &self,
        map: &FieldMap,
        from_x: f64,
        from_y: f64,
        to_x: f64,
        to_y: f64,
        sight_range: f64,
    ) -> bool {
        if distance_between(from_x, from_y, to_x, to_y) > sight_range {
            return false;
        }
        let (field_from_x, field_from_y) = self.to_field(from_x, from_y);
        let (field_to_x, field_to_y) = self.to_field(to_x, to_y);
        map.blocked_path(field_from_x, field_from_y, field_to_x, field_to_y, 0.0)
            .is_none()
    }

    fn mirror(&self, value: f64, invert: bool, extent: u32) -> f64 {
        if invert {
            f64::from(extent) - value
        } else {
            value
        }
    }
}

/// Unit-step walk shared by both frames.
fn walk_toward(from_x: f64, from_y: f64, target_x: f64, target_y: f64, max_dist: f64) -> (f64, f64) {
    let mut traveled = 0.0;
    let mut curr_x = from_x;
    let mut curr_y = from_y;
    let mut last_x = curr_x;
    let mut last_y = curr_y;
    // Compared against every step; the walk ends once it would carry the
    // point farther out than where it started.
    let start_dist = distance_between(curr_x, curr_y, target_x, target_y);

    if start_dist <= max_dist {
        return (target_x, target_y);
    }

    let dx = target_x - from_x;
    let vertical = dx == 0.0;
    let slope = if vertical {
        0.0
    } else {
        (target_y - from_y) / dx
    };

    while traveled < max_dist && start_dist >= distance_between(curr_x, curr_y, target_x, target_y)
    {
        last_x = curr_x;
        last_y = curr_y;

        traveled += 1.0;
        if vertical {
            curr_y += if target_y > curr_y { 1.0 } else { -1.0 };
        } else if slope.abs() < 1.0 {
            curr_x += if target_x > curr_x { 1.0 } else { -1.0 };
            curr_y += slope;
        } else {
            curr_y += slope;
            curr_x += 1.0 / slope;
        }
    }

    if traveled >= max_dist {
        return (last_x, last_y);
    }
    (curr_x, curr_y)
}
