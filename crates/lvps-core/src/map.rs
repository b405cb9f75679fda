//! Field geometry and procedural map generation.
//!
//! A [`FieldMap`] is immutable for the lifetime of an episode: a boundary
//! rectangle, named obstacle rectangles, and named dead spots in which
//! positioning fails. [`FieldMapGenerator`] builds one randomly with a
//! bounded best-effort placement search.

use crate::{SimError, distance_between};
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Retry cap for nudging a candidate placement before giving up.
const PLACEMENT_RETRIES: u32 = 10;

/// Axis-aligned rectangle in field coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rect {
    /// Construct a rectangle from its bounds.
    #[must_use]
    pub const fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Construct a rectangle from a center point and extents.
    #[must_use]
    pub fn centered(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x_min: x - width / 2.0,
            x_max: x + width / 2.0,
            y_min: y - height / 2.0,
            y_max: y + height / 2.0,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Center of the rectangle.
    #[must_use]
    pub fn centroid(&self) -> (f64, f64) {
        (
            self.x_min + 0.5 * (self.x_max - self.x_min),
            self.y_min + 0.5 * (self.y_max - self.y_min),
        )
    }

    /// Whether the point lies inside or on the edge.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Whether the point lies strictly inside.
    #[must_use]
    pub fn contains_strict(&self, x: f64, y: f64) -> bool {
        x > self.x_min && x < self.x_max && y > self.y_min && y < self.y_max
    }

    /// A copy grown outward by `margin` on every side.
    #[must_use]
    pub fn inflated(&self, margin: f64) -> Self {
        Self {
            x_min: self.x_min - margin,
            x_max: self.x_max + margin,
            y_min: self.y_min - margin,
            y_max: self.y_max + margin,
        }
    }

    /// Whether this rectangle fits entirely inside `other`.
    #[must_use]
    pub fn within(&self, other: &Self) -> bool {
        self.x_min >= other.x_min
            && self.x_max <= other.x_max
            && self.y_min >= other.y_min
            && self.y_max <= other.y_max
    }

    fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x_min, self.y_min),
            (self.x_min, self.y_max),
            (self.x_max, self.y_min),
            (self.x_max, self.y_max),
        ]
    }

    /// Overlap test by corner containment only. A pair straddling each other
    /// in a cross shape has no contained corner and is not flagged; placement
    /// quirks downstream depend on exactly this check.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.corners()
            .iter()
            .any(|&(x, y)| other.contains_strict(x, y))
            || other
                .corners()
                .iter()
                .any(|&(x, y)| self.contains_strict(x, y))
    }
}

/// Region in which position estimation always fails, optionally limited to a
/// range of headings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeadSpot {
    pub bounds: Rect,
    /// Inclusive heading range (degrees) in which the dead spot applies.
    /// `None` means every heading.
    pub heading_range: Option<(f64, f64)>,
}

impl DeadSpot {
    /// Whether positioning fails at the given pose.
    #[must_use]
    pub fn applies(&self, x: f64, y: f64, heading: f64) -> bool {
        if !self.bounds.contains(x, y) {
            return false;
        }
        match self.heading_range {
            Some((begin, end)) => heading >= begin && heading <= end,
            None => true,
        }
    }
}

/// Static field geometry for one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    boundary: Rect,
    obstacles: BTreeMap<String, Rect>,
    dead_spots: BTreeMap<String, DeadSpot>,
    // Reserved: positioning landmarks are not simulated yet.
    landmarks: BTreeMap<String, Rect>,
}

impl FieldMap {
    /// Builds a map from explicit geometry.
    #[must_use]
    pub fn new(
        boundary: Rect,
        obstacles: BTreeMap<String, Rect>,
        dead_spots: BTreeMap<String, DeadSpot>,
    ) -> Self {
        Self {
            boundary,
            obstacles,
            dead_spots,
            landmarks: BTreeMap::new(),
        }
    }

    /// Boundary rectangle.
    #[must_use]
    pub const fn boundary(&self) -> &Rect {
        &self.boundary
    }

    /// Field extent along the x axis.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.boundary.width()
    }

    /// Field extent along the y axis.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.boundary.height()
    }

    /// The shorter of width and length.
    #[must_use]
    pub fn min_side(&self) -> f64 {
        self.width().min(self.length())
    }

    /// Named obstacle rectangles.
    #[must_use]
    pub const fn obstacles(&self) -> &BTreeMap<String, Rect> {
        &self.obstacles
    }

    /// Named dead spots.
    #[must_use]
    pub const fn dead_spots(&self) -> &BTreeMap<String, DeadSpot> {
        &self.dead_spots
    }

    /// Bounds of a named obstacle.
    #[must_use]
    pub fn obstacle_bounds(&self, obstacle_id: &str) -> Option<&Rect> {
        self.obstacles.get(obstacle_id)
    }

    /// Whether the point lies strictly inside the boundary, shrunk by
    /// `margin` on every side (the agent path width for clearance checks).
    #[must_use]
    pub fn is_in_bounds(&self, x: f64, y: f64, margin: f64) -> bool {
        x > self.boundary.x_min + margin
            && x < self.boundary.x_max - margin
            && y > self.boundary.y_min + margin
            && y < self.boundary.y_max - margin
    }

    /// Id of the obstacle blocking the point, if any. Each obstacle is
    /// inflated by half the path width so narrow gaps stay impassable.
    #[must_use]
    pub fn blocking_obstacle(&self, x: f64, y: f64, path_width: f64) -> Option<&str> {
        let margin = path_width / 2.0;
        self.obstacles
            .iter()
            .find(|(_, rect)| rect.inflated(margin).contains(x, y))
            .map(|(id, _)| id.as_str())
    }

    /// Id of the first obstacle blocking the straight path between two
    /// points, sampling roughly every field unit.
    #[must_use]
    pub fn blocked_path(
        &self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        path_width: f64,
    ) -> Option<&str> {
        let total = distance_between(x1, y1, x2, y2);
        let steps = total.ceil().max(1.0) as u32;
        for step in 0..=steps {
            let t = f64::from(step) / f64::from(steps);
            let x = x1 + (x2 - x1) * t;
            let y = y1 + (y2 - y1) * t;
            if let Some(id) = self.blocking_obstacle(x, y, path_width) {
                return Some(id);
            }
        }
        None
    }

    /// Id of the dead spot covering the pose, if any.
    #[must_use]
    pub fn dead_spot_at(&self, x: f64, y: f64, heading: f64) -> Option<&str> {
        self.dead_spots
            .iter()
            .find(|(_, spot)| spot.applies(x, y, heading))
            .map(|(id, _)| id.as_str())
    }
}

/// Ranges used when generating a random field map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub min_obstacles: u32,
    pub max_obstacles: u32,
    /// Obstacle extent as a fraction of the matching boundary extent.
    pub min_obstacle_size_pct: f64,
    pub max_obstacle_size_pct: f64,
    pub min_dead_spots: u32,
    pub max_dead_spots: u32,
    /// Dead-spot extent as a fraction of the matching boundary extent.
    pub min_dead_spot_size_pct: f64,
    pub max_dead_spot_size_pct: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            min_width: 150.0,
            max_width: 500.0,
            min_height: 150.0,
            max_height: 500.0,
            min_obstacles: 3,
            max_obstacles: 10,
            min_obstacle_size_pct: 0.01,
            max_obstacle_size_pct: 0.25,
            min_dead_spots: 2,
            max_dead_spots: 10,
            min_dead_spot_size_pct: 0.01,
            max_dead_spot_size_pct: 0.05,
        }
    }
}

impl MapConfig {
    /// Validates the generation ranges.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.min_width <= 0.0 || self.min_height <= 0.0 {
            return Err(SimError::InvalidConfig("field extents must be positive"));
        }
        if self.min_width > self.max_width || self.min_height > self.max_height {
            return Err(SimError::InvalidConfig(
                "field extent ranges must not be inverted",
            ));
        }
        if self.min_obstacles > self.max_obstacles || self.min_dead_spots > self.max_dead_spots {
            return Err(SimError::InvalidConfig(
                "placement count ranges must not be inverted",
            ));
        }
        for (min, max) in [
            (self.min_obstacle_size_pct, self.max_obstacle_size_pct),
            (self.min_dead_spot_size_pct, self.max_dead_spot_size_pct),
        ] {
            if min <= 0.0 || max >= 1.0 || min > max {
                return Err(SimError::InvalidConfig(
                    "placement size percentages must be in (0, 1) and ordered",
                ));
            }
        }
        Ok(())
    }
}

/// Procedural map builder.
///
/// Placement is best effort: each rectangle gets a bounded number of random
/// nudges to escape same-category overlap or the boundary edge, and the last
/// candidate is kept when the retries run out. Feasibility is never
/// guaranteed, only attempted.
#[derive(Debug, Default)]
pub struct FieldMapGenerator;

impl FieldMapGenerator {
    /// Generates a random map from the configured ranges.
    #[must_use]
    pub fn generate(config: &MapConfig, rng: &mut SmallRng) -> FieldMap {
        let width = rng.random_range(config.min_width..=config.max_width);
        let height = rng.random_range(config.min_height..=config.max_height);
        let center_x = rng.random_range(-width / 2.0..=width / 2.0);
        let center_y = rng.random_range(-height / 2.0..=height / 2.0);
        let boundary = Rect::centered(center_x, center_y, width, height);

        let mut obstacles = BTreeMap::new();
        let obstacle_count = rng.random_range(config.min_obstacles..=config.max_obstacles);
        for index in 0..obstacle_count {
            let placed: Vec<Rect> = obstacles.values().copied().collect();
            let rect = Self::place_rect(
                rng,
                &boundary,
                config.min_obstacle_size_pct..=config.max_obstacle_size_pct,
                &placed,
            );
            obstacles.insert(format!("obstacle_{index}"), rect);
        }

        let mut dead_spots = BTreeMap::new();
        let dead_spot_count = rng.random_range(config.min_dead_spots..=config.max_dead_spots);
        for index in 0..dead_spot_count {
            let placed: Vec<Rect> = dead_spots
                .values()
                .map(|spot: &DeadSpot| spot.bounds)
                .collect();
            let bounds = Self::place_rect(
                rng,
                &boundary,
                config.min_dead_spot_size_pct..=config.max_dead_spot_size_pct,
                &placed,
            );
            // Roughly half the dead spots only defeat positioning within a
            // band of headings, matching the hand-built reference maps.
            let heading_range = if rng.random_bool(0.5) {
                let begin: f64 = rng.random_range(-180.0..=90.0);
                let end = (begin + rng.random_range(30.0..=90.0)).min(180.0);
                Some((begin, end))
            } else {
                None
            };
            dead_spots.insert(
                format!("deadspot_{index}"),
                DeadSpot {
                    bounds,
                    heading_range,
                },
            );
        }

        debug!(
            width,
            height,
            obstacles = obstacles.len(),
            dead_spots = dead_spots.len(),
            "generated field map"
        );
        FieldMap::new(boundary, obstacles, dead_spots)
    }

    /// Draws a size from `size_pct`, then searches for a placement that stays
    /// in the boundary and avoids overlap with rectangles of the same
    /// category. The last candidate wins when the retries are exhausted.
    fn place_rect(
        rng: &mut SmallRng,
        boundary: &Rect,
        size_pct: std::ops::RangeInclusive<f64>,
        existing: &[Rect],
    ) -> Rect {
        let width = rng.random_range(size_pct.clone()) * boundary.width();
        let height = rng.random_range(size_pct) * boundary.height();

        let mut center_x = rng.random_range(boundary.x_min..=boundary.x_max);
        let mut center_y = rng.random_range(boundary.y_min..=boundary.y_max);
        let mut candidate = Rect::centered(center_x, center_y, width, height);

        for attempt in 0..PLACEMENT_RETRIES {
            if candidate.within(boundary) && !existing.iter().any(|rect| rect.overlaps(&candidate))
            {
                return candidate;
            }
            if attempt == PLACEMENT_RETRIES - 1 {
                warn!("placement retries exhausted, accepting overlapping rectangle");
                break;
            }
            center_x += rng.random_range(-boundary.width()..=boundary.width());
            center_y += rng.random_range(-boundary.height()..=boundary.height());
            candidate = Rect::centered(center_x, center_y, width, height);
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn test_map() -> FieldMap {
        let mut obstacles = BTreeMap::new();
        obstacles.insert("crate".to_string(), Rect::new(10.0, 20.0, 10.0, 20.0));
        let mut dead_spots = BTreeMap::new();
        dead_spots.insert(
            "corner".to_string(),
            DeadSpot {
                bounds: Rect::new(80.0, 100.0, 80.0, 100.0),
                heading_range: Some((30.0, 120.0)),
            },
        );
        FieldMap::new(Rect::new(0.0, 100.0, 0.0, 100.0), obstacles, dead_spots)
    }

    #[test]
    fn bounds_are_exclusive_with_margin() {
        let map = test_map();
        assert!(map.is_in_bounds(50.0, 50.0, 0.0));
        assert!(!map.is_in_bounds(0.0, 50.0, 0.0));
        assert!(!map.is_in_bounds(2.0, 50.0, 3.0));
        assert!(map.is_in_bounds(4.0, 50.0, 3.0));
    }

    #[test]
    fn blocking_respects_path_width() {
        let map = test_map();
        assert_eq!(map.blocking_obstacle(15.0, 15.0, 0.0), Some("crate"));
        assert_eq!(map.blocking_obstacle(21.0, 15.0, 0.0), None);
        // Inflating by half the path width catches the same point.
        assert_eq!(map.blocking_obstacle(21.0, 15.0, 4.0), Some("crate"));
    }

    #[test]
    fn straight_path_detects_obstacle_crossing() {
        let map = test_map();
        assert_eq!(map.blocked_path(0.0, 15.0, 30.0, 15.0, 0.0), Some("crate"));
        assert_eq!(map.blocked_path(0.0, 25.0, 30.0, 25.0, 0.0), None);
    }

    #[test]
    fn dead_spot_requires_matching_heading() {
        let map = test_map();
        assert_eq!(map.dead_spot_at(90.0, 90.0, 45.0), Some("corner"));
        assert_eq!(map.dead_spot_at(90.0, 90.0, -90.0), None);
        assert_eq!(map.dead_spot_at(50.0, 50.0, 45.0), None);
    }

    #[test]
    fn corner_overlap_misses_cross_straddle() {
        // Wide and tall rectangles crossing like a plus sign share no corner.
        let wide = Rect::new(0.0, 30.0, 10.0, 20.0);
        let tall = Rect::new(10.0, 20.0, 0.0, 30.0);
        assert!(!wide.overlaps(&tall));
        // An ordinary partial overlap is still flagged.
        let shifted = Rect::new(25.0, 40.0, 15.0, 25.0);
        assert!(wide.overlaps(&shifted));
        // Touching edges do not count as overlap.
        let touching = Rect::new(30.0, 40.0, 10.0, 20.0);
        assert!(!wide.overlaps(&touching));
    }

    #[test]
    fn generated_maps_satisfy_containment() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let map = FieldMapGenerator::generate(&MapConfig::default(), &mut rng);
            let boundary = map.boundary();
            assert!(boundary.x_min < boundary.x_max);
            assert!(boundary.y_min < boundary.y_max);
            for rect in map.obstacles().values() {
                assert!(rect.width() > 0.0);
                assert!(rect.height() > 0.0);
            }
            for spot in map.dead_spots().values() {
                assert!(spot.bounds.width() > 0.0);
                assert!(spot.bounds.height() > 0.0);
                if let Some((begin, end)) = spot.heading_range {
                    assert!(begin < end);
                    assert!((-180.0..=180.0).contains(&begin));
                    assert!((-180.0..=180.0).contains(&end));
                }
            }
            let count = map.obstacles().len() as u32;
            assert!(count >= MapConfig::default().min_obstacles);
            assert!(count <= MapConfig::default().max_obstacles);
        }
    }

    #[test]
    fn generated_obstacles_rarely_overlap() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut pairs = 0u32;
        let mut overlapping = 0u32;
        for _ in 0..30 {
            let map = FieldMapGenerator::generate(&MapConfig::default(), &mut rng);
            let rects: Vec<&Rect> = map.obstacles().values().collect();
            for i in 0..rects.len() {
                for j in (i + 1)..rects.len() {
                    pairs += 1;
                    if rects[i].overlaps(rects[j]) {
                        overlapping += 1;
                    }
                }
            }
        }
        // Overlap is only legal after retry exhaustion; with the default
        // ranges that should be the exception, not the rule.
        assert!(pairs > 0);
        assert!(overlapping * 2 < pairs, "{overlapping}/{pairs} pairs overlap");
    }
}
