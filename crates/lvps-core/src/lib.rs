//! Core engine for the LVPS localization-and-search simulation.
//!
//! The engine models a small team of robots searching a bounded 2-D field for
//! targets while their positioning system (LVPS) is unreliable: position fixes
//! fail outright inside dead spots, every action is gated by a success-rate
//! trial, and successful actions are perturbed by an accuracy factor. Ground
//! truth lives exclusively in [`SimulationEnvironment`]; agents carry only a
//! belief pose that is invalidated by every motion and regained through an
//! explicit position estimate.
//!
//! Module map:
//! - [`map`] - field geometry and procedural map generation
//! - [`scaler`] - field/world affine coordinate mapping
//! - [`events`] - typed publish/subscribe notifications
//! - [`actions`] - the action vocabulary and its noise/cost profiles
//! - [`agent`] - per-agent belief state and histories
//! - [`environment`] - shared world state and action execution
//! - [`strategy`] - decision policies driving an agent through an episode

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

pub mod actions;
pub mod agent;
pub mod environment;
pub mod events;
pub mod map;
pub mod scaler;
pub mod strategy;

pub use actions::{ActionKind, ActionProfile, ActionTable, AgentAction, EstimateProfile};
pub use agent::{Agent, AgentKind, Confidence, LookRecord, PositionFix};
pub use environment::{SimulationEnvironment, Target, TruePose};
pub use events::{EventBus, SimEvent, SimEventKind, SimEventSink};
pub use map::{DeadSpot, FieldMap, FieldMapGenerator, MapConfig, Rect};
pub use scaler::FieldScaler;
pub use strategy::{RandomSearchStrategy, ReasonableSearchStrategy, SearchStrategy};

new_key_type! {
    /// Stable handle for agents tracked by the simulation environment.
    pub struct AgentId;
}

new_key_type! {
    /// Stable handle for search targets placed on the field.
    pub struct TargetId;
}

/// Errors raised while constructing or configuring the simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a simulation episode.
///
/// Loaded once per episode; the engine never persists it. Defaults reproduce
/// the reference robot constants (sight and photo ranges in field units,
/// percentages relative to the shorter field side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Optional RNG seed for reproducible episodes.
    pub rng_seed: Option<u64>,
    /// A reported target must lie within this fraction of the shorter field
    /// side of a real target to count as found.
    pub find_threshold_pct: f64,
    /// Agents closer than this fraction of the shorter field side are
    /// considered colliding.
    pub collision_threshold_pct: f64,
    /// How far an agent can see, in field units.
    pub sight_distance: f64,
    /// How close an agent must be for a usable photograph, in field units.
    pub photo_distance: f64,
    /// Start of the field of view relative to the heading, in degrees.
    pub search_begin_degrees: f64,
    /// End of the field of view relative to the heading, in degrees.
    pub search_end_degrees: f64,
    /// Maximum travel per leg as a fraction of the field width.
    pub max_travel_pct: f64,
    /// Short discretized travel as a fraction of the shorter field side.
    pub short_distance_pct: f64,
    /// Medium discretized travel as a fraction of the shorter field side.
    pub medium_distance_pct: f64,
    /// Far discretized travel as a fraction of the shorter field side.
    pub far_distance_pct: f64,
    /// Small discretized rotation, in degrees.
    pub rotate_small_degrees: f64,
    /// Medium discretized rotation, in degrees.
    pub rotate_medium_degrees: f64,
    /// Big discretized rotation, in degrees.
    pub rotate_big_degrees: f64,
    /// Width of the world-frame canvas the scaler maps onto.
    pub scaled_width: u32,
    /// Height of the world-frame canvas the scaler maps onto.
    pub scaled_height: u32,
    /// Fraction of the canvas the scaled field may occupy.
    pub scale_margin: f64,
    /// Per-action success rates, accuracies, and step costs.
    pub actions: ActionTable,
    /// Ranges used when generating a random field map.
    pub map: MapConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            find_threshold_pct: 0.07,
            collision_threshold_pct: 0.1,
            sight_distance: 45.0,
            photo_distance: 14.0,
            search_begin_degrees: -150.0,
            search_end_degrees: 150.0,
            max_travel_pct: 0.25,
            short_distance_pct: 0.05,
            medium_distance_pct: 0.2,
            far_distance_pct: 0.4,
            rotate_small_degrees: 6.0,
            rotate_medium_degrees: 33.0,
            rotate_big_degrees: 45.0,
            scaled_width: 320,
            scaled_height: 320,
            scale_margin: 0.9,
            actions: ActionTable::default(),
            map: MapConfig::default(),
        }
    }
}

impl SimConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(0.0..=1.0).contains(&self.find_threshold_pct) || self.find_threshold_pct == 0.0 {
            return Err(SimError::InvalidConfig(
                "find_threshold_pct must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.collision_threshold_pct)
            || self.collision_threshold_pct == 0.0
        {
            return Err(SimError::InvalidConfig(
                "collision_threshold_pct must be in (0, 1]",
            ));
        }
        if self.sight_distance <= 0.0 || self.photo_distance <= 0.0 {
            return Err(SimError::InvalidConfig(
                "sight_distance and photo_distance must be positive",
            ));
        }
        if self.search_begin_degrees >= self.search_end_degrees {
            return Err(SimError::InvalidConfig(
                "search_begin_degrees must be below search_end_degrees",
            ));
        }
        if self.search_begin_degrees < -180.0 || self.search_end_degrees > 180.0 {
            return Err(SimError::InvalidConfig(
                "field of view bounds must lie within [-180, 180]",
            ));
        }
        if self.max_travel_pct <= 0.0
            || self.short_distance_pct <= 0.0
            || self.medium_distance_pct <= 0.0
            || self.far_distance_pct <= 0.0
        {
            return Err(SimError::InvalidConfig(
                "travel percentages must be positive",
            ));
        }
        if self.rotate_small_degrees <= 0.0
            || self.rotate_medium_degrees <= 0.0
            || self.rotate_big_degrees <= 0.0
        {
            return Err(SimError::InvalidConfig(
                "rotation increments must be positive",
            ));
        }
        if self.scaled_width == 0 || self.scaled_height == 0 {
            return Err(SimError::InvalidConfig(
                "canvas dimensions must be non-zero",
            ));
        }
        if self.scale_margin <= 0.0 || self.scale_margin > 1.0 {
            return Err(SimError::InvalidConfig("scale_margin must be in (0, 1]"));
        }
        self.actions.validate()?;
        self.map.validate()
    }
}

/// Euclidean distance between two points.
#[must_use]
pub fn distance_between(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x1 - x2;
    let dy = y1 - y2;
    (dx * dx + dy * dy).sqrt()
}

/// Projects a point along a zero-north, clockwise-positive heading.
///
/// Heading 0 points up the y axis, 90 points up the x axis. `forward = false`
/// projects in the opposite direction without changing the heading.
#[must_use]
pub fn project_point(
    x: f64,
    y: f64,
    heading_degrees: f64,
    distance: f64,
    forward: bool,
) -> (f64, f64) {
    let rad = heading_degrees.to_radians();
    let sign = if forward { 1.0 } else { -1.0 };
    (
        x + sign * distance * rad.sin(),
        y + sign * distance * rad.cos(),
    )
}

/// Bearing from a start point to an end point in the zero-north system.
///
/// A vertical leg degenerates to slope 0 and therefore reports 90 degrees;
/// downstream behavior depends on that quirk, so it stays.
#[must_use]
pub fn bearing_between(start_x: f64, start_y: f64, end_x: f64, end_y: f64) -> f64 {
    let dx = end_x - start_x;
    let slope = if dx == 0.0 {
        0.0
    } else {
        (end_y - start_y) / dx
    };
    let slope_degrees = slope.atan().to_degrees();
    let mut end_heading = if slope_degrees > 0.0 {
        90.0 - slope_degrees
    } else {
        90.0 + slope_degrees.abs()
    };
    if end_x < start_x {
        end_heading = -(180.0 - end_heading);
    }
    end_heading
}

/// Wraps a heading into (-180, 180].
#[must_use]
pub(crate) fn wrap_heading(heading: f64) -> f64 {
    if heading > 180.0 {
        -(360.0 - heading)
    } else if heading < -180.0 {
        360.0 - heading.abs()
    } else {
        heading
    }
}

/// Folds an offset heading back into range the way the straight-drive path
/// does: magnitudes above 180 reflect instead of wrapping, so the sign is
/// preserved.
#[must_use]
pub(crate) fn fold_heading(heading: f64) -> f64 {
    if heading > 180.0 {
        180.0 - (180.0 - heading).abs()
    } else if heading < -180.0 {
        180.0 - (180.0 + heading).abs()
    } else {
        heading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearing_matches_compass_quadrants() {
        // Due east and due west.
        assert!((bearing_between(0.0, 0.0, 10.0, 0.0) - 90.0).abs() < 1e-9);
        assert!((bearing_between(0.0, 0.0, -10.0, 0.0) + 90.0).abs() < 1e-9);
        // Northeast diagonal sits halfway between north and east.
        assert!((bearing_between(0.0, 0.0, 10.0, 10.0) - 45.0).abs() < 1e-9);
        // Southwest diagonal mirrors into the negative half.
        assert!((bearing_between(0.0, 0.0, -10.0, -10.0) + 135.0).abs() < 1e-9);
    }

    #[test]
    fn bearing_degenerates_to_east_for_vertical_legs() {
        assert!((bearing_between(5.0, 0.0, 5.0, 20.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn projection_inverts_bearing() {
        let (x, y) = project_point(3.0, 4.0, 90.0, 10.0, true);
        assert!((x - 13.0).abs() < 1e-9);
        assert!((y - 4.0).abs() < 1e-9);
        let (x, y) = project_point(3.0, 4.0, 0.0, 10.0, false);
        assert!((x - 3.0).abs() < 1e-9);
        assert!((y + 6.0).abs() < 1e-9);
    }

    #[test]
    fn heading_wraps_into_signed_half_turn() {
        assert!((wrap_heading(190.0) + 170.0).abs() < 1e-9);
        assert!((wrap_heading(-190.0) - 170.0).abs() < 1e-9);
        assert!((wrap_heading(180.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn default_config_validates() {
        SimConfig::default().validate().expect("default config");
    }

    #[test]
    fn config_rejects_inverted_field_of_view() {
        let config = SimConfig {
            search_begin_degrees: 150.0,
            search_end_degrees: -150.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = SimConfig {
            rng_seed: Some(99),
            ..SimConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: SimConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.rng_seed, Some(99));
        assert!((back.sight_distance - config.sight_distance).abs() < f64::EPSILON);
    }
}
