//! Per-agent belief state.
//!
//! An [`Agent`] never sees ground truth. It carries the last position fix the
//! positioning system handed it, histories of where it believed it was and
//! where it looked, and the pose latched by its last photograph. Every motion
//! action clears the fix, whether or not the motion succeeded.

use crate::map::FieldMap;
use serde::{Deserialize, Serialize};

/// Confidence the positioning system attaches to a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Medium,
    High,
}

/// Robot chassis variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    /// Mecanum-wheeled car; narrow and able to strafe sideways.
    MecCar,
    /// Tracked chassis; wider and unable to strafe.
    Tank,
}

impl AgentKind {
    /// Clearance the chassis needs along its path, in field units.
    #[must_use]
    pub const fn path_width(&self) -> f64 {
        match self {
            Self::MecCar => 6.0,
            Self::Tank => 9.0,
        }
    }

    /// Whether the chassis can translate sideways without rotating.
    #[must_use]
    pub const fn supports_strafe(&self) -> bool {
        matches!(self, Self::MecCar)
    }
}

/// A believed pose, as reported by the positioning system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub confidence: Confidence,
}

/// One completed survey of the surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookRecord {
    /// Believed position at the time of the look.
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    /// Field-of-view bounds relative to the heading, in degrees.
    pub begin_degrees: f64,
    pub end_degrees: f64,
    pub sight_range: f64,
}

/// Belief state and sensing envelope of one robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    kind: AgentKind,
    fix: Option<PositionFix>,
    last_photo: Option<PositionFix>,
    distance_traveled: f64,
    position_history: Vec<(f64, f64)>,
    look_history: Vec<LookRecord>,
    sight_distance: f64,
    photo_distance: f64,
    search_begin_degrees: f64,
    search_end_degrees: f64,
    max_travel_distance: f64,
    short_distance: f64,
    medium_distance: f64,
    far_distance: f64,
}

impl Agent {
    /// Builds an agent with its sensing envelope resolved against the map.
    /// Travel distances are fractions of the field dimensions, so a larger
    /// field means longer legs.
    #[must_use]
    pub fn new(kind: AgentKind, config: &crate::SimConfig, map: &FieldMap) -> Self {
        let min_side = map.min_side();
        Self {
            kind,
            fix: None,
            last_photo: None,
            distance_traveled: 0.0,
            position_history: Vec::new(),
            look_history: Vec::new(),
            sight_distance: config.sight_distance,
            photo_distance: config.photo_distance,
            search_begin_degrees: config.search_begin_degrees,
            search_end_degrees: config.search_end_degrees,
            max_travel_distance: map.width() * config.max_travel_pct,
            short_distance: min_side * config.short_distance_pct,
            medium_distance: min_side * config.medium_distance_pct,
            far_distance: min_side * config.far_distance_pct,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Current position fix, if the agent has one.
    #[must_use]
    pub const fn position_fix(&self) -> Option<&PositionFix> {
        self.fix.as_ref()
    }

    #[must_use]
    pub const fn has_position_fix(&self) -> bool {
        self.fix.is_some()
    }

    /// Installs a fresh fix and appends it to the position history.
    pub fn set_fix(&mut self, fix: PositionFix) {
        self.position_history.push((fix.x, fix.y));
        self.fix = Some(fix);
    }

    /// Drops the fix. Called after every motion attempt.
    pub fn clear_position_fix(&mut self) {
        self.fix = None;
    }

    /// Latches the current fix as the pose of the last photograph. Returns
    /// false without a fix.
    pub fn latch_photo(&mut self) -> bool {
        match self.fix {
            Some(fix) => {
                self.last_photo = Some(fix);
                true
            }
            None => false,
        }
    }

    /// Pose latched by the last photograph.
    #[must_use]
    pub const fn last_photo(&self) -> Option<&PositionFix> {
        self.last_photo.as_ref()
    }

    /// Whether the current fix matches the latched photo pose exactly. Any
    /// motion since the photograph clears the fix, so a match means the
    /// camera has not moved.
    #[must_use]
    pub fn photo_matches_current_belief(&self) -> bool {
        match (&self.fix, &self.last_photo) {
            (Some(fix), Some(photo)) => fix == photo,
            _ => false,
        }
    }

    /// Appends a completed look to the history.
    pub fn record_look(&mut self, record: LookRecord) {
        self.look_history.push(record);
    }

    /// Looks in chronological order.
    #[must_use]
    pub fn look_history(&self) -> &[LookRecord] {
        &self.look_history
    }

    /// The look before the latest one, used for backtrack detection.
    #[must_use]
    pub fn second_most_recent_look(&self) -> Option<&LookRecord> {
        self.look_history.len().checked_sub(2).map(|i| &self.look_history[i])
    }

    /// Believed positions in the order fixes were obtained.
    #[must_use]
    pub fn position_history(&self) -> &[(f64, f64)] {
        &self.position_history
    }

    pub fn add_distance_traveled(&mut self, distance: f64) {
        self.distance_traveled += distance;
    }

    /// Cumulative intended travel distance, in field units.
    #[must_use]
    pub const fn distance_traveled(&self) -> f64 {
        self.distance_traveled
    }

    #[must_use]
    pub const fn sight_distance(&self) -> f64 {
        self.sight_distance
    }

    #[must_use]
    pub const fn photo_distance(&self) -> f64 {
        self.photo_distance
    }

    /// Field-of-view bounds relative to the heading, in degrees.
    #[must_use]
    pub const fn field_of_view(&self) -> (f64, f64) {
        (self.search_begin_degrees, self.search_end_degrees)
    }

    /// Longest single travel leg the chassis will attempt.
    #[must_use]
    pub const fn max_travel_distance(&self) -> f64 {
        self.max_travel_distance
    }

    #[must_use]
    pub const fn short_distance(&self) -> f64 {
        self.short_distance
    }

    #[must_use]
    pub const fn medium_distance(&self) -> f64 {
        self.medium_distance
    }

    #[must_use]
    pub const fn far_distance(&self) -> f64 {
        self.far_distance
    }

    /// Whether the agent believes it is outside the field, with the boundary
    /// shrunk by the chassis path width. False without a fix; the agent
    /// cannot tell.
    #[must_use]
    pub fn is_out_of_bounds(&self, map: &FieldMap) -> bool {
        self.fix
            .as_ref()
            .is_some_and(|fix| !map.is_in_bounds(fix.x, fix.y, self.kind.path_width()))
    }

    /// Whether the agent believes it is inside an obstacle's clearance zone.
    /// False without a fix.
    #[must_use]
    pub fn is_in_obstacle(&self, map: &FieldMap) -> bool {
        self.fix.as_ref().is_some_and(|fix| {
            map.blocking_obstacle(fix.x, fix.y, self.kind.path_width())
                .is_some()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Rect;
    use crate::SimConfig;
    use std::collections::BTreeMap;

    fn test_map() -> FieldMap {
        let mut obstacles = BTreeMap::new();
        obstacles.insert("post".to_string(), Rect::new(40.0, 60.0, 40.0, 60.0));
        FieldMap::new(Rect::new(0.0, 200.0, 0.0, 100.0), obstacles, BTreeMap::new())
    }

    fn fix(x: f64, y: f64) -> PositionFix {
        PositionFix {
            x,
            y,
            heading: 0.0,
            confidence: Confidence::High,
        }
    }

    #[test]
    fn distances_scale_with_the_field() {
        let map = test_map();
        let agent = Agent::new(AgentKind::MecCar, &SimConfig::default(), &map);
        // Shorter side is 100, width is 200.
        assert!((agent.short_distance() - 5.0).abs() < 1e-9);
        assert!((agent.medium_distance() - 20.0).abs() < 1e-9);
        assert!((agent.far_distance() - 40.0).abs() < 1e-9);
        assert!((agent.max_travel_distance() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn fix_lifecycle_feeds_position_history() {
        let map = test_map();
        let mut agent = Agent::new(AgentKind::Tank, &SimConfig::default(), &map);
        assert!(!agent.has_position_fix());
        agent.set_fix(fix(10.0, 10.0));
        agent.set_fix(fix(20.0, 20.0));
        agent.clear_position_fix();
        assert!(!agent.has_position_fix());
        assert_eq!(agent.position_history(), &[(10.0, 10.0), (20.0, 20.0)]);
    }

    #[test]
    fn photo_match_requires_identical_fix() {
        let map = test_map();
        let mut agent = Agent::new(AgentKind::MecCar, &SimConfig::default(), &map);
        assert!(!agent.latch_photo());
        agent.set_fix(fix(10.0, 10.0));
        assert!(agent.latch_photo());
        assert!(agent.photo_matches_current_belief());
        // A new fix at the same coordinates still matches; a cleared one
        // cannot.
        agent.clear_position_fix();
        assert!(!agent.photo_matches_current_belief());
        agent.set_fix(fix(10.0, 10.1));
        assert!(!agent.photo_matches_current_belief());
    }

    #[test]
    fn boundary_checks_use_belief_only() {
        let map = test_map();
        let mut agent = Agent::new(AgentKind::MecCar, &SimConfig::default(), &map);
        assert!(!agent.is_out_of_bounds(&map));
        assert!(!agent.is_in_obstacle(&map));
        agent.set_fix(fix(-5.0, 50.0));
        assert!(agent.is_out_of_bounds(&map));
        agent.set_fix(fix(50.0, 50.0));
        assert!(agent.is_in_obstacle(&map));
        assert!(!agent.is_out_of_bounds(&map));
    }

    #[test]
    fn boundary_margin_tracks_the_chassis_width() {
        let map = test_map();
        let mut mec = Agent::new(AgentKind::MecCar, &SimConfig::default(), &map);
        let mut tank = Agent::new(AgentKind::Tank, &SimConfig::default(), &map);
        // Inside the raw boundary but within the MecCar's 6-unit clearance.
        mec.set_fix(fix(1.0, 50.0));
        assert!(mec.is_out_of_bounds(&map));
        mec.set_fix(fix(7.0, 50.0));
        assert!(!mec.is_out_of_bounds(&map));
        // The wider Tank chassis still scrapes the wall at the same spot.
        tank.set_fix(fix(7.0, 50.0));
        assert!(tank.is_out_of_bounds(&map));
    }

    #[test]
    fn second_most_recent_look_needs_two_entries() {
        let map = test_map();
        let mut agent = Agent::new(AgentKind::MecCar, &SimConfig::default(), &map);
        let record = LookRecord {
            x: 1.0,
            y: 2.0,
            heading: 0.0,
            begin_degrees: -150.0,
            end_degrees: 150.0,
            sight_range: 45.0,
        };
        agent.record_look(record);
        assert!(agent.second_most_recent_look().is_none());
        agent.record_look(LookRecord { x: 9.0, ..record });
        assert_eq!(agent.second_most_recent_look(), Some(&record));
    }
}
