//! Shared world state and action execution.
//!
//! The environment owns everything agents are not allowed to see: ground-truth
//! poses, target locations, the map, and the random source behind every
//! success trial and accuracy perturbation. Agents interact with it in two
//! layers. The primitive layer (`rotate`, `go_forward`, `travel_to`, ...)
//! mutates ground truth and publishes events. [`SimulationEnvironment::perform`]
//! executes a full [`AgentAction`], which additionally maintains the acting
//! agent's belief state: every motion attempt clears its position fix.

use crate::actions::{ActionKind, ActionProfile, AgentAction};
use crate::agent::{Agent, AgentKind, Confidence, LookRecord, PositionFix};
use crate::events::{EventBus, SimEvent, SimEventKind, SimEventSink};
use crate::map::{FieldMap, FieldMapGenerator};
use crate::scaler::FieldScaler;
use crate::{
    AgentId, SimConfig, SimError, TargetId, bearing_between, distance_between, fold_heading,
    project_point, wrap_heading,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashSet;
use tracing::{debug, info};

/// Heading adjustments available to a random nudge, in degrees.
const ADJUST_ROTATIONS: [f64; 7] = [-45.0, -33.0, -15.0, 0.0, 15.0, 33.0, 45.0];

/// Ground-truth pose of one agent. Never exposed through [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruePose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// A search target placed on the field.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

/// The simulation world.
#[derive(Debug)]
pub struct SimulationEnvironment {
    config: SimConfig,
    map: FieldMap,
    scaler: Option<FieldScaler>,
    rng: SmallRng,
    bus: EventBus,
    poses: SlotMap<AgentId, TruePose>,
    agents: SecondaryMap<AgentId, Agent>,
    targets: SlotMap<TargetId, Target>,
    found: HashSet<TargetId>,
}

impl SimulationEnvironment {
    /// Builds an environment with a freshly generated map.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = seeded_rng(config.rng_seed);
        let map = FieldMapGenerator::generate(&config.map, &mut rng);
        Self::from_parts(config, map, rng)
    }

    /// Builds an environment around an existing map.
    pub fn with_map(config: SimConfig, map: FieldMap) -> Result<Self, SimError> {
        config.validate()?;
        let rng = seeded_rng(config.rng_seed);
        Self::from_parts(config, map, rng)
    }

    fn from_parts(config: SimConfig, map: FieldMap, rng: SmallRng) -> Result<Self, SimError> {
        info!(
            width = map.width(),
            length = map.length(),
            "simulation environment ready"
        );
        Ok(Self {
            config,
            map,
            scaler: None,
            rng,
            bus: EventBus::new(),
            poses: SlotMap::with_key(),
            agents: SecondaryMap::new(),
            targets: SlotMap::with_key(),
            found: HashSet::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub const fn map(&self) -> &FieldMap {
        &self.map
    }

    /// Coordinate scaler, built on first use.
    pub fn scaler(&mut self) -> &FieldScaler {
        self.scaler_parts().0
    }

    fn scaler_parts(&mut self) -> (&FieldScaler, &FieldMap, &mut SmallRng) {
        let Self {
            scaler,
            map,
            config,
            rng,
            ..
        } = self;
        let scaler = scaler.get_or_insert_with(|| {
            FieldScaler::fitted(
                &*map,
                config.scaled_width,
                config.scaled_height,
                config.scale_margin,
            )
        });
        (scaler, map, rng)
    }

    /// Registers a sink for one event kind.
    pub fn subscribe(&mut self, kind: SimEventKind, sink: Box<dyn SimEventSink>) {
        self.bus.subscribe(kind, sink);
    }

    /// Adds an agent at a known ground-truth pose.
    pub fn place_agent(&mut self, kind: AgentKind, x: f64, y: f64, heading: f64) -> AgentId {
        let agent_id = self.poses.insert(TruePose { x, y, heading });
        self.agents
            .insert(agent_id, Agent::new(kind, &self.config, &self.map));
        info!(?agent_id, x, y, heading, "agent placed");
        agent_id
    }

    /// Places a target on the field.
    pub fn add_target(&mut self, name: &str, kind: &str, x: f64, y: f64) -> TargetId {
        let target_id = self.targets.insert(Target {
            name: name.to_string(),
            kind: kind.to_string(),
            x,
            y,
        });
        info!(?target_id, name, x, y, "target placed");
        target_id
    }

    /// Ground-truth pose of an agent.
    ///
    /// # Panics
    /// Panics when the agent id is unknown.
    #[must_use]
    pub fn true_pose(&self, agent_id: AgentId) -> &TruePose {
        &self.poses[agent_id]
    }

    /// Belief state of an agent.
    ///
    /// # Panics
    /// Panics when the agent id is unknown.
    #[must_use]
    pub fn agent(&self, agent_id: AgentId) -> &Agent {
        &self.agents[agent_id]
    }

    #[must_use]
    pub fn target(&self, target_id: TargetId) -> Option<&Target> {
        self.targets.get(target_id)
    }

    /// Number of targets reported close enough to their true position.
    #[must_use]
    pub fn found_target_count(&self) -> usize {
        self.found.len()
    }

    // ---- positioning and motion primitives ----

    /// One positioning attempt against the agent's ground-truth pose.
    ///
    /// Inside a dead spot this always fails. Otherwise it fails at the
    /// estimate success rate, and a passing attempt is perturbed by the
    /// confidence-dependent accuracy over the matching field dimension (or
    /// 360 degrees for the heading).
    pub fn estimate_agent_position(&mut self, agent_id: AgentId) -> Option<PositionFix> {
        let pose = self.poses[agent_id];
        if let Some(spot_id) = self.map.dead_spot_at(pose.x, pose.y, pose.heading) {
            info!(?agent_id, spot_id, "agent is in a dead spot, positioning will fail");
            return None;
        }
        let profile = self.config.actions.estimate_position;
        if !self.does_event_happen(profile.success_rate) {
            debug!(?agent_id, "positioning failed");
            return None;
        }
        let confidence = if self.rng.random_bool(0.5) {
            Confidence::High
        } else {
            Confidence::Medium
        };
        let (position_accuracy, heading_accuracy) = match confidence {
            Confidence::High => (profile.position_accuracy_high, profile.heading_accuracy_high),
            Confidence::Medium => (
                profile.position_accuracy_medium,
                profile.heading_accuracy_medium,
            ),
        };
        let est_x = self.less_accurate(pose.x, position_accuracy, self.map.width());
        let est_y = self.less_accurate(pose.y, position_accuracy, self.map.length());
        let est_heading = self.less_accurate(pose.heading, heading_accuracy, 360.0);
        debug!(?agent_id, est_x, est_y, est_heading, "positioning successful");
        Some(PositionFix {
            x: est_x,
            y: est_y,
            heading: est_heading,
            confidence,
        })
    }

    /// Rotates in place by roughly `degrees`, wrapped into (-180, 180].
    pub fn rotate(&mut self, agent_id: AgentId, degrees: f64) -> bool {
        let profile = *self.config.actions.profile(ActionKind::Rotate);
        if !self.does_event_happen(profile.success_rate) {
            return false;
        }
        let actual = self.less_accurate(degrees, profile.accuracy, 360.0);
        let pose = &mut self.poses[agent_id];
        let new_heading = wrap_heading(pose.heading + actual);
        debug!(
            ?agent_id,
            requested = degrees,
            actual,
            old = pose.heading,
            new = new_heading,
            "rotated"
        );
        pose.heading = new_heading;
        self.bus.publish(&SimEvent::AgentRotated {
            agent_id,
            heading: new_heading,
        });
        true
    }

    /// Drives straight ahead without changing the heading.
    pub fn go_forward(&mut self, agent_id: AgentId, distance: f64) -> bool {
        let profile = *self.config.actions.profile(ActionKind::GoForward);
        self.go_straight(agent_id, true, distance, &profile, 0.0)
    }

    /// Backs up without changing the heading.
    pub fn go_reverse(&mut self, agent_id: AgentId, distance: f64) -> bool {
        let profile = *self.config.actions.profile(ActionKind::GoReverse);
        self.go_straight(agent_id, false, distance, &profile, 0.0)
    }

    /// Translates left, perpendicular to the heading.
    pub fn strafe_left(&mut self, agent_id: AgentId, distance: f64) -> bool {
        if !self.agents[agent_id].kind().supports_strafe() {
            return false;
        }
        let profile = *self.config.actions.profile(ActionKind::Strafe);
        self.go_straight(agent_id, true, distance, &profile, -90.0)
    }

    /// Translates right, perpendicular to the heading.
    pub fn strafe_right(&mut self, agent_id: AgentId, distance: f64) -> bool {
        if !self.agents[agent_id].kind().supports_strafe() {
            return false;
        }
        let profile = *self.config.actions.profile(ActionKind::Strafe);
        self.go_straight(agent_id, true, distance, &profile, 90.0)
    }

    fn go_straight(
        &mut self,
        agent_id: AgentId,
        forward: bool,
        distance: f64,
        profile: &ActionProfile,
        heading_offset: f64,
    ) -> bool {
        let pose = self.poses[agent_id];
        let path_width = self.agents[agent_id].kind().path_width();
        let travel_heading = fold_heading(pose.heading + heading_offset);

        if !self.does_event_happen(profile.success_rate) {
            return false;
        }
        let actual_distance = self.less_accurate(distance, profile.accuracy, distance * 1.5);
        let (next_x, next_y) =
            project_point(pose.x, pose.y, travel_heading, actual_distance, forward);

        // A blocked path parks the agent on the obstacle itself; the penalty
        // for driving blind.
        let committed = match self
            .map
            .blocked_path(pose.x, pose.y, next_x, next_y, path_width)
        {
            Some(obstacle_id) => {
                info!(?agent_id, obstacle_id, "agent ran into an obstacle");
                let bounds = self.map.obstacle_bounds(obstacle_id);
                match bounds {
                    Some(rect) => rect.centroid(),
                    None => (next_x, next_y),
                }
            }
            None => {
                debug!(?agent_id, next_x, next_y, "straight travel succeeded");
                (next_x, next_y)
            }
        };
        let pose = &mut self.poses[agent_id];
        pose.x = committed.0;
        pose.y = committed.1;
        self.bus.publish(&SimEvent::AgentMoved {
            agent_id,
            x: committed.0,
            y: committed.1,
            heading: pose.heading,
        });
        true
    }

    /// Teleport-style travel toward a field coordinate. The destination is
    /// perturbed first, then the trial decides whether the agent arrives at
    /// all; there is no partial progress.
    pub fn travel_to(&mut self, agent_id: AgentId, target_x: f64, target_y: f64) -> bool {
        let profile = *self.config.actions.profile(ActionKind::Go);
        self.travel_to_with(agent_id, target_x, target_y, &profile)
    }

    fn travel_to_with(
        &mut self,
        agent_id: AgentId,
        target_x: f64,
        target_y: f64,
        profile: &ActionProfile,
    ) -> bool {
        let adjusted_x = self.less_accurate(target_x, profile.accuracy, self.map.width());
        let adjusted_y = self.less_accurate(target_y, profile.accuracy, self.map.length());
        let pose = self.poses[agent_id];
        let new_heading = bearing_between(pose.x, pose.y, adjusted_x, adjusted_y);

        if !self.does_event_happen(profile.success_rate) {
            debug!(?agent_id, "travel attempt failed");
            return false;
        }
        let pose = &mut self.poses[agent_id];
        pose.x = adjusted_x;
        pose.y = adjusted_y;
        pose.heading = new_heading;
        debug!(?agent_id, adjusted_x, adjusted_y, new_heading, "travel succeeded");
        self.bus.publish(&SimEvent::AgentMoved {
            agent_id,
            x: adjusted_x,
            y: adjusted_y,
            heading: new_heading,
        });
        true
    }

    // ---- sensing and reporting ----

    /// Whether any other agent is within the collision threshold.
    #[must_use]
    pub fn is_too_close_to_other_agents(&self, agent_id: AgentId) -> bool {
        let threshold = self.map.min_side() * self.config.collision_threshold_pct;
        match self.find_closest_agent(agent_id) {
            Some((other_id, dist)) if dist <= threshold => {
                info!(?agent_id, ?other_id, "agents may have collided");
                true
            }
            _ => false,
        }
    }

    /// Targets within `sight_distance` of the agent's true position, with the
    /// bearing toward each. A target must have an unobstructed straight path
    /// and its bearing must fall inside the agent's field of view.
    #[must_use]
    pub fn visible_targets(&self, agent_id: AgentId, sight_distance: f64) -> Vec<(TargetId, f64)> {
        let pose = self.poses[agent_id];
        let (fov_begin, fov_end) = self.agents[agent_id].field_of_view();
        let mut visible = Vec::new();
        for (target_id, target) in &self.targets {
            if distance_between(pose.x, pose.y, target.x, target.y) > sight_distance {
                continue;
            }
            if self
                .map
                .blocked_path(pose.x, pose.y, target.x, target.y, 0.0)
                .is_some()
            {
                continue;
            }
            let bearing = bearing_between(pose.x, pose.y, target.x, target.y);
            if bearing >= fov_begin && bearing <= fov_end {
                debug!(?agent_id, ?target_id, bearing, "target visible");
                visible.push((target_id, bearing));
            } else {
                debug!(?agent_id, ?target_id, "target in blind spot");
            }
        }
        visible
    }

    /// Nearest visible target position and its bearing, ranked by distance
    /// from the agent's believed position.
    #[must_use]
    pub fn nearest_visible_target_position(&self, agent_id: AgentId) -> Option<(f64, f64, f64)> {
        let sight = self.agents[agent_id].sight_distance();
        self.nearest_among(agent_id, self.visible_targets(agent_id, sight))
    }

    /// Nearest visible target that has not been found yet.
    #[must_use]
    pub fn nearest_unfound_target_position(&self, agent_id: AgentId) -> Option<(f64, f64, f64)> {
        let sight = self.agents[agent_id].sight_distance();
        let unfound = self
            .visible_targets(agent_id, sight)
            .into_iter()
            .filter(|(target_id, _)| !self.found.contains(target_id))
            .collect();
        self.nearest_among(agent_id, unfound)
    }

    /// Nearest target within photographing range.
    #[must_use]
    pub fn nearest_photographable_target_position(
        &self,
        agent_id: AgentId,
    ) -> Option<(f64, f64, f64)> {
        let photo = self.agents[agent_id].photo_distance();
        self.nearest_among(agent_id, self.visible_targets(agent_id, photo))
    }

    fn nearest_among(
        &self,
        agent_id: AgentId,
        candidates: Vec<(TargetId, f64)>,
    ) -> Option<(f64, f64, f64)> {
        let fix = self.agents[agent_id].position_fix()?;
        let mut best: Option<(f64, f64, f64, f64)> = None;
        for (target_id, bearing) in candidates {
            let target = &self.targets[target_id];
            let dist = distance_between(fix.x, fix.y, target.x, target.y);
            if best.is_none_or(|(_, _, _, best_dist)| dist < best_dist) {
                best = Some((target.x, target.y, bearing, dist));
            }
        }
        best.map(|(x, y, bearing, _)| (x, y, bearing))
    }

    /// Whether the target closest to the given coordinates has already been
    /// found. False when no target is within the find threshold.
    #[must_use]
    pub fn is_target_found(&self, x: f64, y: f64) -> bool {
        self.find_closest_target(x, y)
            .is_some_and(|target_id| self.found.contains(&target_id))
    }

    /// Accepts a found-target report at the given coordinates.
    ///
    /// True when a real target lies within the find threshold of the report.
    /// The first accepted report for a target marks it found and publishes
    /// one [`SimEvent::TargetFound`]; repeats are still true but silent.
    pub fn report_target_found(&mut self, agent_id: AgentId, x: f64, y: f64) -> bool {
        info!(?agent_id, x, y, "agent reports a found target");
        let Some(target_id) = self.find_closest_target(x, y) else {
            info!("there is no target at that location");
            return false;
        };
        if self.found.insert(target_id) {
            self.bus.publish(&SimEvent::TargetFound { agent_id, target_id });
        } else {
            info!(?target_id, "target was already found");
        }
        true
    }

    fn find_closest_target(&self, x: f64, y: f64) -> Option<TargetId> {
        let threshold = self.config.find_threshold_pct * self.map.min_side();
        let mut closest: Option<(TargetId, f64)> = None;
        for (target_id, target) in &self.targets {
            let dist = distance_between(x, y, target.x, target.y);
            if closest.is_none_or(|(_, best)| dist < best) {
                closest = Some((target_id, dist));
            }
        }
        match closest {
            Some((target_id, dist)) if dist <= threshold => Some(target_id),
            Some((target_id, dist)) => {
                debug!(?target_id, dist, threshold, "closest target is beyond the threshold");
                None
            }
            None => None,
        }
    }

    fn find_closest_agent(&self, agent_id: AgentId) -> Option<(AgentId, f64)> {
        let pose = self.poses[agent_id];
        let mut closest: Option<(AgentId, f64)> = None;
        for (other_id, other) in &self.poses {
            if other_id == agent_id {
                continue;
            }
            let dist = distance_between(pose.x, pose.y, other.x, other.y);
            if closest.is_none_or(|(_, best)| dist < best) {
                closest = Some((other_id, dist));
            }
        }
        closest
    }

    /// A random in-bounds, obstacle-free field coordinate.
    pub fn random_traversable_position(&mut self) -> Option<(f64, f64)> {
        let (scaler, map, rng) = self.scaler_parts();
        let (world_x, world_y) = scaler.random_traversable_point(map, rng)?;
        Some(scaler.to_field(world_x, world_y))
    }

    // ---- full actions ----

    /// Executes one action for an agent, maintaining its belief state, and
    /// reports whether the action took effect.
    pub fn perform(&mut self, agent_id: AgentId, action: &AgentAction) -> bool {
        let agent = &self.agents[agent_id];
        let short = agent.short_distance();
        let medium = agent.medium_distance();
        let far = agent.far_distance();
        let small = self.config.rotate_small_degrees;
        let medium_rot = self.config.rotate_medium_degrees;
        let big = self.config.rotate_big_degrees;

        match *action {
            AgentAction::Go {
                x,
                y,
                distance_percent,
            } => self.act_go(agent_id, x, y, distance_percent),
            AgentAction::GoForward { distance } => self.act_straight(agent_id, distance, true),
            AgentAction::GoReverse { distance } => self.act_straight(agent_id, distance, false),
            AgentAction::GoForwardShort => self.act_straight(agent_id, short, true),
            AgentAction::GoForwardMedium => self.act_straight(agent_id, medium, true),
            AgentAction::GoForwardFar => self.act_straight(agent_id, far, true),
            AgentAction::GoReverseShort => self.act_straight(agent_id, short, false),
            AgentAction::GoReverseMedium => self.act_straight(agent_id, medium, false),
            AgentAction::GoReverseFar => self.act_straight(agent_id, far, false),
            AgentAction::StrafeLeft { distance } => self.act_strafe(agent_id, distance, true),
            AgentAction::StrafeRight { distance } => self.act_strafe(agent_id, distance, false),
            AgentAction::Rotate { degrees } => self.act_rotate(agent_id, degrees),
            AgentAction::RotateLeftSmall => self.act_rotate(agent_id, -small),
            AgentAction::RotateLeftMedium => self.act_rotate(agent_id, -medium_rot),
            AgentAction::RotateLeftBig => self.act_rotate(agent_id, -big),
            AgentAction::RotateRightSmall => self.act_rotate(agent_id, small),
            AgentAction::RotateRightMedium => self.act_rotate(agent_id, medium_rot),
            AgentAction::RotateRightBig => self.act_rotate(agent_id, big),
            AgentAction::GoRandom => self.act_go_random(agent_id),
            AgentAction::GoToSafePlace => self.act_go_to_safe_place(agent_id),
            AgentAction::Look => self.act_look(agent_id),
            AgentAction::Photograph => self.act_photograph(agent_id),
            AgentAction::ReportFound => self.act_report_found(agent_id),
            AgentAction::EstimatePosition => self.act_estimate_position(agent_id),
            AgentAction::AdjustRandomly => self.act_adjust_randomly(agent_id),
            AgentAction::Nothing => true,
        }
    }

    fn act_estimate_position(&mut self, agent_id: AgentId) -> bool {
        match self.estimate_agent_position(agent_id) {
            Some(fix) => {
                self.agents[agent_id].set_fix(fix);
                true
            }
            None => {
                self.agents[agent_id].clear_position_fix();
                false
            }
        }
    }

    fn act_straight(&mut self, agent_id: AgentId, distance: f64, forward: bool) -> bool {
        let success = if forward {
            self.go_forward(agent_id, distance)
        } else {
            self.go_reverse(agent_id, distance)
        };
        self.agents[agent_id].clear_position_fix();
        success
    }

    fn act_strafe(&mut self, agent_id: AgentId, distance: f64, left: bool) -> bool {
        let success = if left {
            self.strafe_left(agent_id, distance)
        } else {
            self.strafe_right(agent_id, distance)
        };
        self.agents[agent_id].clear_position_fix();
        success
    }

    fn act_rotate(&mut self, agent_id: AgentId, degrees: f64) -> bool {
        let success = self.rotate(agent_id, degrees);
        self.agents[agent_id].clear_position_fix();
        success
    }

    /// Travel toward a believed destination. Requires a position fix; the
    /// optional `distance_percent` shortens the leg to a fraction of the
    /// believed remaining distance.
    fn act_go(
        &mut self,
        agent_id: AgentId,
        x: f64,
        y: f64,
        distance_percent: Option<f64>,
    ) -> bool {
        let Some(fix) = self.agents[agent_id].position_fix().copied() else {
            return false;
        };
        let (mut target_x, mut target_y) = (x, y);
        if let Some(percent) = distance_percent {
            if (percent - 1.0).abs() > f64::EPSILON {
                let full_dist = distance_between(fix.x, fix.y, x, y);
                let (nx, ny) = self.scaler().nearest_traversable_field_point(
                    fix.x,
                    fix.y,
                    x,
                    y,
                    full_dist * percent,
                );
                debug!(from_x = x, from_y = y, to_x = nx, to_y = ny, "shortened travel leg");
                (target_x, target_y) = (nx, ny);
            }
        }
        self.agents[agent_id].clear_position_fix();
        let success = self.travel_to(agent_id, target_x, target_y);
        if success {
            let intended = distance_between(fix.x, fix.y, target_x, target_y);
            self.agents[agent_id].add_distance_traveled(intended);
        }
        success
    }

    /// Travel toward a random traversable point no farther than the agent's
    /// maximum leg. Requires a position fix.
    fn act_go_random(&mut self, agent_id: AgentId) -> bool {
        let Some(fix) = self.agents[agent_id].position_fix().copied() else {
            return false;
        };
        let max_travel = self.agents[agent_id].max_travel_distance();
        let Some((dest_x, dest_y)) = self.random_traversable_position() else {
            self.agents[agent_id].clear_position_fix();
            return false;
        };
        let (target_x, target_y) =
            self.scaler()
                .nearest_traversable_field_point(fix.x, fix.y, dest_x, dest_y, max_travel);
        self.agents[agent_id].clear_position_fix();
        let profile = self.config.actions.go_random;
        let success = self.travel_to_with(agent_id, target_x, target_y, &profile);
        if success {
            self.agents[agent_id]
                .add_distance_traveled(distance_between(fix.x, fix.y, target_x, target_y));
        }
        success
    }

    /// Travel toward any traversable point, used to escape obstacles and
    /// out-of-bounds positions. Works without a position fix.
    fn act_go_to_safe_place(&mut self, agent_id: AgentId) -> bool {
        let Some((dest_x, dest_y)) = self.random_traversable_position() else {
            self.agents[agent_id].clear_position_fix();
            return false;
        };
        self.agents[agent_id].clear_position_fix();
        let profile = self.config.actions.go_to_safe_place;
        self.travel_to_with(agent_id, dest_x, dest_y, &profile)
    }

    /// Survey the surroundings. Requires a position fix. True when an
    /// unfound target is visible and the look trial passes.
    fn act_look(&mut self, agent_id: AgentId) -> bool {
        let Some(fix) = self.agents[agent_id].position_fix().copied() else {
            return false;
        };
        let agent = &mut self.agents[agent_id];
        let (begin, end) = agent.field_of_view();
        let sight = agent.sight_distance();
        agent.record_look(LookRecord {
            x: fix.x,
            y: fix.y,
            heading: fix.heading,
            begin_degrees: begin,
            end_degrees: end,
            sight_range: sight,
        });
        self.bus.publish(&SimEvent::AgentLooked {
            agent_id,
            x: fix.x,
            y: fix.y,
            heading: fix.heading,
        });
        let sighted = self.nearest_unfound_target_position(agent_id).is_some();
        if sighted {
            info!(?agent_id, "agent sighted a target");
        }
        let rate = self.config.actions.look.success_rate;
        sighted && self.does_event_happen(rate)
    }

    /// Photograph the nearest target in photo range. Requires a position
    /// fix; a success latches the believed pose for a later report.
    fn act_photograph(&mut self, agent_id: AgentId) -> bool {
        if !self.agents[agent_id].has_position_fix() {
            return false;
        }
        let in_range = self.nearest_photographable_target_position(agent_id).is_some();
        let rate = self.config.actions.photograph.success_rate;
        let success = in_range && self.does_event_happen(rate);
        info!(?agent_id, success, "photograph attempt");
        if success {
            self.agents[agent_id].latch_photo();
        }
        success
    }

    /// Report the photographed target's location. Requires a position fix
    /// identical to the pose latched by the last photograph.
    ///
    /// The reported location is projected from the believed pose along the
    /// photographed bearing at the true distance to the target; a deliberate
    /// simplification standing in for photogrammetric ranging.
    fn act_report_found(&mut self, agent_id: AgentId) -> bool {
        let agent = &self.agents[agent_id];
        let Some(fix) = agent.position_fix().copied() else {
            return false;
        };
        if !agent.photo_matches_current_belief() {
            return false;
        }
        let Some((target_x, target_y, target_bearing)) =
            self.nearest_photographable_target_position(agent_id)
        else {
            return false;
        };
        let true_distance = distance_between(fix.x, fix.y, target_x, target_y);
        let (est_x, est_y) = project_point(fix.x, fix.y, target_bearing, true_distance, true);
        info!(?agent_id, est_x, est_y, "reporting found target");
        let rate = self.config.actions.report_found.success_rate;
        if self.does_event_happen(rate) {
            return self.report_target_found(agent_id, est_x, est_y);
        }
        false
    }

    /// A small random nudge used to escape positioning failures: one short
    /// move in a random supported direction, then a random rotation if the
    /// move failed.
    fn act_adjust_randomly(&mut self, agent_id: AgentId) -> bool {
        debug!(?agent_id, "adjusting randomly");
        let agent = &self.agents[agent_id];
        let short = agent.short_distance();
        let strafes = agent.kind().supports_strafe();

        // Strafing entries are doubled so a capable chassis prefers them.
        let move_count = if strafes { 6 } else { 2 };
        let choice = self.rng.random_range(0..move_count);
        let mut success = match choice {
            0 => self.go_forward(agent_id, short),
            1 => self.go_reverse(agent_id, short),
            2 | 3 => self.strafe_left(agent_id, short),
            _ => self.strafe_right(agent_id, short),
        };
        if !success {
            let rotation = ADJUST_ROTATIONS[self.rng.random_range(0..ADJUST_ROTATIONS.len())];
            success = self.rotate(agent_id, rotation);
        }
        self.agents[agent_id].clear_position_fix();
        success
    }

    // ---- randomness helpers ----

    /// Perturbs a value by up to `(1 - accuracy) * range` in either
    /// direction. Perfect accuracy returns the value untouched.
    fn less_accurate(&mut self, value: f64, accuracy: f64, range: f64) -> f64 {
        let tolerance = 1.0 - accuracy;
        if tolerance <= 0.0 || range == 0.0 {
            return value;
        }
        let adjust = self.rng.random_range(-tolerance..tolerance);
        value + range * adjust
    }

    /// One success trial. Rates at or above 1.0 always pass.
    fn does_event_happen(&mut self, rate: f64) -> bool {
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        self.rng.random_range(0.0..1.0) <= rate
    }
}

fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Rect;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<SimEvent>>>);

    impl SimEventSink for Recorder {
        fn on_event(&mut self, event: &SimEvent) {
            self.0.lock().unwrap().push(*event);
        }
    }

    /// Config with every trial forced to pass and no perturbation, so
    /// outcomes are exact.
    fn exact_config() -> SimConfig {
        let mut config = SimConfig {
            rng_seed: Some(1),
            ..SimConfig::default()
        };
        let table = &mut config.actions;
        for profile in [
            &mut table.go,
            &mut table.go_forward,
            &mut table.go_reverse,
            &mut table.strafe,
            &mut table.look,
            &mut table.rotate,
            &mut table.photograph,
            &mut table.report_found,
            &mut table.go_random,
            &mut table.go_to_safe_place,
            &mut table.adjust_randomly,
        ] {
            profile.success_rate = 1.0;
            profile.accuracy = 1.0;
        }
        table.estimate_position.success_rate = 1.0;
        table.estimate_position.position_accuracy_high = 1.0;
        table.estimate_position.position_accuracy_medium = 1.0;
        table.estimate_position.heading_accuracy_high = 1.0;
        table.estimate_position.heading_accuracy_medium = 1.0;
        config
    }

    fn open_map() -> FieldMap {
        FieldMap::new(
            Rect::new(0.0, 100.0, 0.0, 100.0),
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    fn map_with_obstacle() -> FieldMap {
        let mut obstacles = BTreeMap::new();
        obstacles.insert("block".to_string(), Rect::new(10.0, 20.0, 10.0, 20.0));
        FieldMap::new(Rect::new(0.0, 100.0, 0.0, 100.0), obstacles, BTreeMap::new())
    }

    #[test]
    fn blocked_forward_travel_parks_on_the_obstacle() {
        let mut env = SimulationEnvironment::with_map(exact_config(), map_with_obstacle())
            .expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 0.0, 15.0, 90.0);
        assert!(env.go_forward(agent_id, 25.0));
        let pose = env.true_pose(agent_id);
        assert!((pose.x - 15.0).abs() < 1e-9);
        assert!((pose.y - 15.0).abs() < 1e-9);
        assert!((pose.heading - 90.0).abs() < 1e-9);
    }

    #[test]
    fn exact_forward_travel_follows_the_heading() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
        assert!(env.go_forward(agent_id, 10.0));
        let pose = env.true_pose(agent_id);
        assert!((pose.x - 50.0).abs() < 1e-9);
        assert!((pose.y - 60.0).abs() < 1e-9);
    }

    #[test]
    fn estimation_always_fails_in_a_dead_spot() {
        let mut dead_spots = BTreeMap::new();
        dead_spots.insert(
            "hole".to_string(),
            crate::DeadSpot {
                bounds: Rect::new(40.0, 60.0, 40.0, 60.0),
                heading_range: None,
            },
        );
        let map = FieldMap::new(Rect::new(0.0, 100.0, 0.0, 100.0), BTreeMap::new(), dead_spots);
        let mut env = SimulationEnvironment::with_map(exact_config(), map).expect("environment");
        let inside = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
        let outside = env.place_agent(AgentKind::MecCar, 80.0, 80.0, 0.0);
        for _ in 0..10 {
            assert!(env.estimate_agent_position(inside).is_none());
        }
        assert!(env.estimate_agent_position(outside).is_some());
    }

    #[test]
    fn exact_estimation_returns_ground_truth() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::Tank, 33.0, 44.0, -10.0);
        let fix = env.estimate_agent_position(agent_id).expect("fix");
        assert!((fix.x - 33.0).abs() < 1e-9);
        assert!((fix.y - 44.0).abs() < 1e-9);
        assert!((fix.heading + 10.0).abs() < 1e-9);
    }

    #[test]
    fn first_report_emits_one_event_and_repeats_are_silent() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 10.0, 10.0, 0.0);
        env.add_target("t0", "coin", 50.0, 50.0);
        let log = Arc::new(Mutex::new(Vec::new()));
        env.subscribe(SimEventKind::TargetFound, Box::new(Recorder(Arc::clone(&log))));

        // Threshold is 0.07 * 100 = 7 field units.
        assert!(!env.report_target_found(agent_id, 60.0, 60.0));
        assert!(env.report_target_found(agent_id, 52.0, 49.0));
        assert!(env.report_target_found(agent_id, 50.0, 50.0));
        assert_eq!(env.found_target_count(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(env.is_target_found(50.0, 50.0));
    }

    #[test]
    fn every_motion_clears_the_position_fix() {
        let motions = [
            AgentAction::GoForwardShort,
            AgentAction::GoReverseMedium,
            AgentAction::RotateLeftBig,
            AgentAction::StrafeLeft { distance: 2.0 },
            AgentAction::Go {
                x: 60.0,
                y: 60.0,
                distance_percent: None,
            },
            AgentAction::AdjustRandomly,
            AgentAction::GoToSafePlace,
        ];
        for action in motions {
            let mut env =
                SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
            let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
            assert!(env.perform(agent_id, &AgentAction::EstimatePosition));
            assert!(env.agent(agent_id).has_position_fix());
            env.perform(agent_id, &action);
            assert!(
                !env.agent(agent_id).has_position_fix(),
                "{action:?} left the fix in place"
            );
        }
    }

    #[test]
    fn sensing_actions_keep_the_position_fix() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
        assert!(env.perform(agent_id, &AgentAction::EstimatePosition));
        env.perform(agent_id, &AgentAction::Look);
        env.perform(agent_id, &AgentAction::Photograph);
        env.perform(agent_id, &AgentAction::Nothing);
        assert!(env.agent(agent_id).has_position_fix());
    }

    #[test]
    fn targets_outside_the_field_of_view_are_not_visible() {
        let config = SimConfig {
            search_begin_degrees: -45.0,
            search_end_degrees: 45.0,
            ..exact_config()
        };
        let mut env = SimulationEnvironment::with_map(config, open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
        env.add_target("ahead", "coin", 52.0, 70.0);
        env.add_target("west", "coin", 30.0, 50.0);
        let visible = env.visible_targets(agent_id, 45.0);
        assert_eq!(visible.len(), 1);
        let (target_id, bearing) = visible[0];
        assert_eq!(env.target(target_id).map(|t| t.name.as_str()), Some("ahead"));
        assert!(bearing.abs() < 45.0);
    }

    #[test]
    fn photograph_then_report_finds_the_target() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
        env.add_target("t0", "coin", 60.0, 50.0);
        assert!(env.perform(agent_id, &AgentAction::EstimatePosition));
        assert!(env.perform(agent_id, &AgentAction::Look));
        assert!(env.perform(agent_id, &AgentAction::Photograph));
        assert!(env.perform(agent_id, &AgentAction::ReportFound));
        assert_eq!(env.found_target_count(), 1);
    }

    #[test]
    fn report_without_matching_photo_pose_is_rejected() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
        env.add_target("t0", "coin", 50.0, 60.0);
        assert!(env.perform(agent_id, &AgentAction::EstimatePosition));
        assert!(env.perform(agent_id, &AgentAction::Photograph));
        // Moving clears the fix; a fresh estimate no longer matches the
        // latched photo pose unless it is bit-identical.
        env.perform(agent_id, &AgentAction::RotateRightSmall);
        assert!(!env.perform(agent_id, &AgentAction::ReportFound));
        assert_eq!(env.found_target_count(), 0);
    }

    #[test]
    fn tank_cannot_strafe() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let agent_id = env.place_agent(AgentKind::Tank, 50.0, 50.0, 0.0);
        assert!(!env.strafe_left(agent_id, 5.0));
        let pose = env.true_pose(agent_id);
        assert!((pose.x - 50.0).abs() < 1e-9);
        assert!((pose.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn collision_check_uses_the_threshold_distance() {
        let mut env =
            SimulationEnvironment::with_map(exact_config(), open_map()).expect("environment");
        let a = env.place_agent(AgentKind::MecCar, 10.0, 10.0, 0.0);
        let b = env.place_agent(AgentKind::MecCar, 15.0, 10.0, 0.0);
        let c = env.place_agent(AgentKind::MecCar, 80.0, 80.0, 0.0);
        // Threshold is 0.1 * 100 = 10 field units.
        assert!(env.is_too_close_to_other_agents(a));
        assert!(env.is_too_close_to_other_agents(b));
        assert!(!env.is_too_close_to_other_agents(c));
    }

    #[test]
    fn seeded_environments_evolve_identically() {
        let run = || {
            let mut config = SimConfig::default();
            config.rng_seed = Some(42);
            let mut env =
                SimulationEnvironment::with_map(config, open_map()).expect("environment");
            let agent_id = env.place_agent(AgentKind::MecCar, 50.0, 50.0, 0.0);
            let mut outcomes = Vec::new();
            for _ in 0..50 {
                outcomes.push(env.perform(agent_id, &AgentAction::EstimatePosition));
                outcomes.push(env.perform(agent_id, &AgentAction::GoForwardShort));
                let pose = env.true_pose(agent_id);
                outcomes.push(pose.x == pose.y);
            }
            let pose = *env.true_pose(agent_id);
            (outcomes, pose.x, pose.y, pose.heading)
        };
        assert_eq!(run(), run());
    }
}
