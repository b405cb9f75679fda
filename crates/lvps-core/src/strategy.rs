//! Decision policies driving an agent through a search episode.
//!
//! A strategy only sees what the agent sees: belief state, look history, and
//! the environment's sensing queries. It never reads ground truth. Strategies
//! carry their own random source so two strategies over one environment stay
//! independently reproducible.

use crate::actions::{ActionKind, AgentAction};
use crate::environment::SimulationEnvironment;
use crate::{AgentId, distance_between};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Chooses the next action for an agent.
pub trait SearchStrategy {
    /// Picks the next action given the outcome of the previous one. Pure
    /// decision; the caller executes it via
    /// [`SimulationEnvironment::perform`].
    fn next_action(
        &mut self,
        env: &mut SimulationEnvironment,
        agent_id: AgentId,
        last_action: Option<ActionKind>,
        last_result: bool,
        step: u64,
    ) -> AgentAction;
}

/// Priority-driven search policy.
///
/// Keeps a position fix current, walks random legs while nothing is in
/// sight, and escalates through photograph and report once a target shows
/// up. Repeated positioning failures trigger a physical nudge, since dead
/// spots only release an agent that actually moves.
#[derive(Debug)]
pub struct ReasonableSearchStrategy {
    rng: SmallRng,
    consecutive_position_fails: u32,
}

impl ReasonableSearchStrategy {
    const MAX_POSITION_FAILS: u32 = 2;
    const RANDOM_WALK_ATTEMPTS: u32 = 10;
    /// Not worth moving for less than this, in field units.
    const MIN_TRAVEL_DISTANCE: f64 = 5.0;
    const SLOPES: [f64; 11] = [
        -4.0, -2.0, -1.0, -1.5, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0, 4.0,
    ];

    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(SmallRng::from_os_rng())
    }

    /// Reproducible variant.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(SmallRng::seed_from_u64(seed))
    }

    const fn from_rng(rng: SmallRng) -> Self {
        Self {
            rng,
            consecutive_position_fails: 0,
        }
    }

    /// Picks a travel leg in a random direction at sight distance, rejecting
    /// legs that head back toward the second-most-recent look position. Gives
    /// up after a bounded number of draws.
    fn go_random(&mut self, env: &mut SimulationEnvironment, agent_id: AgentId) -> AgentAction {
        debug!(?agent_id, "going in a random direction");
        let agent = env.agent(agent_id);
        let Some(fix) = agent.position_fix().copied() else {
            return AgentAction::EstimatePosition;
        };
        let sight = agent.sight_distance();
        let recent_look = agent.second_most_recent_look().map(|look| (look.x, look.y));

        for attempt in 1..=Self::RANDOM_WALK_ATTEMPTS {
            let slope = Self::SLOPES[self.rng.random_range(0..Self::SLOPES.len())];
            let direction = if self.rng.random_bool(0.5) { 1.0 } else { -1.0 };
            let x_travel = direction * sight;
            let far_x = fix.x + x_travel;
            let far_y = fix.y + x_travel * slope;
            let (closer_x, closer_y) = env
                .scaler()
                .nearest_traversable_field_point(fix.x, fix.y, far_x, far_y, sight);

            // We probably already looked from the current position; avoid
            // heading back toward the look before it.
            let backtracking = recent_look.is_some_and(|(recent_x, recent_y)| {
                distance_between(closer_x, closer_y, recent_x, recent_y)
                    < distance_between(fix.x, fix.y, recent_x, recent_y)
            });

            if (!backtracking || attempt >= Self::RANDOM_WALK_ATTEMPTS - 1)
                && distance_between(fix.x, fix.y, closer_x, closer_y) >= Self::MIN_TRAVEL_DISTANCE
            {
                debug!(closer_x, closer_y, "random travel leg chosen");
                return AgentAction::Go {
                    x: closer_x,
                    y: closer_y,
                    distance_percent: None,
                };
            }
        }
        AgentAction::Nothing
    }

    fn go_to_safe_place(env: &mut SimulationEnvironment) -> AgentAction {
        match env.random_traversable_position() {
            Some((x, y)) => AgentAction::Go {
                x,
                y,
                distance_percent: None,
            },
            None => AgentAction::Nothing,
        }
    }
}

impl Default for ReasonableSearchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchStrategy for ReasonableSearchStrategy {
    fn next_action(
        &mut self,
        env: &mut SimulationEnvironment,
        agent_id: AgentId,
        last_action: Option<ActionKind>,
        last_result: bool,
        _step: u64,
    ) -> AgentAction {
        // A failed positioning streak usually means a dead spot; only motion
        // gets the agent out of one.
        if last_action == Some(ActionKind::EstimatePosition) {
            if last_result {
                self.consecutive_position_fails = 0;
            } else {
                self.consecutive_position_fails += 1;
                if self.consecutive_position_fails > Self::MAX_POSITION_FAILS {
                    return AgentAction::AdjustRandomly;
                }
            }
        }

        let agent = env.agent(agent_id);
        let has_fix = agent.has_position_fix();
        let out_of_bounds = agent.is_out_of_bounds(env.map());
        let in_obstacle = agent.is_in_obstacle(env.map());

        if !has_fix {
            return AgentAction::EstimatePosition;
        }

        if out_of_bounds {
            warn!(?agent_id, "agent believes it is out of bounds, relocating");
            return Self::go_to_safe_place(env);
        }
        if in_obstacle {
            warn!(?agent_id, "agent believes it is stuck in an obstacle, relocating");
            return Self::go_to_safe_place(env);
        }

        match (last_action, last_result) {
            // Move away even if the report failed; re-reporting the same
            // find would fail again anyway.
            (Some(ActionKind::ReportFound), _) => self.go_random(env, agent_id),
            (Some(ActionKind::Photograph), true) => AgentAction::ReportFound,
            (Some(ActionKind::Look), true) => {
                if let Some((target_x, target_y, _)) = env.nearest_visible_target_position(agent_id)
                {
                    if env.nearest_photographable_target_position(agent_id).is_some() {
                        AgentAction::Photograph
                    } else {
                        // Close a quarter of the gap, then look again.
                        AgentAction::Go {
                            x: target_x,
                            y: target_y,
                            distance_percent: Some(0.25),
                        }
                    }
                } else {
                    self.go_random(env, agent_id)
                }
            }
            (Some(ActionKind::EstimatePosition), true) => AgentAction::Look,
            _ => self.go_random(env, agent_id),
        }
    }
}

/// Uniformly random policy. Awful at searching, but it exercises the same
/// action surface a trained policy would.
#[derive(Debug)]
pub struct RandomSearchStrategy {
    rng: SmallRng,
}

impl RandomSearchStrategy {
    const ACTION_SPACE: [AgentAction; 15] = [
        AgentAction::GoForwardShort,
        AgentAction::GoForwardMedium,
        AgentAction::GoForwardFar,
        AgentAction::GoReverseShort,
        AgentAction::GoReverseMedium,
        AgentAction::GoReverseFar,
        AgentAction::RotateLeftSmall,
        AgentAction::RotateLeftMedium,
        AgentAction::RotateLeftBig,
        AgentAction::RotateRightSmall,
        AgentAction::RotateRightMedium,
        AgentAction::RotateRightBig,
        AgentAction::Look,
        AgentAction::Photograph,
        AgentAction::Nothing,
    ];

    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Reproducible variant.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSearchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchStrategy for RandomSearchStrategy {
    fn next_action(
        &mut self,
        env: &mut SimulationEnvironment,
        agent_id: AgentId,
        last_action: Option<ActionKind>,
        last_result: bool,
        _step: u64,
    ) -> AgentAction {
        let agent = env.agent(agent_id);
        let has_fix = agent.has_position_fix();
        let out_of_bounds = agent.is_out_of_bounds(env.map());
        let in_obstacle = agent.is_in_obstacle(env.map());

        if !has_fix && last_action != Some(ActionKind::EstimatePosition) {
            return AgentAction::EstimatePosition;
        }
        if has_fix && last_action == Some(ActionKind::EstimatePosition) {
            return AgentAction::Look;
        }

        if out_of_bounds || in_obstacle {
            warn!(?agent_id, "agent believes it is stuck, relocating");
            return AgentAction::GoToSafePlace;
        }

        if last_action == Some(ActionKind::Photograph) && last_result {
            return AgentAction::ReportFound;
        }

        Self::ACTION_SPACE[self.rng.random_range(0..Self::ACTION_SPACE.len())]
    }
}
