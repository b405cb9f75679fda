//! Action vocabulary and the per-action noise and cost profiles.
//!
//! Strategies request [`AgentAction`] values; the environment looks up the
//! matching [`ActionProfile`] to decide whether the action succeeds, how far
//! its outcome is perturbed, and what it costs in steps.

use crate::SimError;
use serde::{Deserialize, Serialize};

/// Flat action tag used for profile lookup and strategy bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Go,
    Look,
    Rotate,
    Photograph,
    EstimatePosition,
    Nothing,
    ReportFound,
    GoRandom,
    GoToSafePlace,
    GoForward,
    GoReverse,
    Strafe,
    AdjustRandomly,
}

/// A concrete action an agent can be asked to perform, with its parameters.
///
/// The discretized motion variants carry no payload; the environment resolves
/// their distances and angles from the episode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AgentAction {
    /// Travel toward a field coordinate, optionally stopping after a
    /// fraction of the remaining distance.
    Go {
        x: f64,
        y: f64,
        distance_percent: Option<f64>,
    },
    GoForward { distance: f64 },
    GoReverse { distance: f64 },
    StrafeLeft { distance: f64 },
    StrafeRight { distance: f64 },
    Rotate { degrees: f64 },
    GoForwardShort,
    GoForwardMedium,
    GoForwardFar,
    GoReverseShort,
    GoReverseMedium,
    GoReverseFar,
    RotateLeftSmall,
    RotateLeftMedium,
    RotateLeftBig,
    RotateRightSmall,
    RotateRightMedium,
    RotateRightBig,
    GoRandom,
    GoToSafePlace,
    Look,
    Photograph,
    ReportFound,
    EstimatePosition,
    AdjustRandomly,
    Nothing,
}

impl AgentAction {
    /// Tag for profile lookup.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Go { .. } => ActionKind::Go,
            Self::GoForward { .. }
            | Self::GoForwardShort
            | Self::GoForwardMedium
            | Self::GoForwardFar => ActionKind::GoForward,
            Self::GoReverse { .. }
            | Self::GoReverseShort
            | Self::GoReverseMedium
            | Self::GoReverseFar => ActionKind::GoReverse,
            Self::StrafeLeft { .. } | Self::StrafeRight { .. } => ActionKind::Strafe,
            Self::Rotate { .. }
            | Self::RotateLeftSmall
            | Self::RotateLeftMedium
            | Self::RotateLeftBig
            | Self::RotateRightSmall
            | Self::RotateRightMedium
            | Self::RotateRightBig => ActionKind::Rotate,
            Self::GoRandom => ActionKind::GoRandom,
            Self::GoToSafePlace => ActionKind::GoToSafePlace,
            Self::Look => ActionKind::Look,
            Self::Photograph => ActionKind::Photograph,
            Self::ReportFound => ActionKind::ReportFound,
            Self::EstimatePosition => ActionKind::EstimatePosition,
            Self::AdjustRandomly => ActionKind::AdjustRandomly,
            Self::Nothing => ActionKind::Nothing,
        }
    }

    /// Whether the action can change the agent's ground-truth pose. Belief
    /// invalidation keys off this.
    #[must_use]
    pub const fn is_motion(&self) -> bool {
        matches!(
            self.kind(),
            ActionKind::Go
                | ActionKind::GoForward
                | ActionKind::GoReverse
                | ActionKind::Strafe
                | ActionKind::Rotate
                | ActionKind::GoRandom
                | ActionKind::GoToSafePlace
                | ActionKind::AdjustRandomly
        )
    }
}

/// Success rate, outcome accuracy, and step cost for one action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionProfile {
    /// Probability the action takes effect at all.
    pub success_rate: f64,
    /// 1.0 is exact; lower values widen the outcome perturbation.
    pub accuracy: f64,
    /// Steps consumed whether or not the action succeeds.
    pub step_cost: u32,
}

impl ActionProfile {
    const fn new(success_rate: f64, accuracy: f64, step_cost: u32) -> Self {
        Self {
            success_rate,
            accuracy,
            step_cost,
        }
    }

    fn validate(&self) -> Result<(), SimError> {
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(SimError::InvalidConfig("success_rate must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(SimError::InvalidConfig("accuracy must be in [0, 1]"));
        }
        if self.step_cost == 0 {
            return Err(SimError::InvalidConfig("step_cost must be at least 1"));
        }
        Ok(())
    }
}

/// Profile for position estimation, whose accuracy depends on the confidence
/// the positioning system reports alongside the fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateProfile {
    pub success_rate: f64,
    pub position_accuracy_high: f64,
    pub position_accuracy_medium: f64,
    pub heading_accuracy_high: f64,
    pub heading_accuracy_medium: f64,
    pub step_cost: u32,
}

impl EstimateProfile {
    fn validate(&self) -> Result<(), SimError> {
        for value in [
            self.success_rate,
            self.position_accuracy_high,
            self.position_accuracy_medium,
            self.heading_accuracy_high,
            self.heading_accuracy_medium,
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidConfig(
                    "estimate rates and accuracies must be in [0, 1]",
                ));
            }
        }
        if self.step_cost == 0 {
            return Err(SimError::InvalidConfig("step_cost must be at least 1"));
        }
        Ok(())
    }
}

/// One profile per action kind, exhaustive at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTable {
    pub go: ActionProfile,
    pub go_forward: ActionProfile,
    pub go_reverse: ActionProfile,
    pub strafe: ActionProfile,
    pub look: ActionProfile,
    pub rotate: ActionProfile,
    pub photograph: ActionProfile,
    pub estimate_position: EstimateProfile,
    pub nothing: ActionProfile,
    pub report_found: ActionProfile,
    pub go_random: ActionProfile,
    pub go_to_safe_place: ActionProfile,
    pub adjust_randomly: ActionProfile,
}

impl Default for ActionTable {
    fn default() -> Self {
        Self {
            go: ActionProfile::new(0.8, 0.97, 1),
            go_forward: ActionProfile::new(0.95, 0.97, 1),
            go_reverse: ActionProfile::new(0.95, 0.97, 1),
            strafe: ActionProfile::new(0.95, 0.95, 1),
            look: ActionProfile::new(0.9, 0.9, 2),
            rotate: ActionProfile::new(0.97, 0.98, 1),
            photograph: ActionProfile::new(0.9, 0.8, 2),
            estimate_position: EstimateProfile {
                success_rate: 0.75,
                position_accuracy_high: 0.95,
                position_accuracy_medium: 0.9,
                heading_accuracy_high: 0.98,
                heading_accuracy_medium: 0.96,
                step_cost: 1,
            },
            nothing: ActionProfile::new(1.0, 1.0, 1),
            report_found: ActionProfile::new(0.9, 0.8, 1),
            go_random: ActionProfile::new(0.95, 0.96, 1),
            go_to_safe_place: ActionProfile::new(0.95, 0.96, 2),
            adjust_randomly: ActionProfile::new(0.95, 0.95, 1),
        }
    }
}

impl ActionTable {
    /// Success rate for an action kind.
    #[must_use]
    pub fn success_rate(&self, kind: ActionKind) -> f64 {
        match kind {
            ActionKind::EstimatePosition => self.estimate_position.success_rate,
            _ => self.profile(kind).success_rate,
        }
    }

    /// Steps consumed by an action kind.
    #[must_use]
    pub fn step_cost(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::EstimatePosition => self.estimate_position.step_cost,
            _ => self.profile(kind).step_cost,
        }
    }

    /// Profile for every kind except [`ActionKind::EstimatePosition`], whose
    /// accuracy is confidence dependent.
    ///
    /// # Panics
    /// Panics when asked for `EstimatePosition`.
    #[must_use]
    pub fn profile(&self, kind: ActionKind) -> &ActionProfile {
        match kind {
            ActionKind::Go => &self.go,
            ActionKind::GoForward => &self.go_forward,
            ActionKind::GoReverse => &self.go_reverse,
            ActionKind::Strafe => &self.strafe,
            ActionKind::Look => &self.look,
            ActionKind::Rotate => &self.rotate,
            ActionKind::Photograph => &self.photograph,
            ActionKind::Nothing => &self.nothing,
            ActionKind::ReportFound => &self.report_found,
            ActionKind::GoRandom => &self.go_random,
            ActionKind::GoToSafePlace => &self.go_to_safe_place,
            ActionKind::AdjustRandomly => &self.adjust_randomly,
            ActionKind::EstimatePosition => {
                panic!("estimate profile is confidence dependent; use estimate_position")
            }
        }
    }

    /// Validates every profile.
    pub fn validate(&self) -> Result<(), SimError> {
        for profile in [
            &self.go,
            &self.go_forward,
            &self.go_reverse,
            &self.strafe,
            &self.look,
            &self.rotate,
            &self.photograph,
            &self.nothing,
            &self.report_found,
            &self.go_random,
            &self.go_to_safe_place,
            &self.adjust_randomly,
        ] {
            profile.validate()?;
        }
        self.estimate_position.validate()
    }
}
