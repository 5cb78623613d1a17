//! Risk scoring and classification on the 5×5 matrix.
//!
//! RULES:
//!   - risk_score = likelihood × max_impact, always in 1..=25.
//!   - Band boundaries are fixed constants, never read from config.
//!   - Everything here is pure. No store, no logging, no clock.

use crate::{
    error::HazopResult,
    rating::{AssessmentInput, ImpactRatingSet, LikelihoodRating},
};
use serde::{Deserialize, Serialize};

/// Highest score still classified Low.
pub const LOW_MAX: u8 = 7;
/// Highest score still classified Medium.
pub const MEDIUM_MAX: u8 = 16;
/// Highest score still classified High. Everything above is Critical.
pub const HIGH_MAX: u8 = 20;
pub const SCORE_MAX: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn from_score(score: u8) -> Self {
        match score {
            0..=LOW_MAX               => Self::Low,
            s if s <= MEDIUM_MAX      => Self::Medium,
            s if s <= HIGH_MAX        => Self::High,
            _                         => Self::Critical,
        }
    }

    pub fn color(self) -> RiskColor {
        match self {
            Self::Low      => RiskColor::Green,
            Self::Medium   => RiskColor::Yellow,
            Self::High     => RiskColor::Orange,
            Self::Critical => RiskColor::Red,
        }
    }

    /// Inclusive score range covered by this level.
    pub fn score_range(self) -> (u8, u8) {
        match self {
            Self::Low      => (1, LOW_MAX),
            Self::Medium   => (LOW_MAX + 1, MEDIUM_MAX),
            Self::High     => (MEDIUM_MAX + 1, HIGH_MAX),
            Self::Critical => (HIGH_MAX + 1, SCORE_MAX),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low      => "Low",
            Self::Medium   => "Medium",
            Self::High     => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskColor {
    Green,
    Yellow,
    Orange,
    Red,
}

impl RiskColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green  => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red    => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskOutcome {
    pub max_impact: u8,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_color: RiskColor,
}

impl RiskOutcome {
    /// Rebuild an outcome from a stored score. The level and colour are
    /// re-derived rather than trusted from the row.
    pub fn from_parts(max_impact: u8, risk_score: u8) -> Self {
        let risk_level = RiskLevel::from_score(risk_score);
        Self {
            max_impact,
            risk_score,
            risk_level,
            risk_color: risk_level.color(),
        }
    }
}

/// Initial vs residual comparison. Display only, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReductionStats {
    /// Signed: negative when the residual risk is worse.
    pub absolute: i32,
    pub percentage: f64,
    pub initial_level: RiskLevel,
    pub residual_level: RiskLevel,
}

impl ReductionStats {
    pub fn level_improved(&self) -> bool {
        self.residual_level < self.initial_level
    }
}

pub fn assess(impacts: &ImpactRatingSet, likelihood: LikelihoodRating) -> RiskOutcome {
    let max_impact = impacts.max_impact().value();
    RiskOutcome::from_parts(max_impact, likelihood.value() * max_impact)
}

/// Validate a raw payload and score it in one step.
pub fn assess_input(input: &AssessmentInput) -> HazopResult<RiskOutcome> {
    let (impacts, likelihood) = input.validate()?;
    Ok(assess(&impacts, likelihood))
}

pub fn reduction(initial: &RiskOutcome, residual: &RiskOutcome) -> ReductionStats {
    let absolute = initial.risk_score as i32 - residual.risk_score as i32;
    // A stored score is never 0, but outcomes can be built by hand.
    let percentage = if initial.risk_score == 0 {
        0.0
    } else {
        absolute as f64 / initial.risk_score as f64 * 100.0
    };
    ReductionStats {
        absolute,
        percentage,
        initial_level: initial.risk_level,
        residual_level: residual.risk_level,
    }
}
