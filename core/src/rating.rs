//! Rating value objects for the 5×5 risk matrix.
//!
//! A `Rating` can only be built through `Rating::new`, so an
//! `ImpactRatingSet` or `LikelihoodRating` that exists is always in 1..=5.

use crate::error::{HazopError, HazopResult};
use serde::{Deserialize, Serialize};

pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;

/// One step on the 1..=5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub fn new(field: &'static str, value: i64) -> HazopResult<Self> {
        if value < RATING_MIN as i64 || value > RATING_MAX as i64 {
            return Err(HazopError::out_of_range(field, value));
        }
        Ok(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(d)?;
        Rating::new("rating", raw).map_err(serde::de::Error::custom)
    }
}

/// The six fixed impact dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactCategory {
    Safety,
    Financial,
    Environmental,
    Reputation,
    Schedule,
    Performance,
}

impl ImpactCategory {
    pub const ALL: [ImpactCategory; 6] = [
        ImpactCategory::Safety,
        ImpactCategory::Financial,
        ImpactCategory::Environmental,
        ImpactCategory::Reputation,
        ImpactCategory::Schedule,
        ImpactCategory::Performance,
    ];

    /// Wire name of the rating field, e.g. `safety_impact`.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Safety        => "safety_impact",
            Self::Financial     => "financial_impact",
            Self::Environmental => "environmental_impact",
            Self::Reputation    => "reputation_impact",
            Self::Schedule      => "schedule_impact",
            Self::Performance   => "performance_impact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImpactRatingSet {
    pub safety:        Rating,
    pub financial:     Rating,
    pub environmental: Rating,
    pub reputation:    Rating,
    pub schedule:      Rating,
    pub performance:   Rating,
}

impl ImpactRatingSet {
    pub fn get(&self, category: ImpactCategory) -> Rating {
        match category {
            ImpactCategory::Safety        => self.safety,
            ImpactCategory::Financial     => self.financial,
            ImpactCategory::Environmental => self.environmental,
            ImpactCategory::Reputation    => self.reputation,
            ImpactCategory::Schedule      => self.schedule,
            ImpactCategory::Performance   => self.performance,
        }
    }

    /// Highest rating across all six categories.
    pub fn max_impact(&self) -> Rating {
        ImpactCategory::ALL
            .iter()
            .map(|c| self.get(*c))
            .max()
            .unwrap_or(self.safety)
    }

    /// Every category at the same rating. Mostly useful in tests.
    pub fn uniform(rating: Rating) -> Self {
        Self {
            safety: rating,
            financial: rating,
            environmental: rating,
            reputation: rating,
            schedule: rating,
            performance: rating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikelihoodRating(pub Rating);

impl LikelihoodRating {
    pub fn new(value: i64) -> HazopResult<Self> {
        Rating::new("likelihood", value).map(Self)
    }

    pub fn value(self) -> u8 {
        self.0.value()
    }
}

/// Raw assessment payload as it arrives from a client.
/// Nothing here is trusted until `validate()` succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentInput {
    pub safety_impact:        i64,
    pub financial_impact:     i64,
    pub environmental_impact: i64,
    pub reputation_impact:    i64,
    pub schedule_impact:      i64,
    pub performance_impact:   i64,
    pub likelihood:           i64,
}

impl AssessmentInput {
    /// Read the payload field by field from loose JSON, so that a
    /// fractional or string rating is reported against its field
    /// instead of as a generic decode failure.
    pub fn from_json(value: &serde_json::Value) -> HazopResult<Self> {
        let field = |name: &'static str| -> HazopResult<i64> {
            let raw = value.get(name).ok_or_else(|| HazopError::Validation {
                field: name,
                reason: "missing".into(),
            })?;
            raw.as_i64().ok_or_else(|| HazopError::Validation {
                field: name,
                reason: format!("{raw} is not an integer"),
            })
        };
        Ok(Self {
            safety_impact:        field("safety_impact")?,
            financial_impact:     field("financial_impact")?,
            environmental_impact: field("environmental_impact")?,
            reputation_impact:    field("reputation_impact")?,
            schedule_impact:      field("schedule_impact")?,
            performance_impact:   field("performance_impact")?,
            likelihood:           field("likelihood")?,
        })
    }

    pub fn validate(&self) -> HazopResult<(ImpactRatingSet, LikelihoodRating)> {
        let impacts = ImpactRatingSet {
            safety:        Rating::new("safety_impact", self.safety_impact)?,
            financial:     Rating::new("financial_impact", self.financial_impact)?,
            environmental: Rating::new("environmental_impact", self.environmental_impact)?,
            reputation:    Rating::new("reputation_impact", self.reputation_impact)?,
            schedule:      Rating::new("schedule_impact", self.schedule_impact)?,
            performance:   Rating::new("performance_impact", self.performance_impact)?,
        };
        let likelihood = LikelihoodRating::new(self.likelihood)?;
        Ok((impacts, likelihood))
    }
}
